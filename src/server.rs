// ===============================
// src/server.rs
// ===============================
//
//   POST /optimize  -> OptimizerResult (422 on invalid input)
//   GET  /runs      -> run log, oldest first
//   GET  /metrics   -> Prometheus text
//   GET  /healthz   -> ok
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::domain::{OptimizeRequest, OptimizerResult};
use crate::error::OptimizerError;
use crate::metrics;
use crate::optimizer::LiveOptimizer;
use crate::recorder::RunLog;

pub struct AppState {
    optimizer: LiveOptimizer,
    runs: RunLog,
    // one optimization in flight at a time
    gate: Mutex<()>,
}

impl AppState {
    pub fn new(optimizer: LiveOptimizer, runs: RunLog) -> Self {
        Self { optimizer, runs, gate: Mutex::new(()) }
    }

    pub fn runs(&self) -> &RunLog { &self.runs }
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Body>) -> Response<Body> {
    let mut resp = Response::new(body.into());
    *resp.status_mut() = status;
    if let Ok(v) = HeaderValue::from_str(content_type) {
        resp.headers_mut().insert(CONTENT_TYPE, v);
    }
    resp
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(buf) => respond(status, "application/json", buf),
        Err(e) => {
            error!(?e, "response serialize failed");
            respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "serialize error")
        }
    }
}

fn error_response(e: &OptimizerError) -> Response<Body> {
    match e {
        OptimizerError::Validation(violations) => json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &json!({ "error": "validation failed", "violations": violations }),
        ),
        OptimizerError::InvalidInput(msg) => json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &json!({ "error": "invalid input", "violations": [msg] }),
        ),
        other => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "error": other.to_string(), "kind": other.reason_label() }),
        ),
    }
}

async fn optimize(state: &AppState, req: Request<Body>) -> Response<Body> {
    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => {
            warn!(?e, "optimize: body read failed");
            return respond(StatusCode::BAD_REQUEST, "text/plain", "unreadable body");
        }
    };
    let request: OptimizeRequest = match serde_json::from_slice(&bytes) {
        Ok(r) => r,
        Err(e) => {
            return json_response(StatusCode::BAD_REQUEST, &json!({ "error": format!("bad json: {e}") }))
        }
    };

    let _guard = state.gate.lock().await;
    // Sender lives in this future: a dropped connection drops both and polling stops.
    let (_cancel_tx, mut cancel_rx) = watch::channel(false);
    match state.optimizer.optimize(&request, &mut cancel_rx).await {
        Ok(result) => {
            let entry = state.runs.append(result);
            json_response(StatusCode::OK, entry.as_ref())
        }
        Err(e) => error_response(&e),
    }
}

pub async fn handle(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let resp = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => respond(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, "/metrics") => {
            respond(StatusCode::OK, &metrics::content_type(), metrics::encode_metrics())
        }
        (&Method::GET, "/runs") => {
            let runs = state.runs.snapshot();
            let view: Vec<&OptimizerResult> = runs.iter().map(|r| r.as_ref()).collect();
            json_response(StatusCode::OK, &view)
        }
        (&Method::POST, "/optimize") => optimize(&state, req).await,
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    };
    Ok(resp)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> Result<(), hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req))) }
    });
    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(%addr, "serving /optimize /runs /metrics /healthz");
    server.await
}
