// ===============================
// src/solver_client.rs
// ===============================
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error};
use url::Url;

use crate::config::SolverApiCfg;
use crate::error::{OptimizerError, Result};
use crate::orchestrator::SolverBackend;
use crate::solver_api::{
    FileResponse, JobBody, JobResponse, JobStatus, PolynomialFile, TokenRequest, TokenResponse,
};

const TOKEN_PATH: &str = "auth/v1/access-tokens";
const FILES_PATH: &str = "optimization/v1/files";
const JOBS_PATH: &str = "optimization/v1/jobs";

/// REST client for the QCI optimization API.
/// The refresh token is exchanged for an access token on first use.
pub struct HttpSolver {
    http: reqwest::Client,
    base: Url,
    refresh_token: String,
    access_token: OnceCell<String>,
}

// Keeps tokens out of logs.
impl std::fmt::Debug for HttpSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSolver").field("base", &self.base.as_str()).finish_non_exhaustive()
    }
}

/// Which stage a failed call belongs to.
#[derive(Debug, Clone, Copy)]
enum Stage { Auth, Upload, Submit, Status }

impl Stage {
    fn err(self, msg: String) -> OptimizerError {
        match self {
            Stage::Auth => OptimizerError::SolverAuth(msg),
            Stage::Upload => OptimizerError::SolverUpload(msg),
            Stage::Submit => OptimizerError::SolverSubmit(msg),
            Stage::Status => OptimizerError::SolverTransport(msg),
        }
    }
}

impl HttpSolver {
    pub fn new(cfg: &SolverApiCfg) -> Result<Self> {
        let token = cfg
            .token
            .clone()
            .ok_or_else(|| OptimizerError::SolverAuth("QCI_TOKEN / QCI_ACCESS_TOKEN not set".into()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .map_err(|e| OptimizerError::SolverTransport(format!("http client: {e}")))?;
        // trailing slash so join() appends instead of replacing the last segment
        let mut base = Url::parse(&cfg.api_url)
            .map_err(|e| OptimizerError::SolverTransport(format!("bad solver url {}: {e}", cfg.api_url)))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(Self { http, base, refresh_token: token, access_token: OnceCell::new() })
    }

    fn url(&self, path: &str, stage: Stage) -> Result<Url> {
        self.base.join(path).map_err(|e| stage.err(format!("bad url {path}: {e}")))
    }

    async fn access_token(&self) -> Result<&str> {
        let tok = self
            .access_token
            .get_or_try_init(|| async {
                let url = self.url(TOKEN_PATH, Stage::Auth)?;
                let body = TokenRequest { refresh_token: &self.refresh_token };
                let rsp = self.http.post(url).json(&body).send().await;
                let t: TokenResponse = Self::decode(rsp, Stage::Auth).await?;
                debug!("solver access token acquired");
                Ok::<_, OptimizerError>(t.access_token)
            })
            .await?;
        Ok(tok.as_str())
    }

    async fn decode<T: DeserializeOwned>(
        rsp: std::result::Result<reqwest::Response, reqwest::Error>,
        stage: Stage,
    ) -> Result<T> {
        let rsp = rsp.map_err(|e| stage.err(format!("send: {e}")))?;
        let code = rsp.status();
        if !code.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            error!(%code, %body, ?stage, "solver api call failed");
            return Err(match code {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    OptimizerError::SolverAuth(format!("{code}: {body}"))
                }
                _ => stage.err(format!("{code}: {body}")),
            });
        }
        rsp.json::<T>().await.map_err(|e| stage.err(format!("decode: {e}")))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B, stage: Stage) -> Result<T> {
        let token = self.access_token().await?;
        let url = self.url(path, stage)?;
        let rsp = self.http.post(url).bearer_auth(token).json(body).send().await;
        Self::decode(rsp, stage).await
    }
}

#[async_trait]
impl SolverBackend for HttpSolver {
    async fn upload(&self, file: &PolynomialFile) -> Result<String> {
        let r: FileResponse = self.post(FILES_PATH, file, Stage::Upload).await?;
        Ok(r.file_id)
    }

    async fn submit(&self, body: &JobBody) -> Result<String> {
        let r: JobResponse = self.post(JOBS_PATH, body, Stage::Submit).await?;
        Ok(r.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let token = self.access_token().await?;
        let url = self.url(&format!("{JOBS_PATH}/{job_id}"), Stage::Status)?;
        let rsp = self.http.get(url).bearer_auth(token).send().await;
        Self::decode(rsp, Stage::Status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(url: &str, token: Option<&str>) -> SolverApiCfg {
        SolverApiCfg {
            api_url: url.to_string(),
            token: token.map(String::from),
            http_timeout_secs: 5,
        }
    }

    #[test]
    fn missing_token_is_an_auth_error() {
        let err = HttpSolver::new(&cfg("https://api.qci-prod.com", None)).unwrap_err();
        assert!(matches!(err, OptimizerError::SolverAuth(_)));
    }

    #[test]
    fn malformed_url_is_rejected() {
        assert!(HttpSolver::new(&cfg("not a url", Some("t"))).is_err());
    }

    #[test]
    fn paths_join_under_base_prefix() {
        let s = HttpSolver::new(&cfg("https://gw.example.com/qci", Some("secret"))).unwrap();
        let u = s.url("optimization/v1/jobs/abc", Stage::Status).unwrap();
        assert_eq!(u.as_str(), "https://gw.example.com/qci/optimization/v1/jobs/abc");
    }

    #[test]
    fn debug_output_omits_token() {
        let s = HttpSolver::new(&cfg("https://api.qci-prod.com", Some("super-secret"))).unwrap();
        assert!(!format!("{s:?}").contains("super-secret"));
    }
}
