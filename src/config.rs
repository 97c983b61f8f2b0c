// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : hedge_allocator — HUBO-encoded yield / hedge allocation engine
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Picks {pool, hedge, tenor, size, rebalance} maximizing after-cost
          APR under a stress scenario. Encodes the choice as a higher-order
          binary polynomial for the Dirac-3 solver, falls back to an exhaustive
          search, exposes Prometheus metrics, and records JSONL run logs.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use tracing::warn;
use url::Url;

use crate::hubo::{ModelCfg, DEFAULT_LAMBDA_MULT, DEFAULT_TARGET_MAX_COEF_ABS};
use crate::orchestrator::OrchestratorCfg;

pub const DEFAULT_API_URL: &str = "https://api.qci-prod.com";

/// Which solver answers an optimization request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverMode {
    Exhaustive,
    Dirac,
}

impl SolverMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exhaustive" | "local" | "brute_force" => Some(SolverMode::Exhaustive),
            "dirac" | "dirac3" | "dirac-3" | "qci" => Some(SolverMode::Dirac),
            _ => None,
        }
    }

    pub fn from_env(key: &str, default_mode: SolverMode) -> SolverMode {
        env::var(key).ok().and_then(|s| Self::parse(&s)).unwrap_or(default_mode)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverMode::Exhaustive => "exhaustive",
            SolverMode::Dirac => "dirac",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    pub solver_mode: SolverMode,
    pub record_file: Option<String>,
    pub server_port: u16,
}

/// Connection settings for the external solver.
#[derive(Clone)]
pub struct SolverApiCfg {
    pub api_url: String,
    /// Refresh token. Never logged.
    pub token: Option<String>,
    pub http_timeout_secs: u64,
}

impl std::fmt::Debug for SolverApiCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverApiCfg")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<set>"))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct SolverCfg {
    pub api: SolverApiCfg,
    pub orchestrator: OrchestratorCfg,
    pub model: ModelCfg,
}

impl Default for SolverCfg {
    fn default() -> Self {
        Self {
            api: SolverApiCfg { api_url: DEFAULT_API_URL.to_string(), token: None, http_timeout_secs: 30 },
            orchestrator: OrchestratorCfg::default(),
            model: ModelCfg::default(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Relaxation schedule accepted by the device: 1..=4.
pub fn clamp_schedule(v: i64) -> u8 {
    v.clamp(1, 4) as u8
}

pub fn load() -> (Args, SolverCfg) {
    // .env first so every key below can come from it
    let _ = dotenv();

    // ===== Basic =====
    let solver_mode = SolverMode::from_env("SOLVER_MODE", SolverMode::Exhaustive);
    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.trim().is_empty());
    let server_port = parse_env("SERVER_PORT").unwrap_or(8000);
    let args = Args { solver_mode, record_file, server_port };

    // ===== Solver API =====
    let mut api_url = env::var("QCI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    if let Err(e) = Url::parse(&api_url) {
        warn!(%api_url, error = %e, "QCI_API_URL invalid, using default");
        api_url = DEFAULT_API_URL.to_string();
    }
    let token = env::var("QCI_TOKEN")
        .or_else(|_| env::var("QCI_ACCESS_TOKEN"))
        .ok()
        .filter(|t| !t.trim().is_empty());
    let http_timeout_secs = parse_env("SOLVER_HTTP_TIMEOUT_SECS").unwrap_or(30);

    // ===== Job polling =====
    let orchestrator = OrchestratorCfg {
        poll_interval: Duration::from_secs(parse_env("SOLVER_POLL_INTERVAL_SECS").unwrap_or(5).max(1)),
        timeout: Duration::from_secs(parse_env("SOLVER_TIMEOUT_SECS").unwrap_or(300)),
        num_samples: parse_env("SOLVER_NUM_SAMPLES").unwrap_or(10u32).max(1),
        relaxation_schedule: clamp_schedule(parse_env("SOLVER_RELAXATION_SCHEDULE").unwrap_or(1)),
    };

    // ===== Model knobs =====
    let model = ModelCfg {
        lambda_mult: parse_env("LAMBDA_MULT")
            .filter(|v: &f64| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_LAMBDA_MULT),
        target_max_coef_abs: parse_env("TARGET_MAX_COEF_ABS")
            .filter(|v: &f64| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_TARGET_MAX_COEF_ABS),
    };

    if solver_mode == SolverMode::Dirac && token.is_none() {
        warn!("SOLVER_MODE=dirac but no QCI_TOKEN / QCI_ACCESS_TOKEN; runs will fall back to exhaustive");
    }

    let api = SolverApiCfg { api_url, token, http_timeout_secs };
    (args, SolverCfg { api, orchestrator, model })
}
