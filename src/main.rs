// ===============================
// src/main.rs
// ===============================
/*
 # one-shot, local solver
 cargo run -- run --pools data/pools.json --hedges data/hedges.json \
     --scenarios data/scenarios.json --scenario BASE --size 50000 --rebalance weekly --tenor 14D

 # service
 SOLVER_MODE=dirac QCI_TOKEN=... cargo run -- serve --port 8000
 curl -s localhost:8000/metrics | grep '^solver_fallbacks_total'
*/
/*
=============================================================================
Project : hedge_allocator — HUBO-encoded yield / hedge allocation engine
Module  : main.rs
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
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hedge_allocator::config::{self, Args, SolverCfg};
use hedge_allocator::dataset;
use hedge_allocator::domain::{OptimizeRequest, OptimizerResult, RebalanceBucket, SelectedBuckets, Tenor};
use hedge_allocator::metrics;
use hedge_allocator::optimizer::Optimizer;
use hedge_allocator::recorder::{self, RunLog};
use hedge_allocator::server::{self, AppState};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "hedge_allocator", version, about = "Yield / hedge allocation optimizer")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize once from JSON dataset files and print the result.
    Run {
        #[arg(long)]
        pools: PathBuf,
        #[arg(long)]
        hedges: PathBuf,
        #[arg(long)]
        scenarios: PathBuf,
        #[arg(long, default_value = "BASE")]
        scenario: String,
        /// Position size in USD.
        #[arg(long, default_value_t = 50_000.0)]
        size: f64,
        #[arg(long, default_value = "weekly", value_parser = parse_rebalance)]
        rebalance: RebalanceBucket,
        #[arg(long, default_value = "14D", value_parser = parse_tenor)]
        tenor: Tenor,
        #[arg(long)]
        num_samples: Option<u32>,
        #[arg(long)]
        relaxation_schedule: Option<u8>,
        /// Write the result here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// HTTP service: /optimize, /runs, /metrics, /healthz.
    Serve {
        /// Overrides SERVER_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
}

fn parse_rebalance(s: &str) -> Result<RebalanceBucket, String> {
    RebalanceBucket::parse(s).ok_or_else(|| format!("unknown rebalance bucket '{s}' (daily|weekly|monthly)"))
}

fn parse_tenor(s: &str) -> Result<Tenor, String> {
    Tenor::parse(s).ok_or_else(|| format!("unknown tenor '{s}' (7D|14D|30D)"))
}

/// Run log plus the JSONL recorder task when RECORD_FILE is set.
fn run_log(args: &Args) -> (RunLog, Option<tokio::task::JoinHandle<()>>) {
    match args.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Arc<OptimizerResult>>(1024);
            (RunLog::with_sink(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (RunLog::in_memory(), None),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_once(
    args: &Args,
    cfg: &SolverCfg,
    pools: PathBuf,
    hedges: PathBuf,
    scenarios: PathBuf,
    scenario_id: String,
    selected_buckets: SelectedBuckets,
    num_samples: Option<u32>,
    relaxation_schedule: Option<u8>,
    out: Option<PathBuf>,
) -> Result<(), BoxError> {
    let req = OptimizeRequest {
        scenario_id,
        pools: dataset::load_pools(&pools).await?,
        hedges: dataset::load_hedges(&hedges).await?,
        scenarios: dataset::load_scenarios(&scenarios).await?,
        selected_buckets,
        num_samples,
        relaxation_schedule,
    };

    let optimizer = Optimizer::live(args.solver_mode, cfg);
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c: cancelling optimization");
            let _ = cancel_tx.send(true);
        }
    });

    let result = optimizer.optimize(&req, &mut cancel_rx).await?;
    let text = serde_json::to_string_pretty(&result)?;

    let (log, recorder_task) = run_log(args);
    log.append(result);
    drop(log);
    if let Some(task) = recorder_task {
        let _ = task.await;
    }

    match out {
        Some(path) => {
            tokio::fs::write(&path, text).await?;
            info!(path = %path.display(), "result written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // ---- Config & metrics ----
    let (args, cfg) = config::load();
    metrics::init();

    info!(
        solver_mode = args.solver_mode.as_str(),
        api_url = %cfg.api.api_url,
        token_set = cfg.api.token.is_some(),
        poll_interval = ?cfg.orchestrator.poll_interval,
        timeout = ?cfg.orchestrator.timeout,
        num_samples = cfg.orchestrator.num_samples,
        relaxation_schedule = cfg.orchestrator.relaxation_schedule,
        lambda_mult = cfg.model.lambda_mult,
        record_file = ?args.record_file,
        "startup config"
    );

    match cli.cmd {
        Command::Run {
            pools,
            hedges,
            scenarios,
            scenario,
            size,
            rebalance,
            tenor,
            num_samples,
            relaxation_schedule,
            out,
        } => {
            let buckets = SelectedBuckets {
                position_size_usd: size,
                rebalance_bucket: rebalance,
                tenor_bucket: tenor,
            };
            if let Err(e) = run_once(
                &args,
                &cfg,
                pools,
                hedges,
                scenarios,
                scenario,
                buckets,
                num_samples,
                relaxation_schedule,
                out,
            )
            .await
            {
                error!(error = %e, "run failed");
                std::process::exit(1);
            }
        }
        Command::Serve { port } => {
            let (runs, _recorder_task) = run_log(&args);
            let state = Arc::new(AppState::new(Optimizer::live(args.solver_mode, &cfg), runs));
            if let Err(e) = server::serve(port.unwrap_or(args.server_port), state).await {
                error!(error = %e, "server stopped");
                std::process::exit(1);
            }
        }
    }
}
