// ===============================
// src/optimizer.rs
// ===============================
//
// validate -> build model -> (Dirac-3 | exhaustive) -> decode -> breakdown
//          -> baseline -> explanation -> OptimizerResult
//
// Any solver-stage failure becomes the exhaustive fallback path, so the
// caller gets either a result or an explicit validation / cancel error.
//
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{clamp_schedule, SolverCfg, SolverMode};
use crate::cost_model::{hedge_terms, il_penalty_apr, score};
use crate::decoder::{debug_map, decode, resolve};
use crate::domain::{
    BaselineComparison, Breakdown, DebugInfo, Decision, InputsUsed, OptimizeRequest, OptimizerResult, Scenario,
    ScoreMeta, SolverPath, NO_HEDGE,
};
use crate::encoder::{GroupKind, VariableLayout};
use crate::error::{OptimizerError, Result};
use crate::exhaustive;
use crate::hubo::{build_model, HuboModel, ModelCfg};
use crate::metrics::{
    FALLBACKS, HUBO_TERMS, HUBO_VARIABLES, LAST_NET_APR_BPS, LATENCY_MS, OPTIMIZATIONS,
    VALIDATION_FAILURES,
};
use crate::orchestrator::{Clock, Orchestrator, SolverBackend, TokioClock};
use crate::solver_client::HttpSolver;
use crate::validate;

pub const SCHEMA_VERSION: &str = "1.0";

pub type LiveOptimizer = Optimizer<HttpSolver, TokioClock>;

/// What a solver path produced, before baseline and explanation.
#[derive(Debug, Clone)]
struct Solved {
    decision: Decision,
    breakdown: Breakdown,
    objective_value: Option<f64>,
    energies: Vec<f64>,
    counts: Vec<u64>,
    vector: Vec<f64>,
}

pub struct Optimizer<B, C> {
    mode: SolverMode,
    model: ModelCfg,
    solver: Option<Orchestrator<B, C>>,
    /// Why `solver` is missing in Dirac mode.
    unavailable: Option<String>,
}

impl Optimizer<HttpSolver, TokioClock> {
    /// Production wiring from config. A solver that cannot be built (e.g. no
    /// token) leaves Dirac mode running on the fallback path.
    pub fn live(mode: SolverMode, cfg: &SolverCfg) -> LiveOptimizer {
        if mode == SolverMode::Exhaustive {
            return Self::exhaustive(cfg.model);
        }
        match HttpSolver::new(&cfg.api) {
            Ok(http) => {
                let orch = Orchestrator::new(http, TokioClock::new(), cfg.orchestrator.clone());
                Self::with_solver(orch, cfg.model)
            }
            Err(e) => {
                error!(error = %e, "solver client unavailable, every run will fall back");
                Self { mode, model: cfg.model, solver: None, unavailable: Some(e.to_string()) }
            }
        }
    }
}

impl<B: SolverBackend, C: Clock> Optimizer<B, C> {
    pub fn exhaustive(model: ModelCfg) -> Self {
        Self { mode: SolverMode::Exhaustive, model, solver: None, unavailable: None }
    }

    pub fn with_solver(orch: Orchestrator<B, C>, model: ModelCfg) -> Self {
        Self { mode: SolverMode::Dirac, model, solver: Some(orch), unavailable: None }
    }

    pub fn mode(&self) -> SolverMode { self.mode }

    pub async fn optimize(
        &self,
        req: &OptimizeRequest,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<OptimizerResult> {
        let scenario = match validate::check(req) {
            Ok(s) => s,
            Err(e) => {
                VALIDATION_FAILURES.inc();
                warn!(error = %e, "request rejected");
                return Err(e);
            }
        };
        let started = Instant::now();

        // All modeling errors surface here, before any network call.
        let model = build_model(&req.pools, &req.hedges, scenario, &req.selected_buckets, &self.model)?;
        HUBO_VARIABLES.set(model.num_variables() as i64);
        HUBO_TERMS.set(model.poly.len() as i64);
        info!(
            scenario = %scenario.scenario_id,
            groups = model.layout.groups().len(),
            variables = model.num_variables(),
            terms = model.poly.len(),
            lambda = model.lambda,
            scale = model.scale,
            max_degree = model.max_degree(),
            "model built"
        );

        let (solved, path, fallback_reason) = match (self.mode, &self.solver) {
            (SolverMode::Exhaustive, _) => {
                (solve_exhaustive(req, scenario, &model.layout)?, SolverPath::Exhaustive, None)
            }
            (SolverMode::Dirac, None) => {
                let reason = self.unavailable.clone().unwrap_or_else(|| "solver unavailable".into());
                FALLBACKS.with_label_values(&["unavailable"]).inc();
                warn!(%reason, "falling back to exhaustive search");
                (solve_exhaustive(req, scenario, &model.layout)?, SolverPath::ExhaustiveFallback, Some(reason))
            }
            (SolverMode::Dirac, Some(orch)) => {
                match solve_remote(orch, &model, req, scenario, cancel).await {
                    Ok(s) => (s, SolverPath::Dirac, None),
                    Err(e) if e.is_fallback_eligible() => {
                        FALLBACKS.with_label_values(&[e.reason_label()]).inc();
                        warn!(error = %e, "falling back to exhaustive search");
                        let s = solve_exhaustive(req, scenario, &model.layout)?;
                        (s, SolverPath::ExhaustiveFallback, Some(e.to_string()))
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let result = assemble(req, scenario, &model, solved, path, fallback_reason, self.mode)?;

        OPTIMIZATIONS.with_label_values(&[path.as_str()]).inc();
        LATENCY_MS.observe(started.elapsed().as_secs_f64() * 1_000.0);
        LAST_NET_APR_BPS.set((result.score_breakdown.net() * 10_000.0).round() as i64);
        info!(
            path = path.as_str(),
            pool = %result.decision.pool_id,
            hedge = %result.decision.hedge_type,
            tenor = result.decision.tenor_bucket.key(),
            net_apr = result.score_breakdown.net(),
            delta = result.baseline_comparison.delta_net_apr,
            "optimization done"
        );
        Ok(result)
    }
}

fn solve_exhaustive(req: &OptimizeRequest, scenario: &Scenario, layout: &VariableLayout) -> Result<Solved> {
    let best = exhaustive::solve(&req.pools, &req.hedges, scenario, &req.selected_buckets)?;
    let d = &best.decision;
    let vector = layout.one_hot(&[
        (GroupKind::Pool, d.pool_id.as_str()),
        (GroupKind::Hedge, d.hedge_type.as_str()),
        (GroupKind::Size, d.size_bucket.key()),
        (GroupKind::Rebalance, d.rebalance_bucket.key()),
        (GroupKind::Tenor, d.tenor_bucket.key()),
    ]);
    Ok(Solved {
        decision: best.decision,
        breakdown: best.breakdown,
        objective_value: None,
        energies: vec![],
        counts: vec![],
        vector,
    })
}

async fn solve_remote<B: SolverBackend, C: Clock>(
    orch: &Orchestrator<B, C>,
    model: &HuboModel,
    req: &OptimizeRequest,
    scenario: &Scenario,
    cancel: &mut watch::Receiver<bool>,
) -> Result<Solved> {
    let num_samples = req.num_samples.unwrap_or(orch.cfg().num_samples).max(1);
    let schedule = req
        .relaxation_schedule
        .map(|v| clamp_schedule(v as i64))
        .unwrap_or(orch.cfg().relaxation_schedule);
    let job_name = format!("hedge_allocator_{}", scenario.scenario_id);

    let mut job = orch.submit(&model.poly, model.num_variables(), num_samples, schedule, &job_name).await?;
    let samples = orch.run_to_completion(&mut job, cancel).await?;
    let best = samples.first().ok_or_else(|| OptimizerError::SolverJobFailed {
        job_id: job.id.clone(),
        reason: "no samples".into(),
    })?;

    let chosen = decode(&model.layout, &best.solution);
    let (decision, pool, hedge) = resolve(&chosen, &req.pools, &req.hedges, &req.selected_buckets)?;
    let breakdown = score(pool, hedge, decision.tenor_bucket, &req.selected_buckets, &req.hedges, scenario)?;

    Ok(Solved {
        decision,
        breakdown,
        objective_value: Some(best.energy),
        energies: samples.iter().map(|s| s.energy).collect(),
        counts: samples.iter().map(|s| s.count).collect(),
        vector: best.solution.clone(),
    })
}

fn pct(v: f64) -> String { format!("{:.2}%", v * 100.0) }

fn explain(
    req: &OptimizeRequest,
    scenario: &Scenario,
    d: &Decision,
    b: &Breakdown,
    base: &BaselineComparison,
    fallback_reason: Option<&str>,
) -> Vec<String> {
    let mut out = Vec::with_capacity(5);
    let hedge = if d.hedge_type == NO_HEDGE {
        "no hedge".to_string()
    } else {
        format!("{} ({})", d.hedge_type, d.tenor_bucket.key())
    };
    out.push(format!(
        "Picked {} with {hedge} at size {} / {} rebalancing: net {} after costs (gross {}).",
        d.pool_label,
        d.size_bucket.key(),
        d.rebalance_bucket.key(),
        pct(b.net()),
        pct(b.gross()),
    ));
    out.push(format!(
        "Baseline {} (highest headline APR, unhedged) nets {}; difference {:+.2} pts ({:.1}%).",
        base.pool_label,
        pct(base.baseline_net_apr),
        base.delta_net_apr * 100.0,
        base.improvement_pct,
    ));

    if d.hedge_type != NO_HEDGE {
        let pool = req.pools.iter().find(|p| p.pool_id == d.pool_id);
        let none = req.hedges.hedge(NO_HEDGE);
        if let (Some(pool), Some(none)) = (pool, none) {
            out.push(format!(
                "The hedge cuts the IL penalty from {} to {} for {} of hedge cost.",
                pct(il_penalty_apr(
                    pool,
                    hedge_terms(pool, none, d.size_bucket, req.selected_buckets.tenor_bucket, &req.hedges).il_multiplier,
                    scenario,
                )),
                pct(b.penalties_and_costs.il_penalty_apr),
                pct(b.penalties_and_costs.hedge_cost_apr),
            ));
        }
    }

    let p = &b.penalties_and_costs;
    let (name, v) = [
        ("impermanent-loss risk", p.il_penalty_apr),
        ("hedge cost", p.hedge_cost_apr),
        ("execution drag (gas, slippage, MEV)", p.execution_drag_apr),
        ("failure and unwind risk", p.risk_penalty_apr),
    ]
    .into_iter()
    .fold(("", f64::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc });
    if v > 0.0 {
        out.push(format!("Largest cost is {name} at {} under scenario {}.", pct(v), scenario.scenario_id));
    }

    if let Some(r) = fallback_reason {
        out.push(format!("External solver unavailable ({r}); result comes from exhaustive search."));
    }
    out
}

fn assemble(
    req: &OptimizeRequest,
    scenario: &Scenario,
    model: &HuboModel,
    solved: Solved,
    path: SolverPath,
    fallback_reason: Option<String>,
    mode: SolverMode,
) -> Result<OptimizerResult> {
    let buckets = &req.selected_buckets;
    let baseline = exhaustive::baseline(&req.pools, &req.hedges, scenario, buckets, solved.breakdown.net())?;
    let explanation = explain(req, scenario, &solved.decision, &solved.breakdown, &baseline, fallback_reason.as_deref());

    Ok(OptimizerResult {
        schema_version: SCHEMA_VERSION.to_string(),
        as_of_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        inputs_used: InputsUsed {
            scenario_id: scenario.scenario_id.clone(),
            position_size_usd: buckets.position_size_usd,
            rebalance_bucket: buckets.rebalance_bucket,
            tenor_bucket: buckets.tenor_bucket,
            solver_mode: mode.as_str().to_string(),
        },
        decision: solved.decision,
        score: ScoreMeta {
            solver_path: path,
            objective_value: solved.objective_value,
            coef_rescale: model.scale,
            lambda: model.lambda,
            max_degree: model.max_degree(),
            num_variables: model.num_variables(),
            num_terms: model.poly.len(),
            fallback_reason,
        },
        score_breakdown: solved.breakdown,
        baseline_comparison: baseline,
        explanation,
        debug: DebugInfo {
            energies: solved.energies,
            counts: solved.counts,
            chosen_binary_variables: debug_map(&model.layout, &solved.vector),
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::Tenor;
    use crate::orchestrator::tests::{completed, ManualClock, ScriptedBackend};
    use crate::orchestrator::OrchestratorCfg;
    use crate::solver_api::JobStatus;
    use crate::testutil::reference_request;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    type TestOptimizer = Optimizer<ScriptedBackend, ManualClock>;

    /// A finished exhaustive result for the reference request.
    pub fn sample_result() -> OptimizerResult {
        let req = reference_request();
        let scenario = &req.scenarios[0];
        let model = build_model(&req.pools, &req.hedges, scenario, &req.selected_buckets, &ModelCfg::default()).unwrap();
        let solved = solve_exhaustive(&req, scenario, &model.layout).unwrap();
        assemble(&req, scenario, &model, solved, SolverPath::Exhaustive, None, SolverMode::Exhaustive).unwrap()
    }

    fn remote(script: Vec<Result<JobStatus>>) -> TestOptimizer {
        let orch = Orchestrator::new(
            ScriptedBackend::with_script(script),
            ManualClock::default(),
            OrchestratorCfg { timeout: Duration::from_secs(30), ..Default::default() },
        );
        Optimizer::with_solver(orch, ModelCfg::default())
    }

    fn optimal_vector() -> Vec<f64> {
        // POOL_DEGEN, protective_put, M, weekly, 30D
        let mut x = vec![0.0; 14];
        for v in [3, 5, 7, 10, 14] {
            x[v - 1] = 1.0;
        }
        x
    }

    #[tokio::test]
    async fn exhaustive_mode_beats_baseline() {
        let (_tx, mut rx) = watch::channel(false);
        let r = TestOptimizer::exhaustive(ModelCfg::default())
            .optimize(&reference_request(), &mut rx)
            .await
            .unwrap();
        assert_eq!(r.score.solver_path, SolverPath::Exhaustive);
        assert_eq!(r.decision.pool_id, "POOL_DEGEN");
        assert_eq!(r.decision.hedge_type, "protective_put");
        let b = &r.baseline_comparison;
        assert!(b.optimized_net_apr > b.baseline_net_apr);
        assert!((b.delta_net_apr - (b.optimized_net_apr - b.baseline_net_apr)).abs() < 1e-9);
        assert_eq!(r.debug.chosen_binary_variables.vector, optimal_vector());
        assert!(r.explanation.len() >= 3);
    }

    #[tokio::test]
    async fn dirac_sample_is_decoded_and_rescored() {
        let opt = remote(vec![
            Ok(JobStatus::Running),
            Ok(completed(&[(-10.0, vec![0.0; 14]), (-42.0, optimal_vector())])),
        ]);
        let (_tx, mut rx) = watch::channel(false);
        let r = opt.optimize(&reference_request(), &mut rx).await.unwrap();

        assert_eq!(r.score.solver_path, SolverPath::Dirac);
        assert_eq!(r.score.objective_value, Some(-42.0));
        assert_eq!(r.debug.energies, vec![-42.0, -10.0]);
        assert_eq!(r.decision.tenor_bucket, Tenor::D30);
        assert!((r.score_breakdown.net() - 0.29528).abs() < 1e-9);
        assert_eq!(r.debug.chosen_binary_variables.groups["hedge"]["protective_put"], 1.0);
    }

    #[tokio::test]
    async fn failed_job_falls_back_with_reason() {
        let opt = remote(vec![Ok(JobStatus::Failed { error: Some("queue purged".into()) })]);
        let (_tx, mut rx) = watch::channel(false);
        let r = opt.optimize(&reference_request(), &mut rx).await.unwrap();
        assert_eq!(r.score.solver_path, SolverPath::ExhaustiveFallback);
        assert!(r.score.fallback_reason.as_deref().unwrap().contains("queue purged"));
        assert_eq!(r.decision.pool_id, "POOL_DEGEN");
        assert!(r.explanation.last().unwrap().contains("exhaustive"));
    }

    #[tokio::test]
    async fn timeout_falls_back() {
        let opt = remote(vec![Ok(JobStatus::Running)]);
        let (_tx, mut rx) = watch::channel(false);
        let r = opt.optimize(&reference_request(), &mut rx).await.unwrap();
        assert_eq!(r.score.solver_path, SolverPath::ExhaustiveFallback);
        assert!(r.score.fallback_reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_solver_falls_back() {
        let opt: TestOptimizer = Optimizer {
            mode: SolverMode::Dirac,
            model: ModelCfg::default(),
            solver: None,
            unavailable: Some("no token".into()),
        };
        let (_tx, mut rx) = watch::channel(false);
        let r = opt.optimize(&reference_request(), &mut rx).await.unwrap();
        assert_eq!(r.score.solver_path, SolverPath::ExhaustiveFallback);
        assert_eq!(r.inputs_used.solver_mode, "dirac");
    }

    #[tokio::test]
    async fn validation_errors_never_reach_the_solver() {
        let opt = remote(vec![Ok(JobStatus::Running)]);
        let mut req = reference_request();
        req.pools.truncate(1);
        let (_tx, mut rx) = watch::channel(false);
        let err = opt.optimize(&req, &mut rx).await.unwrap_err();
        assert!(matches!(err, OptimizerError::Validation(_)));
        let calls = &opt.solver.as_ref().unwrap().backend().status_calls;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_is_surfaced_not_fallen_back() {
        let opt = remote(vec![Ok(JobStatus::Running)]);
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        let err = opt.optimize(&reference_request(), &mut rx).await.unwrap_err();
        assert!(matches!(err, OptimizerError::Cancelled));
    }
}
