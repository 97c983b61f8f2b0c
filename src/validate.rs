// ===============================
// src/validate.rs
// ===============================
//
// Input checks run before any modeling or network call. Unlike a fail-fast
// guard, every violation is collected so the caller sees the whole list.
//
use ahash::AHashSet as HashSet;

use crate::domain::{OptimizeRequest, Pool, Scenario, Tenor, NO_HEDGE};
use crate::error::{OptimizerError, Result};

pub const MIN_POSITIONS: usize = 3;
pub const APR_MIN: f64 = -1.0;
pub const APR_MAX: f64 = 2.0;

fn apr_in_range(v: f64) -> bool {
    v.is_finite() && (APR_MIN..=APR_MAX).contains(&v)
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn check_pool(p: &Pool, out: &mut Vec<String>) {
    let id = &p.pool_id;
    for (name, v) in [
        ("fee_apr", p.reward.fee_apr),
        ("incentive_apr", p.reward.incentive_apr),
        ("base_apr", p.reward.base_apr),
    ] {
        if !apr_in_range(v) {
            out.push(format!("pool {id}: {name}={v} outside [{APR_MIN}, {APR_MAX}]"));
        }
    }

    let fp = p.execution.failure_prob_per_rebalance;
    if !(fp.is_finite() && (0.0..=1.0).contains(&fp)) {
        out.push(format!("pool {id}: failure_prob_per_rebalance={fp} outside [0, 1]"));
    }

    for (name, v) in [
        ("il_risk_score", p.risk.il_risk_score),
        ("volatility_score", p.risk.volatility_score),
        ("liquidity_unwind_cost_usd", p.risk.liquidity_unwind_cost_usd),
        ("gas_cost_usd_per_rebalance", p.execution.gas_cost_usd_per_rebalance),
        ("slippage_bps_per_rebalance", p.execution.slippage_bps_per_rebalance),
        ("mev_risk_score", p.execution.mev_risk_score),
    ] {
        if !non_negative(v) {
            out.push(format!("pool {id}: {name}={v} must be finite and >= 0"));
        }
    }
}

/// Validate the full request; on success returns the selected scenario.
pub fn check(req: &OptimizeRequest) -> Result<&Scenario> {
    let mut out: Vec<String> = Vec::new();

    // 1) Positions
    if req.pools.len() < MIN_POSITIONS {
        out.push(format!(
            "need at least {MIN_POSITIONS} positions, got {}",
            req.pools.len()
        ));
    }
    let mut seen = HashSet::new();
    for p in &req.pools {
        if !seen.insert(p.pool_id.as_str()) {
            out.push(format!("duplicate pool_id {}", p.pool_id));
        }
        check_pool(p, &mut out);
    }

    // 2) Hedge catalog
    let cat = &req.hedges;
    if cat.hedge(NO_HEDGE).is_none() {
        out.push(format!("hedge catalog must contain the '{NO_HEDGE}' hedge type"));
    }
    let mut keys = HashSet::new();
    for h in &cat.hedge_types {
        if !keys.insert(h.key.as_str()) {
            out.push(format!("duplicate hedge type {}", h.key));
        }
        if !apr_in_range(h.cost_apr) {
            out.push(format!(
                "hedge {}: cost_apr={} outside [{APR_MIN}, {APR_MAX}]",
                h.key, h.cost_apr
            ));
        }
        if !non_negative(h.il_multiplier) {
            out.push(format!("hedge {}: il_multiplier={} must be >= 0", h.key, h.il_multiplier));
        }
    }
    let mut tenors = HashSet::new();
    for t in &cat.tenor_buckets {
        if !tenors.insert(*t) {
            out.push(format!("duplicate tenor bucket {}", t.key()));
        }
    }
    let sc = &cat.size_scaling;
    for (name, f) in [("S", sc.s), ("M", sc.m), ("L", sc.l)] {
        for (field, v) in [("cost_multiplier", f.cost_multiplier), ("benefit_multiplier", f.benefit_multiplier)] {
            if !non_negative(v) {
                out.push(format!("size_scaling {name}.{field}={v} must be >= 0"));
            }
        }
    }
    // entries for pools or hedges not in this request are inert
    for ov in &cat.pool_overrides {
        for (tenor, hedges) in &ov.tenor_overrides {
            if Tenor::parse(tenor).is_none() {
                out.push(format!("pool_overrides {}: unknown tenor '{tenor}'", ov.pool_id));
            }
            for (key, o) in hedges {
                let at = format!("pool_overrides {}/{tenor}/{key}", ov.pool_id);
                if let Some(c) = o.cost_apr.filter(|c| !apr_in_range(*c)) {
                    out.push(format!("{at}: cost_apr={c} outside [{APR_MIN}, {APR_MAX}]"));
                }
                if let Some(m) = o.il_multiplier.filter(|m| !non_negative(*m)) {
                    out.push(format!("{at}: il_multiplier={m} must be >= 0"));
                }
            }
        }
    }

    // 3) Scenarios
    for s in &req.scenarios {
        for (name, v) in s.multipliers.named() {
            if !non_negative(v) {
                out.push(format!("scenario {}: {name}={v} must be >= 0", s.scenario_id));
            }
        }
    }
    let scenario = req.scenarios.iter().find(|s| s.scenario_id == req.scenario_id);
    if scenario.is_none() {
        out.push(format!("scenario '{}' not found", req.scenario_id));
    }

    // 4) Buckets
    let size = req.selected_buckets.position_size_usd;
    if !size.is_finite() || size <= 0.0 {
        out.push(format!("position_size_usd={size} must be finite and > 0"));
    }

    match scenario {
        Some(s) if out.is_empty() => Ok(s),
        _ => Err(OptimizerError::Validation(out)),
    }
}
