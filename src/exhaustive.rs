// ===============================
// src/exhaustive.rs
// ===============================
//
// Brute-force reference solver: pool x hedge x tenor at the user's size and
// rebalance. Used directly, as the fallback, and as the oracle in tests.
//
use tracing::debug;

use crate::cost_model::{gross_apr, score};
use crate::domain::{
    BaselineComparison, Breakdown, Decision, HedgeCatalog, Pool, Scenario, SelectedBuckets, Tenor,
    NO_HEDGE,
};
use crate::error::{OptimizerError, Result};

pub const BASELINE_ID: &str = "MAX_GROSS_APR_NO_HEDGE";

#[derive(Debug, Clone)]
pub struct Best {
    pub decision: Decision,
    pub breakdown: Breakdown,
    /// Combinations scored.
    pub evaluated: usize,
}

/// Tenors worth scoring for a hedge. Unhedged positions have no tenor choice.
fn tenors_for(hedge_key: &str, catalog: &HedgeCatalog, selected: Tenor) -> Vec<Tenor> {
    if hedge_key == NO_HEDGE || catalog.tenor_buckets.is_empty() {
        vec![selected]
    } else {
        catalog.tenor_buckets.clone()
    }
}

fn decision(pool: &Pool, hedge_key: &str, tenor: Tenor, buckets: &SelectedBuckets) -> Decision {
    Decision {
        pool_id: pool.pool_id.clone(),
        pool_label: pool.label.clone(),
        hedge_type: hedge_key.to_string(),
        tenor_bucket: tenor,
        size_bucket: buckets.size_bucket(),
        rebalance_bucket: buckets.rebalance_bucket,
    }
}

/// Max net APR; ties keep the first combination in (pool, hedge, tenor) order.
pub fn solve(
    pools: &[Pool],
    catalog: &HedgeCatalog,
    scenario: &Scenario,
    buckets: &SelectedBuckets,
) -> Result<Best> {
    if pools.is_empty() {
        return Err(OptimizerError::NoFeasibleCombination);
    }

    let mut best: Option<(Decision, Breakdown)> = None;
    let mut evaluated = 0usize;
    for pool in pools {
        for hedge in &catalog.hedge_types {
            for tenor in tenors_for(&hedge.key, catalog, buckets.tenor_bucket) {
                let b = score(pool, hedge, tenor, buckets, catalog, scenario)?;
                evaluated += 1;
                let better = match &best {
                    Some((_, cur)) => b.net() > cur.net(),
                    None => true,
                };
                if better {
                    best = Some((decision(pool, &hedge.key, tenor, buckets), b));
                }
            }
        }
    }

    let (decision, breakdown) = best.ok_or(OptimizerError::NoFeasibleCombination)?;
    debug!(evaluated, pool = %decision.pool_id, hedge = %decision.hedge_type, net = breakdown.net(), "exhaustive optimum");
    Ok(Best { decision, breakdown, evaluated })
}

/// (delta, improvement_pct); pct is 0 when the baseline net is exactly 0.
pub fn improvement(baseline_net: f64, optimized_net: f64) -> (f64, f64) {
    let delta = optimized_net - baseline_net;
    let pct = if baseline_net == 0.0 { 0.0 } else { delta / baseline_net.abs() * 100.0 };
    (delta, pct)
}

/// Greedy baseline: highest scenario-adjusted gross APR, unhedged, user's tenor.
pub fn baseline(
    pools: &[Pool],
    catalog: &HedgeCatalog,
    scenario: &Scenario,
    buckets: &SelectedBuckets,
    optimized_net: f64,
) -> Result<BaselineComparison> {
    let pool = pools
        .iter()
        .fold(None, |acc: Option<&Pool>, p| match acc {
            Some(cur) if gross_apr(cur, scenario) >= gross_apr(p, scenario) => Some(cur),
            _ => Some(p),
        })
        .ok_or(OptimizerError::NoFeasibleCombination)?;
    let none = catalog
        .hedge(NO_HEDGE)
        .ok_or_else(|| OptimizerError::InvalidInput(format!("hedge catalog has no '{NO_HEDGE}' entry")))?;

    let b = score(pool, none, buckets.tenor_bucket, buckets, catalog, scenario)?;
    let (delta, pct) = improvement(b.net(), optimized_net);
    Ok(BaselineComparison {
        baseline_id: BASELINE_ID.to_string(),
        pool_id: pool.pool_id.clone(),
        pool_label: pool.label.clone(),
        baseline_gross_apr: b.gross(),
        baseline_net_apr: b.net(),
        optimized_net_apr: optimized_net,
        delta_net_apr: delta,
        improvement_pct: pct,
        baseline_decision: decision(pool, NO_HEDGE, buckets.tenor_bucket, buckets),
        baseline_score_breakdown: b,
    })
}
