// ===============================
// src/cost_model.rs
// ===============================
//
// Shared economics for both solver paths. Everything here is APR-denominated
// (0.05 = 5%/yr) and pure. The polynomial encoder and the exhaustive solver
// call the same functions, so both paths use a single calibration.
//
use crate::domain::{
    Breakdown, HedgeCatalog, HedgeType, NetApr, PenaltiesAndCosts, Pool, RebalanceBucket, Rewards,
    Scenario, SelectedBuckets, SizeBucket, Tenor,
};
use crate::error::{OptimizerError, Result};

/// IL score -> APR at multiplier 1.0.
pub const IL_BASE_IMPACT: f64 = 0.15;
/// Weight on one-off unwind cost as a fraction of notional.
pub const UNWIND_WEIGHT: f64 = 0.10;
/// Notional fraction lost to MEV per rebalance, per unit of MEV score.
pub const MEV_COST_PER_SCORE: f64 = 0.0002;
/// Notional fraction lost when a rebalance fails.
pub const FAILURE_LOSS_FRACTION: f64 = 0.003;

/// Position size and rebalance cadence at which a cost is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct BucketPoint {
    pub size_bucket: SizeBucket,
    pub rebalance: RebalanceBucket,
    pub position_size_usd: f64,
}

impl From<&SelectedBuckets> for BucketPoint {
    fn from(b: &SelectedBuckets) -> Self {
        Self {
            size_bucket: b.size_bucket(),
            rebalance: b.rebalance_bucket,
            position_size_usd: b.position_size_usd,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionDrag {
    pub gas: f64,
    pub slippage: f64,
    pub mev: f64,
}

impl ExecutionDrag {
    pub fn total(&self) -> f64 { self.gas + self.slippage + self.mev }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskPenalty {
    pub failure: f64,
    pub unwind: f64,
}

impl RiskPenalty {
    pub fn total(&self) -> f64 { self.failure + self.unwind }
}

pub fn annualize(per_event: f64, rebalance: RebalanceBucket) -> f64 {
    per_event * rebalance.events_per_year()
}

pub fn check_position_size(position_size_usd: f64) -> Result<()> {
    if !position_size_usd.is_finite() || position_size_usd <= 0.0 {
        return Err(OptimizerError::InvalidInput(format!(
            "position_size_usd must be finite and > 0, got {position_size_usd}"
        )));
    }
    Ok(())
}

/// (fee + incentive) x reward multiplier + base.
pub fn gross_apr(pool: &Pool, scenario: &Scenario) -> f64 {
    let r = &pool.reward;
    (r.fee_apr + r.incentive_apr) * scenario.multipliers.reward_multiplier + r.base_apr
}

/// Effective hedge pricing for one pool at one size and tenor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeTerms {
    pub cost_apr: f64,
    pub il_multiplier: f64,
}

/// Catalog base, replaced by a pool/tenor override when one exists, then
/// scaled by the size bucket. The tenor cost multiplier only applies to the
/// catalog base; override prices are already quoted for their tenor.
pub fn hedge_terms(
    pool: &Pool,
    hedge: &HedgeType,
    size_bucket: SizeBucket,
    tenor: Tenor,
    catalog: &HedgeCatalog,
) -> HedgeTerms {
    let ov = catalog.override_for(&pool.pool_id, tenor, &hedge.key);
    let cost = match ov.and_then(|o| o.cost_apr) {
        Some(c) => c,
        None => hedge.cost_apr * tenor.cost_multiplier(),
    };
    let il_mult = ov.and_then(|o| o.il_multiplier).unwrap_or(hedge.il_multiplier);
    let f = catalog.size_scaling.get(size_bucket);
    HedgeTerms {
        cost_apr: cost * f.cost_multiplier,
        il_multiplier: il_mult * f.benefit_multiplier,
    }
}

pub fn il_penalty_apr(pool: &Pool, il_multiplier: f64, scenario: &Scenario) -> f64 {
    pool.risk.il_risk_score
        * scenario.multipliers.il_risk_multiplier
        * il_multiplier
        * IL_BASE_IMPACT
}

pub fn hedge_cost_apr(
    pool: &Pool,
    hedge: &HedgeType,
    size_bucket: SizeBucket,
    tenor: Tenor,
    catalog: &HedgeCatalog,
) -> f64 {
    hedge_terms(pool, hedge, size_bucket, tenor, catalog).cost_apr
}

pub fn execution_drag(pool: &Pool, scenario: &Scenario, at: &BucketPoint) -> ExecutionDrag {
    let m = &scenario.multipliers;
    let e = &pool.execution;
    let gas_per_event = e.gas_cost_usd_per_rebalance * m.gas_multiplier / at.position_size_usd;
    let slip_per_event = e.slippage_bps_per_rebalance * m.slippage_multiplier / 10_000.0;
    let mev_per_event = e.mev_risk_score * m.mev_multiplier * MEV_COST_PER_SCORE;
    ExecutionDrag {
        gas: annualize(gas_per_event, at.rebalance),
        slippage: annualize(slip_per_event, at.rebalance),
        mev: annualize(mev_per_event, at.rebalance),
    }
}

pub fn risk_penalty(pool: &Pool, scenario: &Scenario, at: &BucketPoint) -> RiskPenalty {
    let fail_per_event = pool.execution.failure_prob_per_rebalance
        * scenario.multipliers.failure_multiplier
        * FAILURE_LOSS_FRACTION;
    RiskPenalty {
        failure: annualize(fail_per_event, at.rebalance),
        unwind: pool.risk.liquidity_unwind_cost_usd / at.position_size_usd * UNWIND_WEIGHT,
    }
}

/// Full breakdown for one {pool, hedge, tenor} at the user's buckets.
pub fn score(
    pool: &Pool,
    hedge: &HedgeType,
    tenor: Tenor,
    buckets: &SelectedBuckets,
    catalog: &HedgeCatalog,
    scenario: &Scenario,
) -> Result<Breakdown> {
    score_at(pool, hedge, tenor, &BucketPoint::from(buckets), catalog, scenario)
}

pub fn score_at(
    pool: &Pool,
    hedge: &HedgeType,
    tenor: Tenor,
    at: &BucketPoint,
    catalog: &HedgeCatalog,
    scenario: &Scenario,
) -> Result<Breakdown> {
    check_position_size(at.position_size_usd)?;

    let r = &pool.reward;
    let gross = gross_apr(pool, scenario);
    let terms = hedge_terms(pool, hedge, at.size_bucket, tenor, catalog);
    let il = il_penalty_apr(pool, terms.il_multiplier, scenario);
    let hedge_cost = terms.cost_apr;
    let exec = execution_drag(pool, scenario, at);
    let risk = risk_penalty(pool, scenario, at);

    let total = il + hedge_cost + exec.total() + risk.total();
    Ok(Breakdown {
        rewards: Rewards {
            fee_apr: r.fee_apr,
            incentive_apr: r.incentive_apr,
            base_apr: r.base_apr,
            total_gross_apr: gross,
        },
        penalties_and_costs: PenaltiesAndCosts {
            il_penalty_apr: il,
            hedge_cost_apr: hedge_cost,
            gas_drag_apr: exec.gas,
            slippage_drag_apr: exec.slippage,
            mev_drag_apr: exec.mev,
            execution_drag_apr: exec.total(),
            failure_drag_apr: risk.failure,
            unwind_penalty_apr: risk.unwind,
            risk_penalty_apr: risk.total(),
            total_penalties_apr: total,
        },
        net_apr: NetApr { estimated_net_apr: gross - total },
    })
}
