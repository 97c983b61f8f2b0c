// ===============================
// src/testutil.rs
// ===============================
//
// Shared fixtures for unit tests.
//
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{
    ExecutionTerms, HedgeCatalog, HedgeOverride, HedgeType, OptimizeRequest, Pool, PoolOverride,
    RebalanceBucket, RewardTerms, RiskTerms, Scenario, ScenarioMultipliers, SelectedBuckets,
    SizeFactor, SizeScaling, Tenor, NO_HEDGE,
};
use crate::encoder::VariableLayout;

fn pool(id: &str, label: &str, reward: RewardTerms, risk: RiskTerms, execution: ExecutionTerms) -> Pool {
    Pool {
        pool_id: id.into(),
        label: label.into(),
        protocol: "test".into(),
        chain: "ethereum".into(),
        reward,
        risk,
        execution,
    }
}

/// Lending / blue-chip LP / degen LP, `none` + `protective_put`, $50k weekly 14D.
pub fn reference_request() -> OptimizeRequest {
    let pools = vec![
        pool(
            "POOL_LEND",
            "Stable lending",
            RewardTerms { fee_apr: 0.0, incentive_apr: 0.0, base_apr: 0.045 },
            RiskTerms { il_risk_score: 0.0, volatility_score: 0.1, liquidity_unwind_cost_usd: 20.0 },
            ExecutionTerms {
                gas_cost_usd_per_rebalance: 2.0,
                slippage_bps_per_rebalance: 0.0,
                mev_risk_score: 0.0,
                failure_prob_per_rebalance: 0.005,
            },
        ),
        pool(
            "POOL_LP",
            "ETH/USDC LP",
            RewardTerms { fee_apr: 0.12, incentive_apr: 0.05, base_apr: 0.0 },
            RiskTerms { il_risk_score: 0.4, volatility_score: 0.5, liquidity_unwind_cost_usd: 150.0 },
            ExecutionTerms {
                gas_cost_usd_per_rebalance: 8.0,
                slippage_bps_per_rebalance: 3.0,
                mev_risk_score: 0.3,
                failure_prob_per_rebalance: 0.01,
            },
        ),
        pool(
            "POOL_DEGEN",
            "Degen farm",
            RewardTerms { fee_apr: 0.45, incentive_apr: 0.15, base_apr: 0.0 },
            RiskTerms { il_risk_score: 2.0, volatility_score: 0.9, liquidity_unwind_cost_usd: 500.0 },
            ExecutionTerms {
                gas_cost_usd_per_rebalance: 20.0,
                slippage_bps_per_rebalance: 5.0,
                mev_risk_score: 0.6,
                failure_prob_per_rebalance: 0.03,
            },
        ),
    ];

    OptimizeRequest {
        scenario_id: "BASE".into(),
        pools,
        hedges: HedgeCatalog {
            hedge_types: vec![
                HedgeType { key: NO_HEDGE.into(), cost_apr: 0.0, il_multiplier: 1.0 },
                HedgeType { key: "protective_put".into(), cost_apr: 0.06, il_multiplier: 0.65 },
            ],
            tenor_buckets: Tenor::ALL.to_vec(),
            size_scaling: SizeScaling::default(),
            pool_overrides: Vec::new(),
        },
        scenarios: vec![Scenario {
            scenario_id: "BASE".into(),
            label: "Base case".into(),
            notes: String::new(),
            multipliers: ScenarioMultipliers::default(),
        }],
        selected_buckets: SelectedBuckets {
            position_size_usd: 50_000.0,
            rebalance_bucket: RebalanceBucket::Weekly,
            tenor_bucket: Tenor::D14,
        },
        num_samples: None,
        relaxation_schedule: None,
    }
}

/// Random but structurally valid request; same seed, same request.
pub fn random_request(seed: u64) -> OptimizeRequest {
    let mut rng = StdRng::seed_from_u64(seed);

    let n_pools = rng.gen_range(1..=4);
    let pools = (0..n_pools)
        .map(|i| {
            pool(
                &format!("P{i}"),
                &format!("pool {i}"),
                RewardTerms {
                    fee_apr: rng.gen_range(0.0..0.6),
                    incentive_apr: rng.gen_range(0.0..0.3),
                    base_apr: rng.gen_range(0.0..0.08),
                },
                RiskTerms {
                    il_risk_score: rng.gen_range(0.0..2.5),
                    volatility_score: rng.gen_range(0.0..1.0),
                    liquidity_unwind_cost_usd: rng.gen_range(0.0..800.0),
                },
                ExecutionTerms {
                    gas_cost_usd_per_rebalance: rng.gen_range(0.0..30.0),
                    slippage_bps_per_rebalance: rng.gen_range(0.0..10.0),
                    mev_risk_score: rng.gen_range(0.0..1.0),
                    failure_prob_per_rebalance: rng.gen_range(0.0..0.05),
                },
            )
        })
        .collect();

    let mut hedge_types = vec![HedgeType {
        key: NO_HEDGE.into(),
        cost_apr: rng.gen_range(0.0..0.08),
        il_multiplier: 1.0,
    }];
    for key in ["protective_put", "collar"] {
        if rng.gen_bool(0.7) {
            hedge_types.push(HedgeType {
                key: key.into(),
                cost_apr: rng.gen_range(0.0..0.12),
                il_multiplier: rng.gen_range(0.2..1.0),
            });
        }
    }
    let tenor_buckets: Vec<Tenor> = Tenor::ALL.into_iter().filter(|_| rng.gen_bool(0.7)).collect();

    let factor = |rng: &mut StdRng| SizeFactor {
        cost_multiplier: rng.gen_range(0.7..1.3),
        benefit_multiplier: rng.gen_range(0.8..1.2),
    };
    let size_scaling = SizeScaling { s: factor(&mut rng), m: factor(&mut rng), l: factor(&mut rng) };

    // at most one override per pool, at a random tenor, for a random hedge (may be `none`)
    let mut pool_overrides = Vec::new();
    for i in 0..n_pools {
        if !rng.gen_bool(0.5) {
            continue;
        }
        let hedge = hedge_types[rng.gen_range(0..hedge_types.len())].key.clone();
        let tenor = Tenor::ALL[rng.gen_range(0..3)];
        let ov = HedgeOverride {
            cost_apr: rng.gen_bool(0.7).then(|| rng.gen_range(0.0..0.12)),
            il_multiplier: rng.gen_bool(0.7).then(|| rng.gen_range(0.1..1.0)),
        };
        pool_overrides.push(PoolOverride {
            pool_id: format!("P{i}"),
            tenor_overrides: BTreeMap::from([(tenor.key().to_string(), BTreeMap::from([(hedge, ov)]))]),
        });
    }

    let m = |rng: &mut StdRng| rng.gen_range(0.3..2.0);
    let multipliers = ScenarioMultipliers {
        reward_multiplier: m(&mut rng),
        il_risk_multiplier: m(&mut rng),
        gas_multiplier: m(&mut rng),
        slippage_multiplier: m(&mut rng),
        mev_multiplier: m(&mut rng),
        failure_multiplier: m(&mut rng),
    };

    OptimizeRequest {
        scenario_id: "RAND".into(),
        pools,
        hedges: HedgeCatalog { hedge_types, tenor_buckets, size_scaling, pool_overrides },
        scenarios: vec![Scenario {
            scenario_id: "RAND".into(),
            label: String::new(),
            notes: String::new(),
            multipliers,
        }],
        selected_buckets: SelectedBuckets {
            position_size_usd: rng.gen_range(1_000.0..400_000.0),
            rebalance_bucket: RebalanceBucket::ALL[rng.gen_range(0..3)],
            tenor_bucket: Tenor::ALL[rng.gen_range(0..3)],
        },
        num_samples: None,
        relaxation_schedule: None,
    }
}

/// Every assignment with exactly one active variable per group.
pub fn feasible_assignments(layout: &VariableLayout) -> Vec<Vec<f64>> {
    let mut out = vec![vec![0.0; layout.num_variables()]];
    for g in layout.groups() {
        out = out
            .into_iter()
            .flat_map(|x| {
                g.var_indices.iter().map(move |&v| {
                    let mut y = x.clone();
                    y[v - 1] = 1.0;
                    y
                })
            })
            .collect();
    }
    out
}
