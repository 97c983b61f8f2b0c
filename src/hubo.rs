// ===============================
// src/hubo.rs
// ===============================
//
// Energy (minimized) = costs - rewards + one-hot penalties.
//
//   reward        : -gross                      pool                          (1st)
//   exec + risk   : +drag                       pool*size*rebalance           (3rd)
//   IL penalty    : +il                         pool*size*rebalance*hedge[*tenor] (4th/5th)
//   hedge cost    : +cost                       pool*size*hedge[*tenor]           (3rd/4th)
//
// `none` never carries a tenor factor: its terms are priced at the user's
// tenor, the same tenor the decoder and the exhaustive search assign it.
// On any one-hot assignment that matches the user's size/rebalance, the
// objective equals -net_apr of the decoded {pool, hedge, tenor}.
//
use crate::cost_model::{
    check_position_size, execution_drag, gross_apr, hedge_terms, il_penalty_apr, risk_penalty,
    BucketPoint, HedgeTerms,
};
use crate::domain::{
    HedgeCatalog, Pool, RebalanceBucket, Scenario, SelectedBuckets, SizeBucket, Tenor, NO_HEDGE,
};
use crate::encoder::{GroupKind, VariableGroup, VariableLayout};
use crate::error::{OptimizerError, Result};
use crate::poly::PolyBuilder;

pub const DEFAULT_LAMBDA_MULT: f64 = 20.0;
pub const DEFAULT_TARGET_MAX_COEF_ABS: f64 = 25.0;

#[derive(Debug, Clone, Copy)]
pub struct ModelCfg {
    /// lambda = lambda_mult x max |objective coef|
    pub lambda_mult: f64,
    /// Rescale when max |coef| exceeds this.
    pub target_max_coef_abs: f64,
}

impl Default for ModelCfg {
    fn default() -> Self {
        Self { lambda_mult: DEFAULT_LAMBDA_MULT, target_max_coef_abs: DEFAULT_TARGET_MAX_COEF_ABS }
    }
}

#[derive(Debug, Clone)]
pub struct HuboModel {
    pub layout: VariableLayout,
    pub poly: PolyBuilder,
    pub lambda: f64,
    /// Every coefficient was divided by this (1.0 if untouched).
    pub scale: f64,
}

impl HuboModel {
    pub fn num_variables(&self) -> usize { self.layout.num_variables() }
    pub fn max_degree(&self) -> usize { self.poly.max_degree() }
}

fn group(layout: &VariableLayout, kind: GroupKind) -> Result<&VariableGroup> {
    layout
        .group(kind)
        .ok_or_else(|| OptimizerError::InvalidInput(format!("layout has no {} group", kind.name())))
}

/// Encode, penalize and rescale. Built from scratch on every run.
pub fn build_model(
    pools: &[Pool],
    catalog: &HedgeCatalog,
    scenario: &Scenario,
    buckets: &SelectedBuckets,
    cfg: &ModelCfg,
) -> Result<HuboModel> {
    check_position_size(buckets.position_size_usd)?;
    if pools.is_empty() {
        return Err(OptimizerError::NoFeasibleCombination);
    }

    let layout = VariableLayout::build(pools, catalog);
    let mut poly = PolyBuilder::new(layout.max_degree());
    add_objective(&mut poly, &layout, pools, catalog, scenario, buckets)?;
    let lambda = add_constraints(&mut poly, &layout, buckets, cfg.lambda_mult)?;
    let scale = rescale_to_target(&mut poly, cfg.target_max_coef_abs);

    Ok(HuboModel { layout, poly, lambda, scale })
}

pub fn add_objective(
    poly: &mut PolyBuilder,
    layout: &VariableLayout,
    pools: &[Pool],
    catalog: &HedgeCatalog,
    scenario: &Scenario,
    buckets: &SelectedBuckets,
) -> Result<()> {
    let pool_g = group(layout, GroupKind::Pool)?;
    let hedge_g = group(layout, GroupKind::Hedge)?;
    let size_g = group(layout, GroupKind::Size)?;
    let reb_g = group(layout, GroupKind::Rebalance)?;
    let tenor_g = layout.group(GroupKind::Tenor);

    for (pool, &p) in pools.iter().zip(&pool_g.var_indices) {
        // maximize reward == minimize its negation
        poly.add(&[p], -gross_apr(pool, scenario))?;

        for (size, &s) in SizeBucket::ALL.iter().zip(&size_g.var_indices) {
            // (tenor variable, pricing) per hedge; a lone `None` means "no tenor factor"
            let priced: Vec<(usize, Vec<(Option<usize>, HedgeTerms)>)> = catalog
                .hedge_types
                .iter()
                .zip(&hedge_g.var_indices)
                .map(|(hedge, &h)| {
                    let price = |tenor: Tenor| hedge_terms(pool, hedge, *size, tenor, catalog);
                    let terms = match tenor_g {
                        Some(tg) if hedge.key != NO_HEDGE => catalog
                            .tenor_buckets
                            .iter()
                            .zip(&tg.var_indices)
                            .map(|(tenor, &t)| (Some(t), price(*tenor)))
                            .collect(),
                        _ => vec![(None, price(buckets.tenor_bucket))],
                    };
                    (h, terms)
                })
                .collect();

            for (reb, &r) in RebalanceBucket::ALL.iter().zip(&reb_g.var_indices) {
                let at = BucketPoint {
                    size_bucket: *size,
                    rebalance: *reb,
                    position_size_usd: buckets.position_size_usd,
                };
                let drag = execution_drag(pool, scenario, &at).total()
                    + risk_penalty(pool, scenario, &at).total();
                poly.add(&[p, s, r], drag)?;

                for (h, terms) in &priced {
                    for (t, ht) in terms {
                        let il = il_penalty_apr(pool, ht.il_multiplier, scenario);
                        match t {
                            Some(t) => poly.add(&[p, s, r, *h, *t], il)?,
                            None => poly.add(&[p, s, r, *h], il)?,
                        }
                    }
                }
            }

            for (h, terms) in &priced {
                for (t, ht) in terms {
                    match t {
                        Some(t) => poly.add(&[p, s, *h, *t], ht.cost_apr)?,
                        None => poly.add(&[p, s, *h], ht.cost_apr)?,
                    }
                }
            }
        }
    }
    Ok(())
}

/// (sum v - 1)^2 without the constant: -lambda*v_i + 2*lambda*v_i*v_j.
/// Minimum (-lambda) exactly when one variable is active.
pub fn add_one_hot_penalty(poly: &mut PolyBuilder, g: &VariableGroup, lambda: f64) -> Result<()> {
    for &v in &g.var_indices {
        poly.add(&[v], -lambda)?;
    }
    for (i, &vi) in g.var_indices.iter().enumerate() {
        for &vj in &g.var_indices[i + 1..] {
            poly.add(&[vi, vj], 2.0 * lambda)?;
        }
    }
    Ok(())
}

/// Bias every non-selected category of a user-fixed group by +lambda.
pub fn pin_selection(poly: &mut PolyBuilder, g: &VariableGroup, selected: &str, lambda: f64) -> Result<()> {
    for (key, &v) in g.keys.iter().zip(&g.var_indices) {
        if key != selected {
            poly.add(&[v], lambda)?;
        }
    }
    Ok(())
}

/// Returns lambda, sized from the objective before any penalty is added.
pub fn add_constraints(
    poly: &mut PolyBuilder,
    layout: &VariableLayout,
    buckets: &SelectedBuckets,
    lambda_mult: f64,
) -> Result<f64> {
    let lambda = lambda_mult * poly.max_abs_coef();
    for g in layout.groups() {
        add_one_hot_penalty(poly, g, lambda)?;
    }
    pin_selection(poly, group(layout, GroupKind::Size)?, buckets.size_bucket().key(), lambda)?;
    pin_selection(poly, group(layout, GroupKind::Rebalance)?, buckets.rebalance_bucket.key(), lambda)?;
    Ok(lambda)
}

/// Divide by max/target when max |coef| exceeds target. Returns the factor.
pub fn rescale_to_target(poly: &mut PolyBuilder, target: f64) -> f64 {
    let max_abs = poly.max_abs_coef();
    if max_abs > target {
        let scale = max_abs / target;
        poly.rescale(scale);
        scale
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode, resolve};
    use crate::domain::{Decision, OptimizeRequest};
    use crate::exhaustive;
    use crate::testutil::{feasible_assignments, random_request, reference_request};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn model_for(req: &crate::domain::OptimizeRequest) -> HuboModel {
        let scenario = req.scenarios.iter().find(|s| s.scenario_id == req.scenario_id).unwrap();
        build_model(&req.pools, &req.hedges, scenario, &req.selected_buckets, &ModelCfg::default()).unwrap()
    }

    fn argmin(poly: &PolyBuilder, candidates: impl Iterator<Item = Vec<f64>>) -> (Vec<f64>, f64) {
        candidates
            .map(|x| {
                let e = poly.energy(&x);
                (x, e)
            })
            .fold(None, |best: Option<(Vec<f64>, f64)>, (x, e)| match best {
                Some((bx, be)) if be <= e => Some((bx, be)),
                _ => Some((x, e)),
            })
            .unwrap()
    }

    /// Every 0/1 vector over `n` variables.
    fn all_assignments(n: usize) -> impl Iterator<Item = Vec<f64>> {
        assert!(n <= 16, "{n} variables is too many to enumerate");
        (0u32..(1 << n)).map(move |mask| (0..n).map(|i| ((mask >> i) & 1) as f64).collect())
    }

    /// Global minimum over all 2^n assignments, resolved to a decision and its net APR.
    fn brute_force_decision(req: &OptimizeRequest, model: &HuboModel) -> std::result::Result<(Decision, f64), String> {
        let (x, _) = argmin(&model.poly, all_assignments(model.num_variables()));
        for g in model.layout.groups() {
            let active: f64 = g.var_indices.iter().map(|&i| x[i - 1]).sum();
            if active != 1.0 {
                return Err(format!("group {} has {active} active variables", g.kind.name()));
            }
        }
        let chosen = decode(&model.layout, &x);
        if chosen.get(GroupKind::Size) != Some(req.selected_buckets.size_bucket().key())
            || chosen.get(GroupKind::Rebalance) != Some(req.selected_buckets.rebalance_bucket.key())
        {
            return Err(format!("pinned groups moved: {chosen:?}"));
        }
        let scenario = req.scenarios.iter().find(|s| s.scenario_id == req.scenario_id).unwrap();
        let (decision, pool, hedge) = resolve(&chosen, &req.pools, &req.hedges, &req.selected_buckets).unwrap();
        let b = crate::cost_model::score(pool, hedge, decision.tenor_bucket, &req.selected_buckets, &req.hedges, scenario)
            .unwrap();
        Ok((decision, b.net()))
    }

    #[test]
    fn one_hot_penalty_selects_exactly_one_for_sizes_1_to_6() {
        for n in 1..=6usize {
            let layout = VariableLayout::from_groups(vec![(
                GroupKind::Pool,
                (0..n).map(|i| format!("k{i}")).collect(),
            )]);
            let mut poly = PolyBuilder::new(2);
            add_one_hot_penalty(&mut poly, &layout.groups()[0], 3.0).unwrap();

            let mut best = f64::INFINITY;
            let mut best_active = Vec::new();
            for mask in 0u32..(1 << n) {
                let x: Vec<f64> = (0..n).map(|i| ((mask >> i) & 1) as f64).collect();
                let e = poly.energy(&x);
                let active = mask.count_ones();
                if e < best - 1e-12 {
                    best = e;
                    best_active = vec![active];
                } else if (e - best).abs() <= 1e-12 {
                    best_active.push(active);
                }
            }
            assert!((best + 3.0).abs() < 1e-12, "n={n}");
            assert!(best_active.iter().all(|&a| a == 1), "n={n}: {best_active:?}");
            assert_eq!(best_active.len(), n);
        }
    }

    #[test]
    fn feasible_energy_tracks_net_apr() {
        let req = reference_request();
        let scenario = &req.scenarios[0];
        let layout = VariableLayout::build(&req.pools, &req.hedges);
        let mut poly = PolyBuilder::new(layout.max_degree());
        add_objective(&mut poly, &layout, &req.pools, &req.hedges, scenario, &req.selected_buckets).unwrap();

        for x in feasible_assignments(&layout) {
            let chosen = decode(&layout, &x);
            if chosen.get(GroupKind::Size) != Some("M") || chosen.get(GroupKind::Rebalance) != Some("weekly") {
                continue;
            }
            let pool = req.pools.iter().find(|p| Some(p.pool_id.as_str()) == chosen.get(GroupKind::Pool)).unwrap();
            let hedge = req.hedges.hedge(chosen.get(GroupKind::Hedge).unwrap()).unwrap();
            let tenor = match hedge.key.as_str() {
                NO_HEDGE => req.selected_buckets.tenor_bucket,
                _ => Tenor::parse(chosen.get(GroupKind::Tenor).unwrap()).unwrap(),
            };
            let b = crate::cost_model::score(pool, hedge, tenor, &req.selected_buckets, &req.hedges, scenario).unwrap();
            assert!((poly.energy(&x) + b.net()).abs() < 1e-9);
        }
    }

    #[test]
    fn unconstrained_minimum_is_feasible_and_matches_exhaustive() {
        let req = reference_request();
        let model = model_for(&req);
        let (decision, net) = brute_force_decision(&req, &model).unwrap();
        let best = exhaustive::solve(&req.pools, &req.hedges, &req.scenarios[0], &req.selected_buckets).unwrap();
        assert_eq!(decision, best.decision);
        assert!((net - best.breakdown.net()).abs() < 1e-9);
    }

    #[test]
    fn costly_unhedged_option_is_priced_at_the_selected_tenor() {
        // `none` is expensive enough that a cheap long tenor would make it win
        // if it were priced per tenor; it is only ever held at 7D.
        let mut req = reference_request();
        req.hedges.hedge_types[0].cost_apr = 0.10;
        req.hedges.hedge_types[1].cost_apr = 0.13;
        req.hedges.hedge_types[1].il_multiplier = 1.0;
        req.selected_buckets.tenor_bucket = Tenor::D7;

        let model = model_for(&req);
        let (decision, net) = brute_force_decision(&req, &model).unwrap();
        let best = exhaustive::solve(&req.pools, &req.hedges, &req.scenarios[0], &req.selected_buckets).unwrap();

        assert_eq!(best.decision.hedge_type, "protective_put");
        assert_eq!(best.decision.tenor_bucket, Tenor::D30);
        assert_eq!(decision, best.decision);
        assert!((net - best.breakdown.net()).abs() < 1e-9, "poly {net} vs exhaustive {}", best.breakdown.net());
    }

    #[test]
    fn pool_override_at_one_tenor_reaches_both_paths() {
        let mut req = reference_request();
        let cheap = crate::domain::HedgeOverride { cost_apr: Some(0.001), il_multiplier: Some(0.1) };
        req.hedges.pool_overrides.push(crate::domain::PoolOverride {
            pool_id: "POOL_DEGEN".into(),
            tenor_overrides: BTreeMap::from([(
                "7D".to_string(),
                BTreeMap::from([("protective_put".to_string(), cheap)]),
            )]),
        });

        let model = model_for(&req);
        assert_eq!(model.max_degree(), 5);
        let (decision, _) = brute_force_decision(&req, &model).unwrap();
        let best = exhaustive::solve(&req.pools, &req.hedges, &req.scenarios[0], &req.selected_buckets).unwrap();
        assert_eq!(best.decision.pool_id, "POOL_DEGEN");
        assert_eq!(best.decision.tenor_bucket, Tenor::D7);
        assert_eq!(decision, best.decision);
    }

    #[test]
    fn rescaling_caps_magnitude_and_keeps_argmin() {
        let req = reference_request();
        let scenario = &req.scenarios[0];
        let layout = VariableLayout::build(&req.pools, &req.hedges);
        let mut poly = PolyBuilder::new(layout.max_degree());
        add_objective(&mut poly, &layout, &req.pools, &req.hedges, scenario, &req.selected_buckets).unwrap();
        add_constraints(&mut poly, &layout, &req.selected_buckets, DEFAULT_LAMBDA_MULT).unwrap();

        let (before, _) = argmin(&poly, feasible_assignments(&layout).into_iter());
        let mut scaled = poly.clone();
        let f = rescale_to_target(&mut scaled, 0.5);
        assert!(f > 1.0);
        assert!((scaled.max_abs_coef() - 0.5).abs() < 1e-9);
        let (after, _) = argmin(&scaled, feasible_assignments(&layout).into_iter());
        assert_eq!(decode(&layout, &before), decode(&layout, &after));

        // below target: untouched
        let mut small = poly.clone();
        assert_eq!(rescale_to_target(&mut small, 1e9), 1.0);
    }

    #[test]
    fn lambda_dominates_objective() {
        let model = model_for(&reference_request());
        assert!(model.lambda > 0.0);
        assert!(model.scale >= 1.0);
        assert!(model.poly.max_abs_coef() <= DEFAULT_TARGET_MAX_COEF_ABS + 1e-9);
    }

    #[test]
    fn empty_position_list_has_no_feasible_combination() {
        let mut req = reference_request();
        req.pools.clear();
        let s = req.scenarios[0].clone();
        let err = build_model(&req.pools, &req.hedges, &s, &req.selected_buckets, &ModelCfg::default()).unwrap_err();
        assert!(matches!(err, OptimizerError::NoFeasibleCombination));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn polynomial_and_exhaustive_agree(seed in any::<u64>()) {
            let req = random_request(seed);
            let model = model_for(&req);
            let scenario = req.scenarios.iter().find(|s| s.scenario_id == req.scenario_id).unwrap();
            let best = exhaustive::solve(&req.pools, &req.hedges, scenario, &req.selected_buckets).unwrap();

            let found = brute_force_decision(&req, &model);
            prop_assert!(found.is_ok(), "{:?}", found.as_ref().err());
            let (decision, net) = found.unwrap();
            prop_assert!((net - best.breakdown.net()).abs() < 1e-9,
                "poly net {} vs exhaustive {}", net, best.breakdown.net());
            prop_assert_eq!(decision, best.decision);
        }
    }
}
