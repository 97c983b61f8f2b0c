// ===============================
// src/decoder.rs
// ===============================
//
// Solver vector -> one category per group. Values may be relaxed (real),
// so decoding is argmax per group and never fails.
//
use std::collections::BTreeMap;

use tracing::warn;

use crate::domain::{
    ChosenVariables, Decision, HedgeCatalog, HedgeType, Pool, SelectedBuckets, Tenor, NO_HEDGE,
};
use crate::encoder::{GroupKind, VariableGroup, VariableLayout};
use crate::error::{OptimizerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chosen {
    picks: Vec<(GroupKind, String)>,
}

impl Chosen {
    pub fn get(&self, kind: GroupKind) -> Option<&str> {
        self.picks.iter().find(|(k, _)| *k == kind).map(|(_, v)| v.as_str())
    }
}

fn value_at(x: &[f64], var: usize) -> f64 {
    match x.get(var - 1) {
        Some(v) if !v.is_nan() => *v,
        Some(_) => f64::NEG_INFINITY,
        None => 0.0,
    }
}

/// Position of the largest member value; first occurrence wins ties.
fn argmax(g: &VariableGroup, x: &[f64]) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (pos, &v) in g.var_indices.iter().enumerate() {
        let val = value_at(x, v);
        if val > best_val {
            best = pos;
            best_val = val;
        }
    }
    best
}

pub fn decode(layout: &VariableLayout, x: &[f64]) -> Chosen {
    let picks = layout
        .groups()
        .iter()
        .filter(|g| !g.keys.is_empty())
        .map(|g| (g.kind, g.keys[argmax(g, x)].clone()))
        .collect();
    Chosen { picks }
}

/// group -> {key -> value} for the debug section of the result.
pub fn debug_map(layout: &VariableLayout, x: &[f64]) -> ChosenVariables {
    let groups = layout
        .groups()
        .iter()
        .map(|g| {
            let vals: BTreeMap<String, f64> = g
                .keys
                .iter()
                .zip(&g.var_indices)
                .map(|(k, &v)| (k.clone(), x.get(v - 1).copied().unwrap_or(0.0)))
                .collect();
            (g.kind.name().to_string(), vals)
        })
        .collect();
    ChosenVariables { vector: x.to_vec(), groups }
}

/// Resolve decoded keys against the run's inputs.
///
/// Size and rebalance are reported at the user's selection (the breakdown is
/// computed there). A hedge-less pick carries the user's tenor.
pub fn resolve<'a>(
    chosen: &Chosen,
    pools: &'a [Pool],
    catalog: &'a HedgeCatalog,
    buckets: &SelectedBuckets,
) -> Result<(Decision, &'a Pool, &'a HedgeType)> {
    let pool_id = chosen.get(GroupKind::Pool).unwrap_or_default();
    let pool = pools
        .iter()
        .find(|p| p.pool_id == pool_id)
        .ok_or_else(|| OptimizerError::InvalidInput(format!("decoded unknown pool '{pool_id}'")))?;
    let hedge_key = chosen.get(GroupKind::Hedge).unwrap_or(NO_HEDGE);
    let hedge = catalog
        .hedge(hedge_key)
        .ok_or_else(|| OptimizerError::InvalidInput(format!("decoded unknown hedge '{hedge_key}'")))?;

    let tenor = match chosen.get(GroupKind::Tenor).and_then(Tenor::parse) {
        Some(t) if hedge.key != NO_HEDGE => t,
        _ => buckets.tenor_bucket,
    };

    let size = buckets.size_bucket();
    if chosen.get(GroupKind::Size).map_or(false, |s| s != size.key())
        || chosen.get(GroupKind::Rebalance).map_or(false, |r| r != buckets.rebalance_bucket.key())
    {
        warn!(
            size = ?chosen.get(GroupKind::Size),
            rebalance = ?chosen.get(GroupKind::Rebalance),
            "solver sample ignores pinned buckets; reporting the selected ones"
        );
    }

    let decision = Decision {
        pool_id: pool.pool_id.clone(),
        pool_label: pool.label.clone(),
        hedge_type: hedge.key.clone(),
        tenor_bucket: tenor,
        size_bucket: size,
        rebalance_bucket: buckets.rebalance_bucket,
    };
    Ok((decision, pool, hedge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::reference_request;

    fn layout() -> VariableLayout {
        let req = reference_request();
        VariableLayout::build(&req.pools, &req.hedges)
    }

    #[test]
    fn picks_largest_relaxed_value_per_group() {
        let l = layout();
        // pools 1..3, hedges 4..5, size 6..8, reb 9..11, tenor 12..14
        let x = [0.1, 0.7, 0.3, 0.2, 0.9, 0.0, 0.8, 0.1, 0.3, 0.4, 0.2, 0.0, 0.0, 0.6];
        let c = decode(&l, &x);
        assert_eq!(c.get(GroupKind::Pool), Some("POOL_LP"));
        assert_eq!(c.get(GroupKind::Hedge), Some("protective_put"));
        assert_eq!(c.get(GroupKind::Size), Some("M"));
        assert_eq!(c.get(GroupKind::Rebalance), Some("weekly"));
        assert_eq!(c.get(GroupKind::Tenor), Some("30D"));
    }

    #[test]
    fn ties_go_to_first_and_short_vectors_never_fail() {
        let l = layout();
        let c = decode(&l, &[0.5, 0.5, 0.5]);
        assert_eq!(c.get(GroupKind::Pool), Some("POOL_LEND"));
        // missing values read as 0: first key wins
        assert_eq!(c.get(GroupKind::Tenor), Some("7D"));

        let nan = decode(&l, &[f64::NAN, 0.0, -1.0]);
        assert_eq!(nan.get(GroupKind::Pool), Some("POOL_LP"));
    }

    #[test]
    fn argmax_is_scale_invariant() {
        let l = layout();
        let x: Vec<f64> = (0..14).map(|i| ((i * 7) % 5) as f64 * 0.3 - 0.4).collect();
        let scaled: Vec<f64> = x.iter().map(|v| v / 13.7).collect();
        assert_eq!(decode(&l, &x), decode(&l, &scaled));
    }

    #[test]
    fn unhedged_pick_reports_selected_tenor() {
        let req = reference_request();
        let l = layout();
        let mut x = vec![0.0; 14];
        for v in [3, 4, 7, 10, 12] {
            x[v - 1] = 1.0; // DEGEN, none, M, weekly, 7D
        }
        let (d, pool, hedge) = resolve(&decode(&l, &x), &req.pools, &req.hedges, &req.selected_buckets).unwrap();
        assert_eq!(pool.pool_id, "POOL_DEGEN");
        assert_eq!(hedge.key, NO_HEDGE);
        assert_eq!(d.tenor_bucket, Tenor::D14);
    }

    #[test]
    fn debug_map_lists_every_group() {
        let l = layout();
        let mut x = vec![0.0; 14];
        x[4] = 1.0;
        let m = debug_map(&l, &x);
        assert_eq!(m.groups.len(), 5);
        assert_eq!(m.groups["hedge"]["protective_put"], 1.0);
        assert_eq!(m.groups["pool"]["POOL_LEND"], 0.0);
        assert_eq!(m.vector.len(), 14);
    }
}
