// ===============================
// src/encoder.rs
// ===============================
//
// Categorical decision -> one-hot variable groups.
//
// Indices are 1-based and assigned group by group in the fixed order
// pool, hedge, size, rebalance, tenor. Index 0 is never used. The solver's
// assignment vector is 0-based, so vector[i - 1] belongs to variable i.
//
use serde::Serialize;

use crate::domain::{HedgeCatalog, Pool, RebalanceBucket, SizeBucket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind { Pool, Hedge, Size, Rebalance, Tenor }

impl GroupKind {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKind::Pool => "pool",
            GroupKind::Hedge => "hedge",
            GroupKind::Size => "size",
            GroupKind::Rebalance => "rebalance",
            GroupKind::Tenor => "tenor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableGroup {
    pub kind: GroupKind,
    pub keys: Vec<String>,
    /// Contiguous, 1-based, parallel to `keys`.
    pub var_indices: Vec<usize>,
}

impl VariableGroup {
    pub fn position(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn var_of(&self, key: &str) -> Option<usize> {
        self.position(key).map(|p| self.var_indices[p])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLayout {
    groups: Vec<VariableGroup>,
}

impl VariableLayout {
    /// Layout for one run. The tenor group is omitted when no tenors are configured.
    pub fn build(pools: &[Pool], catalog: &HedgeCatalog) -> Self {
        let mut order = vec![
            (GroupKind::Pool, pools.iter().map(|p| p.pool_id.clone()).collect()),
            (GroupKind::Hedge, catalog.hedge_types.iter().map(|h| h.key.clone()).collect()),
            (GroupKind::Size, SizeBucket::ALL.iter().map(|s| s.key().to_string()).collect()),
            (
                GroupKind::Rebalance,
                RebalanceBucket::ALL.iter().map(|r| r.key().to_string()).collect(),
            ),
        ];
        if !catalog.tenor_buckets.is_empty() {
            order.push((
                GroupKind::Tenor,
                catalog.tenor_buckets.iter().map(|t| t.key().to_string()).collect(),
            ));
        }
        Self::from_groups(order)
    }

    /// Sequential index assignment starting at 1, in the given group order.
    pub fn from_groups(order: Vec<(GroupKind, Vec<String>)>) -> Self {
        let mut next = 1usize;
        let groups = order
            .into_iter()
            .map(|(kind, keys)| {
                let var_indices: Vec<usize> = (next..next + keys.len()).collect();
                next += keys.len();
                VariableGroup { kind, keys, var_indices }
            })
            .collect();
        Self { groups }
    }

    pub fn groups(&self) -> &[VariableGroup] { &self.groups }

    pub fn group(&self, kind: GroupKind) -> Option<&VariableGroup> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    pub fn num_variables(&self) -> usize {
        self.groups.iter().map(|g| g.var_indices.len()).sum()
    }

    pub fn has_tenor(&self) -> bool { self.group(GroupKind::Tenor).is_some() }

    /// Widest monomial: pool x size x hedge x rebalance (x tenor).
    pub fn max_degree(&self) -> usize { if self.has_tenor() { 5 } else { 4 } }

    /// 0/1 vector with the named key active in each listed group.
    /// Unknown keys leave their group all-zero.
    pub fn one_hot(&self, picks: &[(GroupKind, &str)]) -> Vec<f64> {
        let mut x = vec![0.0; self.num_variables()];
        for (kind, key) in picks {
            if let Some(v) = self.group(*kind).and_then(|g| g.var_of(key)) {
                x[v - 1] = 1.0;
            }
        }
        x
    }
}
