// ===============================
// src/poly.rs
// ===============================
//
// Sparse pseudo-boolean polynomial. A monomial is a sorted, deduplicated set
// of 1-based variable indices (x*x == x for binaries). Adding an existing
// monomial accumulates into the stored coefficient.
//
use ahash::AHashMap as HashMap;

use crate::error::{OptimizerError, Result};

/// Coefficients below this magnitude are treated as zero and never stored.
pub const COEF_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct PolyBuilder {
    max_degree: usize,
    terms: HashMap<Vec<usize>, f64>,
}

impl PolyBuilder {
    pub fn new(max_degree: usize) -> Self {
        Self { max_degree, terms: HashMap::new() }
    }

    pub fn max_degree(&self) -> usize { self.max_degree }
    pub fn len(&self) -> usize { self.terms.len() }
    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    pub fn add(&mut self, monomial: &[usize], coef: f64) -> Result<()> {
        if monomial.is_empty() {
            return Err(OptimizerError::UnsupportedTerm);
        }
        let mut key = monomial.to_vec();
        key.sort_unstable();
        key.dedup();
        if key.len() > self.max_degree {
            return Err(OptimizerError::DegreeOverflow { degree: key.len(), max: self.max_degree });
        }
        if coef.abs() < COEF_EPSILON {
            return Ok(());
        }

        let slot = self.terms.entry(key.clone()).or_insert(0.0);
        *slot += coef;
        if slot.abs() < COEF_EPSILON {
            self.terms.remove(&key);
        }
        Ok(())
    }

    pub fn get(&self, monomial: &[usize]) -> Option<f64> {
        let mut key = monomial.to_vec();
        key.sort_unstable();
        key.dedup();
        self.terms.get(&key).copied()
    }

    /// Largest |coef|; 1.0 when empty so callers can divide by it.
    pub fn max_abs_coef(&self) -> f64 {
        self.terms
            .values()
            .map(|c| c.abs())
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))
            .unwrap_or(1.0)
    }

    pub fn rescale(&mut self, factor: f64) {
        for c in self.terms.values_mut() {
            *c /= factor;
        }
    }

    pub fn min_degree(&self) -> usize {
        self.terms.keys().map(|k| k.len()).min().unwrap_or(1)
    }

    /// Terms in deterministic (degree, indices) order.
    pub fn sorted_terms(&self) -> Vec<(Vec<usize>, f64)> {
        let mut out: Vec<(Vec<usize>, f64)> =
            self.terms.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Energy of a (possibly relaxed) assignment; `x[i - 1]` is variable i.
    pub fn energy(&self, x: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(mono, c)| c * mono.iter().map(|&i| x.get(i - 1).copied().unwrap_or(0.0)).product::<f64>())
            .sum()
    }
}
