// ===============================
// src/domain.rs
// ===============================
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Hedge key meaning "unhedged". Required in every catalog (baseline uses it).
pub const NO_HEDGE: &str = "none";

fn one() -> f64 { 1.0 }

// ---- Positions ----
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardTerms {
    #[serde(default)] pub fee_apr: f64,
    #[serde(default)] pub incentive_apr: f64,
    /// Fixed lending rate, not scenario-scaled.
    #[serde(default)] pub base_apr: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskTerms {
    #[serde(default)] pub il_risk_score: f64,
    #[serde(default)] pub volatility_score: f64,
    #[serde(default)] pub liquidity_unwind_cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionTerms {
    #[serde(default)] pub gas_cost_usd_per_rebalance: f64,
    #[serde(default)] pub slippage_bps_per_rebalance: f64,
    #[serde(default)] pub mev_risk_score: f64,
    #[serde(default)] pub failure_prob_per_rebalance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub pool_id: String,
    pub label: String,
    #[serde(default)] pub protocol: String,
    #[serde(default)] pub chain: String,
    #[serde(default)] pub reward: RewardTerms,
    #[serde(default)] pub risk: RiskTerms,
    #[serde(default)] pub execution: ExecutionTerms,
}

// ---- Buckets ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tenor {
    #[serde(rename = "7D")] D7,
    #[serde(rename = "14D")] D14,
    #[serde(rename = "30D")] D30,
}

impl Tenor {
    pub const ALL: [Tenor; 3] = [Tenor::D7, Tenor::D14, Tenor::D30];

    pub fn key(&self) -> &'static str {
        match self { Tenor::D7 => "7D", Tenor::D14 => "14D", Tenor::D30 => "30D" }
    }

    /// Shorter protection costs proportionally more per year.
    pub fn cost_multiplier(&self) -> f64 {
        match self { Tenor::D7 => 1.2, Tenor::D14 => 1.0, Tenor::D30 => 0.85 }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "7D" => Some(Tenor::D7),
            "14D" => Some(Tenor::D14),
            "30D" => Some(Tenor::D30),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeBucket { S, M, L }

impl SizeBucket {
    pub const ALL: [SizeBucket; 3] = [SizeBucket::S, SizeBucket::M, SizeBucket::L];

    /// Step function: < 10k -> S, < 100k -> M, else L.
    pub fn from_usd(position_size_usd: f64) -> Self {
        if position_size_usd < 10_000.0 {
            SizeBucket::S
        } else if position_size_usd < 100_000.0 {
            SizeBucket::M
        } else {
            SizeBucket::L
        }
    }

    pub fn key(&self) -> &'static str {
        match self { SizeBucket::S => "S", SizeBucket::M => "M", SizeBucket::L => "L" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceBucket { Daily, Weekly, Monthly }

impl RebalanceBucket {
    pub const ALL: [RebalanceBucket; 3] =
        [RebalanceBucket::Daily, RebalanceBucket::Weekly, RebalanceBucket::Monthly];

    pub fn events_per_year(&self) -> f64 {
        match self {
            RebalanceBucket::Daily => 365.0,
            RebalanceBucket::Weekly => 52.0,
            RebalanceBucket::Monthly => 12.0,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            RebalanceBucket::Daily => "daily",
            RebalanceBucket::Weekly => "weekly",
            RebalanceBucket::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(RebalanceBucket::Daily),
            "weekly" => Some(RebalanceBucket::Weekly),
            "monthly" => Some(RebalanceBucket::Monthly),
            _ => None,
        }
    }
}

// ---- Hedges ----
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeType {
    pub key: String,
    #[serde(alias = "default_cost_apr", default)]
    pub cost_apr: f64,
    #[serde(alias = "default_il_multiplier", default = "one")]
    pub il_multiplier: f64,
}

/// Per size bucket: `cost_multiplier` scales hedge cost, `benefit_multiplier`
/// scales the hedge's IL multiplier. A bare number is a cost multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "SizeFactorRepr")]
pub struct SizeFactor {
    pub cost_multiplier: f64,
    pub benefit_multiplier: f64,
}

impl SizeFactor {
    pub fn cost(cost_multiplier: f64) -> Self { Self { cost_multiplier, benefit_multiplier: 1.0 } }
}

impl Default for SizeFactor {
    fn default() -> Self { Self::cost(1.0) }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeFactorRepr {
    Plain(f64),
    Object {
        #[serde(default = "one")]
        cost_multiplier: f64,
        #[serde(default = "one")]
        benefit_multiplier: f64,
    },
}

impl From<SizeFactorRepr> for SizeFactor {
    fn from(r: SizeFactorRepr) -> Self {
        match r {
            SizeFactorRepr::Plain(c) => Self::cost(c),
            SizeFactorRepr::Object { cost_multiplier, benefit_multiplier } => {
                Self { cost_multiplier, benefit_multiplier }
            }
        }
    }
}

/// Missing buckets in a given table are neutral; a missing table is S=1.15, M=1.0, L=0.9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeScaling {
    #[serde(rename = "S", default)] pub s: SizeFactor,
    #[serde(rename = "M", default)] pub m: SizeFactor,
    #[serde(rename = "L", default)] pub l: SizeFactor,
}

impl Default for SizeScaling {
    fn default() -> Self {
        Self { s: SizeFactor::cost(1.15), m: SizeFactor::cost(1.0), l: SizeFactor::cost(0.9) }
    }
}

impl SizeScaling {
    pub fn get(&self, bucket: SizeBucket) -> SizeFactor {
        match bucket { SizeBucket::S => self.s, SizeBucket::M => self.m, SizeBucket::L => self.l }
    }
}

/// Pool-specific replacement for a hedge's base cost / IL multiplier at one tenor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HedgeOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_apr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub il_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolOverride {
    pub pool_id: String,
    /// tenor key ("7D") -> hedge key -> override
    #[serde(default)]
    pub tenor_overrides: BTreeMap<String, BTreeMap<String, HedgeOverride>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TenorEntry {
    Key(Tenor),
    Object { key: Tenor },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TenorBuckets {
    List(Vec<TenorEntry>),
    Map(BTreeMap<String, serde_json::Value>),
}

/// `["7D", ..]`, `[{"key": "7D"}, ..]` or `{"7D": {..}, ..}`.
fn tenor_buckets<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<Tenor>, D::Error> {
    match TenorBuckets::deserialize(d)? {
        TenorBuckets::List(v) => Ok(v
            .into_iter()
            .map(|e| match e {
                TenorEntry::Key(t) | TenorEntry::Object { key: t } => t,
            })
            .collect()),
        TenorBuckets::Map(m) => {
            let mut out = m
                .keys()
                .map(|k| Tenor::parse(k).ok_or_else(|| D::Error::custom(format!("unknown tenor bucket '{k}'"))))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            out.sort();
            Ok(out)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeCatalog {
    pub hedge_types: Vec<HedgeType>,
    #[serde(default, deserialize_with = "tenor_buckets")]
    pub tenor_buckets: Vec<Tenor>,
    #[serde(default)]
    pub size_scaling: SizeScaling,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pool_overrides: Vec<PoolOverride>,
}

impl HedgeCatalog {
    pub fn hedge(&self, key: &str) -> Option<&HedgeType> {
        self.hedge_types.iter().find(|h| h.key == key)
    }

    /// Override pricing `hedge_key` at `tenor` for this pool; later entries win.
    pub fn override_for(&self, pool_id: &str, tenor: Tenor, hedge_key: &str) -> Option<&HedgeOverride> {
        self.pool_overrides
            .iter()
            .filter(|o| o.pool_id == pool_id)
            .filter_map(|o| o.tenor_overrides.get(tenor.key()).and_then(|m| m.get(hedge_key)))
            .last()
    }
}

// ---- Scenario ----
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMultipliers {
    #[serde(default = "one")] pub reward_multiplier: f64,
    #[serde(default = "one")] pub il_risk_multiplier: f64,
    #[serde(default = "one")] pub gas_multiplier: f64,
    #[serde(default = "one")] pub slippage_multiplier: f64,
    #[serde(default = "one")] pub mev_multiplier: f64,
    #[serde(default = "one")] pub failure_multiplier: f64,
}

impl Default for ScenarioMultipliers {
    fn default() -> Self {
        Self {
            reward_multiplier: 1.0,
            il_risk_multiplier: 1.0,
            gas_multiplier: 1.0,
            slippage_multiplier: 1.0,
            mev_multiplier: 1.0,
            failure_multiplier: 1.0,
        }
    }
}

impl ScenarioMultipliers {
    pub fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("reward_multiplier", self.reward_multiplier),
            ("il_risk_multiplier", self.il_risk_multiplier),
            ("gas_multiplier", self.gas_multiplier),
            ("slippage_multiplier", self.slippage_multiplier),
            ("mev_multiplier", self.mev_multiplier),
            ("failure_multiplier", self.failure_multiplier),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    #[serde(default)] pub label: String,
    #[serde(default)] pub notes: String,
    #[serde(default)] pub multipliers: ScenarioMultipliers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedBuckets {
    pub position_size_usd: f64,
    pub rebalance_bucket: RebalanceBucket,
    pub tenor_bucket: Tenor,
}

impl SelectedBuckets {
    pub fn size_bucket(&self) -> SizeBucket { SizeBucket::from_usd(self.position_size_usd) }
}

/// One optimization request: datasets plus the user's selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    pub scenario_id: String,
    pub pools: Vec<Pool>,
    pub hedges: HedgeCatalog,
    pub scenarios: Vec<Scenario>,
    pub selected_buckets: SelectedBuckets,
    #[serde(default)]
    pub num_samples: Option<u32>,
    #[serde(default)]
    pub relaxation_schedule: Option<u8>,
}

// ---- Result records ----
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub pool_id: String,
    pub pool_label: String,
    pub hedge_type: String,
    pub tenor_bucket: Tenor,
    pub size_bucket: SizeBucket,
    pub rebalance_bucket: RebalanceBucket,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rewards {
    pub fee_apr: f64,
    pub incentive_apr: f64,
    pub base_apr: f64,
    pub total_gross_apr: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PenaltiesAndCosts {
    pub il_penalty_apr: f64,
    pub hedge_cost_apr: f64,
    pub gas_drag_apr: f64,
    pub slippage_drag_apr: f64,
    pub mev_drag_apr: f64,
    pub execution_drag_apr: f64,
    pub failure_drag_apr: f64,
    pub unwind_penalty_apr: f64,
    pub risk_penalty_apr: f64,
    pub total_penalties_apr: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetApr { pub estimated_net_apr: f64 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Breakdown {
    pub rewards: Rewards,
    pub penalties_and_costs: PenaltiesAndCosts,
    pub net_apr: NetApr,
}

impl Breakdown {
    pub fn gross(&self) -> f64 { self.rewards.total_gross_apr }
    pub fn costs(&self) -> f64 { self.penalties_and_costs.total_penalties_apr }
    pub fn net(&self) -> f64 { self.net_apr.estimated_net_apr }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub baseline_id: String,
    pub pool_id: String,
    pub pool_label: String,
    pub baseline_gross_apr: f64,
    pub baseline_net_apr: f64,
    pub optimized_net_apr: f64,
    pub delta_net_apr: f64,
    pub improvement_pct: f64,
    pub baseline_decision: Decision,
    pub baseline_score_breakdown: Breakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverPath {
    /// Polynomial solved by the external solver.
    Dirac,
    /// Exhaustive solver requested directly.
    Exhaustive,
    /// External solver failed or timed out.
    ExhaustiveFallback,
}

impl SolverPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverPath::Dirac => "dirac",
            SolverPath::Exhaustive => "exhaustive",
            SolverPath::ExhaustiveFallback => "exhaustive_fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreMeta {
    pub solver_path: SolverPath,
    /// Solver energy (scaled); absent on exhaustive paths.
    pub objective_value: Option<f64>,
    pub coef_rescale: f64,
    pub lambda: f64,
    pub max_degree: usize,
    pub num_variables: usize,
    pub num_terms: usize,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsUsed {
    pub scenario_id: String,
    pub position_size_usd: f64,
    pub rebalance_bucket: RebalanceBucket,
    pub tenor_bucket: Tenor,
    pub solver_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChosenVariables {
    pub vector: Vec<f64>,
    pub groups: BTreeMap<String, BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    pub energies: Vec<f64>,
    pub counts: Vec<u64>,
    pub chosen_binary_variables: ChosenVariables,
}

/// Created once per completed optimization; never mutated after it is logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerResult {
    pub schema_version: String,
    pub as_of_utc: String,
    pub inputs_used: InputsUsed,
    pub decision: Decision,
    pub score: ScoreMeta,
    pub score_breakdown: Breakdown,
    pub baseline_comparison: BaselineComparison,
    pub explanation: Vec<String>,
    pub debug: DebugInfo,
}
