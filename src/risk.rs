// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Fork Risk Analyzer

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::adapter::to_decimal;
use crate::types::{Branch, BranchPair, PerBranch};

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error("non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("negative {field}: {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("metric weights must sum to 1.0, got {0}")]
    WeightSum(Decimal),

    #[error("network constant must be positive, got {0}")]
    NonPositiveConstant(Decimal),
}

// ─── Economic nodes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    Exchange,
    Custodian,
    PaymentProcessor,
    User,
    Unknown,
}

/// Influence tier classified by custody size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfluenceTier {
    Critical,
    Major,
    Moderate,
    Minor,
}

impl InfluenceTier {
    pub fn from_custody(custody: f64) -> Self {
        if custody >= 1_000_000.0 {
            Self::Critical
        } else if custody >= 100_000.0 {
            Self::Major
        } else if custody >= 10_000.0 {
            Self::Moderate
        } else {
            Self::Minor
        }
    }
}

/// One economic node of the population under analysis. Immutable once
/// constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicNode {
    pub name: String,
    pub category: NodeCategory,
    pub custody: f64,
    pub daily_volume: f64,
    /// Which branch the node has declared for, if any.
    pub branch: Option<Branch>,
    pub tier: InfluenceTier,
}

impl EconomicNode {
    pub fn new(
        name: &str,
        category: NodeCategory,
        custody: f64,
        daily_volume: f64,
    ) -> Result<Self, RiskError> {
        check_non_negative("custody", custody)?;
        check_non_negative("daily_volume", daily_volume)?;
        Ok(Self {
            name: name.to_string(),
            category,
            custody,
            daily_volume,
            branch: None,
            tier: InfluenceTier::from_custody(custody),
        })
    }

    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branch = Some(branch);
        self
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// Risk analyzer constants. Custody is the primary consensus signal,
/// transaction volume secondary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub total_supply: Decimal,
    pub total_daily_volume: Decimal,
    pub custody_weight: Decimal,
    pub volume_weight: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            total_supply: dec!(21000000),
            total_daily_volume: dec!(1500000),
            custody_weight: dec!(0.7),
            volume_weight: dec!(0.3),
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<(), RiskError> {
        if self.total_supply <= Decimal::ZERO {
            return Err(RiskError::NonPositiveConstant(self.total_supply));
        }
        if self.total_daily_volume <= Decimal::ZERO {
            return Err(RiskError::NonPositiveConstant(self.total_daily_volume));
        }
        let sum = self.custody_weight + self.volume_weight;
        if sum != Decimal::ONE {
            return Err(RiskError::WeightSum(sum));
        }
        Ok(())
    }
}

// ─── Result types ───────────────────────────────────────────────────────────

/// Dual-metric weight of a single node against the network constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeWeight {
    pub custody_weight_pct: Decimal,
    pub volume_weight_pct: Decimal,
    pub consensus_weight: Decimal,
}

/// Aggregate of one branch's economic-node population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAnalysis {
    pub node_count: usize,
    pub total_custody: Decimal,
    pub total_daily_volume: Decimal,
    pub custody_weight_pct: Decimal,
    pub volume_weight_pct: Decimal,
    pub consensus_weight: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Extreme,
    High,
    Moderate,
    Low,
    Minimal,
}

impl RiskLevel {
    pub fn from_score(score: Decimal) -> Self {
        if score >= dec!(80) {
            Self::Extreme
        } else if score >= dec!(60) {
            Self::High
        } else if score >= dec!(40) {
            Self::Moderate
        } else if score >= dec!(20) {
            Self::Low
        } else {
            Self::Minimal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Extreme => "EXTREME",
            Self::High => "HIGH",
            Self::Moderate => "MODERATE",
            Self::Low => "LOW",
            Self::Minimal => "MINIMAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: Decimal,
    pub level: RiskLevel,
    pub consensus_chain: Branch,
    /// Gap between the two branches' consensus-weight percentages.
    pub consensus_margin: Decimal,
}

/// Share of the combined fork economy held by each branch, per metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsBreakdown {
    pub custody_split_pct: PerBranch<Decimal>,
    pub volume_split_pct: PerBranch<Decimal>,
    pub consensus_split_pct: PerBranch<Decimal>,
}

/// Full fork analysis report -- a plain serializable structure for
/// archival and comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkAnalysisReport {
    pub branches: BranchPair,
    pub chain_a: ChainAnalysis,
    pub chain_b: ChainAnalysis,
    pub risk: RiskAssessment,
    pub metrics: MetricsBreakdown,
}

impl ForkAnalysisReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Outcome of a population-level comparison. Fewer than two branches in
/// the population is a typed "cannot analyze yet", not an error, so a
/// driving loop can keep polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ForkComparison {
    Analyzed(Box<ForkAnalysisReport>),
    InsufficientData { branches_present: usize },
}

// ─── Fork Risk Analyzer ─────────────────────────────────────────────────────

/// Aggregates an economic-node population into dual-metric consensus
/// weights per branch and a bounded risk score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalyzer {
    branches: BranchPair,
    config: RiskConfig,
}

impl RiskAnalyzer {
    pub fn new(branches: BranchPair, config: RiskConfig) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self { branches, config })
    }

    pub fn branches(&self) -> &BranchPair {
        &self.branches
    }

    /// Dual-metric weight of a single node: custody share of total supply,
    /// volume share of total daily volume, blended into consensus weight.
    pub fn consensus_weight(&self, node: &EconomicNode) -> NodeWeight {
        let custody_weight_pct =
            (dec!(100) * to_decimal(node.custody) / self.config.total_supply).min(dec!(100));
        let volume_weight_pct = (dec!(100) * to_decimal(node.daily_volume)
            / self.config.total_daily_volume)
            .min(dec!(100));
        NodeWeight {
            custody_weight_pct,
            volume_weight_pct,
            consensus_weight: self.config.custody_weight * custody_weight_pct
                + self.config.volume_weight * volume_weight_pct,
        }
    }

    /// Sum custody, volume, weight and count across one branch's node set.
    /// An empty set yields all zeros, never an error.
    pub fn analyze_chain(&self, nodes: &[EconomicNode]) -> ChainAnalysis {
        let mut total_custody = Decimal::ZERO;
        let mut total_daily_volume = Decimal::ZERO;
        let mut consensus_weight = Decimal::ZERO;
        let mut custody_weight_pct = Decimal::ZERO;
        let mut volume_weight_pct = Decimal::ZERO;

        for node in nodes {
            let weight = self.consensus_weight(node);
            total_custody += to_decimal(node.custody);
            total_daily_volume += to_decimal(node.daily_volume);
            custody_weight_pct += weight.custody_weight_pct;
            volume_weight_pct += weight.volume_weight_pct;
            consensus_weight += weight.consensus_weight;
        }

        ChainAnalysis {
            node_count: nodes.len(),
            total_custody,
            total_daily_volume,
            custody_weight_pct,
            volume_weight_pct,
            consensus_weight,
        }
    }

    /// Combine both branches' analyses into a risk assessment.
    pub fn analyze_fork(
        &self,
        chain_a_nodes: &[EconomicNode],
        chain_b_nodes: &[EconomicNode],
    ) -> ForkAnalysisReport {
        let chain_a = self.analyze_chain(chain_a_nodes);
        let chain_b = self.analyze_chain(chain_b_nodes);

        let consensus_split = split_pct(chain_a.consensus_weight, chain_b.consensus_weight);
        let custody_split = split_pct(chain_a.total_custody, chain_b.total_custody);
        let volume_split = split_pct(chain_a.total_daily_volume, chain_b.total_daily_volume);

        let score = risk_score(consensus_split.a, consensus_split.b);

        // Consensus goes to the heavier branch; ties break toward custody.
        let consensus_chain = if chain_a.consensus_weight > chain_b.consensus_weight {
            self.branches.a.clone()
        } else if chain_b.consensus_weight > chain_a.consensus_weight {
            self.branches.b.clone()
        } else if chain_b.custody_weight_pct > chain_a.custody_weight_pct {
            self.branches.b.clone()
        } else {
            self.branches.a.clone()
        };

        ForkAnalysisReport {
            branches: self.branches.clone(),
            chain_a,
            chain_b,
            risk: RiskAssessment {
                score,
                level: RiskLevel::from_score(score),
                consensus_chain,
                consensus_margin: (consensus_split.a - consensus_split.b).abs(),
            },
            metrics: MetricsBreakdown {
                custody_split_pct: custody_split,
                volume_split_pct: volume_split,
                consensus_split_pct: consensus_split,
            },
        }
    }

    /// Analyze a mixed population by its nodes' declared branch
    /// assignments. Nodes declaring neither branch of this run are
    /// ignored; fewer than two branches present yields
    /// [`ForkComparison::InsufficientData`].
    pub fn analyze_population(&self, nodes: &[EconomicNode]) -> ForkComparison {
        let on_a: Vec<EconomicNode> = nodes
            .iter()
            .filter(|n| n.branch.as_ref() == Some(&self.branches.a))
            .cloned()
            .collect();
        let on_b: Vec<EconomicNode> = nodes
            .iter()
            .filter(|n| n.branch.as_ref() == Some(&self.branches.b))
            .cloned()
            .collect();

        let branches_present = [!on_a.is_empty(), !on_b.is_empty()]
            .iter()
            .filter(|p| **p)
            .count();
        if branches_present < 2 {
            return ForkComparison::InsufficientData { branches_present };
        }
        ForkComparison::Analyzed(Box::new(self.analyze_fork(&on_a, &on_b)))
    }
}

// ─── Scoring ────────────────────────────────────────────────────────────────

/// Contested-consensus risk: maximal at an exact 50/50 split, zero near
/// full dominance. Symmetric in its arguments.
pub fn risk_score(pct_a: Decimal, pct_b: Decimal) -> Decimal {
    let total = pct_a + pct_b;
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    // Renormalize so callers may pass any non-negative pair.
    let share_a = dec!(100) * pct_a / total;
    (dec!(100) - dec!(2) * (share_a - dec!(50)).abs()).clamp(Decimal::ZERO, dec!(100))
}

/// Percentage split of a metric across the two branches. Both zero yields
/// zero/zero; otherwise the shares sum to 100.
fn split_pct(a: Decimal, b: Decimal) -> PerBranch<Decimal> {
    let total = a + b;
    if total <= Decimal::ZERO {
        return PerBranch {
            a: Decimal::ZERO,
            b: Decimal::ZERO,
        };
    }
    PerBranch {
        a: dec!(100) * a / total,
        b: dec!(100) * b / total,
    }
}

// ─── Validation helpers ─────────────────────────────────────────────────────

fn check_non_negative(field: &'static str, value: f64) -> Result<(), RiskError> {
    if !value.is_finite() {
        return Err(RiskError::NonFinite { field, value });
    }
    if value < 0.0 {
        return Err(RiskError::Negative { field, value });
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> BranchPair {
        BranchPair::new(Branch::from("core"), Branch::from("classic"))
            .expect("test: distinct branches")
    }

    fn analyzer() -> RiskAnalyzer {
        RiskAnalyzer::new(pair(), RiskConfig::default()).expect("test: analyzer")
    }

    fn node(name: &str, custody: f64, volume: f64) -> EconomicNode {
        EconomicNode::new(name, NodeCategory::Exchange, custody, volume)
            .expect("test: valid node")
    }

    #[test]
    fn node_validation() {
        assert!(matches!(
            EconomicNode::new("x", NodeCategory::User, -1.0, 0.0),
            Err(RiskError::Negative { .. })
        ));
        assert!(matches!(
            EconomicNode::new("x", NodeCategory::User, 1.0, f64::NAN),
            Err(RiskError::NonFinite { .. })
        ));
    }

    #[test]
    fn influence_tier_thresholds() {
        assert_eq!(InfluenceTier::from_custody(2_000_000.0), InfluenceTier::Critical);
        assert_eq!(InfluenceTier::from_custody(150_000.0), InfluenceTier::Major);
        assert_eq!(InfluenceTier::from_custody(50_000.0), InfluenceTier::Moderate);
        assert_eq!(InfluenceTier::from_custody(100.0), InfluenceTier::Minor);
    }

    #[test]
    fn consensus_weight_monotone_in_custody_and_volume() {
        let analyzer = analyzer();
        let base = analyzer.consensus_weight(&node("a", 100_000.0, 10_000.0));
        let more_custody = analyzer.consensus_weight(&node("b", 200_000.0, 10_000.0));
        let more_volume = analyzer.consensus_weight(&node("c", 100_000.0, 20_000.0));

        assert!(base.consensus_weight >= Decimal::ZERO);
        assert!(more_custody.consensus_weight > base.consensus_weight);
        assert!(more_volume.consensus_weight > base.consensus_weight);
    }

    #[test]
    fn risk_score_properties() {
        assert_eq!(risk_score(dec!(50), dec!(50)), dec!(100));
        assert_eq!(risk_score(dec!(100), dec!(0)), dec!(0));
        assert_eq!(risk_score(dec!(30), dec!(70)), risk_score(dec!(70), dec!(30)));
        assert_eq!(risk_score(dec!(0), dec!(0)), dec!(0));
    }

    #[test]
    fn empty_chain_is_all_zeros() {
        let analysis = analyzer().analyze_chain(&[]);
        assert_eq!(analysis.node_count, 0);
        assert_eq!(analysis.total_custody, Decimal::ZERO);
        assert_eq!(analysis.total_daily_volume, Decimal::ZERO);
        assert_eq!(analysis.consensus_weight, Decimal::ZERO);
    }

    #[test]
    fn custody_outweighs_volume_for_consensus() {
        // Custody-heavy, volume-light vs custody-light, volume-heavy
        let heavy_custody = vec![
            node("vault-1", 400_000.0, 5_000.0),
            node("vault-2", 300_000.0, 5_000.0),
        ];
        let heavy_volume = vec![
            node("proc-1", 40_000.0, 60_000.0),
            node("proc-2", 30_000.0, 40_000.0),
        ];

        let report = analyzer().analyze_fork(&heavy_custody, &heavy_volume);
        assert_eq!(
            report.risk.consensus_chain,
            Branch::from("core"),
            "custody at 0.7 weight must beat volume at 0.3"
        );
    }

    #[test]
    fn even_split_is_extreme_risk() {
        // Two populations each holding ~50% of circulating supply
        let a = vec![node("a", 10_500_000.0, 100_000.0)];
        let b = vec![node("b", 10_400_000.0, 100_000.0)];

        let report = analyzer().analyze_fork(&a, &b);
        assert!(report.risk.score > dec!(90), "score was {}", report.risk.score);
        assert_eq!(report.risk.level, RiskLevel::Extreme);
    }

    #[test]
    fn dominance_is_minimal_risk() {
        let a = vec![node("a", 10_000_000.0, 500_000.0)];
        let b = vec![node("b", 1_000.0, 10.0)];
        let report = analyzer().analyze_fork(&a, &b);
        assert_eq!(report.risk.level, RiskLevel::Minimal);
        assert_eq!(report.risk.consensus_chain, Branch::from("core"));
    }

    #[test]
    fn tie_breaks_toward_custody() {
        // Equal consensus weight by construction: A all custody, B tuned so
        // 0.7*custodyPct + 0.3*volumePct matches, with less custody.
        let config = RiskConfig::default();
        let analyzer = RiskAnalyzer::new(pair(), config).expect("test: analyzer");

        // A: custody 210_000 -> custodyPct 1, volume 0 -> weight 0.7
        // B: custody 84_000 -> custodyPct 0.4 -> 0.28, volume 21_000 ->
        //    volumePct 1.4 -> 0.42; weight 0.28 + 0.42 = 0.7 exactly
        let a = vec![node("a", 210_000.0, 0.0)];
        let b = vec![node("b", 84_000.0, 21_000.0)];

        let report = analyzer.analyze_fork(&a, &b);
        assert_eq!(
            report.chain_a.consensus_weight, report.chain_b.consensus_weight,
            "weights must tie exactly"
        );
        assert_eq!(report.risk.consensus_chain, Branch::from("core"));
    }

    #[test]
    fn population_split_by_assignment() {
        let analyzer = analyzer();
        let nodes = vec![
            node("a1", 500_000.0, 10_000.0).with_branch(Branch::from("core")),
            node("b1", 200_000.0, 50_000.0).with_branch(Branch::from("classic")),
            // Unassigned and foreign nodes are ignored
            node("loose", 99_999.0, 0.0),
        ];
        match analyzer.analyze_population(&nodes) {
            ForkComparison::Analyzed(report) => {
                assert_eq!(report.chain_a.node_count, 1);
                assert_eq!(report.chain_b.node_count, 1);
            }
            other => panic!("expected analysis, got {other:?}"),
        }
    }

    #[test]
    fn single_branch_population_is_insufficient() {
        let analyzer = analyzer();
        let nodes = vec![node("a1", 500_000.0, 10_000.0).with_branch(Branch::from("core"))];
        match analyzer.analyze_population(&nodes) {
            ForkComparison::InsufficientData { branches_present } => {
                assert_eq!(branches_present, 1)
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[test]
    fn split_percentages_sum_to_100() {
        let report = analyzer().analyze_fork(
            &[node("a", 700_000.0, 20_000.0)],
            &[node("b", 300_000.0, 80_000.0)],
        );
        let m = &report.metrics;
        let tolerance = dec!(0.000001);
        assert_eq!(m.custody_split_pct.a + m.custody_split_pct.b, dec!(100));
        assert_eq!(m.volume_split_pct.a + m.volume_split_pct.b, dec!(100));
        assert!(
            (m.consensus_split_pct.a + m.consensus_split_pct.b - dec!(100)).abs() < tolerance
        );
    }

    #[test]
    fn bad_config_rejected() {
        let config = RiskConfig {
            custody_weight: dec!(0.8),
            volume_weight: dec!(0.3),
            ..RiskConfig::default()
        };
        assert!(matches!(
            RiskAnalyzer::new(pair(), config),
            Err(RiskError::WeightSum(_))
        ));
    }

    #[test]
    fn report_serializes() {
        let report = analyzer().analyze_fork(
            &[node("a", 700_000.0, 20_000.0)],
            &[node("b", 300_000.0, 80_000.0)],
        );
        let json = report.to_json_pretty().expect("test: serialize");
        assert!(json.contains("consensus_chain"));
    }
}
