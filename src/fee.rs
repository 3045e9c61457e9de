// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Fee Oracle

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::price::PriceOracle;
use crate::types::{Branch, BranchPair, PerBranch, Side};

// ─── Constants ──────────────────────────────────────────────────────────────

const DEFAULT_BASE_FEE: f64 = 0.5;
const DEFAULT_ACTIVITY_COEFF: f64 = 2.0;
const DEFAULT_PRESSURE_COEFF: f64 = 1.5;
/// Floor for block production rate; slower blocks raise fees but a stalled
/// branch must not divide by zero.
const DEFAULT_MIN_BLOCK_RATE: f64 = 0.05;
const DEFAULT_OPERATING_COST: f64 = 2_000.0;

/// Rolling window length for organic-vs-manipulative flow tracking.
const FLOW_WINDOW_SIZE: usize = 20;
/// Below this organic share of total flow, fee activity on a branch is
/// flagged as manipulated.
const ORGANIC_RATIO_THRESHOLD: f64 = 0.3;

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FeeError {
    #[error("non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("negative {field}: {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("unknown branch: {0}")]
    UnknownBranch(Branch),

    #[error("unknown actor: {0}")]
    UnknownActor(String),

    #[error("actor {actor} holds {holdings} on {branch}, cannot spend {spend}")]
    InsufficientHoldings {
        actor: String,
        branch: Branch,
        holdings: f64,
        spend: f64,
    },

    #[error(transparent)]
    Price(#[from] crate::price::PriceError),
}

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fee per block under neutral activity, parity pressure, nominal rate.
    pub base_fee: f64,
    pub activity_coeff: f64,
    pub pressure_coeff: f64,
    pub min_block_rate: f64,
    /// Fixed per-period miner operating cost used in profitability.
    pub operating_cost: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            base_fee: DEFAULT_BASE_FEE,
            activity_coeff: DEFAULT_ACTIVITY_COEFF,
            pressure_coeff: DEFAULT_PRESSURE_COEFF,
            min_block_rate: DEFAULT_MIN_BLOCK_RATE,
            operating_cost: DEFAULT_OPERATING_COST,
        }
    }
}

// ─── Result types ───────────────────────────────────────────────────────────

/// Per-branch miner economics for one period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MinerProfitability {
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin_pct: f64,
}

/// Outcome of a manipulation-sustainability check for one actor.
///
/// Compares cumulative manipulation spend on the target branch against the
/// appreciation of the actor's total cross-branch holdings. The campaign is
/// sustainable while appreciation outruns spend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SustainabilityReport {
    pub costs_so_far: f64,
    pub current_portfolio_value: f64,
    /// Appreciation minus costs.
    pub net_position: f64,
    /// Appreciation divided by cumulative cost; infinite when nothing has
    /// been spent yet.
    pub sustainability_ratio: f64,
    pub is_sustainable: bool,
}

/// Organic-vs-manipulative pressure on one branch's fee market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ManipulationPressure {
    /// Organic share of recent fee flow, in [0, 1]. 1.0 when no flow at all.
    pub organic_ratio: f64,
    pub detected: bool,
}

// ─── Actor portfolio ────────────────────────────────────────────────────────

/// Dual-branch position of one tracked actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorPortfolio {
    pub holdings: PerBranch<f64>,
    pub initial_valuation: f64,
    pub manipulation_spend: PerBranch<f64>,
}

// ─── Flow window ────────────────────────────────────────────────────────────

/// Rolling window of organic fee flow vs. manipulative spend on one branch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FlowWindow {
    organic: Vec<f64>,
    manipulative: Vec<f64>,
}

impl FlowWindow {
    fn push_organic(&mut self, amount: f64) {
        push_bounded(&mut self.organic, amount);
    }

    fn push_manipulative(&mut self, amount: f64) {
        push_bounded(&mut self.manipulative, amount);
    }

    fn organic_ratio(&self) -> f64 {
        let organic: f64 = self.organic.iter().sum();
        let manipulative: f64 = self.manipulative.iter().sum();
        let total = organic + manipulative;
        if total > 0.0 {
            organic / total
        } else {
            1.0
        }
    }
}

fn push_bounded(window: &mut Vec<f64>, amount: f64) {
    window.push(amount);
    if window.len() > FLOW_WINDOW_SIZE {
        window.remove(0);
    }
}

// ─── Fee Oracle ─────────────────────────────────────────────────────────────

/// Computes organic fees per branch from activity inputs, tracks per-actor
/// cross-branch portfolios and manipulative fee spending, and derives miner
/// profitability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeOracle {
    branches: BranchPair,
    config: FeeConfig,
    /// Latest organic fee level per branch (per-block).
    fees: PerBranch<f64>,
    /// Aggregate manipulation spend per branch across all actors.
    manipulation_total: PerBranch<f64>,
    windows: PerBranch<FlowWindow>,
    actors: HashMap<String, ActorPortfolio>,
}

impl FeeOracle {
    pub fn new(branches: BranchPair, config: FeeConfig) -> Self {
        Self {
            branches,
            config,
            fees: PerBranch::splat(0.0),
            manipulation_total: PerBranch::splat(0.0),
            windows: PerBranch::splat(FlowWindow::default()),
            actors: HashMap::new(),
        }
    }

    pub fn branches(&self) -> &BranchPair {
        &self.branches
    }

    /// Latest organic fee level quoted for a branch.
    pub fn current_fee(&self, branch: &Branch) -> Result<f64, FeeError> {
        let side = self.side_of(branch)?;
        Ok(*self.fees.get(side))
    }

    /// Recompute the organic per-block fee for one branch.
    ///
    /// Monotone increasing in economic activity share, mempool pressure and
    /// block scarcity (slower blocks raise the fee). Never negative.
    pub fn organic_fee(
        &mut self,
        branch: &Branch,
        block_production_rate: f64,
        economic_activity_share: f64,
        mempool_pressure: f64,
    ) -> Result<f64, FeeError> {
        let side = self.side_of(branch)?;
        check_non_negative("block_production_rate", block_production_rate)?;
        check_non_negative("economic_activity_share", economic_activity_share)?;
        check_non_negative("mempool_pressure", mempool_pressure)?;

        let scarcity = 1.0 / block_production_rate.max(self.config.min_block_rate);
        let fee = self.config.base_fee
            * (1.0 + self.config.activity_coeff * economic_activity_share)
            * (1.0 + self.config.pressure_coeff * mempool_pressure)
            * scarcity;

        self.fees.set(side, fee);
        self.windows.get_mut(side).push_organic(fee);
        Ok(fee)
    }

    /// Miner economics on one branch for the current period: block subsidy
    /// plus the latest per-block fee, valued at the given price, minus the
    /// configured fixed operating cost.
    pub fn miner_profitability(
        &self,
        branch: &Branch,
        block_subsidy: f64,
        price: f64,
    ) -> Result<MinerProfitability, FeeError> {
        let side = self.side_of(branch)?;
        check_non_negative("block_subsidy", block_subsidy)?;
        check_non_negative("price", price)?;

        let revenue = (block_subsidy + self.fees.get(side)) * price;
        let cost = self.config.operating_cost;
        let profit = revenue - cost;
        let margin_pct = if revenue > 0.0 {
            100.0 * profit / revenue
        } else {
            0.0
        };
        Ok(MinerProfitability {
            revenue,
            cost,
            profit,
            margin_pct,
        })
    }

    // ─── Actor tracking ─────────────────────────────────────────────────

    /// Register an actor's starting dual-branch position. Both holdings are
    /// valued at `initial_price` to fix the baseline valuation.
    pub fn initialize_actor(
        &mut self,
        id: &str,
        initial_holdings: PerBranch<f64>,
        initial_price: f64,
    ) -> Result<(), FeeError> {
        check_non_negative("initial_holdings_a", initial_holdings.a)?;
        check_non_negative("initial_holdings_b", initial_holdings.b)?;
        check_non_negative("initial_price", initial_price)?;

        let initial_valuation = (initial_holdings.a + initial_holdings.b) * initial_price;
        self.actors.insert(
            id.to_string(),
            ActorPortfolio {
                holdings: initial_holdings,
                initial_valuation,
                manipulation_spend: PerBranch::splat(0.0),
            },
        );
        Ok(())
    }

    pub fn actor(&self, id: &str) -> Result<&ActorPortfolio, FeeError> {
        self.actors
            .get(id)
            .ok_or_else(|| FeeError::UnknownActor(id.to_string()))
    }

    /// Record manipulative fee spending: the actor burns `amount_spent` of
    /// its holdings on `branch` to inflate that branch's fee market.
    pub fn apply_manipulation(
        &mut self,
        branch: &Branch,
        actor_id: &str,
        amount_spent: f64,
    ) -> Result<(), FeeError> {
        let side = self.side_of(branch)?;
        check_non_negative("amount_spent", amount_spent)?;

        let actor = self
            .actors
            .get_mut(actor_id)
            .ok_or_else(|| FeeError::UnknownActor(actor_id.to_string()))?;

        let holdings = actor.holdings.get_mut(side);
        if *holdings < amount_spent {
            return Err(FeeError::InsufficientHoldings {
                actor: actor_id.to_string(),
                branch: branch.clone(),
                holdings: *holdings,
                spend: amount_spent,
            });
        }
        *holdings -= amount_spent;
        *actor.manipulation_spend.get_mut(side) += amount_spent;
        *self.manipulation_total.get_mut(side) += amount_spent;
        self.windows.get_mut(side).push_manipulative(amount_spent);

        debug!(actor = actor_id, %branch, amount_spent, "manipulation recorded");
        Ok(())
    }

    /// Whether a manipulation campaign on `branch` is economically
    /// sustainable for `actor_id`: appreciation of the actor's total
    /// cross-branch holdings versus cumulative spend on that branch.
    pub fn sustainability(
        &self,
        branch: &Branch,
        prices: &PriceOracle,
        actor_id: &str,
    ) -> Result<SustainabilityReport, FeeError> {
        let side = self.side_of(branch)?;
        let actor = self.actor(actor_id)?;

        let price_a = prices.price(&self.branches.a)?;
        let price_b = prices.price(&self.branches.b)?;
        let current_portfolio_value = actor.holdings.a * price_a + actor.holdings.b * price_b;

        let costs_so_far = *actor.manipulation_spend.get(side);
        let appreciation = current_portfolio_value - actor.initial_valuation;
        let net_position = appreciation - costs_so_far;
        let sustainability_ratio = if costs_so_far > 0.0 {
            appreciation / costs_so_far
        } else {
            f64::INFINITY
        };

        Ok(SustainabilityReport {
            costs_so_far,
            current_portfolio_value,
            net_position,
            sustainability_ratio,
            is_sustainable: sustainability_ratio > 1.0,
        })
    }

    // ─── Manipulation pressure ──────────────────────────────────────────

    /// Aggregate manipulation spend recorded against a branch.
    pub fn manipulation_spend(&self, branch: &Branch) -> Result<f64, FeeError> {
        let side = self.side_of(branch)?;
        Ok(*self.manipulation_total.get(side))
    }

    /// Organic-vs-manipulative pressure over the rolling flow window.
    pub fn manipulation_pressure(&self, branch: &Branch) -> Result<ManipulationPressure, FeeError> {
        let side = self.side_of(branch)?;
        let organic_ratio = self.windows.get(side).organic_ratio();
        Ok(ManipulationPressure {
            organic_ratio,
            detected: organic_ratio < ORGANIC_RATIO_THRESHOLD,
        })
    }

    fn side_of(&self, branch: &Branch) -> Result<Side, FeeError> {
        self.branches
            .side_of(branch)
            .ok_or_else(|| FeeError::UnknownBranch(branch.clone()))
    }
}

// ─── Validation helpers ─────────────────────────────────────────────────────

fn check_non_negative(field: &'static str, value: f64) -> Result<(), FeeError> {
    if !value.is_finite() {
        return Err(FeeError::NonFinite { field, value });
    }
    if value < 0.0 {
        return Err(FeeError::Negative { field, value });
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::{PriceConfig, PriceOracle};
    use crate::sustainment::SustainmentTracker;
    use crate::types::Branch;

    fn pair() -> BranchPair {
        BranchPair::new(Branch::from("core"), Branch::from("classic"))
            .expect("test: distinct branches")
    }

    fn oracle() -> FeeOracle {
        FeeOracle::new(pair(), FeeConfig::default())
    }

    #[test]
    fn organic_fee_monotone_in_activity_and_pressure() {
        let mut fees = oracle();
        let core = Branch::from("core");
        let low = fees.organic_fee(&core, 1.0, 0.2, 0.1).expect("test: fee");
        let more_activity = fees.organic_fee(&core, 1.0, 0.6, 0.1).expect("test: fee");
        let more_pressure = fees.organic_fee(&core, 1.0, 0.2, 0.8).expect("test: fee");
        assert!(more_activity > low);
        assert!(more_pressure > low);
    }

    #[test]
    fn slower_blocks_raise_fee() {
        let mut fees = oracle();
        let core = Branch::from("core");
        let nominal = fees.organic_fee(&core, 1.0, 0.5, 0.5).expect("test: fee");
        let slow = fees.organic_fee(&core, 0.25, 0.5, 0.5).expect("test: fee");
        assert!(slow > nominal, "block scarcity must raise the fee");
    }

    #[test]
    fn stalled_branch_fee_is_finite() {
        let mut fees = oracle();
        let fee = fees
            .organic_fee(&Branch::from("core"), 0.0, 1.0, 1.0)
            .expect("test: fee");
        assert!(fee.is_finite() && fee > 0.0);
    }

    #[test]
    fn invalid_inputs_rejected() {
        let mut fees = oracle();
        let core = Branch::from("core");
        assert!(matches!(
            fees.organic_fee(&core, -1.0, 0.5, 0.5),
            Err(FeeError::Negative { .. })
        ));
        assert!(matches!(
            fees.organic_fee(&core, 1.0, f64::NAN, 0.5),
            Err(FeeError::NonFinite { .. })
        ));
        assert!(matches!(
            fees.organic_fee(&Branch::from("cash"), 1.0, 0.5, 0.5),
            Err(FeeError::UnknownBranch(_))
        ));
    }

    #[test]
    fn miner_profitability_accounts_subsidy_fee_and_cost() {
        let mut fees = oracle();
        let core = Branch::from("core");
        fees.organic_fee(&core, 1.0, 0.5, 0.5).expect("test: fee");
        let fee = fees.current_fee(&core).expect("test: current fee");

        let p = fees
            .miner_profitability(&core, 3.125, 1_000.0)
            .expect("test: profitability");
        assert!((p.revenue - (3.125 + fee) * 1_000.0).abs() < 1e-9);
        assert!((p.profit - (p.revenue - p.cost)).abs() < 1e-9);
        assert!(p.margin_pct <= 100.0);
    }

    #[test]
    fn zero_revenue_profitability_is_defined() {
        let fees = oracle();
        let p = fees
            .miner_profitability(&Branch::from("core"), 0.0, 0.0)
            .expect("test: profitability");
        assert_eq!(p.revenue, 0.0);
        assert_eq!(p.margin_pct, 0.0);
        assert!(p.profit < 0.0, "operating cost still applies");
    }

    #[test]
    fn unregistered_actor_is_lookup_error() {
        let mut fees = oracle();
        assert!(matches!(
            fees.apply_manipulation(&Branch::from("core"), "ghost", 10.0),
            Err(FeeError::UnknownActor(_))
        ));
        assert!(matches!(fees.actor("ghost"), Err(FeeError::UnknownActor(_))));
    }

    #[test]
    fn manipulation_decrements_holdings_and_accumulates_cost() {
        let mut fees = oracle();
        let core = Branch::from("core");
        fees.initialize_actor("whale", PerBranch { a: 500.0, b: 300.0 }, 1_000.0)
            .expect("test: init");

        fees.apply_manipulation(&core, "whale", 120.0).expect("test: spend");
        fees.apply_manipulation(&core, "whale", 30.0).expect("test: spend");

        let actor = fees.actor("whale").expect("test: actor");
        assert!((actor.holdings.a - 350.0).abs() < 1e-9);
        assert!((actor.manipulation_spend.a - 150.0).abs() < 1e-9);
        assert!((fees.manipulation_spend(&core).expect("test") - 150.0).abs() < 1e-9);

        // Overdraft is refused, not clamped
        assert!(matches!(
            fees.apply_manipulation(&core, "whale", 1_000.0),
            Err(FeeError::InsufficientHoldings { .. })
        ));
    }

    #[test]
    fn sustainability_tracks_appreciation_vs_spend() {
        let mut fees = oracle();
        let core = Branch::from("core");
        let classic = Branch::from("classic");

        let mut prices = PriceOracle::new(pair(), PriceConfig::default())
            .expect("test: price oracle");
        let mut tracker = SustainmentTracker::new(0);
        tracker.observe(4, 4);

        fees.initialize_actor("whale", PerBranch { a: 100.0, b: 100.0 }, 1_000.0)
            .expect("test: init");
        fees.apply_manipulation(&classic, "whale", 50.0).expect("test: spend");

        // Winning branch appreciates strongly; manipulated branch decays
        prices
            .update(
                &tracker,
                &core,
                crate::price::BranchWeights {
                    chain: 0.9,
                    economic: 0.9,
                    hashrate: 0.9,
                },
            )
            .expect("test: price");
        prices
            .update(
                &tracker,
                &classic,
                crate::price::BranchWeights {
                    chain: 0.1,
                    economic: 0.1,
                    hashrate: 0.1,
                },
            )
            .expect("test: price");

        let report = fees
            .sustainability(&classic, &prices, "whale")
            .expect("test: sustainability");
        assert!((report.costs_so_far - 50.0).abs() < 1e-9);
        assert!(report.current_portfolio_value > 0.0);
        assert!(
            (report.net_position
                - (report.current_portfolio_value - 200_000.0 - report.costs_so_far))
                .abs()
                < 1e-6
        );

        // No spend yet on the other side: infinitely sustainable
        let untouched = fees
            .sustainability(&core, &prices, "whale")
            .expect("test: sustainability");
        assert!(untouched.sustainability_ratio.is_infinite());
        assert!(untouched.is_sustainable);
    }

    #[test]
    fn manipulation_pressure_flags_dominated_flow() {
        let mut fees = oracle();
        let core = Branch::from("core");
        fees.initialize_actor("whale", PerBranch { a: 1e7, b: 0.0 }, 1_000.0)
            .expect("test: init");

        // Thin organic flow, heavy manipulative spend
        fees.organic_fee(&core, 1.0, 0.1, 0.0).expect("test: fee");
        for _ in 0..5 {
            fees.apply_manipulation(&core, "whale", 10_000.0).expect("test: spend");
        }

        let pressure = fees.manipulation_pressure(&core).expect("test: pressure");
        assert!(pressure.organic_ratio < 0.3);
        assert!(pressure.detected);

        // Untouched branch reads fully organic
        let clean = fees
            .manipulation_pressure(&Branch::from("classic"))
            .expect("test: pressure");
        assert_eq!(clean.organic_ratio, 1.0);
        assert!(!clean.detected);
    }
}
