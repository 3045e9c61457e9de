// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Simulation Core

use serde::{Deserialize, Serialize};

use crate::conservation::{ConservationResult, ShareConservation};
use crate::fee::{FeeConfig, FeeOracle};
use crate::price::{PriceConfig, PriceOracle};
use crate::risk::{EconomicNode, ForkComparison, RiskAnalyzer, RiskConfig};
use crate::strategy::{AgentProfile, AllocationSnapshot, DecisionConfig, DecisionEngine};
use crate::sustainment::SustainmentTracker;
use crate::types::{BranchPair, PerBranch};

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Price(#[from] crate::price::PriceError),

    #[error(transparent)]
    Fee(#[from] crate::fee::FeeError),

    #[error(transparent)]
    Strategy(#[from] crate::strategy::StrategyError),

    #[error(transparent)]
    Risk(#[from] crate::risk::RiskError),
}

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub price: PriceConfig,
    pub fee: FeeConfig,
    pub decision: DecisionConfig,
    pub risk: RiskConfig,
    /// Height of the last block both branches share.
    pub ancestor_height: u64,
    pub min_sustained_depth: u64,
    /// Simulation time elapsed per tick.
    pub tick_interval: f64,
    pub block_subsidy: f64,
    /// Economic-node profit model parameters.
    pub activity_margin: f64,
    pub fee_burden: f64,
    /// Circuit-breaker threshold for share conservation.
    pub conservation_threshold: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            price: PriceConfig::default(),
            fee: FeeConfig::default(),
            decision: DecisionConfig::default(),
            risk: RiskConfig::default(),
            ancestor_height: 0,
            min_sustained_depth: crate::sustainment::DEFAULT_MIN_SUSTAINED_DEPTH,
            tick_interval: 1.0,
            block_subsidy: 3.125,
            activity_margin: 0.05,
            fee_burden: 1.0,
            conservation_threshold: 0.001,
        }
    }
}

// ─── Per-tick input ─────────────────────────────────────────────────────────

/// Chain state for one tick, supplied by the external state-query
/// collaborator. Everything else the oracles need is derived from the
/// engines' own allocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainObservation {
    pub height_a: u64,
    pub height_b: u64,
    /// Blocks per unit time on each branch, relative to nominal 1.0.
    pub block_rate: PerBranch<f64>,
    /// Share of total economic activity happening on each branch, [0, 1].
    pub activity_share: PerBranch<f64>,
    pub mempool_pressure: PerBranch<f64>,
}

// ─── Per-tick output ────────────────────────────────────────────────────────

/// Snapshot of one tick, serializable for archival by the driving loop.
#[derive(Debug, Clone, Serialize)]
pub struct TickResult {
    pub tick: u64,
    pub fork_depth: u64,
    pub sustained: bool,
    pub prices: PerBranch<f64>,
    pub fees: PerBranch<f64>,
    pub pool_allocation: AllocationSnapshot,
    pub node_allocation: AllocationSnapshot,
    pub pool_conservation: ConservationResult,
    pub node_conservation: ConservationResult,
}

// ─── ForkSimulation ─────────────────────────────────────────────────────────

/// Composes tracker, oracles and both strategy engines into one closed
/// loop. The external driving loop owns pacing: it calls [`tick`] with
/// fresh chain observations and may stop between ticks; each tick's
/// mutation is atomic in effect.
///
/// Feedback coupling: hashrate weight for pricing comes from the pool
/// engine's current allocation, economic weight from the node engine's,
/// so agent migration moves prices which moves agents.
///
/// [`tick`]: ForkSimulation::tick
#[derive(Debug)]
pub struct ForkSimulation {
    branches: BranchPair,
    config: SimulationConfig,
    tracker: SustainmentTracker,
    prices: PriceOracle,
    fees: FeeOracle,
    pools: DecisionEngine,
    nodes: DecisionEngine,
    analyzer: RiskAnalyzer,
    pool_conservation: ShareConservation,
    node_conservation: ShareConservation,
    current_tick: u64,
}

impl ForkSimulation {
    pub fn new(
        branches: BranchPair,
        config: SimulationConfig,
        pool_profiles: Vec<AgentProfile>,
        node_profiles: Vec<AgentProfile>,
    ) -> Result<Self, SimulationError> {
        let tracker =
            SustainmentTracker::with_min_depth(config.ancestor_height, config.min_sustained_depth);
        let prices = PriceOracle::new(branches.clone(), config.price.clone())?;
        let fees = FeeOracle::new(branches.clone(), config.fee.clone());
        let pools = DecisionEngine::for_pools(
            branches.clone(),
            config.decision.clone(),
            config.block_subsidy,
            pool_profiles,
        )?;
        let nodes = DecisionEngine::for_economic_nodes(
            branches.clone(),
            config.decision.clone(),
            config.activity_margin,
            config.fee_burden,
            node_profiles,
        )?;
        let analyzer = RiskAnalyzer::new(branches.clone(), config.risk.clone())?;

        let pool_total = pools.current_allocation().total_declared_pct;
        let node_total = nodes.current_allocation().total_declared_pct;
        let pool_conservation = ShareConservation::new(pool_total, config.conservation_threshold);
        let node_conservation = ShareConservation::new(node_total, config.conservation_threshold);

        Ok(Self {
            branches,
            config,
            tracker,
            prices,
            fees,
            pools,
            nodes,
            analyzer,
            pool_conservation,
            node_conservation,
            current_tick: 0,
        })
    }

    pub fn branches(&self) -> &BranchPair {
        &self.branches
    }

    pub fn is_sustained(&self) -> bool {
        self.tracker.is_sustained()
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn price_oracle(&self) -> &PriceOracle {
        &self.prices
    }

    pub fn fee_oracle(&self) -> &FeeOracle {
        &self.fees
    }

    pub fn fee_oracle_mut(&mut self) -> &mut FeeOracle {
        &mut self.fees
    }

    pub fn pool_engine(&self) -> &DecisionEngine {
        &self.pools
    }

    pub fn node_engine(&self) -> &DecisionEngine {
        &self.nodes
    }

    /// Advance the simulation one tick.
    ///
    /// Order per the protocol: observe heights, gate on sustainment,
    /// reprice, refresh fees, re-evaluate both populations, then verify
    /// share conservation on the aggregates.
    pub fn tick(&mut self, observation: &ChainObservation) -> Result<TickResult, SimulationError> {
        // Reject malformed observations before touching any state, so a
        // failed tick leaves the previous tick's state intact.
        validate_observation(observation)?;

        self.current_tick += 1;
        let now = self.current_tick as f64 * self.config.tick_interval;

        // Last tick's allocations drive this tick's price weights.
        let hashrate_pct_a = allocation_pct_a(&self.pools.current_allocation());
        let custody_pct_a = allocation_pct_a(&self.nodes.current_allocation());

        let prices = self.prices.update_from_chain(
            &mut self.tracker,
            observation.height_a,
            observation.height_b,
            custody_pct_a,
            hashrate_pct_a,
        )?;

        let fee_a = self.fees.organic_fee(
            &self.branches.a,
            observation.block_rate.a,
            observation.activity_share.a,
            observation.mempool_pressure.a,
        )?;
        let fee_b = self.fees.organic_fee(
            &self.branches.b,
            observation.block_rate.b,
            observation.activity_share.b,
            observation.mempool_pressure.b,
        )?;

        let pool_allocation = self.pools.allocate(now, &self.prices, &self.fees);
        let node_allocation = self.nodes.allocate(now, &self.prices, &self.fees);

        let pool_conservation = self.pool_conservation.verify(&pool_allocation);
        let node_conservation = self.node_conservation.verify(&node_allocation);

        Ok(TickResult {
            tick: self.current_tick,
            fork_depth: self.tracker.fork_depth(),
            sustained: self.tracker.is_sustained(),
            prices,
            fees: PerBranch { a: fee_a, b: fee_b },
            pool_allocation,
            node_allocation,
            pool_conservation,
            node_conservation,
        })
    }

    /// Analyze a custody/volume snapshot of the economic-node population
    /// against the current branch pair.
    pub fn analyze(&self, nodes: &[EconomicNode]) -> ForkComparison {
        self.analyzer.analyze_population(nodes)
    }
}

fn validate_observation(observation: &ChainObservation) -> Result<(), SimulationError> {
    for (field, value) in [
        ("block_rate_a", observation.block_rate.a),
        ("block_rate_b", observation.block_rate.b),
        ("activity_share_a", observation.activity_share.a),
        ("activity_share_b", observation.activity_share.b),
        ("mempool_pressure_a", observation.mempool_pressure.a),
        ("mempool_pressure_b", observation.mempool_pressure.b),
    ] {
        if !value.is_finite() {
            return Err(crate::fee::FeeError::NonFinite { field, value }.into());
        }
        if value < 0.0 {
            return Err(crate::fee::FeeError::Negative { field, value }.into());
        }
    }
    Ok(())
}

/// Branch A's percentage of an allocation, at parity when nothing is
/// allocated yet.
fn allocation_pct_a(snapshot: &AllocationSnapshot) -> f64 {
    if snapshot.total_declared_pct > 0.0 {
        100.0 * snapshot.share_a_pct / snapshot.total_declared_pct
    } else {
        50.0
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
