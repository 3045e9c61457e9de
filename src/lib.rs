// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism")

//! Economic aftermath of a sustained blockchain protocol fork.
//!
//! Models how autonomous agents (mining pools, exchanges and economic
//! nodes, end users) respond to diverging token prices and fee markets,
//! weigh ideological preference against profit, and how their aggregate
//! behavior determines which branch of the fork wins economic consensus.
//!
//! The crate is a pure computation core: no I/O, no pacing, no network.
//! An external driving loop feeds per-tick chain observations into
//! [`ForkSimulation::tick`] and archives the serializable results.

pub mod adapter;
pub mod conservation;
pub mod fee;
pub mod population;
pub mod price;
pub mod risk;
pub mod simulation;
pub mod strategy;
pub mod sustainment;
pub mod types;

pub use fee::{FeeConfig, FeeOracle, MinerProfitability, SustainabilityReport};
pub use price::{BranchWeights, PriceConfig, PriceOracle};
pub use risk::{
    EconomicNode, ForkAnalysisReport, ForkComparison, NodeCategory, RiskAnalyzer, RiskConfig,
    RiskLevel,
};
pub use simulation::{ChainObservation, ForkSimulation, SimulationConfig, TickResult};
pub use strategy::{
    AgentProfile, AllocationSnapshot, DecisionConfig, DecisionEngine, ForkPreference,
};
pub use sustainment::SustainmentTracker;
pub use types::{Branch, BranchPair, PerBranch, Side};
