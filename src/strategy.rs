// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Decision Strategy Engine

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::fee::FeeOracle;
use crate::price::PriceOracle;
use crate::types::{Branch, BranchPair, PerBranch, Side};

// ─── Constants ──────────────────────────────────────────────────────────────

const DEFAULT_COOLDOWN: f64 = 10.0;
/// Guard for the relative-gap ideology bar when rational profit is ~zero.
const PROFIT_EPSILON: f64 = 1e-9;

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("agent {id}: {field} out of range [{min}, {max}]: {value}")]
    OutOfRange {
        id: String,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("agent {id}: non-finite {field}: {value}")]
    NonFinite {
        id: String,
        field: &'static str,
        value: f64,
    },

    #[error("agent {id}: preferred branch {branch} is not part of this fork")]
    UnknownPreferredBranch { id: String, branch: Branch },

    #[error("duplicate agent id: {0}")]
    DuplicateAgent(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}

// ─── Profiles ───────────────────────────────────────────────────────────────

/// Declared allegiance of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkPreference {
    Prefer(Branch),
    Neutral,
}

/// Immutable per-agent configuration, supplied by the external scenario
/// loader and validated at engine construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    /// Share of the population's total weight, in [0, 100].
    pub share_pct: f64,
    pub preference: ForkPreference,
    /// How much profit the agent will sacrifice for its preference, [0, 1].
    pub ideology_strength: f64,
    /// Profit gap required before switching is even considered.
    pub switch_threshold: f64,
    /// Hard ceilings on accumulated opportunity cost.
    pub max_loss_absolute: f64,
    pub max_loss_pct: f64,
}

impl AgentProfile {
    fn validate(&self, branches: &BranchPair) -> Result<Option<Side>, StrategyError> {
        check_range(&self.id, "share_pct", self.share_pct, 0.0, 100.0)?;
        check_range(&self.id, "ideology_strength", self.ideology_strength, 0.0, 1.0)?;
        check_range(&self.id, "switch_threshold", self.switch_threshold, 0.0, f64::MAX)?;
        check_range(&self.id, "max_loss_absolute", self.max_loss_absolute, 0.0, f64::MAX)?;
        check_range(&self.id, "max_loss_pct", self.max_loss_pct, 0.0, 100.0)?;

        match &self.preference {
            ForkPreference::Neutral => Ok(None),
            ForkPreference::Prefer(branch) => branches
                .side_of(branch)
                .map(Some)
                .ok_or_else(|| StrategyError::UnknownPreferredBranch {
                    id: self.id.clone(),
                    branch: branch.clone(),
                }),
        }
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Minimum elapsed simulation time between two decisions of one agent.
    pub cooldown: f64,
    /// Whether a forced switch clears the opportunity-cost counter,
    /// allowing renewed ideological allocation later. Never automatic.
    pub reset_cost_on_forced_switch: bool,
    /// Branch that agents without a preference start on (the incumbent).
    pub initial_side: Side,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            reset_cost_on_forced_switch: false,
            initial_side: Side::A,
        }
    }
}

// ─── Profit model ───────────────────────────────────────────────────────────

/// How an agent population values a branch, per unit share per unit time.
///
/// The engine itself is agnostic; pools and economic nodes differ only in
/// which variant they plug in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProfitModel {
    /// Mining pools: block subsidy plus fee revenue at branch price, minus
    /// operating cost (delegated to the fee oracle).
    PoolMining { block_subsidy: f64 },
    /// Exchanges / economic nodes / users: activity margin valued at
    /// branch price, minus organic fee burden.
    EconomicActivity { activity_margin: f64, fee_burden: f64 },
}

impl ProfitModel {
    fn profitability(
        &self,
        branch: &Branch,
        prices: &PriceOracle,
        fees: &FeeOracle,
    ) -> Result<f64, crate::fee::FeeError> {
        let price = prices.price(branch)?;
        match self {
            ProfitModel::PoolMining { block_subsidy } => Ok(fees
                .miner_profitability(branch, *block_subsidy, price)?
                .profit),
            ProfitModel::EconomicActivity {
                activity_margin,
                fee_burden,
            } => Ok(price * activity_margin - fees.current_fee(branch)? * fee_burden),
        }
    }
}

// ─── Records & snapshots ────────────────────────────────────────────────────

/// One row of an agent's append-only decision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub time: f64,
    pub chosen: Branch,
    pub rational: Branch,
    /// Agent stayed on its preferred branch against the rational choice.
    pub ideology_override: bool,
    pub cumulative_opportunity_cost: f64,
    pub forced_switch: bool,
}

/// Aggregate allocation of declared shares across the two branches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub share_a_pct: f64,
    pub share_b_pct: f64,
    /// Sum of all declared shares; `share_a_pct + share_b_pct` always
    /// equals this.
    pub total_declared_pct: f64,
    /// Profitability inputs were unavailable this tick; every agent
    /// retained its previous branch.
    pub stale_inputs: bool,
}

/// Public per-agent view: current branch, history and counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    pub current_branch: Branch,
    pub cumulative_opportunity_cost: f64,
    pub ideology_override_count: u32,
    pub forced_switch_count: u32,
    pub history: Vec<DecisionRecord>,
}

// ─── Agent state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentState {
    profile: AgentProfile,
    preferred: Option<Side>,
    current: Side,
    last_decision_time: Option<f64>,
    last_accrual_time: Option<f64>,
    cumulative_opportunity_cost: f64,
    /// Profit the agent would have accumulated on the rational path;
    /// baseline for the percentage loss ceiling.
    rational_profit_accum: f64,
    ideology_override_count: u32,
    forced_switch_count: u32,
    history: Vec<DecisionRecord>,
}

impl AgentState {
    fn loss_pct(&self) -> f64 {
        if self.rational_profit_accum > 0.0 {
            100.0 * self.cumulative_opportunity_cost / self.rational_profit_accum
        } else {
            0.0
        }
    }

    fn over_loss_ceiling(&self) -> bool {
        self.cumulative_opportunity_cost > self.profile.max_loss_absolute
            || self.loss_pct() > self.profile.max_loss_pct
    }
}

// ─── Decision Engine ────────────────────────────────────────────────────────

/// Per-agent rational-choice engine with ideology override, cooldown-gated
/// switching and hard loss limits. One instance models one population
/// (mining pools, or economic/user nodes) against a shared oracle pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEngine {
    branches: BranchPair,
    config: DecisionConfig,
    model: ProfitModel,
    agents: Vec<AgentState>,
}

impl DecisionEngine {
    pub fn new(
        branches: BranchPair,
        config: DecisionConfig,
        model: ProfitModel,
        profiles: Vec<AgentProfile>,
    ) -> Result<Self, StrategyError> {
        let mut agents: Vec<AgentState> = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if agents.iter().any(|a| a.profile.id == profile.id) {
                return Err(StrategyError::DuplicateAgent(profile.id));
            }
            let preferred = profile.validate(&branches)?;
            let current = preferred.unwrap_or(config.initial_side);
            agents.push(AgentState {
                profile,
                preferred,
                current,
                last_decision_time: None,
                last_accrual_time: None,
                cumulative_opportunity_cost: 0.0,
                rational_profit_accum: 0.0,
                ideology_override_count: 0,
                forced_switch_count: 0,
                history: Vec::new(),
            });
        }
        Ok(Self {
            branches,
            config,
            model,
            agents,
        })
    }

    /// Pool-population engine: profitability comes from mining economics.
    pub fn for_pools(
        branches: BranchPair,
        config: DecisionConfig,
        block_subsidy: f64,
        profiles: Vec<AgentProfile>,
    ) -> Result<Self, StrategyError> {
        Self::new(
            branches,
            config,
            ProfitModel::PoolMining { block_subsidy },
            profiles,
        )
    }

    /// Economic/user-node engine: profitability comes from activity margin
    /// net of fee burden.
    pub fn for_economic_nodes(
        branches: BranchPair,
        config: DecisionConfig,
        activity_margin: f64,
        fee_burden: f64,
        profiles: Vec<AgentProfile>,
    ) -> Result<Self, StrategyError> {
        Self::new(
            branches,
            config,
            ProfitModel::EconomicActivity {
                activity_margin,
                fee_burden,
            },
            profiles,
        )
    }

    pub fn branches(&self) -> &BranchPair {
        &self.branches
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Re-evaluate every agent at simulation time `now` and return the
    /// aggregate allocation.
    ///
    /// Never fails in normal operation: if the oracles cannot supply
    /// profitability this tick, all agents retain their previous branch
    /// and the snapshot is marked `stale_inputs`.
    pub fn allocate(
        &mut self,
        now: f64,
        prices: &PriceOracle,
        fees: &FeeOracle,
    ) -> AllocationSnapshot {
        let profits = self.compute_profits(prices, fees);
        match profits {
            Ok(profits) => {
                for agent in &mut self.agents {
                    evaluate_agent(agent, now, &profits, &self.branches, &self.config);
                }
                self.snapshot(false)
            }
            Err(err) => {
                debug!(error = %err, "profitability unavailable, allocations held");
                self.snapshot(true)
            }
        }
    }

    /// Current allocation without re-evaluating any agent.
    pub fn current_allocation(&self) -> AllocationSnapshot {
        self.snapshot(false)
    }

    pub fn agent_summary(&self, id: &str) -> Result<AgentSummary, StrategyError> {
        let agent = self
            .agents
            .iter()
            .find(|a| a.profile.id == id)
            .ok_or_else(|| StrategyError::UnknownAgent(id.to_string()))?;
        Ok(AgentSummary {
            id: agent.profile.id.clone(),
            current_branch: self.branches.branch(agent.current).clone(),
            cumulative_opportunity_cost: agent.cumulative_opportunity_cost,
            ideology_override_count: agent.ideology_override_count,
            forced_switch_count: agent.forced_switch_count,
            history: agent.history.clone(),
        })
    }

    fn compute_profits(
        &self,
        prices: &PriceOracle,
        fees: &FeeOracle,
    ) -> Result<PerBranch<f64>, crate::fee::FeeError> {
        Ok(PerBranch {
            a: self.model.profitability(&self.branches.a, prices, fees)?,
            b: self.model.profitability(&self.branches.b, prices, fees)?,
        })
    }

    fn snapshot(&self, stale_inputs: bool) -> AllocationSnapshot {
        let mut share_a = 0.0;
        let mut share_b = 0.0;
        for agent in &self.agents {
            match agent.current {
                Side::A => share_a += agent.profile.share_pct,
                Side::B => share_b += agent.profile.share_pct,
            }
        }
        AllocationSnapshot {
            share_a_pct: share_a,
            share_b_pct: share_b,
            total_declared_pct: share_a + share_b,
            stale_inputs,
        }
    }
}

// ─── Per-agent evaluation ───────────────────────────────────────────────────

fn evaluate_agent(
    agent: &mut AgentState,
    now: f64,
    profits: &PerBranch<f64>,
    branches: &BranchPair,
    config: &DecisionConfig,
) {
    // The rational choice is sticky: leaving the current branch must be
    // worth more than the agent's switching friction.
    let held = agent.current;
    let rational = if profits.get(held.other()) - profits.get(held) > agent.profile.switch_threshold
    {
        held.other()
    } else {
        held
    };

    // Accrue opportunity cost for the period just spent on the held branch.
    let elapsed = agent
        .last_accrual_time
        .map(|t| (now - t).max(0.0))
        .unwrap_or(0.0);
    agent.last_accrual_time = Some(now);
    if elapsed > 0.0 {
        let share = agent.profile.share_pct / 100.0;
        let gap = (profits.get(rational) - profits.get(held)).max(0.0);
        agent.cumulative_opportunity_cost += gap * share * elapsed;
        agent.rational_profit_accum += profits.get(rational).max(0.0) * share * elapsed;
    }

    // Cooldown gates the decision itself, not the accrual above.
    if let Some(last) = agent.last_decision_time {
        if now - last < config.cooldown {
            return;
        }
    }
    agent.last_decision_time = Some(now);

    let (next, ideology_override, forced) = match agent.preferred {
        // Neutral agents simply take the rational branch.
        None => (rational, false, false),
        Some(pref) if pref == rational => (rational, false, false),
        Some(pref) => {
            // Preference fights rationality: staying requires enough
            // ideology for the relative sacrifice AND headroom under both
            // loss ceilings.
            let gap = profits.get(rational) - profits.get(pref);
            let bar = (gap / profits.get(rational).abs().max(PROFIT_EPSILON)).clamp(0.0, 1.0);
            let ideological_enough = agent.profile.ideology_strength >= bar;
            if ideological_enough && !agent.over_loss_ceiling() {
                (pref, true, false)
            } else {
                let was_on_pref = agent.current == pref;
                (rational, false, was_on_pref)
            }
        }
    };

    if forced {
        agent.forced_switch_count += 1;
        debug!(
            id = %agent.profile.id,
            cost = agent.cumulative_opportunity_cost,
            loss_pct = agent.loss_pct(),
            "agent force-switched to rational branch"
        );
    }
    if ideology_override {
        agent.ideology_override_count += 1;
    }

    agent.current = next;
    agent.history.push(DecisionRecord {
        time: now,
        chosen: branches.branch(next).clone(),
        rational: branches.branch(rational).clone(),
        ideology_override,
        cumulative_opportunity_cost: agent.cumulative_opportunity_cost,
        forced_switch: forced,
    });

    // The record above keeps the breach cost visible; the reset only
    // affects periods after the forced switch.
    if forced && config.reset_cost_on_forced_switch {
        agent.cumulative_opportunity_cost = 0.0;
        agent.rational_profit_accum = 0.0;
    }
    trace!(
        id = %agent.profile.id,
        chosen = %branches.branch(next),
        rational = %branches.branch(rational),
        ideology_override,
        forced,
        "agent evaluated"
    );
}

// ─── Validation helpers ─────────────────────────────────────────────────────

fn check_range(
    id: &str,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), StrategyError> {
    if !value.is_finite() {
        return Err(StrategyError::NonFinite {
            id: id.to_string(),
            field,
            value,
        });
    }
    if value < min || value > max {
        return Err(StrategyError::OutOfRange {
            id: id.to_string(),
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
