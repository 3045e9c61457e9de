// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Synthetic Population Generator

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::strategy::{AgentProfile, ForkPreference};
use crate::types::BranchPair;

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    #[error("agent_count must be at least 1")]
    EmptyPopulation,

    #[error("preference fractions must sum to at most 1.0, got {0}")]
    PreferenceFractions(f64),

    #[error("empty range for {0}: low > high")]
    EmptyRange(&'static str),
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// Parameters for synthesizing an agent population when no declared
/// profiles exist. This generator is the explicit stand-in for missing
/// scenario metadata -- callers opt into it, it is never a silent default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub agent_count: usize,
    /// Total share spread across the population.
    pub total_share_pct: f64,
    /// Fraction of agents declaring for branch A / branch B; the rest are
    /// neutral.
    pub prefer_a_fraction: f64,
    pub prefer_b_fraction: f64,
    pub ideology_range: (f64, f64),
    pub switch_threshold_range: (f64, f64),
    pub max_loss_absolute_range: (f64, f64),
    pub max_loss_pct_range: (f64, f64),
    /// Prefix for generated agent ids, e.g. "pool" -> "pool-07".
    pub id_prefix: String,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            agent_count: 12,
            total_share_pct: 100.0,
            prefer_a_fraction: 0.3,
            prefer_b_fraction: 0.3,
            ideology_range: (0.1, 0.9),
            switch_threshold_range: (1.0, 50.0),
            max_loss_absolute_range: (100.0, 10_000.0),
            max_loss_pct_range: (5.0, 60.0),
            id_prefix: "agent".to_string(),
        }
    }
}

impl PopulationConfig {
    fn validate(&self) -> Result<(), PopulationError> {
        if self.agent_count == 0 {
            return Err(PopulationError::EmptyPopulation);
        }
        let fractions = self.prefer_a_fraction + self.prefer_b_fraction;
        if !(0.0..=1.0).contains(&fractions) {
            return Err(PopulationError::PreferenceFractions(fractions));
        }
        for (name, range) in [
            ("ideology_range", self.ideology_range),
            ("switch_threshold_range", self.switch_threshold_range),
            ("max_loss_absolute_range", self.max_loss_absolute_range),
            ("max_loss_pct_range", self.max_loss_pct_range),
        ] {
            if range.0 > range.1 {
                return Err(PopulationError::EmptyRange(name));
            }
        }
        Ok(())
    }
}

// ─── Generator ──────────────────────────────────────────────────────────────

/// Generate a synthetic agent population, deterministic for a given seed.
///
/// Raw weights are drawn power-law-ish (squared uniform) so a few agents
/// dominate, then normalized so declared shares sum exactly to
/// `total_share_pct`.
pub fn generate(
    branches: &BranchPair,
    config: &PopulationConfig,
    seed: u64,
) -> Result<Vec<AgentProfile>, PopulationError> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let raw_weights: Vec<f64> = (0..config.agent_count)
        .map(|_| rng.gen::<f64>().powi(2) + 1e-6)
        .collect();
    let weight_total: f64 = raw_weights.iter().sum();

    let mut profiles = Vec::with_capacity(config.agent_count);
    let mut allocated = 0.0;
    for (i, raw) in raw_weights.iter().enumerate() {
        // Last agent absorbs rounding so the declared total is exact.
        let share_pct = if i == config.agent_count - 1 {
            config.total_share_pct - allocated
        } else {
            let share = config.total_share_pct * raw / weight_total;
            allocated += share;
            share
        };

        let roll: f64 = rng.gen();
        let preference = if roll < config.prefer_a_fraction {
            ForkPreference::Prefer(branches.a.clone())
        } else if roll < config.prefer_a_fraction + config.prefer_b_fraction {
            ForkPreference::Prefer(branches.b.clone())
        } else {
            ForkPreference::Neutral
        };

        profiles.push(AgentProfile {
            id: format!("{}-{:02}", config.id_prefix, i),
            share_pct,
            preference,
            ideology_strength: sample(&mut rng, config.ideology_range),
            switch_threshold: sample(&mut rng, config.switch_threshold_range),
            max_loss_absolute: sample(&mut rng, config.max_loss_absolute_range),
            max_loss_pct: sample(&mut rng, config.max_loss_pct_range),
        });
    }
    Ok(profiles)
}

fn sample(rng: &mut ChaCha8Rng, range: (f64, f64)) -> f64 {
    if range.0 == range.1 {
        range.0
    } else {
        rng.gen_range(range.0..range.1)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
