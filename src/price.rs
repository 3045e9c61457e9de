// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Price Oracle

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::sustainment::SustainmentTracker;
use crate::types::{Branch, BranchPair, PerBranch, Side};

// ─── Constants ──────────────────────────────────────────────────────────────

const DEFAULT_BASE_PRICE: f64 = 1_000.0;
/// Maximum relative divergence from base price. Must stay below 1.0 so a
/// fully dominated branch still trades above zero.
const DEFAULT_MAX_DIVERGENCE: f64 = 0.8;

// Blend coefficients: economic backing dominates, chain length second,
// hashrate last.
const DEFAULT_ECONOMIC_WEIGHT: f64 = 0.5;
const DEFAULT_CHAIN_WEIGHT: f64 = 0.3;
const DEFAULT_HASHRATE_WEIGHT: f64 = 0.2;

/// A zero/missing input weight is read as "no signal", i.e. parity.
const NEUTRAL_WEIGHT: f64 = 0.5;

const BLEND_SUM_TOLERANCE: f64 = 1e-6;

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} out of range [{min}, {max}]: {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("blend coefficients must sum to 1.0, got {0}")]
    BlendSum(f64),

    #[error("unknown branch: {0}")]
    UnknownBranch(Branch),
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// Price oracle configuration.
///
/// The coefficient blend is deliberately configurable; the defaults put
/// economic backing ahead of chain length ahead of hashrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    pub base_price: f64,
    /// Divergence envelope: per-branch price stays within
    /// `base_price * (1 ± max_divergence)`.
    pub max_divergence: f64,
    pub economic_weight: f64,
    pub chain_weight: f64,
    pub hashrate_weight: f64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_price: DEFAULT_BASE_PRICE,
            max_divergence: DEFAULT_MAX_DIVERGENCE,
            economic_weight: DEFAULT_ECONOMIC_WEIGHT,
            chain_weight: DEFAULT_CHAIN_WEIGHT,
            hashrate_weight: DEFAULT_HASHRATE_WEIGHT,
        }
    }
}

impl PriceConfig {
    fn validate(&self) -> Result<(), PriceError> {
        check_finite("base_price", self.base_price)?;
        if self.base_price <= 0.0 {
            return Err(PriceError::OutOfRange {
                field: "base_price",
                value: self.base_price,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        check_range("max_divergence", self.max_divergence, 0.0, 1.0 - f64::EPSILON)?;
        check_range("economic_weight", self.economic_weight, 0.0, 1.0)?;
        check_range("chain_weight", self.chain_weight, 0.0, 1.0)?;
        check_range("hashrate_weight", self.hashrate_weight, 0.0, 1.0)?;

        let sum = self.economic_weight + self.chain_weight + self.hashrate_weight;
        if (sum - 1.0).abs() > BLEND_SUM_TOLERANCE {
            return Err(PriceError::BlendSum(sum));
        }
        Ok(())
    }
}

// ─── Input weights ──────────────────────────────────────────────────────────

/// One branch's relative share of each signal versus the counterpart
/// branch, each in [0, 1]. A value of exactly 0.0 means "missing" and is
/// treated as parity (0.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BranchWeights {
    pub chain: f64,
    pub economic: f64,
    pub hashrate: f64,
}

impl BranchWeights {
    pub fn parity() -> Self {
        Self {
            chain: NEUTRAL_WEIGHT,
            economic: NEUTRAL_WEIGHT,
            hashrate: NEUTRAL_WEIGHT,
        }
    }
}

// ─── Price Oracle ───────────────────────────────────────────────────────────

/// Computes per-branch token price from weighted economic, chain-length and
/// hashrate inputs, bounded by the divergence envelope.
///
/// Until the [`SustainmentTracker`] latches, both branches are quoted at
/// base price regardless of inputs; an ephemeral split never moves prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceOracle {
    branches: BranchPair,
    config: PriceConfig,
    prices: PerBranch<f64>,
}

impl PriceOracle {
    pub fn new(branches: BranchPair, config: PriceConfig) -> Result<Self, PriceError> {
        config.validate()?;
        let base = config.base_price;
        Ok(Self {
            branches,
            config,
            prices: PerBranch::splat(base),
        })
    }

    pub fn branches(&self) -> &BranchPair {
        &self.branches
    }

    pub fn base_price(&self) -> f64 {
        self.config.base_price
    }

    /// Current quoted price for a branch.
    pub fn price(&self, branch: &Branch) -> Result<f64, PriceError> {
        let side = self.side_of(branch)?;
        Ok(*self.prices.get(side))
    }

    /// Recompute one branch's price from its signal weights.
    ///
    /// Each weight is that branch's share of the signal versus the
    /// counterpart branch, in [0, 1]; 0.0 reads as parity. While the fork
    /// is not sustained the quote is pinned to base price.
    pub fn update(
        &mut self,
        tracker: &SustainmentTracker,
        branch: &Branch,
        weights: BranchWeights,
    ) -> Result<f64, PriceError> {
        let side = self.side_of(branch)?;

        if !tracker.is_sustained() {
            self.prices.set(side, self.config.base_price);
            return Ok(self.config.base_price);
        }

        let chain = normalize_weight("chain_weight", weights.chain)?;
        let economic = normalize_weight("economic_weight", weights.economic)?;
        let hashrate = normalize_weight("hashrate_weight", weights.hashrate)?;

        let blend = self.config.economic_weight * economic
            + self.config.chain_weight * chain
            + self.config.hashrate_weight * hashrate;

        // Center the [0,1] blend on parity and scale into the envelope.
        let divergence = ((blend - 0.5) * 2.0 * self.config.max_divergence)
            .clamp(-self.config.max_divergence, self.config.max_divergence);
        let price = self.config.base_price * (1.0 + divergence);

        trace!(%branch, blend, divergence, price, "price updated");
        self.prices.set(side, price);
        Ok(price)
    }

    /// Convenience entry: quote both branches directly from raw chain
    /// heights and custody/hashrate percentage splits, recording the
    /// heights on the tracker (the sustainment check happens here).
    ///
    /// `custody_pct_a` / `hashrate_pct_a` are branch A's share in
    /// [0, 100]; branch B holds the remainder.
    pub fn update_from_chain(
        &mut self,
        tracker: &mut SustainmentTracker,
        height_a: u64,
        height_b: u64,
        custody_pct_a: f64,
        hashrate_pct_a: f64,
    ) -> Result<PerBranch<f64>, PriceError> {
        check_range("custody_pct_a", custody_pct_a, 0.0, 100.0)?;
        check_range("hashrate_pct_a", hashrate_pct_a, 0.0, 100.0)?;

        tracker.observe(height_a, height_b);

        let ancestor = tracker.ancestor_height();
        let depth_a = height_a.saturating_sub(ancestor) as f64;
        let depth_b = height_b.saturating_sub(ancestor) as f64;
        let chain_a = if depth_a + depth_b > 0.0 {
            depth_a / (depth_a + depth_b)
        } else {
            NEUTRAL_WEIGHT
        };

        let weights_a = BranchWeights {
            chain: chain_a,
            economic: custody_pct_a / 100.0,
            hashrate: hashrate_pct_a / 100.0,
        };
        let weights_b = BranchWeights {
            chain: 1.0 - chain_a,
            economic: 1.0 - weights_a.economic,
            hashrate: 1.0 - weights_a.hashrate,
        };

        let branch_a = self.branches.a.clone();
        let branch_b = self.branches.b.clone();
        let price_a = self.update(tracker, &branch_a, weights_a)?;
        let price_b = self.update(tracker, &branch_b, weights_b)?;
        Ok(PerBranch {
            a: price_a,
            b: price_b,
        })
    }

    fn side_of(&self, branch: &Branch) -> Result<Side, PriceError> {
        self.branches
            .side_of(branch)
            .ok_or_else(|| PriceError::UnknownBranch(branch.clone()))
    }
}

// ─── Validation helpers ─────────────────────────────────────────────────────

fn check_finite(field: &'static str, value: f64) -> Result<(), PriceError> {
    if !value.is_finite() {
        return Err(PriceError::NonFinite { field, value });
    }
    Ok(())
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), PriceError> {
    check_finite(field, value)?;
    if value < min || value > max {
        return Err(PriceError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn normalize_weight(field: &'static str, value: f64) -> Result<f64, PriceError> {
    if value == 0.0 {
        return Ok(NEUTRAL_WEIGHT);
    }
    check_range(field, value, 0.0, 1.0)?;
    Ok(value)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
