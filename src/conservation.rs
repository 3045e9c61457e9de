// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Share Conservation

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::strategy::AllocationSnapshot;

/// Absolute share error below this threshold is considered balanced.
const TOLERANCE: f64 = 0.0001;

// ---------------------------------------------------------------------------
// Conservation result
// ---------------------------------------------------------------------------

/// Outcome of a single share-conservation check (one allocation snapshot).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConservationResult {
    /// Whether the check passed within tolerance.
    pub balanced: bool,
    /// Absolute error for this check.
    pub error: f64,
    /// Whether the circuit breaker is currently tripped.
    pub circuit_breaker_tripped: bool,
}

// ---------------------------------------------------------------------------
// Share conservation law (circuit breaker + per-tick verification)
// ---------------------------------------------------------------------------

/// Verifies that allocation snapshots conserve the declared share total:
///
///   shareA + shareB = total declared
///
/// No share may be lost or duplicated by agent switching. Errors accumulate
/// and a circuit breaker trips when the cumulative error exceeds a
/// configurable threshold, giving the driving loop a tripwire for a broken
/// population setup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShareConservation {
    /// Total share the population declared at setup.
    pub declared_total_pct: f64,
    /// Running total of absolute errors across violating checks.
    pub cumulative_error: f64,
    /// Maximum cumulative error before the circuit breaker trips.
    pub circuit_breaker_threshold: f64,
    pub circuit_breaker_tripped: bool,
    /// Number of consecutive checks that violated tolerance.
    pub consecutive_violations: u32,
}

impl ShareConservation {
    pub fn new(declared_total_pct: f64, threshold: f64) -> Self {
        Self {
            declared_total_pct,
            cumulative_error: 0.0,
            circuit_breaker_threshold: threshold,
            circuit_breaker_tripped: false,
            consecutive_violations: 0,
        }
    }

    /// Verify one allocation snapshot against the declared total.
    pub fn verify(&mut self, snapshot: &AllocationSnapshot) -> ConservationResult {
        let allocated = snapshot.share_a_pct + snapshot.share_b_pct;
        let error = (self.declared_total_pct - allocated).abs();
        let balanced = error < TOLERANCE;

        if balanced {
            self.consecutive_violations = 0;
        } else {
            self.cumulative_error += error;
            self.consecutive_violations += 1;
        }

        if self.cumulative_error > self.circuit_breaker_threshold {
            if !self.circuit_breaker_tripped {
                debug!(
                    cumulative_error = self.cumulative_error,
                    "share conservation circuit breaker tripped"
                );
            }
            self.circuit_breaker_tripped = true;
        }

        ConservationResult {
            balanced,
            error,
            circuit_breaker_tripped: self.circuit_breaker_tripped,
        }
    }

    /// Reset the circuit breaker and all accumulated error state.
    pub fn reset_circuit_breaker(&mut self) {
        self.cumulative_error = 0.0;
        self.circuit_breaker_tripped = false;
        self.consecutive_violations = 0;
    }

    pub fn is_tripped(&self) -> bool {
        self.circuit_breaker_tripped
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
