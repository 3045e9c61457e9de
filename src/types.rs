// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Fork Aftermath Simulation Suite ("Schism") - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Branch ──────────────────────────────────────────────────────────────────

/// Label for one side of a protocol fork, identified by its chain tip.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Branch(pub String);

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Branch {
    fn from(s: String) -> Self {
        Branch(s)
    }
}

impl From<&str> for Branch {
    fn from(s: &str) -> Self {
        Branch(s.to_string())
    }
}

// ─── Side ────────────────────────────────────────────────────────────────────

/// Position of a branch within a [`BranchPair`]. Exactly two branches exist
/// per analysis; every per-branch container is indexed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

// ─── BranchPair ──────────────────────────────────────────────────────────────

/// The two branches of a fork under analysis.
///
/// Constructed once and handed to every component so all of them agree on
/// which two branches exist for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPair {
    pub a: Branch,
    pub b: Branch,
}

impl BranchPair {
    /// Create a pair of distinct branches. Returns `None` if both labels
    /// are identical.
    pub fn new(a: Branch, b: Branch) -> Option<Self> {
        if a == b {
            return None;
        }
        Some(Self { a, b })
    }

    /// Resolve a branch label to its side, or `None` if the label is not
    /// one of the two branches of this run.
    pub fn side_of(&self, branch: &Branch) -> Option<Side> {
        if *branch == self.a {
            Some(Side::A)
        } else if *branch == self.b {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn branch(&self, side: Side) -> &Branch {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

// ─── PerBranch ───────────────────────────────────────────────────────────────

/// Fixed two-slot storage, one value per fork branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerBranch<T> {
    pub a: T,
    pub b: T,
}

impl<T> PerBranch<T> {
    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            a: value.clone(),
            b: value,
        }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    pub fn set(&mut self, side: Side, value: T) {
        *self.get_mut(side) = value;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_pair_rejects_identical_labels() {
        assert!(BranchPair::new(Branch::from("core"), Branch::from("core")).is_none());
    }

    #[test]
    fn side_resolution() {
        let pair = BranchPair::new(Branch::from("core"), Branch::from("classic"))
            .expect("test: distinct branches");
        assert_eq!(pair.side_of(&Branch::from("core")), Some(Side::A));
        assert_eq!(pair.side_of(&Branch::from("classic")), Some(Side::B));
        assert_eq!(pair.side_of(&Branch::from("cash")), None);
    }

    #[test]
    fn per_branch_get_set() {
        let mut pb = PerBranch::splat(0.0_f64);
        pb.set(Side::B, 2.5);
        assert_eq!(*pb.get(Side::A), 0.0);
        assert_eq!(*pb.get(Side::B), 2.5);
        assert_eq!(Side::A.other(), Side::B);
    }
}
