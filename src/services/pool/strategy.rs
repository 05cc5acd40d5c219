//! Connection selection strategies
//!
//! A pool manager asks its strategy for an index into the connection array
//! on every request. Strategies must never block and never lock the array.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Load Balance Strategy
// ============================================================================

/// Selection policy as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    /// Cycle through the connections in index order (default)
    #[default]
    RoundRobin,
    /// Pick a connection uniformly at random
    Random,
}

impl LoadBalanceStrategy {
    /// Build the runtime strategy for this policy
    pub fn build(&self) -> Box<dyn SelectionStrategy> {
        match self {
            Self::RoundRobin => Box::new(RoundRobin::new()),
            Self::Random => Box::new(RandomSelection),
        }
    }
}

impl fmt::Display for LoadBalanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl std::str::FromStr for LoadBalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(format!(
                "Unknown load balance strategy '{}'. Expected: round_robin or random",
                other
            )),
        }
    }
}

// ============================================================================
// Selection Strategy
// ============================================================================

/// Picks the index of the connection serving the next request
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    /// Index in `0..len`. `len` is always at least 1; the pool manager
    /// reduces larger values modulo `len`.
    fn next_index(&self, len: usize) -> usize;

    /// Name reported in pool statistics
    fn name(&self) -> &'static str;
}

/// Single atomic counter, advanced once per selection and kept below the
/// pool size
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl SelectionStrategy for RoundRobin {
    fn next_index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        // bounded to `0..len`, so the cycle never breaks on wrap-around
        let previous = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some((current % len + 1) % len)
            })
            .unwrap_or_else(|current| current);
        previous % len
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelection;

impl SelectionStrategy for RandomSelection {
    fn next_index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::thread_rng().gen_range(0..len)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

// ============================================================================
// Tests
// ============================================================================
