//! Balancing strategies and their construction.
//!
//! A strategy instance is owned by exactly one site. It holds only its own
//! rotation state; the endpoint list it selects from is a snapshot taken
//! from the registry under the registry lock and handed in per call. Calls
//! for one site are serialized by the site's balancer mutex, which is why
//! `pick` can take `&mut self` without further locking.

use crate::error::{ProxyError, Result};
use crate::registry::Endpoint;
use crate::weighted::WeightedRoundRobin;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A balancing algorithm bound to one site.
pub trait Strategy: Send {
    /// Selects one endpoint address from the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::NoEndpoints` when the snapshot is empty;
    /// weighted strategies additionally fail with
    /// `ProxyError::NoAvailableEndpoints` when every weight is zero.
    fn pick(&mut self, domain: &str, endpoints: &[Endpoint]) -> Result<String>;

    /// Notifies the strategy that the site's endpoint set changed.
    ///
    /// Stateless and purely positional strategies ignore this; weighted
    /// round-robin rebuilds its working table from the new list.
    fn endpoints_changed(&mut self, _endpoints: &[Endpoint]) {}

    /// Returns the kind tag identifying this strategy.
    fn kind(&self) -> StrategyKind;
}

/// Strategy selector used at construction and introspection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Uniform random selection.
    #[default]
    #[serde(rename = "random")]
    Random,
    /// Rotating cursor over the endpoint list.
    #[serde(rename = "roundrobin")]
    RoundRobin,
    /// GCD-reduced weighted rotation.
    #[serde(rename = "wroundrobin")]
    WeightedRoundRobin,
}

impl StrategyKind {
    /// Constructs a fresh strategy instance with no rotation state.
    pub fn instantiate(self) -> Box<dyn Strategy> {
        match self {
            StrategyKind::Random => Box::new(Random),
            StrategyKind::RoundRobin => Box::new(RoundRobin::new()),
            StrategyKind::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
        }
    }

    /// Returns the wire name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Random => "random",
            StrategyKind::RoundRobin => "roundrobin",
            StrategyKind::WeightedRoundRobin => "wroundrobin",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(StrategyKind::Random),
            "roundrobin" => Ok(StrategyKind::RoundRobin),
            "wroundrobin" => Ok(StrategyKind::WeightedRoundRobin),
            other => Err(ProxyError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Uniform random selection over the current endpoint list.
///
/// Keeps no state between calls.
#[derive(Debug, Default)]
pub struct Random;

impl Strategy for Random {
    fn pick(&mut self, domain: &str, endpoints: &[Endpoint]) -> Result<String> {
        if endpoints.is_empty() {
            return Err(ProxyError::NoEndpoints {
                domain: domain.to_string(),
            });
        }
        let idx = rand::thread_rng().gen_range(0..endpoints.len());
        Ok(endpoints[idx].addr.clone())
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Random
    }
}

/// Rotating cursor selection in endpoint insertion order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    /// Creates a round-robin strategy with the cursor at the start.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobin {
    fn pick(&mut self, domain: &str, endpoints: &[Endpoint]) -> Result<String> {
        if endpoints.is_empty() {
            return Err(ProxyError::NoEndpoints {
                domain: domain.to_string(),
            });
        }
        // The cursor is taken modulo the current length: if the list
        // shrank since the last call, an entry may be skipped or repeated.
        let idx = self.cursor % endpoints.len();
        self.cursor = (idx + 1) % endpoints.len();
        Ok(endpoints[idx].addr.clone())
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }
}
