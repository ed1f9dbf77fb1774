//! Weighted round-robin strategy.
//!
//! Weights are reduced by their greatest common divisor into a compact
//! remaining-count table. One pass through the table (an epoch) dispenses
//! each endpoint exactly `weight / gcd` times, so the reduced table keeps
//! the exact proportional distribution while bounding the rotation period.

use crate::error::{ProxyError, Result};
use crate::registry::Endpoint;
use crate::strategy::{Strategy, StrategyKind};

/// One working-table entry: an address and its remaining picks within the
/// current epoch.
#[derive(Debug, Clone)]
struct ActiveItem {
    addr: String,
    remaining: u32,
}

/// Weighted round-robin selection state.
///
/// The working table is rebuilt lazily: a freshly constructed instance
/// (or one whose epoch is exhausted) reloads from the endpoint snapshot on
/// the next `pick`. Membership changes rebuild it immediately, discarding
/// any in-progress epoch so weight changes take effect on the next call.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    active: Vec<ActiveItem>,
    cursor: usize,
}

impl WeightedRoundRobin {
    /// Creates a weighted round-robin strategy with an uninitialized
    /// working table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the working table from the given endpoints and resets the
    /// cursor. A zero GCD (every weight zero) leaves the table empty; the
    /// all-zero check in `pick` fails first, so selection never scans a
    /// table built from an unservable set.
    fn reload(&mut self, endpoints: &[Endpoint]) {
        self.cursor = 0;
        let divisor = gcd_of(endpoints);
        if divisor == 0 {
            self.active.clear();
            return;
        }
        self.active = endpoints
            .iter()
            .map(|e| ActiveItem {
                addr: e.addr.clone(),
                remaining: e.weight / divisor,
            })
            .collect();
    }

    /// True when every remaining count is zero, including the
    /// uninitialized (empty) table.
    fn exhausted(&self) -> bool {
        self.active.iter().all(|item| item.remaining == 0)
    }
}

impl Strategy for WeightedRoundRobin {
    fn pick(&mut self, domain: &str, endpoints: &[Endpoint]) -> Result<String> {
        if endpoints.is_empty() {
            return Err(ProxyError::NoEndpoints {
                domain: domain.to_string(),
            });
        }
        if endpoints.iter().all(|e| e.weight == 0) {
            return Err(ProxyError::NoAvailableEndpoints {
                domain: domain.to_string(),
            });
        }

        if self.exhausted() {
            self.reload(endpoints);
        }

        let len = self.active.len();
        for probe in 0..len {
            let idx = (self.cursor + probe) % len;
            if self.active[idx].remaining > 0 {
                self.active[idx].remaining -= 1;
                self.cursor = (idx + 1) % len;
                return Ok(self.active[idx].addr.clone());
            }
        }

        // Unreachable after a successful reload; a hard stop rather than
        // a loop.
        Err(ProxyError::NoAvailableEndpoints {
            domain: domain.to_string(),
        })
    }

    fn endpoints_changed(&mut self, endpoints: &[Endpoint]) {
        self.reload(endpoints);
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::WeightedRoundRobin
    }
}

/// Greatest common divisor of all endpoint weights, folded with identity
/// 0, so an all-zero (or empty) set yields 0.
fn gcd_of(endpoints: &[Endpoint]) -> u32 {
    endpoints.iter().fold(0, |acc, e| gcd(acc, e.weight))
}

/// Euclidean greatest common divisor with `gcd(x, 0) = x`.
fn gcd(m: u32, n: u32) -> u32 {
    let (mut m, mut n) = (m, n);
    while n != 0 {
        let r = m % n;
        m = n;
        n = r;
    }
    m
}
