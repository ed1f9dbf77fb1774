//! Site controller: the selection and management facade.
//!
//! The director is the single surface the data path and the admin API
//! depend on. Per request it answers "where does this domain go next";
//! everything else is a thin pass-through into the registry.

use crate::error::Result;
use crate::registry::{Endpoint, Registry, Scheme, SiteInfo};
use crate::strategy::StrategyKind;
use std::sync::Arc;
use tracing::debug;

/// Resolved forwarding target for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Routing key the target was resolved for.
    pub domain: String,
    /// Selected backend address (`host:port`).
    pub addr: String,
    /// Scheme to forward with.
    pub scheme: Scheme,
}

/// Cheap clonable handle over a shared registry.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use steelyard::director::Director;
/// use steelyard::registry::{Registry, Scheme};
/// use steelyard::strategy::StrategyKind;
///
/// let director = Director::new(Arc::new(Registry::new()));
/// director.register_site("example.com", StrategyKind::RoundRobin, Scheme::Http);
/// director.add_addr("example.com", "10.0.0.1:80", 1).unwrap();
/// let target = director.route("example.com").unwrap();
/// assert_eq!(target.addr, "10.0.0.1:80");
/// ```
#[derive(Clone)]
pub struct Director {
    registry: Arc<Registry>,
}

impl Director {
    /// Creates a director over the given registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Picks the next target for the domain using its active strategy.
    ///
    /// # Errors
    ///
    /// Forwards the registry/strategy error verbatim: `ServiceNotFound`,
    /// `NoEndpoints` or `NoAvailableEndpoints`.
    pub fn route(&self, domain: &str) -> Result<RouteTarget> {
        let (addr, scheme) = self.registry.select(domain)?;
        debug!(%domain, %addr, "routed");
        Ok(RouteTarget {
            domain: domain.to_string(),
            addr,
            scheme,
        })
    }

    /// Registers a site (lookup-or-create; see `Registry::register_site`).
    pub fn register_site(&self, domain: &str, strategy: StrategyKind, scheme: Scheme) -> SiteInfo {
        self.registry.register_site(domain, strategy, scheme)
    }

    /// Adds a backend address with the given weight to the domain's site.
    pub fn add_addr(&self, domain: &str, addr: impl Into<String>, weight: u32) -> Result<()> {
        self.registry.add_endpoint(domain, Endpoint::new(addr, weight))
    }

    /// Removes a backend address from the domain's site (idempotent).
    pub fn del_addr(&self, domain: &str, addr: &str) -> Result<()> {
        self.registry.remove_endpoint(domain, addr)
    }

    /// Swaps the domain's active strategy for a fresh instance.
    pub fn change_load_type(&self, domain: &str, strategy: StrategyKind) {
        self.registry.change_strategy(domain, strategy)
    }

    /// Deletes the domain's site entirely (idempotent).
    pub fn flush_site(&self, domain: &str) {
        self.registry.flush_site(domain)
    }

    /// Returns a read-only snapshot of the domain's site.
    pub fn site_info(&self, domain: &str) -> Result<SiteInfo> {
        self.registry.site_info(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;

    fn director() -> Director {
        Director::new(Arc::new(Registry::new()))
    }

    #[test]
    fn test_route_round_robin_scenario() {
        let director = director();
        director.register_site("example.com", StrategyKind::RoundRobin, Scheme::Http);
        director.add_addr("example.com", "10.0.0.1:80", 1).unwrap();
        director.add_addr("example.com", "10.0.0.2:80", 1).unwrap();
        director.add_addr("example.com", "10.0.0.3:80", 1).unwrap();

        let picks: Vec<String> = (0..4)
            .map(|_| director.route("example.com").unwrap().addr)
            .collect();
        assert_eq!(
            picks,
            vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80", "10.0.0.1:80"]
        );
    }

    #[test]
    fn test_route_unknown_domain() {
        let director = director();
        let err = director.route("missing.example").unwrap_err();
        assert!(matches!(err, ProxyError::ServiceNotFound { .. }));
    }

    #[test]
    fn test_route_empty_site() {
        let director = director();
        director.register_site("example.com", StrategyKind::Random, Scheme::Http);
        let err = director.route("example.com").unwrap_err();
        assert!(matches!(err, ProxyError::NoEndpoints { .. }));
    }

    #[test]
    fn test_strategy_swap_keeps_no_state() {
        let director = director();
        director.register_site("example.com", StrategyKind::RoundRobin, Scheme::Http);
        director.add_addr("example.com", "10.0.0.1:80", 2).unwrap();
        director.add_addr("example.com", "10.0.0.2:80", 1).unwrap();

        // Burn a few round-robin picks, then swap to weighted and back.
        director.route("example.com").unwrap();
        director.route("example.com").unwrap();
        director.change_load_type("example.com", StrategyKind::WeightedRoundRobin);

        // Weighted starts a fresh epoch: 2,1 reduces to [2,1].
        let picks: Vec<String> = (0..3)
            .map(|_| director.route("example.com").unwrap().addr)
            .collect();
        assert_eq!(picks, vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.1:80"]);

        director.change_load_type("example.com", StrategyKind::RoundRobin);
        assert_eq!(director.route("example.com").unwrap().addr, "10.0.0.1:80");
    }

    #[test]
    fn test_management_passthroughs() {
        let director = director();
        director.register_site("example.com", StrategyKind::Random, Scheme::Https);
        director.add_addr("example.com", "10.0.0.1:443", 1).unwrap();
        director.add_addr("example.com", "10.0.0.2:443", 1).unwrap();
        director.del_addr("example.com", "10.0.0.1:443").unwrap();

        let info = director.site_info("example.com").unwrap();
        assert_eq!(info.scheme, Scheme::Https);
        assert_eq!(info.strategy, StrategyKind::Random);
        assert_eq!(info.endpoints.len(), 1);

        director.flush_site("example.com");
        assert!(director.site_info("example.com").is_err());
    }
}
