//! Site registry: the shared table mapping routing keys to backend sets.
//!
//! The registry is the single source of truth for which backends exist for
//! a domain. It is owned by the composition root and shared by handle, so
//! several isolated registries can coexist in one process (tests rely on
//! this).
//!
//! Locking discipline: one reader/writer lock guards the whole map. Every
//! mutation holds the write lock for its full duration; selection holds the
//! read lock only long enough to snapshot the endpoint list and clone the
//! site's balancer handle. Strategy-local rotation state is serialized by a
//! per-site mutex, so selections for different domains never contend.

use crate::error::{ProxyError, Result};
use crate::strategy::{Strategy, StrategyKind};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// URL scheme used when forwarding to a site's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Forward as plain HTTP.
    #[default]
    Http,
    /// Forward as HTTPS.
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// One backend address with its balancing weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Backend address as `host:port`.
    pub addr: String,
    /// Weight for weighted strategies; ignored by the others.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl Endpoint {
    /// Creates an endpoint with the given address and weight.
    pub fn new(addr: impl Into<String>, weight: u32) -> Self {
        Self {
            addr: addr.into(),
            weight,
        }
    }
}

/// Read-only snapshot of a registered site.
///
/// Returned by introspection calls and serialized by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct SiteInfo {
    /// Routing key the site is registered under.
    pub domain: String,
    /// Scheme used when forwarding to the site's endpoints.
    pub scheme: Scheme,
    /// Name of the active balancing strategy.
    pub strategy: StrategyKind,
    /// Endpoint list in insertion order.
    pub endpoints: Vec<Endpoint>,
}

/// Registry record binding a domain to its endpoints and active balancer.
struct Site {
    scheme: Scheme,
    strategy: StrategyKind,
    endpoints: Vec<Endpoint>,
    balancer: Arc<Mutex<Box<dyn Strategy>>>,
}

impl Site {
    fn new(strategy: StrategyKind, scheme: Scheme) -> Self {
        Self {
            scheme,
            strategy,
            endpoints: Vec::new(),
            balancer: Arc::new(Mutex::new(strategy.instantiate())),
        }
    }

    fn info(&self, domain: &str) -> SiteInfo {
        SiteInfo {
            domain: domain.to_string(),
            scheme: self.scheme,
            strategy: self.strategy,
            endpoints: self.endpoints.clone(),
        }
    }
}

/// Process-wide table of sites keyed by domain.
///
/// # Example
///
/// ```
/// use steelyard::registry::{Endpoint, Registry, Scheme};
/// use steelyard::strategy::StrategyKind;
///
/// let registry = Registry::new();
/// registry.register_site("example.com", StrategyKind::RoundRobin, Scheme::Http);
/// registry.add_endpoint("example.com", Endpoint::new("10.0.0.1:80", 1)).unwrap();
/// let (addr, _scheme) = registry.select("example.com").unwrap();
/// assert_eq!(addr, "10.0.0.1:80");
/// ```
pub struct Registry {
    sites: RwLock<HashMap<String, Site>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sites: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a site, or returns the existing one untouched.
    ///
    /// Lookup-or-create semantics: registering an already-registered domain
    /// is not an error and changes nothing.
    pub fn register_site(&self, domain: &str, strategy: StrategyKind, scheme: Scheme) -> SiteInfo {
        let mut sites = self.sites.write();
        let site = sites.entry(domain.to_string()).or_insert_with(|| {
            info!(%domain, strategy = %strategy, %scheme, "registered site");
            Site::new(strategy, scheme)
        });
        site.info(domain)
    }

    /// Registers a site, failing if the domain is already registered.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ServiceExisted` when the domain is taken.
    pub fn create_site(&self, domain: &str, strategy: StrategyKind, scheme: Scheme) -> Result<SiteInfo> {
        let mut sites = self.sites.write();
        if sites.contains_key(domain) {
            return Err(ProxyError::ServiceExisted {
                domain: domain.to_string(),
            });
        }
        info!(%domain, strategy = %strategy, %scheme, "registered site");
        let site = Site::new(strategy, scheme);
        let info = site.info(domain);
        sites.insert(domain.to_string(), site);
        Ok(info)
    }

    /// Returns a snapshot of the named site.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ServiceNotFound` if the domain is unregistered.
    pub fn site_info(&self, domain: &str) -> Result<SiteInfo> {
        let sites = self.sites.read();
        sites
            .get(domain)
            .map(|site| site.info(domain))
            .ok_or_else(|| ProxyError::ServiceNotFound {
                domain: domain.to_string(),
            })
    }

    /// Returns snapshots of every registered site.
    pub fn sites(&self) -> Vec<SiteInfo> {
        let sites = self.sites.read();
        let mut infos: Vec<SiteInfo> = sites
            .iter()
            .map(|(domain, site)| site.info(domain))
            .collect();
        infos.sort_by(|a, b| a.domain.cmp(&b.domain));
        infos
    }

    /// Appends an endpoint to the named site, preserving insertion order.
    ///
    /// The site's balancer is told about the membership change before the
    /// write lock is released, so weighted strategies discard their
    /// in-progress epoch immediately.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ServiceNotFound` if the domain is unregistered
    /// and `ProxyError::EndpointExisted` if the address is already present.
    pub fn add_endpoint(&self, domain: &str, endpoint: Endpoint) -> Result<()> {
        let mut sites = self.sites.write();
        let site = sites
            .get_mut(domain)
            .ok_or_else(|| ProxyError::ServiceNotFound {
                domain: domain.to_string(),
            })?;

        if site.endpoints.iter().any(|e| e.addr == endpoint.addr) {
            return Err(ProxyError::EndpointExisted {
                domain: domain.to_string(),
                addr: endpoint.addr,
            });
        }

        debug!(%domain, addr = %endpoint.addr, weight = endpoint.weight, "added endpoint");
        site.endpoints.push(endpoint);
        site.balancer.lock().endpoints_changed(&site.endpoints);
        Ok(())
    }

    /// Removes the first endpoint with the given address from the named
    /// site, preserving the relative order of the remainder.
    ///
    /// Removing an absent address is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ServiceNotFound` if the domain is unregistered.
    pub fn remove_endpoint(&self, domain: &str, addr: &str) -> Result<()> {
        let mut sites = self.sites.write();
        let site = sites
            .get_mut(domain)
            .ok_or_else(|| ProxyError::ServiceNotFound {
                domain: domain.to_string(),
            })?;

        if let Some(pos) = site.endpoints.iter().position(|e| e.addr == addr) {
            site.endpoints.remove(pos);
            debug!(%domain, %addr, "removed endpoint");
            site.balancer.lock().endpoints_changed(&site.endpoints);
        }
        Ok(())
    }

    /// Deletes the named site and all of its endpoints.
    ///
    /// Flushing an unregistered domain is a no-op.
    pub fn flush_site(&self, domain: &str) {
        let mut sites = self.sites.write();
        if sites.remove(domain).is_some() {
            info!(%domain, "flushed site");
        }
    }

    /// Replaces the named site's active strategy with a freshly
    /// constructed instance carrying no prior rotation state.
    ///
    /// If the domain is unregistered, a site with an empty endpoint list
    /// and the requested strategy is created instead.
    pub fn change_strategy(&self, domain: &str, strategy: StrategyKind) {
        let mut sites = self.sites.write();
        match sites.get_mut(domain) {
            Some(site) => {
                info!(%domain, strategy = %strategy, "changed strategy");
                site.strategy = strategy;
                // Swapping inside the existing mutex keeps in-flight
                // selections ordered: each sees the old or the new
                // instance, never a mix.
                *site.balancer.lock() = strategy.instantiate();
            }
            None => {
                info!(%domain, strategy = %strategy, "registered site");
                sites.insert(domain.to_string(), Site::new(strategy, Scheme::default()));
            }
        }
    }

    /// Selects the next target address for the domain using its active
    /// strategy, returning the address and the site's scheme.
    ///
    /// The endpoint snapshot is taken under the map read lock; the
    /// strategy then runs under the site's own mutex with the map lock
    /// released.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ServiceNotFound` for an unregistered domain,
    /// or whatever the strategy fails with (`NoEndpoints`,
    /// `NoAvailableEndpoints`).
    pub fn select(&self, domain: &str) -> Result<(String, Scheme)> {
        let (snapshot, scheme, balancer) = {
            let sites = self.sites.read();
            let site = sites.get(domain).ok_or_else(|| ProxyError::ServiceNotFound {
                domain: domain.to_string(),
            })?;
            (site.endpoints.clone(), site.scheme, Arc::clone(&site.balancer))
        };

        let addr = balancer.lock().pick(domain, &snapshot)?;
        Ok((addr, scheme))
    }

    /// Returns the number of registered sites.
    pub fn len(&self) -> usize {
        self.sites.read().len()
    }

    /// Returns true if no sites are registered.
    pub fn is_empty(&self) -> bool {
        self.sites.read().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
