//! Configuration for the proxy.

use crate::registry::{Endpoint, Registry, Scheme};
use crate::strategy::StrategyKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid listen address format.
    #[error("invalid listen address '{addr}': {reason}")]
    InvalidListenAddr { addr: String, reason: String },

    /// Invalid admin address format.
    #[error("invalid admin address '{addr}': {reason}")]
    InvalidAdminAddr { addr: String, reason: String },

    /// Invalid timeout value.
    #[error("invalid timeout value: {reason}")]
    InvalidTimeout { reason: String },

    /// Duplicate listen and admin addresses.
    #[error("listen address and admin address cannot be the same: {addr}")]
    DuplicateAddrs { addr: String },

    /// Failed to parse a sites file.
    #[error("invalid sites file: {0}")]
    InvalidSitesFile(String),
}

/// Proxy configuration loaded at startup.
///
/// Immutable after initialization. The site table itself is runtime
/// state, mutated through the admin API; this only carries the process
/// plumbing.
///
/// # Environment Variables
///
/// * `PROXY_LISTEN_ADDR` - Address to listen on (default: "127.0.0.1:3000")
/// * `PROXY_ADMIN_ADDR` - Admin endpoint address (default: "127.0.0.1:9090")
/// * `PROXY_REQUEST_TIMEOUT_MS` - Request timeout in milliseconds (default: 30000)
/// * `PROXY_SITES_FILE` - Optional TOML or JSON file seeding the site table
///
/// # Example
///
/// ```
/// use steelyard::config::ProxyConfig;
///
/// let config = ProxyConfig::from_env();
/// assert!(!config.listen_addr.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address to listen on for incoming connections.
    pub listen_addr: String,

    /// Address to serve admin endpoints on.
    pub admin_addr: String,

    /// Request timeout duration.
    pub request_timeout: Duration,

    /// Optional path to a sites file applied to the registry at startup.
    pub sites_file: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            admin_addr: "127.0.0.1:9090".to_string(),
            request_timeout: Duration::from_secs(30),
            sites_file: None,
        }
    }
}

impl ProxyConfig {
    /// Loads configuration from environment variables with fallback to
    /// defaults.
    pub fn from_env() -> Self {
        let listen_addr =
            env::var("PROXY_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

        let admin_addr =
            env::var("PROXY_ADMIN_ADDR").unwrap_or_else(|_| "127.0.0.1:9090".to_string());

        let request_timeout_ms = env::var("PROXY_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30000);

        let sites_file = env::var("PROXY_SITES_FILE").ok().filter(|s| !s.is_empty());

        Self {
            listen_addr,
            admin_addr,
            request_timeout: Duration::from_millis(request_timeout_ms),
            sites_file,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is not a valid socket address, the
    /// listen and admin addresses collide, or the timeout is zero or
    /// beyond one hour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidListenAddr {
                addr: self.listen_addr.clone(),
                reason: e.to_string(),
            })?;

        self.admin_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidAdminAddr {
                addr: self.admin_addr.clone(),
                reason: e.to_string(),
            })?;

        if self.listen_addr == self.admin_addr {
            return Err(ConfigError::DuplicateAddrs {
                addr: self.listen_addr.clone(),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                reason: "timeout must be greater than zero".to_string(),
            });
        }

        if self.request_timeout > Duration::from_secs(3600) {
            return Err(ConfigError::InvalidTimeout {
                reason: "timeout must not exceed 1 hour".to_string(),
            });
        }

        Ok(())
    }
}

/// One declared endpoint within a site definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Backend address as `host:port`.
    pub addr: String,
    /// Weight for weighted strategies (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// One declared site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Routing key (request authority, port included).
    pub domain: String,
    /// Balancing strategy (default: random).
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Forwarding scheme (default: http).
    #[serde(default)]
    pub scheme: Scheme,
    /// Endpoint list in priority order.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// Declarative site table that can be loaded from file.
///
/// # Example
///
/// ```
/// use steelyard::config::SitesConfig;
///
/// let config = SitesConfig::from_toml(r#"
///     [[sites]]
///     domain = "example.com"
///     strategy = "roundrobin"
///     endpoints = [{ addr = "10.0.0.1:80" }, { addr = "10.0.0.2:80" }]
/// "#).unwrap();
/// assert_eq!(config.sites.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitesConfig {
    /// List of sites.
    pub sites: Vec<SiteConfig>,
}

impl SitesConfig {
    /// Loads a site table from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidSitesFile(e.to_string()))
    }

    /// Loads a site table from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::InvalidSitesFile(e.to_string()))
    }

    /// Applies the declared sites to a registry.
    ///
    /// Existing sites are left untouched (registration is idempotent);
    /// duplicate endpoint declarations are logged and skipped.
    pub fn apply(&self, registry: &Registry) {
        for site in &self.sites {
            registry.register_site(&site.domain, site.strategy, site.scheme);
            for endpoint in &site.endpoints {
                match registry.add_endpoint(
                    &site.domain,
                    Endpoint::new(endpoint.addr.clone(), endpoint.weight),
                ) {
                    Ok(()) => {}
                    Err(e) => warn!(domain = %site.domain, addr = %endpoint.addr, error = %e,
                        "skipped endpoint"),
                }
            }
            info!(domain = %site.domain, strategy = %site.strategy,
                endpoints = site.endpoints.len(), "seeded site");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.admin_addr, "127.0.0.1:9090");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.sites_file.is_none());
    }

    #[test]
    fn test_from_env() {
        let config = ProxyConfig::from_env();
        assert!(!config.listen_addr.is_empty());
        assert!(!config.admin_addr.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = ProxyConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_listen_addr() {
        let config = ProxyConfig {
            listen_addr: "invalid".to_string(),
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidListenAddr { .. }
        ));
    }

    #[test]
    fn test_validate_invalid_admin_addr() {
        let config = ProxyConfig {
            admin_addr: "invalid".to_string(),
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidAdminAddr { .. }
        ));
    }

    #[test]
    fn test_validate_duplicate_addrs() {
        let config = ProxyConfig {
            listen_addr: "127.0.0.1:3000".to_string(),
            admin_addr: "127.0.0.1:3000".to_string(),
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::DuplicateAddrs { .. }
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = ProxyConfig {
            request_timeout: Duration::ZERO,
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidTimeout { .. }
        ));
    }

    #[test]
    fn test_validate_excessive_timeout() {
        let config = ProxyConfig {
            request_timeout: Duration::from_secs(7200),
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidTimeout { .. }
        ));
    }

    #[test]
    fn test_sites_from_toml_and_apply() {
        let config = SitesConfig::from_toml(
            r#"
            [[sites]]
            domain = "example.com"
            strategy = "wroundrobin"
            scheme = "https"
            endpoints = [
                { addr = "10.0.0.1:443", weight = 2 },
                { addr = "10.0.0.2:443" },
            ]

            [[sites]]
            domain = "other.example"
            "#,
        )
        .unwrap();

        let registry = Registry::new();
        config.apply(&registry);

        let info = registry.site_info("example.com").unwrap();
        assert_eq!(info.strategy, StrategyKind::WeightedRoundRobin);
        assert_eq!(info.scheme, Scheme::Https);
        assert_eq!(info.endpoints.len(), 2);
        assert_eq!(info.endpoints[0].weight, 2);
        assert_eq!(info.endpoints[1].weight, 1);

        let other = registry.site_info("other.example").unwrap();
        assert_eq!(other.strategy, StrategyKind::Random);
        assert!(other.endpoints.is_empty());
    }

    #[test]
    fn test_sites_from_json() {
        let config = SitesConfig::from_json(
            r#"{"sites":[{"domain":"example.com","strategy":"roundrobin",
                "endpoints":[{"addr":"10.0.0.1:80"}]}]}"#,
        )
        .unwrap();
        assert_eq!(config.sites[0].strategy, StrategyKind::RoundRobin);
        assert_eq!(config.sites[0].endpoints[0].weight, 1);
    }

    #[test]
    fn test_sites_invalid_toml() {
        let result = SitesConfig::from_toml("sites = 3");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidSitesFile(_)
        ));
    }

    #[test]
    fn test_apply_skips_duplicate_endpoints() {
        let config = SitesConfig::from_toml(
            r#"
            [[sites]]
            domain = "example.com"
            endpoints = [{ addr = "10.0.0.1:80" }, { addr = "10.0.0.1:80" }]
            "#,
        )
        .unwrap();

        let registry = Registry::new();
        config.apply(&registry);
        assert_eq!(registry.site_info("example.com").unwrap().endpoints.len(), 1);
    }
}
