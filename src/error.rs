//! Error types for the proxy.

use std::io;
use thiserror::Error;

/// Errors that can occur during registry, balancing, and proxy operations.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Requested domain has no registered site.
    #[error("no site registered for domain {domain}")]
    ServiceNotFound { domain: String },

    /// Strict registration attempted for an already-registered domain.
    #[error("site already registered for domain {domain}")]
    ServiceExisted { domain: String },

    /// Duplicate endpoint address within one site.
    #[error("endpoint {addr} already present for domain {domain}")]
    EndpointExisted { domain: String, addr: String },

    /// Site has no endpoints at selection time.
    #[error("no endpoints for domain {domain}")]
    NoEndpoints { domain: String },

    /// Every endpoint of the site has weight zero (weighted strategies only).
    #[error("no available endpoints for domain {domain}: all weights are zero")]
    NoAvailableEndpoints { domain: String },

    /// Unknown load balancing strategy name.
    #[error("unknown load balancing strategy: {name}")]
    UnknownStrategy { name: String },

    /// Failed to bind to a listener address.
    #[error("failed to bind listener to {addr}: {source}")]
    ListenerBind { addr: String, source: io::Error },

    /// Selection produced an address that does not form a valid URI.
    #[error("invalid upstream uri: {0}")]
    InvalidUpstreamUri(String),

    /// HTTP protocol error.
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
