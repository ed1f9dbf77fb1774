//! Admin endpoints: health, metrics, and the site management API.
//!
//! The management surface is the operator-facing half of the proxy: it
//! registers sites, mutates endpoint sets, and swaps strategies at
//! runtime, all against the same registry the data path selects from.
//!
//! Routes:
//! - `GET /health` - liveness check
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /sites` - list all registered sites
//! - `POST /sites` - register a site (409 when the domain is taken)
//! - `GET /sites/{domain}` - inspect one site
//! - `DELETE /sites/{domain}` - flush a site (idempotent)
//! - `PUT /sites/{domain}/strategy` - swap the active strategy
//! - `POST /sites/{domain}/endpoints` - add an endpoint
//! - `DELETE /sites/{domain}/endpoints` - remove an endpoint (idempotent)

use crate::director::Director;
use crate::error::ProxyError;
use crate::metrics::Metrics;
use crate::registry::Scheme;
use crate::strategy::StrategyKind;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use serde::Deserialize;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, warn};

/// Body of `POST /sites`.
#[derive(Debug, Deserialize)]
struct RegisterSiteRequest {
    domain: String,
    #[serde(default)]
    strategy: StrategyKind,
    #[serde(default)]
    scheme: Scheme,
}

/// Body of `POST /sites/{domain}/endpoints`.
#[derive(Debug, Deserialize)]
struct AddEndpointRequest {
    addr: String,
    #[serde(default = "default_weight")]
    weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Body of `DELETE /sites/{domain}/endpoints`.
#[derive(Debug, Deserialize)]
struct RemoveEndpointRequest {
    addr: String,
}

/// Body of `PUT /sites/{domain}/strategy`.
#[derive(Debug, Deserialize)]
struct ChangeStrategyRequest {
    strategy: StrategyKind,
}

/// Admin service for health, metrics, and site management.
#[derive(Clone)]
pub struct AdminService {
    director: Director,
}

impl AdminService {
    /// Creates an admin service over the given director.
    pub fn new(director: Director) -> Self {
        Self { director }
    }

    /// Collects the request body, then dispatches on method and path.
    async fn handle_request(
        self,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("failed to read admin request body: {}", e);
                return Ok(Self::error_response(
                    StatusCode::BAD_REQUEST,
                    "failed to read request body",
                ));
            }
        };
        Ok(self.dispatch(&parts.method, parts.uri.path(), &body))
    }

    /// Routes one admin request. Registry operations are synchronous, so
    /// dispatch is too; tests call this directly.
    fn dispatch(&self, method: &Method, path: &str, body: &Bytes) -> Response<BoxBody<Bytes, hyper::Error>> {
        debug!(%method, %path, "admin request");

        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (method, segments.as_slice()) {
            (&Method::GET, ["health"]) => Self::text_response(StatusCode::OK, "healthy"),
            (&Method::GET, ["metrics"]) => match Metrics::encode() {
                Ok(metrics) => Self::metrics_response(metrics),
                Err(e) => {
                    warn!("failed to encode metrics: {}", e);
                    Self::error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "failed to encode metrics",
                    )
                }
            },
            (&Method::GET, ["sites"]) => {
                Self::json_response(StatusCode::OK, &self.director.registry().sites())
            }
            (&Method::POST, ["sites"]) => {
                let req: RegisterSiteRequest = match serde_json::from_slice(body) {
                    Ok(req) => req,
                    Err(e) => return Self::error_response(StatusCode::BAD_REQUEST, &e.to_string()),
                };
                match self
                    .director
                    .registry()
                    .create_site(&req.domain, req.strategy, req.scheme)
                {
                    Ok(info) => Self::json_response(StatusCode::CREATED, &info),
                    Err(e) => Self::registry_error_response(&e),
                }
            }
            (&Method::GET, ["sites", domain]) => match self.director.site_info(domain) {
                Ok(info) => Self::json_response(StatusCode::OK, &info),
                Err(e) => Self::registry_error_response(&e),
            },
            (&Method::DELETE, ["sites", domain]) => {
                self.director.flush_site(domain);
                Self::empty_response(StatusCode::NO_CONTENT)
            }
            (&Method::PUT, ["sites", domain, "strategy"]) => {
                let req: ChangeStrategyRequest = match serde_json::from_slice(body) {
                    Ok(req) => req,
                    Err(e) => return Self::error_response(StatusCode::BAD_REQUEST, &e.to_string()),
                };
                self.director.change_load_type(domain, req.strategy);
                Self::empty_response(StatusCode::NO_CONTENT)
            }
            (&Method::POST, ["sites", domain, "endpoints"]) => {
                let req: AddEndpointRequest = match serde_json::from_slice(body) {
                    Ok(req) => req,
                    Err(e) => return Self::error_response(StatusCode::BAD_REQUEST, &e.to_string()),
                };
                match self.director.add_addr(domain, req.addr, req.weight) {
                    Ok(()) => Self::empty_response(StatusCode::CREATED),
                    Err(e) => Self::registry_error_response(&e),
                }
            }
            (&Method::DELETE, ["sites", domain, "endpoints"]) => {
                let req: RemoveEndpointRequest = match serde_json::from_slice(body) {
                    Ok(req) => req,
                    Err(e) => return Self::error_response(StatusCode::BAD_REQUEST, &e.to_string()),
                };
                match self.director.del_addr(domain, &req.addr) {
                    Ok(()) => Self::empty_response(StatusCode::NO_CONTENT),
                    Err(e) => Self::registry_error_response(&e),
                }
            }
            _ => Self::error_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    /// Maps a registry error to its HTTP representation.
    fn registry_error_response(err: &ProxyError) -> Response<BoxBody<Bytes, hyper::Error>> {
        let status = match err {
            ProxyError::ServiceNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::ServiceExisted { .. } | ProxyError::EndpointExisted { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::error_response(status, &err.to_string())
    }

    /// Creates a JSON response from a serializable value.
    fn json_response<T: serde::Serialize>(
        status: StatusCode,
        value: &T,
    ) -> Response<BoxBody<Bytes, hyper::Error>> {
        match serde_json::to_vec(value) {
            Ok(body) => Response::builder()
                .status(status)
                .header("Content-Type", "application/json")
                .body(
                    Full::new(Bytes::from(body))
                        .map_err(|never| match never {})
                        .boxed(),
                )
                .unwrap_or_else(|_| {
                    Response::new(
                        Full::new(Bytes::new())
                            .map_err(|never| match never {})
                            .boxed(),
                    )
                }),
            Err(e) => {
                warn!("failed to serialize admin response: {}", e);
                Self::error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to serialize response",
                )
            }
        }
    }

    /// Creates a metrics response in Prometheus text format.
    fn metrics_response(metrics: String) -> Response<BoxBody<Bytes, hyper::Error>> {
        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(
                Full::new(Bytes::from(metrics))
                    .map_err(|never| match never {})
                    .boxed(),
            )
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::new())
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }

    /// Creates a plain-text response.
    fn text_response(status: StatusCode, message: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        Response::builder()
            .status(status)
            .body(
                Full::new(Bytes::from(message.to_string()))
                    .map_err(|never| match never {})
                    .boxed(),
            )
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::new())
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }

    /// Creates a response with no body.
    fn empty_response(status: StatusCode) -> Response<BoxBody<Bytes, hyper::Error>> {
        Response::builder()
            .status(status)
            .body(
                Full::new(Bytes::new())
                    .map_err(|never| match never {})
                    .boxed(),
            )
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::new())
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }

    /// Creates an HTTP error response.
    fn error_response(status: StatusCode, message: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        Self::text_response(status, message)
    }
}

impl Service<Request<Incoming>> for AdminService {
    type Response = Response<BoxBody<Bytes, hyper::Error>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let this = self.clone();
        Box::pin(this.handle_request(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn admin() -> AdminService {
        AdminService::new(Director::new(Arc::new(Registry::new())))
    }

    fn body(json: &str) -> Bytes {
        Bytes::from(json.to_string())
    }

    #[test]
    fn test_health() {
        let response = admin().dispatch(&Method::GET, "/health", &Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_metrics() {
        let response = admin().dispatch(&Method::GET, "/metrics", &Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "text/plain; version=0.0.4"
        );
    }

    #[test]
    fn test_unknown_route() {
        let response = admin().dispatch(&Method::GET, "/nope", &Bytes::new());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_register_site_conflict() {
        let admin = admin();
        let req = body(r#"{"domain":"example.com","strategy":"roundrobin"}"#);

        let response = admin.dispatch(&Method::POST, "/sites", &req);
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = admin.dispatch(&Method::POST, "/sites", &req);
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_register_site_bad_json() {
        let response = admin().dispatch(&Method::POST, "/sites", &body("{not json"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_endpoint_lifecycle() {
        let admin = admin();
        admin.dispatch(
            &Method::POST,
            "/sites",
            &body(r#"{"domain":"example.com","strategy":"wroundrobin","scheme":"https"}"#),
        );

        let response = admin.dispatch(
            &Method::POST,
            "/sites/example.com/endpoints",
            &body(r#"{"addr":"10.0.0.1:443","weight":2}"#),
        );
        assert_eq!(response.status(), StatusCode::CREATED);

        // Duplicate address is a conflict.
        let response = admin.dispatch(
            &Method::POST,
            "/sites/example.com/endpoints",
            &body(r#"{"addr":"10.0.0.1:443"}"#),
        );
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Removal is idempotent.
        for _ in 0..2 {
            let response = admin.dispatch(
                &Method::DELETE,
                "/sites/example.com/endpoints",
                &body(r#"{"addr":"10.0.0.1:443"}"#),
            );
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let info = admin.director.site_info("example.com").unwrap();
        assert!(info.endpoints.is_empty());
        assert_eq!(info.scheme, Scheme::Https);
    }

    #[test]
    fn test_add_endpoint_unknown_site() {
        let response = admin().dispatch(
            &Method::POST,
            "/sites/missing.example/endpoints",
            &body(r#"{"addr":"10.0.0.1:80"}"#),
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_change_strategy() {
        let admin = admin();
        admin.dispatch(
            &Method::POST,
            "/sites",
            &body(r#"{"domain":"example.com","strategy":"random"}"#),
        );

        let response = admin.dispatch(
            &Method::PUT,
            "/sites/example.com/strategy",
            &body(r#"{"strategy":"wroundrobin"}"#),
        );
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let info = admin.director.site_info("example.com").unwrap();
        assert_eq!(info.strategy, StrategyKind::WeightedRoundRobin);
    }

    #[test]
    fn test_flush_site_idempotent() {
        let admin = admin();
        for _ in 0..2 {
            let response = admin.dispatch(&Method::DELETE, "/sites/example.com", &Bytes::new());
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }
    }

    #[test]
    fn test_site_listing() {
        let admin = admin();
        admin.dispatch(
            &Method::POST,
            "/sites",
            &body(r#"{"domain":"a.example"}"#),
        );
        admin.dispatch(
            &Method::POST,
            "/sites",
            &body(r#"{"domain":"b.example"}"#),
        );

        let response = admin.dispatch(&Method::GET, "/sites", &Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
        assert_eq!(admin.director.registry().len(), 2);
    }
}
