//! Tower service implementation for the proxy data path.

use crate::director::Director;
use crate::errpage;
use crate::error::Result;
use crate::metrics::Metrics;
use http::header::HOST;
use http::{Request, Response, StatusCode, Uri};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tower::Service;
use tracing::{debug, info, instrument, warn};

/// HTTP proxy service that routes each request by its authority.
///
/// Looks up the request's host in the site registry via the [`Director`],
/// forwards to the selected backend, and renders a local error page when
/// routing or the upstream fails. Implements `tower::Service` for
/// composability.
#[derive(Clone)]
pub struct ProxyService {
    director: Director,
    client: Client<HttpConnector, Incoming>,
    request_timeout: Duration,
}

impl ProxyService {
    /// Creates a proxy service over the given director.
    ///
    /// # Arguments
    ///
    /// * `director` - Selection and management handle over the registry
    /// * `request_timeout` - Maximum duration for upstream requests
    pub fn new(director: Director, request_timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            director,
            client,
            request_timeout,
        }
    }

    /// Extracts the routing key from the request: the URI authority when
    /// present, otherwise the `Host` header, verbatim (port included).
    fn request_authority(req: &Request<Incoming>) -> Option<String> {
        if let Some(authority) = req.uri().authority() {
            return Some(authority.to_string());
        }
        req.headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Forwards an HTTP request to the backend selected for its host.
    #[instrument(level = "debug", skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    async fn forward_request(
        &self,
        mut req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>> {
        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let Some(domain) = Self::request_authority(&req) else {
            warn!("request without host");
            return Ok(Self::error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "request carries no host",
                &path,
                "",
            ));
        };

        let target = match self.director.route(&domain) {
            Ok(target) => target,
            Err(e) => {
                // Routing failure is answered locally; the registry error
                // text becomes the page message.
                warn!(%domain, error = %e, "routing failed");
                let duration = start.elapsed().as_secs_f64();
                Metrics::record_request(&method, 500, &domain, "-", duration);
                return Ok(Self::error_page(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &e.to_string(),
                    &path,
                    &domain,
                ));
            }
        };

        let upstream_uri = match Self::build_upstream_uri(&target.scheme.to_string(), &target.addr, req.uri()) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(%domain, error = %e, "failed to build upstream uri");
                let duration = start.elapsed().as_secs_f64();
                Metrics::record_request(&method, 502, &domain, &target.addr, duration);
                return Ok(Self::error_page(
                    StatusCode::BAD_GATEWAY,
                    "invalid upstream uri",
                    &path,
                    &domain,
                ));
            }
        };

        debug!(%domain, upstream = %upstream_uri, "forwarding");
        *req.uri_mut() = upstream_uri;

        match timeout(self.request_timeout, self.client.request(req)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                let duration = start.elapsed().as_secs_f64();

                info!(
                    method = %method,
                    status = status.as_u16(),
                    %domain,
                    upstream = %target.addr,
                    duration_ms = duration * 1000.0,
                    "request completed"
                );
                Metrics::record_request(&method, status.as_u16(), &domain, &target.addr, duration);

                // Error statuses from the upstream are replaced by the
                // local page carrying the same status.
                if status.as_u16() > 400 {
                    return Ok(Self::error_page(status, "upstream error", &path, &domain));
                }

                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, body.boxed()))
            }
            Ok(Err(e)) => {
                warn!(%domain, upstream = %target.addr, error = %e, "upstream request failed");
                let duration = start.elapsed().as_secs_f64();
                Metrics::record_request(&method, 502, &domain, &target.addr, duration);
                Ok(Self::error_page(
                    StatusCode::BAD_GATEWAY,
                    "upstream request failed",
                    &path,
                    &domain,
                ))
            }
            Err(_) => {
                warn!(%domain, upstream = %target.addr, "upstream request timed out");
                let duration = start.elapsed().as_secs_f64();
                Metrics::record_request(&method, 504, &domain, &target.addr, duration);
                Ok(Self::error_page(
                    StatusCode::GATEWAY_TIMEOUT,
                    "upstream request timed out",
                    &path,
                    &domain,
                ))
            }
        }
    }

    /// Builds the full upstream URI from the selected backend and the
    /// original request path.
    fn build_upstream_uri(scheme: &str, addr: &str, original_uri: &Uri) -> Result<Uri> {
        let path_and_query = original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let uri_str = format!("{scheme}://{addr}{path_and_query}");
        uri_str
            .parse()
            .map_err(|_| crate::error::ProxyError::InvalidUpstreamUri(uri_str))
    }

    /// Renders a locally answered HTML error response.
    fn error_page(
        status: StatusCode,
        msg: &str,
        url: &str,
        host: &str,
    ) -> Response<BoxBody<Bytes, hyper::Error>> {
        let body = Full::new(Bytes::from(errpage::render(status, msg, url, host)))
            .map_err(|never| match never {})
            .boxed();
        Response::builder()
            .status(status)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(body)
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::new())
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }
}

impl Service<Request<Incoming>> for ProxyService {
    type Response = Response<BoxBody<Bytes, hyper::Error>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let response = match this.forward_request(req).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("proxy error: {}", e);
                    Self::error_page(StatusCode::BAD_GATEWAY, "proxy error", "", "")
                }
            };
            Ok(response)
        })
    }
}
