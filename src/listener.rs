//! TCP listener for the proxy data path.
//!
//! Accepts connections and serves them with HTTP/1.1, one task per
//! connection, until a shutdown signal arrives.

use crate::director::Director;
use crate::error::{ProxyError, Result};
use crate::service::ProxyService;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::Service;
use tracing::{debug, error, info, instrument, warn};

/// HTTP listener that accepts connections and spawns handler tasks.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use steelyard::director::Director;
/// use steelyard::listener::Listener;
/// use steelyard::registry::Registry;
/// use tokio::sync::broadcast;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (shutdown_tx, _) = broadcast::channel(1);
///     let director = Director::new(Arc::new(Registry::new()));
///     let listener = Listener::bind("127.0.0.1:3000", director, Duration::from_secs(30)).await?;
///     listener.serve(shutdown_tx.subscribe()).await?;
///     Ok(())
/// }
/// ```
pub struct Listener {
    tcp_listener: TcpListener,
    proxy_service: ProxyService,
    addr: SocketAddr,
}

impl Listener {
    /// Binds to the specified address and creates a listener.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address to bind to (e.g., "127.0.0.1:3000")
    /// * `director` - Selection handle the data path routes through
    /// * `request_timeout` - Maximum duration for upstream requests
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ListenerBind` if binding fails.
    #[instrument(level = "info", skip(director))]
    pub async fn bind(addr: &str, director: Director, request_timeout: Duration) -> Result<Self> {
        let tcp_listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::ListenerBind {
                addr: addr.to_string(),
                source: e,
            })?;

        let local_addr = tcp_listener
            .local_addr()
            .map_err(|e| ProxyError::ListenerBind {
                addr: addr.to_string(),
                source: e,
            })?;

        info!("bound to {}", local_addr);

        Ok(Self {
            tcp_listener,
            proxy_service: ProxyService::new(director, request_timeout),
            addr: local_addr,
        })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves incoming connections until a shutdown signal is received.
    ///
    /// Spawns a new task for each connection.
    ///
    /// # Arguments
    ///
    /// * `shutdown_rx` - Broadcast receiver for shutdown signal
    #[instrument(level = "info", skip(self, shutdown_rx), fields(addr = %self.addr))]
    pub async fn serve(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("serving connections");

        loop {
            tokio::select! {
                accept_result = self.tcp_listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!("accepted connection from {}", peer_addr);
                            let service = self.proxy_service.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, service).await {
                                    error!("connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("received shutdown signal, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Serves HTTP/1.1 on a single accepted connection.
    #[instrument(level = "debug", skip_all)]
    async fn handle_connection(stream: tokio::net::TcpStream, service: ProxyService) -> Result<()> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req: Request<Incoming>| {
            let mut svc = service.clone();
            async move { svc.call(req).await }
        });

        http1::Builder::new()
            .serve_connection(io, service)
            .await
            .map_err(ProxyError::Http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn director() -> Director {
        Director::new(Arc::new(Registry::new()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_bind() {
        let listener = Listener::bind("127.0.0.1:0", director(), Duration::from_secs(30)).await;
        assert!(listener.is_ok());
        assert_ne!(listener.unwrap().local_addr().port(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_bind_invalid_address() {
        let listener =
            Listener::bind("999.999.999.999:0", director(), Duration::from_secs(30)).await;
        assert!(listener.is_err());
    }
}
