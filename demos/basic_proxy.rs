//! Basic proxy demo: three local upstreams behind one round-robin site.
//!
//! Run with:
//! ```bash
//! cargo run --example basic_proxy
//! ```
//! Then: `curl http://127.0.0.1:5000/` a few times and watch the body
//! rotate across the three upstreams.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use steelyard::admin_listener::AdminListener;
use steelyard::director::Director;
use steelyard::listener::Listener;
use steelyard::registry::{Registry, Scheme};
use steelyard::strategy::StrategyKind;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Spawns a tiny upstream that identifies itself in every response.
async fn spawn_upstream(addr: &str, name: &'static str) {
    let listener = TcpListener::bind(addr).await.expect("bind upstream");
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |_req: Request<Incoming>| async move {
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(format!(
                        "view http server {name}\n"
                    )))))
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting basic proxy demo");

    spawn_upstream("127.0.0.1:5001", "01").await;
    spawn_upstream("127.0.0.1:5002", "02").await;
    spawn_upstream("127.0.0.1:5003", "03").await;

    let registry = Arc::new(Registry::new());
    let director = Director::new(Arc::clone(&registry));

    // The routing key is the authority clients will send: the proxy's
    // own address.
    let domain = "127.0.0.1:5000";
    let strategy: StrategyKind = "roundrobin".parse().expect("strategy name");
    director.register_site(domain, strategy, Scheme::Http);
    for backend in ["127.0.0.1:5001", "127.0.0.1:5002", "127.0.0.1:5003"] {
        director.add_addr(domain, backend, 1).expect("add backend");
    }

    let listener = match Listener::bind(domain, director.clone(), Duration::from_secs(30)).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind listener: {}", e);
            return;
        }
    };
    info!("proxy listening on http://{}", listener.local_addr());
    info!("try: curl http://{}/", listener.local_addr());

    let admin = match AdminListener::bind("127.0.0.1:9090", director).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind admin listener: {}", e);
            return;
        }
    };
    info!("admin endpoints on http://{}", admin.local_addr());

    let (shutdown_tx, _) = broadcast::channel(1);

    let proxy_task = tokio::spawn({
        let shutdown_rx = shutdown_tx.subscribe();
        async move {
            if let Err(e) = listener.serve(shutdown_rx).await {
                error!("listener error: {}", e);
            }
        }
    });
    tokio::spawn({
        let shutdown_rx = shutdown_tx.subscribe();
        async move {
            if let Err(e) = admin.serve(shutdown_rx).await {
                error!("admin listener error: {}", e);
            }
        }
    });

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
        let _ = shutdown_tx.send(());
    }
    let _ = proxy_task.await;
}
