use std::sync::Arc;

use steelyard::admin_listener::AdminListener;
use steelyard::config::{ProxyConfig, SitesConfig};
use steelyard::director::Director;
use steelyard::listener::Listener;
use steelyard::registry::Registry;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting steelyard proxy");

    if let Err(e) = run().await {
        error!("fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ProxyConfig::from_env();
    config.validate()?;
    info!(
        "config: proxy={}, admin={}, timeout={}ms",
        config.listen_addr,
        config.admin_addr,
        config.request_timeout.as_millis()
    );

    let registry = Arc::new(Registry::new());
    let director = Director::new(Arc::clone(&registry));

    if let Some(path) = &config.sites_file {
        let content = tokio::fs::read_to_string(path).await?;
        let sites = if path.ends_with(".json") {
            SitesConfig::from_json(&content)?
        } else {
            SitesConfig::from_toml(&content)?
        };
        sites.apply(&registry);
        info!("seeded {} site(s) from {}", sites.sites.len(), path);
    }

    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    let proxy_listener = Listener::bind(
        &config.listen_addr,
        director.clone(),
        config.request_timeout,
    )
    .await?;
    let proxy_addr = proxy_listener.local_addr();
    info!("proxy listening on {}", proxy_addr);

    let admin_listener = AdminListener::bind(&config.admin_addr, director).await?;
    let admin_addr = admin_listener.local_addr();
    info!("admin endpoints on {} (/health, /metrics, /sites)", admin_addr);

    let mut proxy_task = tokio::spawn({
        let shutdown_rx = shutdown_tx.subscribe();
        async move {
            if let Err(e) = proxy_listener.serve(shutdown_rx).await {
                error!("proxy listener error: {}", e);
            }
        }
    });

    let mut admin_task = tokio::spawn({
        let shutdown_rx = shutdown_tx.subscribe();
        async move {
            if let Err(e) = admin_listener.serve(shutdown_rx).await {
                error!("admin listener error: {}", e);
            }
        }
    });

    let mut proxy_finished = false;
    let mut admin_finished = false;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, initiating graceful shutdown");
        }
        res = &mut proxy_task => {
            proxy_finished = true;
            match res {
                Ok(()) => info!("proxy task completed"),
                Err(err) => error!("proxy task join error: {}", err),
            }
        }
        res = &mut admin_task => {
            admin_finished = true;
            match res {
                Ok(()) => info!("admin task completed"),
                Err(err) => error!("admin task join error: {}", err),
            }
        }
    }

    let _ = shutdown_tx.send(());

    if !proxy_finished {
        match proxy_task.await {
            Ok(()) => info!("proxy task completed"),
            Err(err) => error!("proxy task join error: {}", err),
        }
    }

    if !admin_finished {
        match admin_task.await {
            Ok(()) => info!("admin task completed"),
            Err(err) => error!("admin task join error: {}", err),
        }
    }

    info!("shutdown complete");
    Ok(())
}
