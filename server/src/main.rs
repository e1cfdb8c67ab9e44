use crate::{config::Config, db::SqliteStore, github::middleware::SignatureKey};
use listenfd::ListenFd;
use pushlink::LinkingEngine;
use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

mod config;
mod db;
mod error;
mod github;
mod middleware;
mod tasks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: Config = pushlink::init(include_str!("./default.toml"))?;

    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    tracing::info!("opened database {}", config.database_path.display());
    let engine = Arc::new(LinkingEngine::with_store(store.clone()));

    let secret = config
        .github_webhook_secret
        .filter(|secret| !secret.expose_secret().is_empty());
    if secret.is_none() {
        tracing::warn!("no webhook secret configured, accepting unsigned deliveries");
    }
    let key = SignatureKey {
        secret,
        max_body_bytes: config.max_body_bytes,
    };

    let app = github::webhook::router(
        engine,
        key,
        config
            .manual_sync
            .then(|| config.allowed_ip_ranges.clone()),
    )
    .merge(tasks::router(store, config.allowed_ip_ranges))
    .layer((
        TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()),
        // Graceful shutdown will wait for outstanding requests to complete. Add a timeout so
        // requests don't hang forever.
        TimeoutLayer::new(config.request_timeout),
    ));

    let mut listenfd = ListenFd::from_env();
    let listener = match listenfd.take_tcp_listener(0)? {
        // if we are given a tcp listener on listen fd 0, we use that one
        Some(listener) => {
            listener.set_nonblocking(true)?;
            TcpListener::from_std(listener)?
        }
        // otherwise fall back to local listening
        None => TcpListener::bind(&config.listen_addr).await?,
    };

    tracing::debug!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(pushlink::shutdown_signal())
    .await?;
    Ok(())
}
