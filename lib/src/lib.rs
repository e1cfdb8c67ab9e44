use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use figment_file_provider_adapter::FileAdapter;
use serde::de::DeserializeOwned;
use tokio::signal;
use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

pub mod error;
pub mod event;
pub mod extract;
pub mod linker;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod notify;
pub mod repo;
pub mod signature;
pub mod store;

pub use error::{DecodeError, StoreError};
pub use event::PushEvent;
pub use linker::{CommitLinkResult, LinkingEngine, WebhookResult};

/// Installs the tracing subscriber and loads the configuration.
///
/// Sources are layered in order: the built-in `defaults` TOML, an optional config file given as
/// the first CLI argument, then `PUSHLINK_` environment variables. Any env var may be suffixed
/// with `_FILE` to read its value from a file (handy for secrets).
pub fn init<C>(defaults: &str) -> anyhow::Result<C>
where
    C: DeserializeOwned,
{
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                // also covers the `pushlink_server` target
                .with_default_directive("pushlink=DEBUG".parse()?)
                .from_env()?,
        )
        .init();

    let mut figment = Figment::new().merge(Toml::string(defaults));
    if let Some(path) = std::env::args().nth(1) {
        tracing::info!("Loading config from file {}", path);
        let path = std::path::Path::new(&path);
        figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => anyhow::bail!("Unknown config format: {path:?}"),
        };
    }

    Ok(figment
        .merge(FileAdapter::wrap(Env::prefixed("PUSHLINK_")))
        .extract::<C>()?)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
