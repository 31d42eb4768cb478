use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use imgresize::cache::build_cache;
use imgresize::config::{LogFormat, LogSettings, Settings};
use imgresize::service::{self, AppState};
use imgresize::{Resizer, Server};

fn init_tracing(log: &LogSettings) {
    // RUST_LOG wins over LOG_LEVEL.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let (json, text) = match log.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    init_tracing(&settings.log);

    info!(
        port = settings.http.server_port,
        cache = ?settings.service.cache_backend,
        async_resize = settings.service.async_resize,
        "starting imgresize"
    );

    let cache = build_cache(&settings.service)
        .await
        .context("failed to initialize image cache")?;

    let resizer = Arc::new(
        Resizer::from_settings(&settings, Arc::clone(&cache)).context("failed to build resizer")?,
    );
    resizer.start();

    let server = Server::bind(format!("0.0.0.0:{}", settings.http.server_port))
        .await
        .context("failed to bind http server")?;

    let state = Arc::new(AppState {
        settings,
        cache,
        resizer: Arc::clone(&resizer),
    });

    let served = service::serve(server, state, service::shutdown_signal()).await;

    resizer.shutdown().await;
    served.context("http server failed")?;

    info!("bye");
    Ok(())
}
