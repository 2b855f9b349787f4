use std::{error::Error, path::PathBuf};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayline_server::{config::ServerConfig, create_app, AppState};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Route planning API proxy for OSRM and Nominatim"
)]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Base URL of the OSRM service (overrides OSRM_URL)
    #[arg(long)]
    osrm_url: Option<String>,

    /// Base URL of the Nominatim service (overrides NOMINATIM_URL)
    #[arg(long)]
    nominatim_url: Option<String>,

    /// Directory with the built front-end (overrides STATIC_DIR)
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = self.osrm_url {
            config.osrm_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = self.nominatim_url {
            config.nominatim_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = self.static_dir {
            config.static_dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wayline_server=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::from_env()?;
    Args::parse().apply(&mut config);

    let state = AppState::from_config(&config)?;
    let app = create_app(state, &config);

    let addr = config.socket_addr();
    tracing::info!("starting wayline on http://{addr}");
    tracing::info!("OSRM URL: {}", config.osrm_url);
    tracing::info!("Nominatim URL: {}", config.nominatim_url);
    tracing::info!(
        "CORS origin: {}",
        config.cors_origin.as_deref().unwrap_or("any")
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, shutting down gracefully");
}
