//! Build Status Relay — Cloud Build notifications to GitHub commit statuses.
//!
//! Receives build lifecycle notifications from a Pub/Sub push subscription on
//! the `cloud-builds` topic, works out which GitHub repository and commit each
//! build ran against, and records the build state as a commit status.

mod config;
mod errors;
mod metrics;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;

use config::{RelayArgs, RelayConfig};
use services::github_service::GitHubClient;
use services::identity_service::IdentityResolver;
use services::relay_service::{RelayOutcome, StatusPublisher};
use services::sourcerepo_service::{SourceRepoClient, TokenSource};

#[derive(Parser)]
#[command(name = "build-status-relay", about = "Cloud Build to GitHub commit status relay")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Deadline for handling one push request, in seconds
    #[arg(long, env = "RELAY_HANDLER_TIMEOUT", default_value = "120")]
    handler_timeout_secs: u64,

    #[command(flatten)]
    relay: RelayArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the Pub/Sub push endpoint (default)
    Serve,
    /// Relay one notification read from a file ("-" for stdin)
    Publish {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    let config = match RelayConfig::from_args(cli.relay) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return Err(e.into());
        }
    };
    let http = config.http_client()?;
    let publisher = Arc::new(build_publisher(&config, http));

    tracing::info!(
        strategy = ?config.strategy,
        context = %config.status_context,
        on_delivery_failure = ?config.on_delivery_failure,
        "Status publisher ready"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let handler_timeout = Duration::from_secs(cli.handler_timeout_secs.max(1));
            serve(&config, publisher, cli.port, handler_timeout).await
        }
        Command::Publish { file } => publish_file(&publisher, &file).await,
    }
}

fn build_publisher(config: &RelayConfig, http: reqwest::Client) -> StatusPublisher {
    let tokens = match &config.sourcerepo_token {
        Some(token) => TokenSource::Static(token.clone()),
        None => TokenSource::Metadata(config.metadata_url.clone()),
    };
    let registry = Arc::new(SourceRepoClient::new(
        http.clone(),
        config.sourcerepo_api_url.clone(),
        tokens,
    ));
    let resolver =
        IdentityResolver::for_strategy(config.strategy, registry, config.github_host.clone())
            .with_allowed_owners(config.allowed_owners.clone());
    let sink = Arc::new(GitHubClient::new(
        http,
        config.github_api_url.clone(),
        config.github_token.clone(),
    ));

    StatusPublisher::new(resolver, sink, config.status_context.clone())
}

async fn serve(
    config: &RelayConfig,
    publisher: Arc<StatusPublisher>,
    port: u16,
    handler_timeout: Duration,
) -> anyhow::Result<()> {
    metrics::init_metrics();

    let state = routes::RelayRouterState {
        publisher,
        on_delivery_failure: config.on_delivery_failure,
    };
    let app = routes::relay_router(state, handler_timeout);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Build status relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn publish_file(publisher: &StatusPublisher, file: &Path) -> anyhow::Result<()> {
    let payload = if file.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?
    };

    let outcome = publisher.publish(&payload).await;
    println!("{}", outcome.as_str());
    if outcome != RelayOutcome::Delivered {
        anyhow::bail!("notification was not delivered ({})", outcome.as_str());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
