//! `retail-api` - serves the retail catalog as a JSON:API.
//!
//! Usage:
//!   retail-api [--database-url <url>] [--listen <addr>] [--namespace <schema>]
//!              [--base-url <url>] [--migrate]
//!
//! Unset flags fall back to `DATABASE_URL` and the `RETAIL_*` environment variables.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use retail_store::{ResourceStore, StoreConfig, api};

/// Retail JSON:API server.
#[derive(Parser, Debug)]
#[command(name = "retail-api", about = "Retail order-management JSON:API server")]
struct Cli {
    /// PostgreSQL URL (defaults to $DATABASE_URL).
    #[arg(long = "database-url")]
    database_url: Option<String>,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,

    /// PostgreSQL schema holding the retail tables.
    #[arg(long = "namespace")]
    namespace: Option<String>,

    /// Public base URL used in response links.
    #[arg(long = "base-url")]
    base_url: Option<String>,

    /// Create missing tables before serving.
    #[arg(long = "migrate")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let database_url = match cli.database_url {
        Some(url) => url,
        None => std::env::var("DATABASE_URL")
            .context("--database-url not given and DATABASE_URL is not set")?,
    };

    let mut builder = StoreConfig::builder(database_url).env_overrides()?;
    if let Some(namespace) = cli.namespace {
        builder = builder.namespace(namespace);
    }
    if let Some(base_url) = cli.base_url {
        builder = builder.base_url(base_url);
    }
    let config = builder.try_build()?;

    let store = ResourceStore::new(config).await?;
    info!(namespace = %store.config().namespace, "connected to database");

    if cli.migrate {
        store.migrate().await?;
    }

    let prefix = store.config().api_prefix.clone();
    let app = api::router(Arc::new(store));

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!("Retail API listening on {}{}", cli.listen, prefix);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
