use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vodgate::api::middleware::session::{create_session_layer, AppState};
use vodgate::config::Config;
use vodgate::db::{self, PgEntitlementStore};
use vodgate::models::Order;
use vodgate::services::catalog::{Catalog, InMemoryCatalog, RestCatalog};
use vodgate::services::entitlement::EntitlementService;
use vodgate::services::reconcile::{self, ReconcileReport};
use vodgate::services::token::TokenSigner;

#[derive(Parser)]
#[command(name = "vodgate")]
#[command(about = "VOD entitlement and secure delivery service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Insert entitlements owed by paid orders that are missing from the table
    Backfill {
        /// JSON export of orders
        #[arg(long)]
        orders: PathBuf,

        /// Only consider orders created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Print intended inserts without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare paid orders against the entitlement table
    Check {
        /// JSON export of orders
        #[arg(long)]
        orders: PathBuf,

        /// Only consider orders created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Insert missing rows and delete orphans
        #[arg(long)]
        fix: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vodgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database ready");

    // Connect timeout only; long downloads through the proxy must not be cut off.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let catalog = build_catalog(&config, client.clone());
    let entitlements = EntitlementService::new(Arc::new(PgEntitlementStore::new(pool.clone())));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool, entitlements, catalog, client).await,
        Command::Backfill {
            orders,
            since,
            dry_run,
        } => {
            let orders = load_orders(&orders)?;
            let report =
                reconcile::backfill(&entitlements, catalog.as_ref(), &orders, since, dry_run)
                    .await?;
            print_report("Backfill", &report);
            Ok(())
        }
        Command::Check { orders, since, fix } => {
            let orders = load_orders(&orders)?;
            let report =
                reconcile::check(&entitlements, catalog.as_ref(), &orders, since, fix).await?;
            print_report("Check", &report);
            Ok(())
        }
    }
}

fn build_catalog(config: &Config, client: reqwest::Client) -> Arc<dyn Catalog> {
    match (
        &config.catalog_api_url,
        &config.catalog_consumer_key,
        &config.catalog_consumer_secret,
    ) {
        (Some(url), Some(key), Some(secret)) => Arc::new(RestCatalog::new(
            client,
            url,
            key.clone(),
            secret.clone(),
        )),
        _ => {
            tracing::warn!("Catalog API not configured, every product lookup will miss");
            Arc::new(InMemoryCatalog::new())
        }
    }
}

async fn serve(
    config: Config,
    pool: PgPool,
    entitlements: EntitlementService,
    catalog: Arc<dyn Catalog>,
    client: reqwest::Client,
) -> anyhow::Result<()> {
    tracing::info!("Starting vodgate server...");

    let session_layer = create_session_layer(pool).await?;
    tracing::info!("Session layer initialized");

    let tokens = TokenSigner::new(config.secret_key.expose_secret(), &config.base_url);
    let state = AppState::new(
        entitlements,
        catalog,
        tokens,
        config.vod.clone(),
        config.webhook_secret.clone(),
        client,
    );

    let app = vodgate::api::router()
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;
    tracing::info!(
        delivery_mode = ?config.vod.delivery_mode,
        storage_root = %config.vod.storage_root.display(),
        "Listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn load_orders(path: &Path) -> anyhow::Result<Vec<Order>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading orders from {}", path.display()))?;
    let orders: Vec<Order> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing orders from {}", path.display()))?;
    tracing::info!(count = orders.len(), "Loaded orders");
    Ok(orders)
}

fn print_report(label: &str, report: &ReconcileReport) {
    println!("Missing rows: {}", report.missing.len());
    if label == "Check" {
        println!("Orphan rows: {}", report.orphans.len());
    }

    if report.dry_run {
        for (user_id, product_id) in &report.missing {
            println!("Would insert: u={} p={}", user_id, product_id);
        }
        for (user_id, product_id) in &report.orphans {
            println!("Would delete: u={} p={}", user_id, product_id);
        }
        println!("{} dry run complete.", label);
    } else {
        println!(
            "{} complete. Inserted {}, deleted {}.",
            label, report.inserted, report.deleted
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
