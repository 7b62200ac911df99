//! # Catalog Sync Server
//!
//! Serves the sync API and runs the collection scheduler. Operational
//! one-shots (term refresh, enqueue, single collection, local reset) are
//! subcommands of the same binary.

use anyhow::Context;
use catalog_sync::config::{CatalogConfig, ServicesConfig};
use catalog_sync::database::{reset_catalog, DatabaseConnection, MIGRATOR};
use catalog_sync::logging::init_structured_logging;
use catalog_sync::messaging::{CollectionMessage, CollectionQueue, PgmqCollectionQueue};
use catalog_sync::orchestration::{enqueue_active_terms, CollectionRunner, Orchestrator, Scheduler};
use catalog_sync::services::{BannerService, Service};
use catalog_sync::web::{self, AppState};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "catalog-sync-server")]
#[command(about = "Course catalog collection and change feed server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the sync API and run the scheduler (default)
    Serve {
        /// Serve the API only
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Upsert every configured school and refresh its term collections
    RefreshTerms,

    /// Enqueue one collection job per term that is still collecting
    Enqueue {
        #[arg(long)]
        full: bool,
    },

    /// Run a single collection now
    Collect {
        #[arg(long)]
        school: String,
        #[arg(long)]
        term: String,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        full: bool,
    },

    /// Truncate all catalog data (requires LOCAL=true)
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_structured_logging();

    let cli = Cli::parse();
    let config = CatalogConfig::from_env().context("loading configuration")?;
    let db = DatabaseConnection::connect(&config)
        .await
        .context("connecting to database")?;
    MIGRATOR.run(db.pool()).await.context("running migrations")?;

    let command = cli.command.unwrap_or(Commands::Serve {
        no_scheduler: false,
    });

    if let Commands::Reset = command {
        reset_catalog(db.pool(), &config).await?;
        info!("Catalog reset");
        return Ok(());
    }

    let services = ServicesConfig::load(&config.services_config_path)?;
    let banner: Arc<dyn Service> = Arc::new(BannerService::new(services.banner)?);
    let orchestrator = Arc::new(Orchestrator::new(db.pool().clone(), vec![banner]).await?);

    match command {
        Commands::Serve { no_scheduler } => serve(&config, &db, orchestrator, no_scheduler).await?,
        Commands::RefreshTerms => {
            orchestrator.upsert_all_schools().await?;
            let terms = orchestrator.upsert_all_terms().await?;
            info!(terms, "Term collections refreshed");
        }
        Commands::Enqueue { full } => {
            let queue = PgmqCollectionQueue::new(&config.database_url).await?;
            queue.create_queue(&config.scheduler.queue_name).await?;
            enqueue_active_terms(db.pool(), &queue, &config.scheduler.queue_name, full).await?;
        }
        Commands::Collect {
            school,
            term,
            service,
            full,
        } => {
            let mut message = CollectionMessage::new(&school, &term, full);
            message.service = service;
            let summary = orchestrator
                .run_collection(&message, &CancellationToken::new())
                .await?;
            info!(
                history_id = summary.history_id,
                changed_rows = summary.changed_rows,
                duration_ms = summary.duration.as_millis() as u64,
                "Collection finished"
            );
        }
        Commands::Reset => {}
    }

    db.close().await;
    Ok(())
}

async fn serve(
    config: &CatalogConfig,
    db: &DatabaseConnection,
    orchestrator: Arc<Orchestrator>,
    no_scheduler: bool,
) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let scheduler = if no_scheduler {
        None
    } else {
        let queue = Arc::new(PgmqCollectionQueue::new(&config.database_url).await?);
        let scheduler = Scheduler::new(queue, orchestrator.clone(), config.scheduler.clone());
        let cancel = shutdown.clone();
        Some(tokio::spawn(async move { scheduler.run(cancel).await }))
    };

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    let state = AppState::new(db.pool().clone()).with_orchestrator(orchestrator);
    let served = web::serve(listener, state, shutdown.clone()).await;
    shutdown.cancel();

    if let Some(handle) = scheduler {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Scheduler stopped with error"),
            Err(e) => error!(error = %e, "Scheduler task panicked"),
        }
    }

    served.context("sync API server")?;
    Ok(())
}
