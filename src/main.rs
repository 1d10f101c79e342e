use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::{signal, sync::watch};
use tracing::{info, warn};
use uuid::Uuid;

use posting_engine as engine;
use posting_engine::services::tenant_locks::TenantLocks;

/// Upper bound on drain passes for `work --once`.
const MAX_ONCE_PASSES: usize = 1000;

#[derive(Parser)]
#[command(
    name = "posting-engine",
    about = "Turns offline POS events into documents, lot moves and balanced journals",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// HTTP surface plus the worker pool, scheduler and heartbeat
    Serve,
    /// Drain the outbox without serving HTTP
    Work(WorkArgs),
    /// Apply pending migrations and exit
    Migrate,
}

#[derive(Args)]
struct WorkArgs {
    /// Drain once until idle and exit instead of looping
    #[arg(long)]
    once: bool,
    /// Only this tenant
    #[arg(long)]
    tenant: Option<Uuid>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = engine::config::load_config().context("failed to load configuration")?;
    engine::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db = engine::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    engine::db::check_connection(&db)
        .await
        .context("database is not answering")?;

    if matches!(cli.command, Commands::Migrate) {
        engine::db::run_migrations(&db).await?;
        info!("migrations applied");
        return Ok(());
    }
    if cfg.auto_migrate {
        engine::db::run_migrations(&db).await?;
    }

    let db = Arc::new(db);
    let state = engine::AppState::new(db.clone(), cfg.clone(), TenantLocks::new());

    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Work(args) => work(state, args).await,
        Commands::Serve => serve(state).await,
    }
}

async fn work(state: engine::AppState, args: WorkArgs) -> Result<()> {
    let worker = state.worker();
    if args.once {
        let report = worker.run_until_idle(args.tenant, MAX_ONCE_PASSES).await?;
        info!(?report, "outbox drained");
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if args.tenant.is_some() {
        warn!("--tenant only applies with --once; draining every tenant");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = worker.spawn(shutdown_rx);
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn serve(state: engine::AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .context("invalid host/port")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = state.worker().spawn(shutdown_rx);

    let app = engine::handlers::app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "posting-engine listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
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
}
