use std::{sync::Arc, time::Duration};

use migration::{Migrator, MigratorTrait};
use settings::Database;
use tokio_util::sync::CancellationToken;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "loyalty={level},server={level},engine={level},accrual={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.database).await?;
    let engine = Arc::new(engine::Engine::builder().database(db.clone()).build().await?);

    let client = accrual::Client::new(
        &settings.accrual.address,
        Duration::from_millis(settings.accrual.timeout_ms),
    )?;
    tracing::info!(accrual = %client.base_url(), "using accrual authority");

    let shutdown = CancellationToken::new();
    let pool = engine::WorkerPool::new(
        engine.clone(),
        engine::Updater::new(client),
        settings.workers.pool_config(),
    )
    .start(shutdown.clone());

    let state = server::ServerState {
        intake: pool.intake(),
        balance: engine::BalanceLedger::new(engine.clone()),
        db,
    };

    let mut tasks = tokio::task::JoinSet::new();

    let listener = tokio::net::TcpListener::bind(&settings.server.address).await?;
    let server_shutdown = shutdown.clone();
    tasks.spawn(async move {
        if let Err(err) =
            server::run_with_listener(state, listener, server_shutdown.cancelled_owned()).await
        {
            tracing::error!("server failed: {err}");
        }
    });

    let signal = shutdown.clone();
    tasks.spawn(async move {
        tokio::select! {
            _ = signal.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => tracing::info!("Received Ctrl+C, shutting down..."),
                    Err(err) => tracing::error!("failed to listen for Ctrl+C: {err}"),
                }
                signal.cancel();
            }
        }
    });

    // Orders left non-terminal by a previous run.
    if let Err(err) = pool.reseed().await {
        tracing::error!("failed to re-seed the task queue: {err}");
    }

    while tasks.join_next().await.is_some() {
        // Whichever task ends first takes the whole process down.
        shutdown.cancel();
    }
    pool.join().await;

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
        Database::Url(url) => url.clone(),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
