use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;

use senado_sync::config::AppConfig;
use senado_sync::repository::PgActRepository;
use senado_sync::senado::SenadoClient;
use senado_sync::state::AppState;
use senado_sync::{db, routes, telemetry, Scheduler, SyncService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        senado_api_base_url = %config.senado_api_base_url,
        cron_schedule = %config.cron_schedule,
        cron_timezone = %config.cron_timezone,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool).await?;

    let repository = Arc::new(PgActRepository::new(pool));
    let client = Arc::new(SenadoClient::from_config(&config)?);
    let sync = Arc::new(
        SyncService::new(client, repository.clone())
            .with_timezone(config.cron_timezone)
            .with_year_pause(config.sync_year_pause),
    );
    let scheduler = Arc::new(
        Scheduler::new(sync, config.cron_timezone)
            .await
            .context("failed to start scheduler")?,
    );
    scheduler
        .start_daily_job(&config.cron_schedule)
        .await
        .context("failed to schedule daily sync job")?;

    let listen_addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port).parse()?;
    let state = AppState::new(config, repository, scheduler.clone());
    let router = routes::create_router(state)?;

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;
    Ok(())
}

async fn shutdown_signal(scheduler: Arc<Scheduler>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }

    scheduler.shutdown().await;
}
