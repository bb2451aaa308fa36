use crate::{
    cli::{Cli, RunMode},
    cloudflare::{adapter::build_rate_limiter, CloudflareClient, CloudflareZoneAdapter},
    config::Config,
    db::build_db_pool,
    logging::{format_error_report, init_logging, LogSettings},
    record_store::PgRecordStore,
    server::setup_server_with_addr,
    state::AppState,
    sync_service::{Error, ShutdownCoordinator, SyncService, SyncSettings},
    zone::ZoneTranslator,
};
use dotenv::dotenv;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "dnslink_sync";

/// Cancels the coordinator on the first SIGTERM or SIGINT.
async fn handle_shutdown_signals(coordinator: ShutdownCoordinator) {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(err), _) | (_, Err(err)) => {
                error!(error = %err, "failed to register signal handlers");
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM received, shutting down.");
        }
        _ = sigint.recv() => {
            info!("SIGINT received, shutting down.");
        }
        _ = coordinator.cancelled() => return,
    }

    coordinator.cancel();
}

fn report_failure(event: &'static str, message: &str, err: &(dyn StdError + 'static)) {
    let error_report = format_error_report(err);
    error!(
        event,
        error = %err,
        error_debug = ?err,
        error_report = %error_report,
        "{message}"
    );
    eprintln!("{message}: {err}");
    eprintln!("{error_report}");
}

fn load_config(cli: &Cli) -> Result<Config, Error> {
    if cli.workers == Some(0) {
        return Err(Error::Orchestration("--workers must be > 0".to_string()));
    }
    let mut config = Config::from_env()?;
    if let Some(workers) = cli.workers {
        config.n_workers = workers;
    }
    Ok(config)
}

async fn build_service(
    config: &Config,
    skip_backlog: bool,
) -> Result<SyncService<PgRecordStore, CloudflareZoneAdapter>, Error> {
    let pool = build_db_pool(&config.db_url)
        .await
        .map_err(|err| Error::DBPoolBuild(err.to_string()))?;
    let store = PgRecordStore::new(pool);
    store.check_connection().await?;
    info!("record store reachable");

    let client = CloudflareClient::new(&config.cloudflare_api_url, config.cloudflare_auth.clone())?;
    let zone = CloudflareZoneAdapter::connect(
        client,
        &config.cloudflare_zone_name,
        config.ipfs_gateway.clone(),
        config.dns_ttl,
        build_rate_limiter(config.cloudflare_rps),
    )
    .await?;

    let settings = SyncSettings {
        poll_interval: config.poll_interval,
        worker_count: config.n_workers,
        queue_capacity: config.queue_capacity,
        skip_backlog,
    };

    Ok(SyncService::new(
        Arc::new(store),
        Arc::new(zone),
        ZoneTranslator::new(config.hostname_suffix.as_str()),
        settings,
    ))
}

/// Runs the service until shutdown and returns the process exit code.
pub async fn run(cli: Cli) -> i32 {
    match &cli.env_file {
        Some(path) => {
            if let Err(err) = dotenv::from_path(path) {
                eprintln!("failed to load env file {}: {err}", path.display());
                return 2;
            }
        }
        None => {
            dotenv().ok();
        }
    }

    let mode = cli.run_mode();
    let logging_context = init_logging(SERVICE_NAME, mode, &LogSettings::from_env());
    let run_span = tracing::info_span!(
        "sync_run",
        service = logging_context.service,
        mode = logging_context.mode.as_str(),
        run_id = %logging_context.run_id,
    );
    let _run_guard = run_span.enter();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            report_failure("config_invalid", "configuration could not be loaded", &err);
            return 2;
        }
    };
    info!(
        event = "sync_starting",
        zone = %config.cloudflare_zone_name,
        suffix = %config.hostname_suffix,
        workers = config.n_workers,
        poll_interval = ?config.poll_interval,
        "starting dnslink sync"
    );

    let service = match build_service(&config, mode == RunMode::LiveNoBacklog).await {
        Ok(service) => service,
        Err(err) => {
            report_failure("startup_failed", "startup failed", &err);
            return 1;
        }
    };

    let coordinator = ShutdownCoordinator::new();
    let app_state = Arc::new(AppState::new(coordinator.token()));
    let server_handle = match setup_server_with_addr(app_state, config.metrics_addr).await {
        Ok(handle) => handle,
        Err(err) => {
            report_failure(
                "metrics_server_start_failed",
                "failed to start metrics endpoint",
                &err,
            );
            return 1;
        }
    };
    let signal_handle = tokio::spawn(handle_shutdown_signals(coordinator.clone()));

    let exit_code = match mode {
        RunMode::BacklogOnly => run_backlog_only(&service, &coordinator).await,
        RunMode::Live | RunMode::LiveNoBacklog => run_live(&service, &coordinator).await,
    };

    coordinator.cancel();
    if let Err(err) = server_handle.await {
        warn!(error = %err, "metrics server task did not exit cleanly");
    }
    signal_handle.abort();
    exit_code
}

async fn run_backlog_only(
    service: &SyncService<PgRecordStore, CloudflareZoneAdapter>,
    coordinator: &ShutdownCoordinator,
) -> i32 {
    let start_time = Instant::now();
    match service.backlog_only(coordinator).await {
        Ok(summary) => {
            info!(
                event = "backlog_complete",
                applied = summary.applied,
                failed = summary.failed,
                skipped = summary.skipped,
                elapsed = ?start_time.elapsed(),
                "backlog-only run completed"
            );
            0
        }
        Err(err) => {
            report_failure("backlog_failed", "backlog run failed", &err);
            1
        }
    }
}

async fn run_live(
    service: &SyncService<PgRecordStore, CloudflareZoneAdapter>,
    coordinator: &ShutdownCoordinator,
) -> i32 {
    let running = match service.start(coordinator).await {
        Ok(running) => running,
        Err(err) => {
            report_failure("sync_start_failed", "sync pipeline failed to start", &err);
            coordinator.cancel();
            coordinator.await_drain().await;
            return 1;
        }
    };
    info!(
        event = "sync_live",
        backlog_applied = running.backlog().applied,
        backlog_failed = running.backlog().failed,
        "backlog finished, following new records"
    );

    coordinator.cancelled().await;
    info!(queued = running.queued_jobs(), "draining sync pipeline");

    match running.drain(coordinator).await {
        Ok(summary) => {
            info!(
                event = "sync_stopped",
                watermark = %summary.final_watermark,
                applied = summary.workers.applied,
                removed = summary.workers.removed,
                failed = summary.workers.failed,
                abandoned = summary.abandoned_jobs,
                "sync pipeline stopped"
            );
            0
        }
        Err(err) => {
            report_failure("sync_drain_failed", "sync pipeline did not drain cleanly", &err);
            1
        }
    }
}
