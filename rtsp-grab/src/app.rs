//! Command dispatch and process wiring.

use std::path::PathBuf;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::FfmpegConnector;
use crate::cli::{Args, Command, Settings};
use crate::config::{AppConfig, RetentionConfig};
use crate::retention::{
    RetentionPassReport, RetentionService, RetentionSweeper, SpaceGuard, SysinfoProbe,
};
use crate::supervisor::{Supervisor, SupervisorStats};
use crate::utils::fs::prepare_output_root;
use crate::{Error, Result};

/// Run the selected subcommand to completion.
pub async fn run(args: Args) -> Result<()> {
    match args.command() {
        Command::Run => run_capture(&args.settings).await.map(|_| ()),
        Command::Sweep { dry_run } => run_sweep(&args.settings, dry_run).await.map(|_| ()),
        Command::Check => check(&args.settings).await,
    }
}

/// Record until a shutdown signal arrives or retries are exhausted.
pub async fn run_capture(settings: &Settings) -> Result<SupervisorStats> {
    let config = AppConfig::from_settings(settings)?;
    let summary = config.summary();
    info!(
        url = %summary.rtsp_url,
        out_root = %summary.out_root,
        camera = %summary.camera_name,
        container = %summary.container,
        log_dir = %summary.log_dir,
        "Starting rtsp-grab {}",
        env!("CARGO_PKG_VERSION")
    );

    prepare_output_root(config.layout.root()).await?;

    match FfmpegConnector::detect_version(&config.ffmpeg_bin).await {
        Some(version) => info!(program = %config.ffmpeg_bin, %version, "Media tool found"),
        None => warn!(
            program = %config.ffmpeg_bin,
            "Could not determine media tool version, connections will likely fail"
        ),
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    let connector = FfmpegConnector::new(config.ffmpeg_bin.clone(), config.stream.clone());
    let supervisor = Supervisor::from_config(connector, &config);

    let retention_token = cancel.child_token();
    let retention = retention_service(&config.retention, supervisor.active_segment().subscribe(), false)
        .start_background_task(retention_token.clone());

    let result = supervisor.run(cancel.clone()).await;

    retention_token.cancel();
    if let Err(e) = retention.await {
        warn!(error = %e, "Retention task did not finish cleanly");
    }

    let stats = result?;
    info!(
        segments = stats.segments,
        bytes_written = stats.bytes_written,
        "Shutdown complete"
    );
    Ok(stats)
}

/// One retention and free-space pass over the output root.
pub async fn run_sweep(settings: &Settings, dry_run: bool) -> Result<RetentionPassReport> {
    let retention = RetentionConfig::from_settings(settings)?;
    // Nothing is being recorded by this process.
    let (_active_tx, active) = watch::channel(None);

    let report = retention_service(&retention, active, dry_run).run_once().await;
    info!(
        dry_run,
        deleted = report.sweep.deleted,
        bytes_freed = report.sweep.bytes_freed,
        dirs_removed = report.sweep.dirs_removed,
        failed = report.sweep.failed,
        "Sweep finished"
    );
    if let Some(space) = report.space
        && !space.satisfied
    {
        warn!(
            deleted = space.deleted,
            planned = space.planned,
            "Free-space thresholds still not met"
        );
    }
    Ok(report)
}

/// Validate the configuration, check the media tool and print the summary.
pub async fn check(settings: &Settings) -> Result<()> {
    let config = AppConfig::from_settings(settings)?;
    println!("{}", serde_json::to_string_pretty(&config.summary())?);

    match FfmpegConnector::detect_version(&config.ffmpeg_bin).await {
        Some(version) => {
            info!(program = %config.ffmpeg_bin, %version, "Configuration OK");
            Ok(())
        }
        None => Err(Error::Other(format!(
            "media tool '{}' could not be executed",
            config.ffmpeg_bin
        ))),
    }
}

fn retention_service(
    config: &RetentionConfig,
    active: watch::Receiver<Option<PathBuf>>,
    dry_run: bool,
) -> RetentionService {
    let sweeper = RetentionSweeper::new(config.policy.clone(), active.clone()).with_dry_run(dry_run);
    let mut space = config.space.clone();
    space.dry_run = dry_run;
    let guard = SpaceGuard::new(config.policy.root.clone(), space, SysinfoProbe::new(), active);
    RetentionService::new(sweeper, config.interval).with_space_guard(guard)
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}
