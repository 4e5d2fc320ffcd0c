//! Periodic catalog refresh.
//!
//! One task owns the schedule, so runs never overlap: each tick refreshes
//! the source directory, then rebuilds the catalog from it.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use patternlang_shared::{AppConfig, IngestReport, MAX_UPDATE_INTERVAL_DAYS, Result};
use patternlang_storage::Storage;

use crate::ingest::{SilentProgress, ingest};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Interval between runs, clamped to `MAX_UPDATE_INTERVAL_DAYS` so that
/// configs built without `validate` cannot overflow the timer.
fn schedule_period(days: u64) -> Duration {
    let days = days.clamp(1, MAX_UPDATE_INTERVAL_DAYS);
    Duration::from_secs(days * SECONDS_PER_DAY)
}

/// Run the configured refresh command (e.g. a `git subtree pull`).
///
/// Failure is logged and ignored: ingestion proceeds on whatever files are
/// already on disk. Returns whether the command ran and exited successfully.
#[instrument]
pub async fn refresh_source(command: &[String]) -> bool {
    let Some((program, args)) = command.split_first() else {
        return true;
    };

    match Command::new(program).args(args).output().await {
        Ok(output) if output.status.success() => {
            info!(%program, "source refreshed");
            true
        }
        Ok(output) => {
            warn!(
                %program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "source refresh failed; ingesting existing files"
            );
            false
        }
        Err(e) => {
            warn!(%program, error = %e, "could not run source refresh; ingesting existing files");
            false
        }
    }
}

/// Refresh the source, then ingest it.
pub async fn refresh_and_ingest(storage: &Storage, config: &AppConfig) -> Result<IngestReport> {
    refresh_source(&config.source.refresh_command).await;
    ingest(storage, &config.source, &SilentProgress).await
}

/// Re-ingest every `update_interval_days` until `shutdown` flips or its
/// sender is dropped.
///
/// With `ingest_on_startup` the first run happens immediately. A failed run
/// is logged and retried on the next tick. Ticks missed while a run is in
/// progress are skipped, not queued.
pub async fn run_scheduler(
    storage: Arc<Storage>,
    config: AppConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = schedule_period(config.schedule.update_interval_days);
    let first = if config.schedule.ingest_on_startup {
        Instant::now()
    } else {
        Instant::now() + period
    };

    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_days = config.schedule.update_interval_days,
        on_startup = config.schedule.ingest_on_startup,
        "scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match refresh_and_ingest(&storage, &config).await {
                    Ok(report) => info!(
                        run_id = %report.run_id,
                        patterns = report.patterns_loaded,
                        "scheduled ingestion finished"
                    ),
                    Err(e) => error!(error = %e, "scheduled ingestion failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("scheduler stopped");
}
