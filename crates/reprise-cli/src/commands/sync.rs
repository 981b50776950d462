use std::path::Path;
use std::sync::Arc;

use reprise_core::sync::{SkipReason, SyncReport};
use reprise_core::{
    EngineConfig, LocalRecordStore, RemoteBlobAdapter, SyncOutcome, SyncScheduler, SyncState,
};

use crate::commands::common::{format_sync_timestamp, open_store, ConfiguredRemote};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let remote = ConfiguredRemote::from_env()?;
    if !remote.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let store = open_store(db_path)?;
    let scheduler = SyncScheduler::new(
        LocalRecordStore::new(store),
        remote,
        Arc::new(SyncState::new()),
        config,
    );

    let outcome = scheduler.perform_sync().await;
    let report = outcome_to_result(outcome)?;
    println!("{}", format_sync_report(scheduler.remote().backend_name(), &report));
    Ok(())
}

pub fn outcome_to_result(outcome: SyncOutcome) -> Result<SyncReport, CliError> {
    match outcome {
        SyncOutcome::Completed(report) => Ok(report),
        SyncOutcome::Skipped(SkipReason::NotConfigured) => Err(CliError::SyncNotConfigured),
        SyncOutcome::Skipped(SkipReason::Disabled) => Err(CliError::SyncDisabled),
        SyncOutcome::Skipped(SkipReason::AlreadySyncing) => Ok(SyncReport::default()),
        SyncOutcome::Failed { error, attempts } => Err(CliError::SyncFailed {
            attempts,
            source: error,
        }),
    }
}

pub fn format_sync_report(backend: &str, report: &SyncReport) -> String {
    let pushed = if report.pushed { "pushed" } else { "remote unchanged" };
    let mut line = format!(
        "Sync completed via {backend} at {}: {} record(s), {pushed}, {} backfilled",
        format_sync_timestamp(report.synced_at),
        report.merged_records,
        report.backfilled.len(),
    );
    if report.cleared > 0 {
        line.push_str(&format!(", {} cleared remotely", report.cleared));
    }
    if report.deferred > 0 {
        line.push_str(&format!(", {} local write(s) deferred", report.deferred));
    }
    line
}
