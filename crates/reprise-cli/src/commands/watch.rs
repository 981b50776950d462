use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use reprise_core::{
    BookmarkService, EngineConfig, LocalRecordStore, RemoteBlobAdapter, ResourceKey,
    SyncOutcome, SyncScheduler, SyncState,
};
use tokio::sync::{mpsc, watch};

use crate::commands::common::{open_store, parse_key, parse_position, ConfiguredRemote};
use crate::error::CliError;

pub async fn run_watch(
    playing: bool,
    read_positions: bool,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let remote = ConfiguredRemote::from_env()?;
    if !remote.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let store = open_store(db_path)?;
    let state = Arc::new(SyncState::new());
    let service = BookmarkService::new(LocalRecordStore::new(Arc::clone(&store)), config)
        .with_sync_state(Arc::clone(&state));
    service.set_playing(playing);

    let scheduler = SyncScheduler::new(LocalRecordStore::new(store), remote, state, config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(error) => tracing::warn!("Failed to listen for Ctrl-C: {error}"),
        }
    });

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    if read_positions {
        spawn_stdin_reader(line_tx);
    } else {
        drop(line_tx);
    }
    let feed = async {
        while let Some(line) = line_rx.recv().await {
            match parse_position_line(&line) {
                Ok(Some((key, timestamp))) => service.queue_auto_save(&key, timestamp),
                Ok(None) => {}
                Err(error) => tracing::warn!("{error}"),
            }
        }
        std::future::pending::<()>().await;
    };

    println!(
        "Watching via {}; press Ctrl-C to stop",
        scheduler.remote().backend_name()
    );
    tokio::select! {
        () = scheduler.run(shutdown_rx) => {}
        () = feed => {}
    }

    let flushed = service.flush_pending_auto_saves();
    if flushed > 0 {
        tracing::info!(flushed, "Flushed pending resume positions");
        if let SyncOutcome::Failed { error, .. } = scheduler.perform_sync().await {
            tracing::warn!("Final sync failed; positions stay local until the next run: {error}");
        }
    }
    println!("Stopped");
    Ok(())
}

/// Stdin is read on a plain thread; a blocking read must not hold up
/// runtime shutdown.
fn spawn_stdin_reader(lines: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if lines.send(line).is_err() {
                break;
            }
        }
    });
}

/// Parse one `KEY POSITION` line. Blank lines and `#` comments yield `None`.
pub fn parse_position_line(line: &str) -> Result<Option<(ResourceKey, f64)>, CliError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut parts = trimmed.split_whitespace();
    let (Some(key), Some(position), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CliError::InvalidPositionLine(trimmed.to_string()));
    };
    Ok(Some((parse_key(key)?, parse_position(position)?)))
}
