use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use reprise_core::remote::{
    HttpBlobAdapter, HttpBlobConfig, R2BlobAdapter, R2Config, RemoteResult, RemoteSnapshot,
    VersionToken,
};
use reprise_core::services::TrackedResource;
use reprise_core::store::SqliteKvStore;
use reprise_core::util::{format_position, normalize_text_option};
use reprise_core::{
    BookmarkEntry, BookmarkService, EngineConfig, LocalRecordStore, RemoteBlobAdapter,
    RemoteError, ResourceKey, ResourceRecord, Snapshot,
};
use serde::Serialize;

use crate::cli::ResourceArgs;
use crate::error::CliError;

pub type CliService = BookmarkService<Arc<SqliteKvStore>>;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub key: String,
    pub url: String,
    pub title: String,
    pub bookmarks: usize,
    pub resume_position: Option<f64>,
    pub last_modified: i64,
    pub last_modified_iso: String,
}

#[derive(Debug, Serialize)]
pub struct BookmarkListItem {
    /// Position among user bookmarks; what `delete` accepts
    pub index: Option<usize>,
    pub id: Option<String>,
    pub timestamp: f64,
    pub position: String,
    pub label: String,
    pub is_auto_save: bool,
    pub color_tag: Option<String>,
    pub created_at: i64,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("REPRISE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reprise")
        .join("reprise.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os("REPRISE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reprise")
        .join("config.json")
}

pub fn load_engine_config(config_path: &Path) -> Result<EngineConfig, CliError> {
    Ok(EngineConfig::load_from_path(config_path)?)
}

pub fn open_store(db_path: &Path) -> Result<Arc<SqliteKvStore>, CliError> {
    Ok(Arc::new(SqliteKvStore::open(db_path)?))
}

pub fn open_service(db_path: &Path, config: &EngineConfig) -> Result<CliService, CliError> {
    let store = open_store(db_path)?;
    Ok(BookmarkService::new(LocalRecordStore::new(store), config))
}

/// Remote backend selected from the environment.
#[derive(Debug)]
pub enum ConfiguredRemote {
    R2(R2BlobAdapter),
    Http(HttpBlobAdapter),
    Offline,
}

impl ConfiguredRemote {
    /// R2 wins when both backends are configured.
    pub fn from_env() -> Result<Self, CliError> {
        if let Some(config) = R2Config::from_env()? {
            return Ok(Self::R2(R2BlobAdapter::new(config)));
        }
        if let Some(config) = HttpBlobConfig::from_env()? {
            return Ok(Self::Http(HttpBlobAdapter::new(config)?));
        }
        Ok(Self::Offline)
    }

    pub const fn is_configured(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl RemoteBlobAdapter for ConfiguredRemote {
    fn backend_name(&self) -> &str {
        match self {
            Self::R2(adapter) => adapter.backend_name(),
            Self::Http(adapter) => adapter.backend_name(),
            Self::Offline => "offline",
        }
    }

    async fn get_all(&self) -> RemoteResult<RemoteSnapshot> {
        match self {
            Self::R2(adapter) => adapter.get_all().await,
            Self::Http(adapter) => adapter.get_all().await,
            Self::Offline => Err(RemoteError::NotConfigured),
        }
    }

    async fn save_all(
        &self,
        snapshot: &Snapshot,
        precondition: &VersionToken,
    ) -> RemoteResult<()> {
        match self {
            Self::R2(adapter) => adapter.save_all(snapshot, precondition).await,
            Self::Http(adapter) => adapter.save_all(snapshot, precondition).await,
            Self::Offline => Err(RemoteError::NotConfigured),
        }
    }
}

pub fn parse_key(raw: &str) -> Result<ResourceKey, CliError> {
    Ok(raw.parse::<ResourceKey>()?)
}

/// Parse `90`, `90.5`, `1:30` or `1:02:03` into seconds.
pub fn parse_position(raw: &str) -> Result<f64, CliError> {
    let invalid = || CliError::InvalidPosition(raw.to_string());
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let parts = trimmed.split(':').collect::<Vec<_>>();
    if parts.len() > 3 {
        return Err(invalid());
    }

    let (leading, seconds) = parts.split_at(parts.len() - 1);
    let seconds = seconds[0].parse::<f64>().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 || (!leading.is_empty() && seconds >= 60.0) {
        return Err(invalid());
    }

    let mut total = 0u64;
    for (index, part) in leading.iter().enumerate() {
        let value = part.parse::<u64>().map_err(|_| invalid())?;
        // Minutes are bounded only when hours precede them.
        if index > 0 && value >= 60 {
            return Err(invalid());
        }
        total = total.saturating_mul(60).saturating_add(value);
    }

    #[allow(clippy::cast_precision_loss)]
    let total = total as f64 * 60.0;
    Ok(total + seconds)
}

/// Register `--duration`, `--title` and `--url` for `key` so the next write
/// carries them. Nothing is registered when all three are absent.
pub fn remember_resource(
    service: &CliService,
    key: &ResourceKey,
    args: &ResourceArgs,
) -> Result<(), CliError> {
    let duration = args
        .duration
        .as_deref()
        .map(|raw| match parse_position(raw) {
            Ok(duration) if duration > 0.0 => Ok(duration),
            _ => Err(CliError::InvalidDuration(raw.to_string())),
        })
        .transpose()?;
    let title = normalize_text_option(args.title.clone());
    let url = normalize_text_option(args.url.clone());
    if duration.is_none() && title.is_none() && url.is_none() {
        return Ok(());
    }

    service.remember(TrackedResource {
        key: key.clone(),
        url: url.unwrap_or_default(),
        title: title.unwrap_or_default(),
        duration,
    });
    Ok(())
}

pub fn record_to_list_item(record: &ResourceRecord) -> RecordListItem {
    RecordListItem {
        key: record.key.to_string(),
        url: record.url.clone(),
        title: record.title.clone(),
        bookmarks: record.user_bookmarks().count(),
        resume_position: record.auto_save().map(|entry| entry.timestamp),
        last_modified: record.last_modified,
        last_modified_iso: format_sync_timestamp(record.last_modified),
    }
}

pub fn format_record_lines(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .values()
        .map(|record| {
            let item = record_to_list_item(record);
            let name = [&item.title, &item.url]
                .into_iter()
                .find(|value| !value.is_empty())
                .map_or("(untitled)", String::as_str);
            let noun = if item.bookmarks == 1 { "bookmark" } else { "bookmarks" };
            let resume = item
                .resume_position
                .map(|position| format!("  resume {}", format_position(position)))
                .unwrap_or_default();

            format!("{}  {name}  {} {noun}{resume}", item.key, item.bookmarks)
        })
        .collect()
}

/// Bookmarks in display order; user bookmarks carry the index `delete` uses.
pub fn bookmark_list_items(entries: &[BookmarkEntry]) -> Vec<BookmarkListItem> {
    let mut next_index = 0;
    entries
        .iter()
        .map(|entry| {
            let index = (!entry.is_auto_save).then(|| {
                next_index += 1;
                next_index - 1
            });
            BookmarkListItem {
                index,
                id: entry.id.map(|id| id.to_string()),
                timestamp: entry.timestamp,
                position: format_position(entry.timestamp),
                label: entry.label.clone(),
                is_auto_save: entry.is_auto_save,
                color_tag: entry.color_tag.map(|tag| tag.as_str().to_string()),
                created_at: entry.created_at,
            }
        })
        .collect()
}

pub fn format_bookmark_lines(entries: &[BookmarkEntry]) -> Vec<String> {
    bookmark_list_items(entries)
        .into_iter()
        .map(|item| {
            let marker = item
                .index
                .map_or_else(|| "  *".to_string(), |index| format!("{index:>3}"));
            let color = item
                .color_tag
                .map(|tag| format!(" [{tag}]"))
                .unwrap_or_default();
            format!("{marker}  {:>8}  {}{color}", item.position, item.label)
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms).single().map_or_else(
        || timestamp_ms.to_string(),
        |value| value.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
