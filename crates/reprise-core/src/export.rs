//! Snapshot export and import helpers shared by the CLI and embedders.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::Snapshot;
use crate::remote::decode_document;
use crate::util::format_position;
use crate::{Error, Result};

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Render a snapshot as pretty-printed JSON in the remote document layout,
/// so an export can be imported again or uploaded as-is.
pub fn render_json_export(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

/// Human-readable rendering with one frontmatter block per resource.
#[must_use]
pub fn render_markdown_export(snapshot: &Snapshot) -> String {
    let mut output = String::new();

    for (index, record) in snapshot.values().enumerate() {
        if index > 0 {
            output.push('\n');
        }

        let _ = writeln!(output, "---");
        let _ = writeln!(output, "key: {}", record.key);
        if !record.url.is_empty() {
            let _ = writeln!(output, "url: {}", record.url);
        }
        if !record.title.is_empty() {
            let _ = writeln!(output, "title: {}", record.title);
        }
        if let Some(duration) = record.duration {
            let _ = writeln!(output, "duration: {}", format_position(duration));
        }
        let _ = writeln!(output, "last_modified: {}", record.last_modified);
        let _ = writeln!(output, "---");
        let _ = writeln!(output);

        for entry in &record.bookmarks {
            let position = format_position(entry.timestamp);
            if entry.is_auto_save {
                let _ = writeln!(output, "- {position} (resume)");
                continue;
            }
            match entry.color_tag {
                Some(tag) => {
                    let _ = writeln!(output, "- {position} {} [{tag}]", entry.label);
                }
                None => {
                    let _ = writeln!(output, "- {position} {}", entry.label);
                }
            }
        }
    }

    output
}

/// Render a snapshot based on selected export format.
pub fn render_snapshot_export(
    snapshot: &Snapshot,
    format: ExportFormat,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(snapshot),
        ExportFormat::Markdown => Ok(render_markdown_export(snapshot)),
    }
}

/// Parse a JSON export. Invalid records are dropped with a warning.
pub fn parse_json_import(payload: &str) -> Result<Snapshot> {
    decode_document(payload.as_bytes())
        .map_err(|error| Error::InvalidInput(format!("Import file is not a snapshot: {error}")))
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("reprise-export-{timestamp_ms}.{}", format.extension())
}
