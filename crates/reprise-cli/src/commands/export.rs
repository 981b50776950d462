use std::path::Path;

use reprise_core::export::{render_snapshot_export, ExportFormat as SnapshotFormat};
use reprise_core::EngineConfig;

use crate::cli::ExportFormat;
use crate::commands::common::open_service;
use crate::error::CliError;

pub fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let service = open_service(db_path, config)?;
    let snapshot = service.export_all()?;
    let rendered = render_snapshot_export(&snapshot, snapshot_format(format))?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

pub const fn snapshot_format(format: ExportFormat) -> SnapshotFormat {
    match format {
        ExportFormat::Json => SnapshotFormat::Json,
        ExportFormat::Markdown => SnapshotFormat::Markdown,
    }
}
