use std::path::Path;

use reprise_core::util::format_position;
use reprise_core::{BookmarkRef, EngineConfig};

use crate::commands::common::{open_service, parse_key};
use crate::error::CliError;

pub fn run_delete(
    key: &str,
    target: &str,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let target = target
        .parse::<BookmarkRef>()
        .map_err(CliError::InvalidTarget)?;

    let service = open_service(db_path, config)?;
    let removed = service.delete_bookmark(&key, target)?;

    println!(
        "Deleted {} {}",
        format_position(removed.timestamp),
        removed.label
    );
    Ok(())
}
