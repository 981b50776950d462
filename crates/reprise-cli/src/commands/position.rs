use std::path::Path;

use reprise_core::util::format_position;
use reprise_core::EngineConfig;

use crate::cli::ResourceArgs;
use crate::commands::common::{open_service, parse_key, parse_position, remember_resource};
use crate::error::CliError;

pub fn run_position(
    key: &str,
    position: &str,
    resource: &ResourceArgs,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let timestamp = parse_position(position)?;

    let service = open_service(db_path, config)?;
    remember_resource(&service, &key, resource)?;
    if service.refresh_auto_save(&key, timestamp)? {
        println!("Saved resume position {}", format_position(timestamp));
    } else {
        println!("Position too close to the start or end; not saved");
    }
    Ok(())
}
