use std::path::Path;

use reprise_core::{ColorTag, EngineConfig};

use crate::cli::ResourceArgs;
use crate::commands::common::{open_service, parse_key, parse_position, remember_resource};
use crate::error::CliError;

pub fn run_add(
    key: &str,
    position: &str,
    label: &str,
    color: Option<&str>,
    resource: &ResourceArgs,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let timestamp = parse_position(position)?;
    let color_tag = color
        .map(|value| value.parse::<ColorTag>().map_err(CliError::InvalidColor))
        .transpose()?;

    let service = open_service(db_path, config)?;
    remember_resource(&service, &key, resource)?;
    let entry = service.add_bookmark(&key, timestamp, label, color_tag)?;

    match entry.id {
        Some(id) => println!("{id}"),
        None => println!("{}", entry.label),
    }
    Ok(())
}
