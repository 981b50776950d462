use std::io::{self, Read};
use std::path::Path;

use reprise_core::export::parse_json_import;
use reprise_core::EngineConfig;

use crate::commands::common::open_service;
use crate::error::CliError;

pub fn run_import(
    input_path: Option<&Path>,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let payload = read_payload(input_path)?;
    let snapshot = parse_json_import(&payload)?;

    let service = open_service(db_path, config)?;
    let changed = service.import_all(&snapshot)?;

    println!(
        "Imported {} record(s), {changed} changed locally",
        snapshot.len()
    );
    Ok(())
}

fn read_payload(input_path: Option<&Path>) -> Result<String, CliError> {
    match input_path {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
