use std::path::Path;

use reprise_core::EngineConfig;

use crate::commands::common::open_service;
use crate::error::CliError;

pub fn run_clear(confirmed: bool, db_path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ClearNotConfirmed);
    }

    let service = open_service(db_path, config)?;
    let removed = service.clear_all()?;

    println!("Cleared {removed} record(s); the remote copy is cleared on next sync");
    Ok(())
}
