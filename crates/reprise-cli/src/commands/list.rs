use std::path::Path;

use reprise_core::EngineConfig;

use crate::commands::common::{
    bookmark_list_items, format_bookmark_lines, format_record_lines, open_service, parse_key,
    record_to_list_item, RecordListItem,
};
use crate::error::CliError;

pub fn run_list(
    key: Option<&str>,
    as_json: bool,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let service = open_service(db_path, config)?;

    if let Some(key) = key {
        let key = parse_key(key)?;
        let entries = service.list_bookmarks(&key)?;
        if as_json {
            let items = bookmark_list_items(&entries);
            println!("{}", serde_json::to_string_pretty(&items)?);
        } else if entries.is_empty() {
            println!("No bookmarks for {key}.");
        } else {
            for line in format_bookmark_lines(&entries) {
                println!("{line}");
            }
        }
        return Ok(());
    }

    let snapshot = service.export_all()?;
    if as_json {
        let items = snapshot
            .values()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if snapshot.is_empty() {
        println!("No bookmarks yet.");
    } else {
        for line in format_record_lines(&snapshot) {
            println!("{line}");
        }
    }

    Ok(())
}

