use std::path::Path;

use reprise_core::{EngineConfig, MediaContext, ResourceKeyDeriver};

use crate::cli::MediaArgs;
use crate::error::CliError;

pub fn run_key(args: &MediaArgs, config: &EngineConfig) -> Result<(), CliError> {
    let context = media_context(args)?;
    let deriver = ResourceKeyDeriver::new(config.key.clone());
    let key = deriver.derive(&context).ok_or(CliError::NoStableKey)?;

    println!("{key}");
    Ok(())
}

/// Build the context from a `--context` JSON file or from the flags.
pub fn media_context(args: &MediaArgs) -> Result<MediaContext, CliError> {
    if let Some(path) = args.context.as_deref() {
        return read_context_file(path);
    }

    let page_url = args
        .page_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(CliError::MissingMediaContext)?;

    Ok(MediaContext {
        page_url: page_url.to_string(),
        content_url: args.content_url.clone(),
        duration: args.duration,
        width: args.width,
        height: args.height,
        poster_url: args.poster.clone(),
        source_urls: args.sources.clone(),
        ..MediaContext::default()
    })
}

fn read_context_file(path: &Path) -> Result<MediaContext, CliError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
