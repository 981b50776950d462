//! URL normalization for key seeds.

use url::{Position, Url};

use crate::config::{KeyDerivationConfig, QueryMode};

/// Schemes whose URLs only live as long as the page that created them.
const EPHEMERAL_SCHEMES: &[&str] = &["blob", "data", "mediastream"];

/// Canonical form of a page URL: lower-case host, query filtered per
/// `config.query_mode`, fragment dropped unless preserved, one trailing slash removed.
pub fn normalize_page_url(raw: &str, config: &KeyDerivationConfig) -> String {
    let raw = raw.trim();
    let Ok(mut url) = Url::parse(raw) else {
        return strip_suffixes(raw, !config.preserve_fragment);
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| keep_query_param(name, config))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept);
    }
    if !config.preserve_fragment {
        url.set_fragment(None);
    }

    let path = url.path();
    let path = path.strip_suffix('/').unwrap_or(path);
    let mut normalized = url[..Position::BeforePath].to_ascii_lowercase();
    normalized.push_str(path);
    normalized.push_str(&url[Position::AfterPath..]);
    normalized
}

/// A media URL with its query and fragment removed.
pub fn strip_query_and_fragment(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.into()
        }
        Err(_) => strip_suffixes(raw, true),
    }
}

/// True for blob/data/stream URLs and empty strings, which identify nothing.
pub fn is_ephemeral_url(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return true;
    }
    raw.split_once(':').is_some_and(|(scheme, _)| {
        EPHEMERAL_SCHEMES
            .iter()
            .any(|ephemeral| scheme.eq_ignore_ascii_case(ephemeral))
    })
}

fn keep_query_param(name: &str, config: &KeyDerivationConfig) -> bool {
    match config.query_mode {
        QueryMode::DenyList => !config
            .tracking_params
            .iter()
            .any(|pattern| param_matches(pattern, name)),
        QueryMode::Strict => config
            .allowed_params
            .iter()
            .any(|pattern| param_matches(pattern, name)),
    }
}

fn param_matches(pattern: &str, name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let pattern = pattern.trim().to_ascii_lowercase();
    pattern
        .strip_suffix('*')
        .map_or_else(|| name == pattern, |prefix| name.starts_with(prefix))
}

fn strip_suffixes(raw: &str, strip_fragment: bool) -> String {
    let (without_fragment, fragment) = raw
        .split_once('#')
        .map_or((raw, None), |(head, tail)| (head, Some(tail)));
    let base = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(head, _)| head);
    let base = base.strip_suffix('/').unwrap_or(base);
    match fragment {
        Some(fragment) if !strip_fragment => format!("{base}#{fragment}"),
        _ => base.to_string(),
    }
}
