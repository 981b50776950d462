//! Identity signal strategies, tried in order until one yields a value.

use super::normalize::{is_ephemeral_url, strip_query_and_fragment};
use super::MediaContext;
use crate::config::KeyDerivationConfig;

/// One source of identity for a media element.
pub trait IdentitySignalExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The signal, or `None` when this strategy does not apply.
    fn extract(&self, context: &MediaContext, config: &KeyDerivationConfig) -> Option<String>;
}

/// The media's own URL, unless it is a blob/data URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentUrlSignal;

impl IdentitySignalExtractor for ContentUrlSignal {
    fn name(&self) -> &'static str {
        "content_url"
    }

    fn extract(&self, context: &MediaContext, _config: &KeyDerivationConfig) -> Option<String> {
        stable_url(context.content_url.as_deref())
    }
}

/// An element id or identifying attribute on the element or a close ancestor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitIdSignal;

impl IdentitySignalExtractor for ExplicitIdSignal {
    fn name(&self) -> &'static str {
        "explicit_id"
    }

    fn extract(&self, context: &MediaContext, config: &KeyDerivationConfig) -> Option<String> {
        std::iter::once(&context.element)
            .chain(context.ancestors.iter().take(config.ancestor_depth))
            .find_map(|element| {
                let id = element
                    .id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty());
                id.or_else(|| {
                    config.identifying_attributes.iter().find_map(|name| {
                        element
                            .attributes
                            .get(name)
                            .map(|value| value.trim())
                            .filter(|value| !value.is_empty())
                    })
                })
                .map(ToOwned::to_owned)
            })
    }
}

/// The poster or thumbnail image.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosterSignal;

impl IdentitySignalExtractor for PosterSignal {
    fn name(&self) -> &'static str {
        "poster"
    }

    fn extract(&self, context: &MediaContext, _config: &KeyDerivationConfig) -> Option<String> {
        stable_url(context.poster_url.as_deref())
    }
}

/// The first declared `<source>` alternative.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlternateSourceSignal;

impl IdentitySignalExtractor for AlternateSourceSignal {
    fn name(&self) -> &'static str {
        "alternate_source"
    }

    fn extract(&self, context: &MediaContext, _config: &KeyDerivationConfig) -> Option<String> {
        context
            .source_urls
            .iter()
            .find_map(|source| stable_url(Some(source.as_str())))
    }
}

/// Class list plus position among same-type siblings. Always applies, and
/// distinguishes two elements on one page even when nothing else does.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralSignal;

impl IdentitySignalExtractor for StructuralSignal {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn extract(&self, context: &MediaContext, _config: &KeyDerivationConfig) -> Option<String> {
        let classes = context
            .element
            .class_names
            .iter()
            .map(|class| class.trim())
            .filter(|class| !class.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Some(format!("{classes}|i:{}", context.sibling_index))
    }
}

/// Built-in strategies in priority order.
pub fn default_extractors() -> Vec<Box<dyn IdentitySignalExtractor>> {
    vec![
        Box::new(ContentUrlSignal),
        Box::new(ExplicitIdSignal),
        Box::new(PosterSignal),
        Box::new(AlternateSourceSignal),
        Box::new(StructuralSignal),
    ]
}

fn stable_url(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if is_ephemeral_url(raw) {
        return None;
    }
    Some(strip_query_and_fragment(raw))
}
