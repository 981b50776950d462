//! Resource identity derivation.
//!
//! Pages rarely expose a stable id for the media they embed, so a key is built
//! from whatever the environment offers: the page URL, the best available
//! identity signal, the rounded duration and the intrinsic dimensions. The
//! seed is fingerprinted with [`hash::fingerprint`] and prefixed with the
//! configured namespace.

mod hash;
mod normalize;
mod signals;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use hash::fingerprint;
pub use normalize::{is_ephemeral_url, normalize_page_url, strip_query_and_fragment};
pub use signals::{
    default_extractors, AlternateSourceSignal, ContentUrlSignal, ExplicitIdSignal,
    IdentitySignalExtractor, PosterSignal, StructuralSignal,
};

use crate::config::KeyDerivationConfig;
use crate::models::ResourceKey;

/// An element around (or being) the media element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementInfo {
    pub id: Option<String>,
    pub class_names: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

/// Everything observable about a media element and its page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaContext {
    pub page_url: String,
    /// The URL currently being played
    pub content_url: Option<String>,
    /// Seconds; `None` until metadata is loaded
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub element: ElementInfo,
    /// Nearest first
    pub ancestors: Vec<ElementInfo>,
    pub poster_url: Option<String>,
    /// Declared `<source>` URLs in document order
    pub source_urls: Vec<String>,
    /// Position among media elements of the same type on the page
    pub sibling_index: usize,
}

/// Computes deterministic [`ResourceKey`]s from a [`MediaContext`].
pub struct ResourceKeyDeriver {
    config: KeyDerivationConfig,
    extractors: Vec<Box<dyn IdentitySignalExtractor>>,
}

impl ResourceKeyDeriver {
    #[must_use]
    pub fn new(config: KeyDerivationConfig) -> Self {
        Self::with_extractors(config, default_extractors())
    }

    /// Use a custom strategy chain. The chain should end with a strategy that
    /// always applies; otherwise contexts with no signal get no identity.
    #[must_use]
    pub fn with_extractors(
        config: KeyDerivationConfig,
        extractors: Vec<Box<dyn IdentitySignalExtractor>>,
    ) -> Self {
        Self { config, extractors }
    }

    #[must_use]
    pub const fn config(&self) -> &KeyDerivationConfig {
        &self.config
    }

    /// Derive the key, or `None` when the resource should not be persisted.
    #[must_use]
    pub fn derive(&self, context: &MediaContext) -> Option<ResourceKey> {
        let seed = self.seed(context)?;
        let key = format!("{}{}", self.config.namespace, fingerprint(&seed));
        Some(ResourceKey::from_derived(key))
    }

    /// The pre-hash seed, exposed for diagnostics.
    #[must_use]
    pub fn seed(&self, context: &MediaContext) -> Option<String> {
        let duration = self.bucketed_duration(context.duration)?;
        let page_url = normalize_page_url(&context.page_url, &self.config);

        if self.config.url_only {
            return Some(format!("url:{page_url}"));
        }

        let signal = self.extractors.iter().find_map(|extractor| {
            let value = extractor.extract(context, &self.config)?;
            tracing::trace!(signal = extractor.name(), "Resolved identity signal");
            Some(value)
        })?;

        Some(format!(
            "{page_url}|{signal}|d={duration}|s={}x{}",
            context.width, context.height
        ))
    }

    /// Rounded duration, or `None` for previews, live streams and unknown lengths.
    #[allow(clippy::cast_possible_truncation)]
    fn bucketed_duration(&self, duration: Option<f64>) -> Option<i64> {
        let duration = duration.filter(|duration| duration.is_finite())?;
        if duration < self.config.min_duration_secs || duration > self.config.max_duration_secs {
            return None;
        }
        let bucket = f64::from(self.config.duration_bucket_secs.max(1));
        Some(((duration / bucket).round() * bucket) as i64)
    }
}

impl Default for ResourceKeyDeriver {
    fn default() -> Self {
        Self::new(KeyDerivationConfig::default())
    }
}

impl std::fmt::Debug for ResourceKeyDeriver {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ResourceKeyDeriver")
            .field("config", &self.config)
            .field(
                "extractors",
                &self
                    .extractors
                    .iter()
                    .map(|extractor| extractor.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
