//! Plain HTTPS blob host with bearer auth and `ETag` preconditions.

use std::env;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{
    decode_document, encode_document, read_token, RemoteBlobAdapter, RemoteResult,
    RemoteSnapshot, VersionToken,
};
use crate::error::{Error, RemoteError, Result};
use crate::models::Snapshot;
use crate::util::{compact_text, is_http_url, normalize_text_option};

const ENV_REMOTE_URL: &str = "REPRISE_REMOTE_URL";
const ENV_REMOTE_TOKEN: &str = "REPRISE_REMOTE_TOKEN";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, PartialEq, Eq)]
pub struct HttpBlobConfig {
    /// Document URL; GET reads it and PUT replaces it.
    pub url: String,
    pub bearer_token: String,
}

impl std::fmt::Debug for HttpBlobConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpBlobConfig")
            .field("url", &self.url)
            .field("bearer_token", &"[REDACTED]")
            .finish()
    }
}

impl HttpBlobConfig {
    /// Load from `REPRISE_REMOTE_URL` / `REPRISE_REMOTE_TOKEN`.
    ///
    /// Returns `Ok(None)` when neither is set.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<HttpBlobConfig>> {
    let url = normalize_text_option(lookup(ENV_REMOTE_URL));
    let token = normalize_text_option(lookup(ENV_REMOTE_TOKEN));

    match (url, token) {
        (None, None) => Ok(None),
        (Some(url), Some(bearer_token)) => {
            if !is_http_url(&url) {
                return Err(Error::InvalidInput(format!(
                    "{ENV_REMOTE_URL} must start with http:// or https://"
                )));
            }
            Ok(Some(HttpBlobConfig { url, bearer_token }))
        }
        (None, Some(_)) => Err(Error::InvalidInput(format!(
            "Remote configuration is incomplete. Missing: {ENV_REMOTE_URL}"
        ))),
        (Some(_), None) => Err(Error::InvalidInput(format!(
            "Remote configuration is incomplete. Missing: {ENV_REMOTE_TOKEN}"
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct HttpBlobAdapter {
    config: HttpBlobConfig,
    client: reqwest::Client,
}

impl HttpBlobAdapter {
    pub fn new(config: HttpBlobConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { config, client })
    }

    #[must_use]
    pub const fn config(&self) -> &HttpBlobConfig {
        &self.config
    }
}

impl RemoteBlobAdapter for HttpBlobAdapter {
    fn backend_name(&self) -> &str {
        "http"
    }

    async fn get_all(&self) -> RemoteResult<RemoteSnapshot> {
        let response = self
            .client
            .get(&self.config.url)
            .bearer_auth(&self.config.bearer_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(RemoteSnapshot::empty());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let tag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok());
        let token = read_token(tag)?;
        let body = response.bytes().await.map_err(transport_error)?;
        let records = decode_document(&body)?;
        Ok(RemoteSnapshot { records, token })
    }

    async fn save_all(
        &self,
        snapshot: &Snapshot,
        precondition: &VersionToken,
    ) -> RemoteResult<()> {
        let body = encode_document(snapshot)?;
        let mut request = self
            .client
            .put(&self.config.url)
            .bearer_auth(&self.config.bearer_token)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        request = match precondition.as_str() {
            Some(tag) => request.header(IF_MATCH, tag),
            None => request.header(IF_NONE_MATCH, "*"),
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let detail = parse_api_error(status, body);
    match status.as_u16() {
        401 | 403 => RemoteError::Auth(detail),
        409 | 412 => RemoteError::Conflict,
        429 => RemoteError::RateLimited(detail),
        _ => RemoteError::Network(detail),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Network(error.to_string())
}
