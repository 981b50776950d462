//! Cloudflare R2 backend: the snapshot lives in a single object and writes are
//! guarded with S3 conditional requests.

use std::env;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use super::{
    decode_document, encode_document, read_token, RemoteBlobAdapter, RemoteResult,
    RemoteSnapshot, VersionToken,
};
use crate::error::{Error, RemoteError, Result};
use crate::models::Snapshot;
use crate::util::compact_text;

const ENV_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
const ENV_BUCKET: &str = "R2_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
const ENV_OBJECT_KEY: &str = "R2_OBJECT_KEY";

/// Object holding the snapshot when `R2_OBJECT_KEY` is unset.
pub const DEFAULT_OBJECT_KEY: &str = "reprise/bookmarks.json";

/// Cloudflare R2 configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct R2Config {
    /// Cloudflare account identifier.
    pub account_id: String,
    /// R2 bucket name.
    pub bucket: String,
    /// Access key id for S3-compatible auth.
    pub access_key_id: String,
    /// Secret access key for S3-compatible auth.
    pub secret_access_key: String,
    /// Object holding the snapshot document.
    pub object_key: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("object_key", &self.object_key)
            .finish()
    }
}

impl R2Config {
    /// Load R2 configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no R2 variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// Cloudflare R2 S3-compatible endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

/// R2-backed snapshot store.
#[derive(Clone, Debug)]
pub struct R2BlobAdapter {
    config: R2Config,
    client: Client,
}

impl R2BlobAdapter {
    #[must_use]
    pub fn new(config: R2Config) -> Self {
        let client = build_s3_client(&config);
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &R2Config {
        &self.config
    }
}

impl RemoteBlobAdapter for R2BlobAdapter {
    fn backend_name(&self) -> &str {
        "r2"
    }

    async fn get_all(&self) -> RemoteResult<RemoteSnapshot> {
        let result = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&self.config.object_key)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(error) if is_missing_object(&error) => return Ok(RemoteSnapshot::empty()),
            Err(error) => return Err(classify_sdk_error("get_object", &error)),
        };

        let token = read_token(response.e_tag())?;
        let payload = response.body.collect().await.map_err(|error| {
            RemoteError::Network(format!(
                "R2 get_object body failed for {}: {error}",
                self.config.object_key
            ))
        })?;
        let records = decode_document(&payload.into_bytes())?;
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
            .put_object()
            .bucket(&self.config.bucket)
            .key(&self.config.object_key)
            .content_type("application/json")
            .body(ByteStream::from(body));
        request = match precondition.as_str() {
            Some(tag) => request.if_match(tag),
            None => request.if_none_match("*"),
        };

        request
            .send()
            .await
            .map_err(|error| classify_sdk_error("put_object", &error))?;
        Ok(())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<R2Config>> {
    let read = |key: &str| lookup(key).map(|value| value.trim().to_string());
    let account_id = read(ENV_ACCOUNT_ID);
    let bucket = read(ENV_BUCKET);
    let access_key_id = read(ENV_ACCESS_KEY_ID);
    let secret_access_key = read(ENV_SECRET_ACCESS_KEY);
    let object_key = read(ENV_OBJECT_KEY);

    let any_present = account_id.is_some()
        || bucket.is_some()
        || access_key_id.is_some()
        || secret_access_key.is_some()
        || object_key.is_some();

    if !any_present {
        return Ok(None);
    }

    let required = [
        (ENV_ACCOUNT_ID, account_id),
        (ENV_BUCKET, bucket),
        (ENV_ACCESS_KEY_ID, access_key_id),
        (ENV_SECRET_ACCESS_KEY, secret_access_key),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.as_ref().is_none_or(String::is_empty))
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "R2 configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let [account_id, bucket, access_key_id, secret_access_key] =
        required.map(|(_, value)| value.unwrap_or_default());

    Ok(Some(R2Config {
        account_id,
        bucket,
        access_key_id,
        secret_access_key,
        object_key: normalize_object_key(object_key),
    }))
}

fn normalize_object_key(object_key: Option<String>) -> String {
    object_key
        .map(|value| value.trim_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_OBJECT_KEY.to_string())
}

fn build_s3_client(config: &R2Config) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "reprise-core-r2-sync",
    );

    let sdk_config = aws_sdk_s3::config::Builder::new()
        .region(Region::new("auto"))
        .credentials_provider(credentials)
        .endpoint_url(config.endpoint_url())
        .force_path_style(true)
        .build();

    Client::from_conf(sdk_config)
}

fn is_missing_object(error: &SdkError<GetObjectError, HttpResponse>) -> bool {
    matches!(error.as_service_error(), Some(GetObjectError::NoSuchKey(_)))
        || error
            .raw_response()
            .is_some_and(|response| response.status().as_u16() == 404)
}

fn classify_sdk_error<E>(operation: &str, error: &SdkError<E, HttpResponse>) -> RemoteError
where
    E: std::error::Error + 'static,
{
    let detail = compact_text(&format!(
        "R2 {operation} failed: {}",
        DisplayErrorContext(error)
    ));
    let status = error
        .raw_response()
        .map(|response| response.status().as_u16());
    classify_status_code(status, detail)
}

fn classify_status_code(status: Option<u16>, detail: String) -> RemoteError {
    match status {
        Some(401 | 403) => RemoteError::Auth(detail),
        Some(409 | 412) => RemoteError::Conflict,
        Some(429) => RemoteError::RateLimited(detail),
        _ => RemoteError::Network(detail),
    }
}
