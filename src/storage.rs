//! Object storage for backup artifacts
//!
//! [`ObjectStore`] is the narrow put/head/list surface the backup core needs.
//! [`S3Store`] implements it against the S3 REST API with AWS Signature V4,
//! which also covers S3-compatible stores reachable through a custom endpoint.
//!
//! Artifacts are uploaded from a file on disk. Files up to the configured part
//! size go up in a single PUT; anything larger uses a multipart upload, so at
//! most one part is held in memory per upload.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::config::{KeyLayout, S3Config};
use crate::error::{ConfigError, StorageError};

const KEY_SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const ARTIFACT_CONTENT_TYPE: &str = "application/gzip";
const METADATA_SIZE_HEADER: &str = "x-amz-meta-size-bytes";
const BYTES_PER_MB: u64 = 1024 * 1024;

/// File suffix of every backup artifact
pub const ARTIFACT_SUFFIX: &str = ".tar.gz";

/// Location of a repository's backup artifact inside the bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Deterministic key for a repository backup
    ///
    /// `prefix` is used as given; callers pass the normalized form with one
    /// trailing slash. `run_date` only affects the daily layout.
    pub fn for_repository(
        prefix: &str,
        organization: &str,
        repo_name: &str,
        layout: KeyLayout,
        run_date: NaiveDate,
    ) -> Self {
        let key = match layout {
            KeyLayout::Latest => format!("{}{}/{}.tar.gz", prefix, organization, repo_name),
            KeyLayout::Daily => format!(
                "{}{}/{}/{}-{}.tar.gz",
                prefix,
                organization,
                repo_name,
                repo_name,
                run_date.format("%Y%m%d")
            ),
        };
        Self(key)
    }

    /// Prefix shared by every dated backup of a repository under the daily layout
    pub fn history_prefix(prefix: &str, organization: &str, repo_name: &str) -> String {
        format!("{}{}/{}/", prefix, organization, repo_name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Metadata of an existing backup object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistenceInfo {
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One entry of a prefix listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub key: StorageKey,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// User metadata attached to every uploaded artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub repository: String,
    pub backup_date: DateTime<Utc>,
    pub default_branch: String,
    pub size_bytes: u64,
}

impl ObjectMetadata {
    /// `x-amz-meta-*` header pairs
    fn to_headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-amz-meta-repository".to_string(), ascii_header_value(&self.repository)),
            (
                "x-amz-meta-backup-date".to_string(),
                self.backup_date.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
            (
                "x-amz-meta-default-branch".to_string(),
                ascii_header_value(&self.default_branch),
            ),
            (METADATA_SIZE_HEADER.to_string(), self.size_bytes.to_string()),
        ]
    }
}

/// Object-store collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the file at `artifact` under `key`, replacing any previous object
    async fn put_object(
        &self,
        key: &StorageKey,
        artifact: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError>;

    /// Metadata for `key`, or `None` when no object exists
    async fn head_object(&self, key: &StorageKey) -> Result<Option<ExistenceInfo>, StorageError>;

    /// Every object whose key starts with `prefix`, in key order
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError>;
}

/// Static AWS credentials
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[redacted]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`
    pub fn from_env() -> Result<Self, ConfigError> {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let access_key_id = read("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| ConfigError::Credentials("AWS_ACCESS_KEY_ID is not set".to_string()))?;
        let secret_access_key = read("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            ConfigError::Credentials("AWS_SECRET_ACCESS_KEY is not set".to_string())
        })?;

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: read("AWS_SESSION_TOKEN"),
        })
    }
}

/// S3 REST client using path-style addressing
pub struct S3Store {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    region: String,
    part_size: u64,
    credentials: S3Credentials,
}

impl S3Store {
    pub fn new(config: &S3Config, credentials: S3Credentials) -> Result<Self, ConfigError> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.trim().is_empty())
            .ok_or(ConfigError::MissingSetting("backup.s3.bucket"))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::InvalidSetting {
                name: "backup.s3",
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        info!(
            "Initialized S3 store for bucket '{}' in region '{}'",
            bucket, config.region
        );

        Ok(Self {
            client,
            endpoint: config.endpoint_url(),
            bucket,
            region: config.region.clone(),
            part_size: config.part_size_mb.max(1) * BYTES_PER_MB,
            credentials,
        })
    }

    fn object_url(&self, key: &StorageKey, query: &[(&str, &str)]) -> Result<reqwest::Url, StorageError> {
        let path = format!("{}/{}", self.bucket, encode_key(key.as_str()));
        self.url(&path, query)
    }

    /// URL for `path` below the endpoint with a canonical (sorted, encoded) query
    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Url, StorageError> {
        let raw = format!("{}/{}", self.endpoint, path);
        let mut url = reqwest::Url::parse(&raw)
            .map_err(|e| StorageError::Transport(format!("invalid URL {}: {}", raw, e)))?;
        if !query.is_empty() {
            url.set_query(Some(&canonical_query(query)));
        }
        Ok(url)
    }

    /// Build a signed request; `extra` headers are signed along with the
    /// standard set
    fn signed_request(
        &self,
        method: reqwest::Method,
        url: reqwest::Url,
        payload_hash: &str,
        extra: Vec<(String, String)>,
    ) -> Result<reqwest::RequestBuilder, StorageError> {
        let host = host_header(&url)?;
        let now = Utc::now();

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());
        headers.insert(
            "x-amz-date".to_string(),
            now.format("%Y%m%dT%H%M%SZ").to_string(),
        );
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }
        for (name, value) in extra {
            headers.insert(name.to_ascii_lowercase(), value);
        }

        let authorization = sign_v4(
            method.as_str(),
            url.path(),
            url.query().unwrap_or(""),
            &headers,
            payload_hash,
            &self.credentials,
            &self.region,
            "s3",
            now,
        );

        let mut request = self.client.request(method, url);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        Ok(request.header("authorization", authorization))
    }

    /// Single signed PUT; the body is at most one part long
    async fn put_single(
        &self,
        key: &StorageKey,
        artifact: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        let body = tokio::fs::read(artifact)
            .await
            .map_err(|e| file_error(artifact, e))?;
        let payload_hash = hex_sha256(&body);

        let mut extra = metadata.to_headers();
        extra.push(("content-type".to_string(), ARTIFACT_CONTENT_TYPE.to_string()));

        let response = self
            .signed_request(reqwest::Method::PUT, self.object_url(key, &[])?, &payload_hash, extra)?
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        Ok(())
    }

    /// Multipart upload reading one part at a time; aborted on any failure
    async fn put_multipart(
        &self,
        key: &StorageKey,
        artifact: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        let upload_id = self.create_multipart_upload(key, metadata).await?;
        debug!("Started multipart upload {} for {}", upload_id, key);

        let result = self.upload_parts(key, artifact, &upload_id).await;
        let result = match result {
            Ok(parts) => self.complete_multipart_upload(key, &upload_id, &parts).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!("Multipart upload of {} failed, aborting: {}", key, e);
            if let Err(abort) = self.abort_multipart_upload(key, &upload_id).await {
                warn!("Failed to abort multipart upload {}: {}", upload_id, abort);
            }
        }
        result
    }

    async fn create_multipart_upload(
        &self,
        key: &StorageKey,
        metadata: &ObjectMetadata,
    ) -> Result<String, StorageError> {
        let mut extra = metadata.to_headers();
        extra.push(("content-type".to_string(), ARTIFACT_CONTENT_TYPE.to_string()));

        let url = self.object_url(key, &[("uploads", "")])?;
        let response = self
            .signed_request(reqwest::Method::POST, url, &hex_sha256(b""), extra)?
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let body = response.text().await.map_err(transport_error)?;
        xml_elements(&body, "UploadId")
            .first()
            .map(|id| xml_unescape(id))
            .ok_or_else(|| StorageError::Transport("multipart upload response has no UploadId".to_string()))
    }

    /// Upload the file in `part_size` chunks; returns `(part number, ETag)` pairs
    async fn upload_parts(
        &self,
        key: &StorageKey,
        artifact: &Path,
        upload_id: &str,
    ) -> Result<Vec<(u32, String)>, StorageError> {
        let mut file = tokio::fs::File::open(artifact)
            .await
            .map_err(|e| file_error(artifact, e))?;
        let mut parts = Vec::new();

        for part_number in 1u32.. {
            let mut chunk = Vec::new();
            (&mut file)
                .take(self.part_size)
                .read_to_end(&mut chunk)
                .await
                .map_err(|e| file_error(artifact, e))?;
            if chunk.is_empty() {
                break;
            }

            let number = part_number.to_string();
            let url = self.object_url(key, &[("partNumber", number.as_str()), ("uploadId", upload_id)])?;
            let payload_hash = hex_sha256(&chunk);

            debug!("Uploading part {} ({} bytes) of {}", part_number, chunk.len(), key);
            let response = self
                .signed_request(reqwest::Method::PUT, url, &payload_hash, Vec::new())?
                .body(chunk)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error(status, response).await);
            }

            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| StorageError::Transport(format!("part {} response has no ETag", part_number)))?;
            parts.push((part_number, etag));
        }

        Ok(parts)
    }

    async fn complete_multipart_upload(
        &self,
        key: &StorageKey,
        upload_id: &str,
        parts: &[(u32, String)],
    ) -> Result<(), StorageError> {
        let body = complete_multipart_body(parts);
        let url = self.object_url(key, &[("uploadId", upload_id)])?;

        let response = self
            .signed_request(reqwest::Method::POST, url, &hex_sha256(body.as_bytes()), Vec::new())?
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        // S3 can report a failed completion inside a 200 response
        let text = response.text().await.map_err(transport_error)?;
        if text.contains("<Error>") {
            return Err(StorageError::Status {
                status: status.as_u16(),
                body: text.chars().take(512).collect(),
            });
        }
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &StorageKey, upload_id: &str) -> Result<(), StorageError> {
        let url = self.object_url(key, &[("uploadId", upload_id)])?;
        let response = self
            .signed_request(reqwest::Method::DELETE, url, &hex_sha256(b""), Vec::new())?
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        key: &StorageKey,
        artifact: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        let expected_size = tokio::fs::metadata(artifact)
            .await
            .map_err(|e| file_error(artifact, e))?
            .len();

        info!(
            "Uploading {} bytes to s3://{}/{}",
            expected_size, self.bucket, key
        );

        if expected_size > self.part_size {
            self.put_multipart(key, artifact, metadata).await?;
        } else {
            self.put_single(key, artifact, metadata).await?;
        }

        match self.head_object(key).await? {
            Some(info) if info.size_bytes == expected_size => {
                debug!("Verification passed: sizes match ({} bytes)", expected_size);
                Ok(())
            }
            Some(info) => Err(StorageError::Verification(format!(
                "size mismatch: stored={} bytes, local={} bytes",
                info.size_bytes, expected_size
            ))),
            None => Err(StorageError::Verification(
                "object missing after upload".to_string(),
            )),
        }
    }

    async fn head_object(&self, key: &StorageKey) -> Result<Option<ExistenceInfo>, StorageError> {
        let url = self.object_url(key, &[])?;
        let payload_hash = hex_sha256(b"");

        let response = self
            .signed_request(reqwest::Method::HEAD, url, &payload_hash, Vec::new())?
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(existence_from_headers(response.headers()))),
            status => Err(status_error(status, response).await),
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![("list-type", "2"), ("prefix", prefix)];
            if let Some(token) = &continuation {
                query.push(("continuation-token", token.as_str()));
            }
            let url = self.url(&self.bucket, &query)?;

            let response = self
                .signed_request(reqwest::Method::GET, url, &hex_sha256(b""), Vec::new())?
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error(status, response).await);
            }

            let body = response.text().await.map_err(transport_error)?;
            let page = parse_list_page(&body);
            objects.extend(page.objects);

            match page.next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!("Listed {} objects under {}", objects.len(), prefix);
        objects.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        Ok(objects)
    }
}

fn existence_from_headers(headers: &HeaderMap) -> ExistenceInfo {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    let size_bytes = header_u64(CONTENT_LENGTH.as_str())
        .or_else(|| header_u64(METADATA_SIZE_HEADER))
        .unwrap_or(0);

    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    ExistenceInfo {
        size_bytes,
        last_modified,
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> StorageError {
    let body = response.text().await.unwrap_or_default();
    StorageError::Status {
        status: status.as_u16(),
        body: body.chars().take(512).collect(),
    }
}

fn transport_error(err: reqwest::Error) -> StorageError {
    StorageError::Transport(err.to_string())
}

fn file_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Transport(format!("failed to read {}: {}", path.display(), err))
}

/// One page of a ListObjectsV2 response
struct ListPage {
    objects: Vec<ObjectSummary>,
    next_token: Option<String>,
}

fn parse_list_page(xml: &str) -> ListPage {
    let objects = xml_elements(xml, "Contents")
        .into_iter()
        .filter_map(|entry| {
            let key = xml_elements(entry, "Key").first().map(|k| xml_unescape(k))?;
            let size_bytes = xml_elements(entry, "Size")
                .first()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(0);
            let last_modified = xml_elements(entry, "LastModified")
                .first()
                .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
                .map(|dt| dt.with_timezone(&Utc));
            Some(ObjectSummary {
                key: StorageKey(key),
                size_bytes,
                last_modified,
            })
        })
        .collect();

    let truncated = xml_elements(xml, "IsTruncated")
        .first()
        .is_some_and(|v| v.trim() == "true");
    let next_token = if truncated {
        xml_elements(xml, "NextContinuationToken")
            .first()
            .map(|t| xml_unescape(t))
    } else {
        None
    };

    ListPage {
        objects,
        next_token,
    }
}

/// Text of every `<tag>...</tag>` element, in document order
fn xml_elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        found.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    found
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn complete_multipart_body(parts: &[(u32, String)]) -> String {
    let mut body = String::from("<CompleteMultipartUpload>");
    for (number, etag) in parts {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            number, etag
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}

/// Sorted `name=value` pairs, both percent-encoded
fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(name, value)| {
            (
                utf8_percent_encode(name, KEY_SEGMENT_ENCODE_SET).to_string(),
                utf8_percent_encode(value, KEY_SEGMENT_ENCODE_SET).to_string(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &reqwest::Url) -> Result<String, StorageError> {
    let host = url
        .host_str()
        .ok_or_else(|| StorageError::Transport(format!("endpoint missing host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Percent-encode each key segment, keeping `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn ascii_header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect()
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// AWS Signature V4 `Authorization` header value
///
/// `headers` must hold lowercase names and include `host` and `x-amz-date`;
/// every entry is signed. `query` must already be in canonical form.
fn sign_v4(
    method: &str,
    uri_path: &str,
    query: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
    credentials: &S3Credentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> String {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, uri_path, query, canonical_headers, signed_headers, payload_hash
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let key = derive_signing_key(&credentials.secret_access_key, &date_stamp, region, service);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, scope, signed_headers, signature
    )
}
