//! Blob HTTP client (spec §4.7, §6; Blossom descriptor parsing per SPEC_FULL §11)

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("all upload strategies failed for {server}/{sha256}: {attempts:?}")]
    AllStrategiesFailed {
        server: String,
        sha256: String,
        attempts: Vec<String>,
    },
}

/// Descriptor a Blossom-compatible server may return on successful upload.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobDescriptor {
    pub url: Option<String>,
    pub sha256: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthPlacement {
    Header,
    FormField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadPath {
    Hash,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Raw,
    Multipart,
}

/// One entry in the ordered upload-strategy list (spec §9's redesign note:
/// "encode as an ordered list of Strategy records, each a pure function
/// producing an HTTP request").
#[derive(Debug, Clone, Copy)]
struct UploadStrategy {
    method: Method,
    path: UploadPath,
    body: BodyKind,
    auth: AuthPlacement,
}

fn upload_strategies() -> Vec<UploadStrategy> {
    use AuthPlacement::*;
    use BodyKind::*;
    use UploadPath::*;

    vec![
        UploadStrategy { method: Method::PUT, path: Hash, body: Raw, auth: Header },
        UploadStrategy { method: Method::POST, path: Hash, body: Raw, auth: Header },
        UploadStrategy { method: Method::PUT, path: Upload, body: Raw, auth: Header },
        UploadStrategy { method: Method::POST, path: Upload, body: Raw, auth: Header },
        UploadStrategy { method: Method::PUT, path: Hash, body: Multipart, auth: Header },
        UploadStrategy { method: Method::POST, path: Hash, body: Multipart, auth: Header },
        UploadStrategy { method: Method::PUT, path: Upload, body: Multipart, auth: Header },
        UploadStrategy { method: Method::POST, path: Upload, body: Multipart, auth: Header },
        UploadStrategy { method: Method::POST, path: Hash, body: Multipart, auth: FormField },
        UploadStrategy { method: Method::POST, path: Upload, body: Multipart, auth: FormField },
    ]
}

/// Outcome of a single successful upload attempt.
pub struct UploadSuccess {
    pub strategy_index: usize,
    pub descriptor: Option<BlobDescriptor>,
}

/// Transport seam between the orchestrator and the blob layer, so tests can
/// drive the orchestrator's concurrency/retry/idempotence logic against an
/// in-memory fake instead of real HTTP.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    async fn head(&self, server: &str, sha256: &str) -> Result<bool, BlobError>;

    #[allow(clippy::too_many_arguments)]
    async fn upload(
        &self,
        server: &str,
        sha256: &str,
        bytes: &[u8],
        content_type: &str,
        auth_header: &str,
        auth_json: &str,
        attempt_timeout: Duration,
    ) -> Result<UploadSuccess, BlobError>;
}

pub struct BlobClient {
    http: reqwest::Client,
}

impl Default for BlobClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// `HEAD /{sha256}`; 2xx means present (spec §4.7 step 2, §6).
    pub async fn head(&self, server: &str, sha256: &str) -> Result<bool, BlobError> {
        let url = format!("{}/{}", server.trim_end_matches('/'), sha256);
        let response = self.http.head(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Try each upload strategy in order until one returns 2xx (spec §4.7
    /// step 3). `auth_header` is the `Nostr <base64>` value; `auth_json` is
    /// the same authorization event as plain JSON for the form-field
    /// fallback strategies.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        &self,
        server: &str,
        sha256: &str,
        bytes: &[u8],
        content_type: &str,
        auth_header: &str,
        auth_json: &str,
        attempt_timeout: Duration,
    ) -> Result<UploadSuccess, BlobError> {
        let server = server.trim_end_matches('/');
        let mut attempts = Vec::new();

        for (index, strategy) in upload_strategies().into_iter().enumerate() {
            let url = match strategy.path {
                UploadPath::Hash => format!("{server}/{sha256}"),
                UploadPath::Upload => format!("{server}/upload"),
            };

            let mut request = self.http.request(strategy.method.clone(), &url).timeout(attempt_timeout);
            request = match (strategy.body, strategy.auth) {
                (BodyKind::Raw, AuthPlacement::Header) => request
                    .header("Authorization", format!("Nostr {auth_header}"))
                    .header("Content-Type", content_type)
                    .body(bytes.to_vec()),
                (BodyKind::Multipart, AuthPlacement::Header) => {
                    let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(sha256.to_string())
                        .mime_str(content_type)
                        .unwrap_or_else(|_| reqwest::multipart::Part::bytes(bytes.to_vec()));
                    let form = reqwest::multipart::Form::new().part("file", part);
                    request
                        .header("Authorization", format!("Nostr {auth_header}"))
                        .multipart(form)
                }
                (BodyKind::Multipart, AuthPlacement::FormField) => {
                    let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(sha256.to_string())
                        .mime_str(content_type)
                        .unwrap_or_else(|_| reqwest::multipart::Part::bytes(bytes.to_vec()));
                    let form = reqwest::multipart::Form::new()
                        .part("file", part)
                        .text("auth", auth_json.to_string());
                    request.multipart(form)
                }
                (BodyKind::Raw, AuthPlacement::FormField) => {
                    // Not produced by upload_strategies(); raw bodies always carry
                    // the header form of auth.
                    request
                        .header("Authorization", format!("Nostr {auth_header}"))
                        .body(bytes.to_vec())
                }
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let descriptor = response.json::<BlobDescriptor>().await.ok();
                        return Ok(UploadSuccess {
                            strategy_index: index,
                            descriptor,
                        });
                    }
                    attempts.push(format!("{} {url} -> {status}", strategy.method));
                    debug!(server, sha256, %status, "upload strategy failed");
                }
                Err(e) => {
                    attempts.push(format!("{} {url} -> {e}", strategy.method));
                }
            }
        }

        Err(BlobError::AllStrategiesFailed {
            server: server.to_string(),
            sha256: sha256.to_string(),
            attempts,
        })
    }
}

#[async_trait]
impl BlobTransport for BlobClient {
    async fn head(&self, server: &str, sha256: &str) -> Result<bool, BlobError> {
        BlobClient::head(self, server, sha256).await
    }

    async fn upload(
        &self,
        server: &str,
        sha256: &str,
        bytes: &[u8],
        content_type: &str,
        auth_header: &str,
        auth_json: &str,
        attempt_timeout: Duration,
    ) -> Result<UploadSuccess, BlobError> {
        BlobClient::upload(
            self,
            server,
            sha256,
            bytes,
            content_type,
            auth_header,
            auth_json,
            attempt_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_list_has_ten_entries_in_spec_order() {
        let strategies = upload_strategies();
        assert_eq!(strategies.len(), 10);
        assert_eq!(strategies[0].method, Method::PUT);
        assert_eq!(strategies[0].path, UploadPath::Hash);
        assert_eq!(strategies[0].body, BodyKind::Raw);
        assert_eq!(strategies[8].auth, AuthPlacement::FormField);
        assert_eq!(strategies[9].path, UploadPath::Upload);
    }
}
