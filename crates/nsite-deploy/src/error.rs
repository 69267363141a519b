//! Error types for the deploy engine (spec §7)

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("target directory is not accessible: {0}")]
    RootInaccessible(#[source] std::io::Error),
    #[error("path escapes target directory: {0}")]
    PathEscape(String),
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("local key error: {0}")]
    Key(#[from] nsite_core::Error),
    #[error("remote signer timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("remote signer disconnected and reconnect failed: {0}")]
    ReconnectFailed(String),
    #[error("remote signer credential was rejected")]
    CredentialRejected,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no relays configured and fallback disabled")]
    NoRelays,
    #[error("no blob servers configured and fallback disabled")]
    NoServers,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("blob error: {0}")]
    Blob(#[from] nsite_net::BlobError),
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
}

/// Top-level error kind taxonomy from spec.md §7.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("authentication error: {0}")]
    Auth(#[from] SignerError),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("relay rejected event: {0}")]
    RelayRejection(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("file error: {0}")]
    File(#[from] ScanError),
    #[error("deploy cancelled")]
    Cancel,
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

impl From<OrchestratorError> for DeployError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Blob(e) => DeployError::Server(e.to_string()),
            OrchestratorError::Signer(e) => DeployError::Auth(e),
        }
    }
}

impl From<PublishError> for DeployError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::Signer(e) => DeployError::Auth(e),
        }
    }
}
