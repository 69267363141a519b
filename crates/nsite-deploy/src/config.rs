//! Deploy configuration (SPEC_FULL §10.3)
//!
//! No `clap::Parser` here — CLI parsing is an external collaborator per
//! spec.md §1. `validate()` mirrors the shape of `gossipd::config::Config::
//! validate` but returns a typed error rather than bailing through `anyhow`,
//! since this crate has no binary entry point to unwind out of.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::DeployError;

/// Operator-supplied metadata folded into the site-manifest event (spec §4.8).
#[derive(Debug, Clone, Default)]
pub struct ManifestMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub recommended_relays: Vec<String>,
    pub recommended_servers: Vec<String>,
}

/// Timing constants named in spec.md §4 (T_sign, T_pub, T_eose, T_disc, the
/// per-upload-attempt timeout, and the job retry policy).
#[derive(Debug, Clone)]
pub struct Timing {
    pub sign_timeout: Duration,
    pub publish_timeout: Duration,
    pub eose_timeout: Duration,
    pub discovery_timeout: Duration,
    pub upload_attempt_timeout: Duration,
    pub job_retries: u32,
    pub job_retry_backoff: Duration,
    pub blob_auth_ttl: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sign_timeout: Duration::from_secs(15),
            publish_timeout: Duration::from_secs(5),
            eose_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(5),
            upload_attempt_timeout: Duration::from_secs(60),
            job_retries: 3,
            job_retry_backoff: Duration::from_secs(1),
            blob_auth_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub target_dir: PathBuf,
    pub force: bool,
    pub purge: bool,
    /// Upload worker-pool size, spec §4.7's C. Default 4.
    pub concurrency: usize,
    pub fallback_enable: bool,
    pub non_interactive: bool,
    pub operator_relays: Vec<String>,
    pub operator_servers: Vec<String>,
    pub fallback_relays: Vec<String>,
    pub fallback_servers: Vec<String>,
    pub manifest_metadata: ManifestMetadata,
    pub timing: Timing,
}

impl DeployConfig {
    pub fn new(target_dir: PathBuf) -> Self {
        Self {
            target_dir,
            force: false,
            purge: false,
            concurrency: 4,
            fallback_enable: false,
            non_interactive: false,
            operator_relays: Vec::new(),
            operator_servers: Vec::new(),
            fallback_relays: Vec::new(),
            fallback_servers: Vec::new(),
            manifest_metadata: ManifestMetadata::default(),
            timing: Timing::default(),
        }
    }

    /// Fatal, pre-flight validation (spec §7's ConfigError class).
    pub fn validate(&self) -> std::result::Result<(), DeployError> {
        if !self.target_dir.is_absolute() {
            return Err(DeployError::Config(format!(
                "target_dir must be absolute, got {}",
                self.target_dir.display()
            )));
        }
        if self.concurrency == 0 {
            return Err(DeployError::Config("concurrency must be at least 1".into()));
        }
        if self.operator_relays.is_empty() && !self.fallback_enable {
            return Err(DeployError::Config(
                "no operator relays configured and fallback is disabled".into(),
            ));
        }
        if self.operator_servers.is_empty() && !self.fallback_enable {
            return Err(DeployError::Config(
                "no operator blob servers configured and fallback is disabled".into(),
            ));
        }
        Ok(())
    }
}
