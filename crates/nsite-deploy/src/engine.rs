//! The top-level deploy state machine (spec §4 "State machines",
//! wiring together every component in §2's data flow).

use std::sync::Arc;

use nsite_core::path::normalize_key;
use nsite_core::PathMap;
use nsite_net::{BlobClient, BlobTransport, RelayEvent, RelayPool, RelayTransport};
use tracing::{debug, info, warn};

use crate::aggregator::DeployReport;
use crate::cancel::CancelToken;
use crate::config::DeployConfig;
use crate::diff::{self, DeploymentPlan};
use crate::discovery::{self, DiscoveryResult};
use crate::error::{DeployError, Result};
use crate::observer::{DeployState, Observer, ProgressEvent};
use crate::orchestrator::Orchestrator;
use crate::publisher::Publisher;
use crate::remote_state;
use crate::scanner;
use crate::signer::Signer;

pub struct DeployEngine {
    config: DeployConfig,
    signer: Arc<dyn Signer>,
    observer: Arc<dyn Observer>,
    cancel: CancelToken,
}

impl DeployEngine {
    pub fn new(config: DeployConfig, signer: Arc<dyn Signer>, observer: Arc<dyn Observer>) -> Self {
        Self {
            config,
            signer,
            observer,
            cancel: CancelToken::new(),
        }
    }

    /// A handle the caller can use to cancel this deploy from another task
    /// (spec §5: "A deploy is cancellable at any time by an external signal").
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn transition(&self, state: DeployState) {
        self.observer.on_event(ProgressEvent::StateChanged(state));
    }

    pub async fn run(&self) -> Result<DeployReport> {
        self.transition(DeployState::Initializing);
        self.config.validate()?;

        self.transition(DeployState::ResolvingContext);
        self.transition(DeployState::ResolvingSigner);
        let pubkey = self.signer.public_key();

        self.transition(DeployState::Discovering);
        let (relay_pool, relay_urls, server_urls) = self.resolve_endpoints(&pubkey).await?;

        if self.cancel.is_cancelled() {
            self.transition(DeployState::Failed);
            self.observer.on_event(ProgressEvent::Cancelled);
            return Err(DeployError::Cancel);
        }

        self.transition(DeployState::Scanning);
        let scan_result = scanner::scan(&self.config.target_dir)?;
        for issue in &scan_result.issues {
            warn!(path = %issue.path.display(), message = %issue.message, "scan issue");
        }

        self.transition(DeployState::Diffing);
        let remote = remote_state::load(&relay_pool, &pubkey, self.config.timing.eose_timeout).await;
        if self.config.purge && remote.path_map.is_empty() && remote.source_relays.is_empty() {
            self.transition(DeployState::Failed);
            return Err(DeployError::Config(
                "purge requested but remote state could not be queried from any relay".into(),
            ));
        }
        let plan = diff::diff(scan_result.files, &remote.path_map, self.config.force);

        if self.cancel.is_cancelled() {
            self.transition(DeployState::Failed);
            self.observer.on_event(ProgressEvent::Cancelled);
            return Err(DeployError::Cancel);
        }

        self.transition(DeployState::Uploading);
        let blob_client: Arc<dyn BlobTransport> = Arc::new(BlobClient::new());
        let orchestrator = Orchestrator::new(
            blob_client,
            self.signer.clone(),
            server_urls,
            self.config.concurrency,
            self.config.timing.clone(),
            self.observer.clone(),
            self.cancel.clone(),
        );
        let file_outcomes = orchestrator.upload_all(&plan.to_upload).await;
        let successful: Vec<_> = file_outcomes.iter().filter(|f| f.success).cloned().collect();

        self.transition(DeployState::Publishing);
        let mut report = DeployReport::default();
        report.record_file_outcomes(&file_outcomes);

        let publisher = Publisher::new(
            relay_pool.clone(),
            self.signer.clone(),
            self.observer.clone(),
            self.config.timing.publish_timeout,
            self.cancel.clone(),
        );

        let published = publisher.publish_path_mappings(&successful).await?;
        report.record_published_files(&published);

        let mut post_deploy: PathMap = remote.path_map.clone();
        for file in &successful {
            // file.path is display-case (orchestrator sets it from
            // FileEntry.display_path); post_deploy must stay keyed in the
            // same normalized form as remote.path_map (spec §4.6).
            post_deploy.insert(normalize_key(&file.path), file.sha256.clone());
        }
        if self.config.purge {
            for path in &plan.to_delete {
                post_deploy.remove(path);
            }
        }

        let should_republish = !plan.to_upload.is_empty()
            || self.config.force
            || diff::needs_manifest_republish(&post_deploy, &remote.path_map);

        if should_republish && !self.cancel.is_cancelled() {
            let manifest_result = publisher
                .publish_manifest(&post_deploy, &self.config.manifest_metadata, "")
                .await?;
            if let Some((_event, relay_outcomes)) = manifest_result {
                let accepted_by_any = relay_outcomes.iter().any(|o| o.accepted);
                report.record_manifest(accepted_by_any);
            }
        }

        if self.config.purge && !plan.to_delete.is_empty() {
            self.transition(DeployState::Purging);
            let deletions = publisher.publish_deletions(&pubkey, &plan.to_delete).await?;
            for (path, _event, _relay_outcomes) in deletions {
                report.record_deletion(path);
            }
        }

        self.transition(DeployState::Reporting);
        for issue in &scan_result.issues {
            report.record_error(format!("{}: {}", issue.path.display(), issue.message));
        }

        self.transition(DeployState::Done);
        info!(
            succeeded = report.files_succeeded,
            failed = report.files_failed,
            "deploy finished"
        );
        Ok(report)
    }

    /// Bootstrap a relay pool from operator/fallback relays, discover the
    /// publisher's preferred relays/servers from it, then resolve the final
    /// operational sets (spec §4.4).
    async fn resolve_endpoints(&self, pubkey: &str) -> Result<(Arc<dyn RelayTransport>, Vec<String>, Vec<String>)> {
        let mut bootstrap_relays = self.config.operator_relays.clone();
        if self.config.fallback_enable {
            bootstrap_relays.extend(self.config.fallback_relays.iter().cloned());
        }

        if bootstrap_relays.is_empty() {
            return Err(DeployError::Config(
                "no relays available to bootstrap discovery".into(),
            ));
        }

        let (pool, _events) = RelayPool::connect(&bootstrap_relays);
        let pool = Arc::new(pool);

        let DiscoveryResult {
            relays: discovered_relays,
            servers: discovered_servers,
            profile: _,
        } = discovery::discover(&pool, pubkey, self.config.timing.discovery_timeout).await;

        let relay_urls = discovery::resolve_operational_set(
            discovered_relays,
            &self.config.operator_relays,
            &self.config.fallback_relays,
            self.config.fallback_enable,
            true,
        )?;
        let server_urls = discovery::resolve_operational_set(
            discovered_servers,
            &self.config.operator_servers,
            &self.config.fallback_servers,
            self.config.fallback_enable,
            false,
        )?;

        let pool = if relay_urls == bootstrap_relays {
            pool
        } else {
            let (pool, _events) = RelayPool::connect(&relay_urls);
            Arc::new(pool)
        };

        spawn_relay_event_forwarder(&pool, self.observer.clone());

        let pool: Arc<dyn RelayTransport> = pool;
        Ok((pool, relay_urls, server_urls))
    }
}

/// Forward `RelayEvent`s onto the `Observer` for as long as `pool` is
/// reachable, surfacing NOTICE/disconnect as `ProgressEvent::RelayNotice`/
/// `RelayDisconnected` (SPEC_FULL §11). Connected/SubscriptionClosed have no
/// dedicated progress event yet and are only traced.
fn spawn_relay_event_forwarder(pool: &Arc<RelayPool>, observer: Arc<dyn Observer>) {
    let mut events = pool.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RelayEvent::Notice { relay, text }) => {
                    observer.on_event(ProgressEvent::RelayNotice { relay, text });
                }
                Ok(RelayEvent::Disconnected { relay }) => {
                    observer.on_event(ProgressEvent::RelayDisconnected { relay });
                }
                Ok(RelayEvent::Connected { relay }) => {
                    debug!(relay, "relay connected");
                }
                Ok(RelayEvent::SubscriptionClosed { relay, sub_id, reason }) => {
                    debug!(relay, sub_id, reason, "subscription closed");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay event forwarder lagged behind broadcast channel");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

pub type ScanIssue = scanner::ScanIssue;
pub type Plan = DeploymentPlan;
