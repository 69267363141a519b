//! Event Publisher (spec §4.8)

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nsite_core::{kind, Event, EventTemplate, FileOutcome, PathMap, RelayOutcome};
use nsite_net::RelayTransport;

use crate::cancel::CancelToken;
use crate::config::ManifestMetadata;
use crate::error::PublishError;
use crate::observer::{Observer, ProgressEvent};
use crate::signer::Signer;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub struct PublishedFile {
    pub path: String,
    pub event_id: String,
    pub relay_outcomes: Vec<RelayOutcome>,
    pub accepted_by_any: bool,
}

pub struct Publisher {
    relays: Arc<dyn RelayTransport>,
    signer: Arc<dyn Signer>,
    observer: Arc<dyn Observer>,
    publish_timeout: Duration,
    cancel: CancelToken,
}

impl Publisher {
    pub fn new(
        relays: Arc<dyn RelayTransport>,
        signer: Arc<dyn Signer>,
        observer: Arc<dyn Observer>,
        publish_timeout: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            relays,
            signer,
            observer,
            publish_timeout,
            cancel,
        }
    }

    async fn publish_event(&self, event: &Event) -> Vec<RelayOutcome> {
        let outcomes = self.relays.publish(event, self.publish_timeout).await;
        for outcome in &outcomes {
            self.observer.on_event(ProgressEvent::RelayOutcome {
                event_id: event.id.clone(),
                outcome: outcome.clone(),
            });
        }
        outcomes
    }

    /// Publish one kind-P event per blob-successful file (spec §4.8, "per-file"
    /// phase). The orchestrator must have already excluded all-failed files.
    pub async fn publish_path_mappings(
        &self,
        successful_files: &[FileOutcome],
    ) -> Result<Vec<PublishedFile>, PublishError> {
        let mut published = Vec::new();
        for file in successful_files {
            if self.cancel.is_cancelled() {
                break;
            }
            let template = EventTemplate {
                kind: kind::PATH_MAPPING,
                created_at: now_unix(),
                tags: vec![
                    vec!["d".into(), file.path.clone()],
                    vec!["x".into(), file.sha256.clone()],
                    vec!["client".into(), "nsyte".into()],
                ],
                content: String::new(),
            };
            let event = self.signer.sign(template).await?;
            let relay_outcomes = self.publish_event(&event).await;
            let accepted_by_any = relay_outcomes.iter().any(|o| o.accepted);
            published.push(PublishedFile {
                path: file.path.clone(),
                event_id: event.id,
                relay_outcomes,
                accepted_by_any,
            });
        }
        Ok(published)
    }

    /// Publish the aggregate site-manifest event (spec §4.8 "manifest" phase).
    /// `f`-tags are emitted in the `PathMap`'s natural (lexicographic)
    /// iteration order, satisfying spec §4.8's ordering requirement.
    pub async fn publish_manifest(
        &self,
        post_deploy: &PathMap,
        metadata: &ManifestMetadata,
        site_id: &str,
    ) -> Result<Option<(Event, Vec<RelayOutcome>)>, PublishError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let mut tags = vec![vec!["d".into(), site_id.to_string()]];
        for (path, sha256) in post_deploy {
            tags.push(vec!["f".into(), path.clone(), sha256.clone()]);
        }
        if let Some(title) = &metadata.title {
            tags.push(vec!["title".into(), title.clone()]);
        }
        if let Some(description) = &metadata.description {
            tags.push(vec!["description".into(), description.clone()]);
        }
        for relay in &metadata.recommended_relays {
            tags.push(vec!["relay".into(), relay.clone()]);
        }
        for server in &metadata.recommended_servers {
            tags.push(vec!["server".into(), server.clone()]);
        }

        let template = EventTemplate {
            kind: kind::SITE_MANIFEST,
            created_at: now_unix(),
            tags,
            content: String::new(),
        };
        let event = self.signer.sign(template).await?;
        let relay_outcomes = self.publish_event(&event).await;
        Ok(Some((event, relay_outcomes)))
    }

    /// Publish one kind-D deletion event per purged path (spec §4.8's purge
    /// phase; only called when the caller has confirmed operator consent).
    pub async fn publish_deletions(
        &self,
        pubkey: &str,
        to_delete: &[String],
    ) -> Result<Vec<(String, Event, Vec<RelayOutcome>)>, PublishError> {
        let mut results = Vec::new();
        for path in to_delete {
            if self.cancel.is_cancelled() {
                break;
            }
            let coordinate = format!("{}:{}:{}", kind::PATH_MAPPING, pubkey, path);
            let template = EventTemplate {
                kind: kind::DELETION,
                created_at: now_unix(),
                tags: vec![vec!["a".into(), coordinate]],
                content: String::new(),
            };
            let event = self.signer.sign(template).await?;
            let relay_outcomes = self.publish_event(&event).await;
            results.push((path.clone(), event, relay_outcomes));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_tags_preserve_lexicographic_order() {
        let mut map = PathMap::new();
        map.insert("/z.html".into(), "hz".into());
        map.insert("/a.html".into(), "ha".into());

        let mut tags = vec![vec!["d".into(), "site".to_string()]];
        for (path, sha256) in &map {
            tags.push(vec!["f".into(), path.clone(), sha256.clone()]);
        }

        assert_eq!(tags[1][1], "/a.html");
        assert_eq!(tags[2][1], "/z.html");
    }

    #[test]
    fn deletion_coordinate_matches_addressable_format() {
        let coordinate = format!("{}:{}:{}", kind::PATH_MAPPING, "pk", "/old.html");
        assert_eq!(coordinate, "34128:pk:/old.html");
    }
}
