//! End-to-end scenario tests pinning the policies spec.md §8 lists as S1-S6.
//!
//! S1-S3, S5-S6 exercise the engine's pure decision logic (diff, aggregator,
//! manifest tag construction, signer determinism) directly. S4 and the
//! `coordination` module below drive the orchestrator/publisher against
//! in-memory fakes implementing `BlobTransport`/`RelayTransport`, covering
//! the coordination invariants spec §8 lists that no pure-helper test
//! reaches: publish-after-blob-success (§8.4), the concurrency bound (§8.6),
//! HEAD short-circuit idempotence (§8.7), and cancellation safety (§8.8).

use std::fs;

use nsite_core::crypto::KeyPair;
use nsite_core::{EventTemplate, FileOutcome, PathMap, ServerOutcome};
use nsite_deploy::aggregator::DeployReport;
use nsite_deploy::diff::{self};
use nsite_deploy::scanner;
use nsite_deploy::signer::{LocalSigner, Signer};
use tempfile::tempdir;

/// S1 — Happy path: two new local files, empty remote, single server/relay.
#[test]
fn s1_happy_path_diff_and_manifest_order() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("index.html"), b"<html></html>").unwrap();
    fs::create_dir(dir.path().join("css")).unwrap();
    fs::write(dir.path().join("css/app.css"), b"body{}").unwrap();

    let scan = scanner::scan(dir.path()).unwrap();
    assert_eq!(scan.files.len(), 2);

    let remote = PathMap::new();
    let plan = diff::diff(scan.files, &remote, false);
    assert_eq!(plan.to_upload.len(), 2);
    assert!(plan.unchanged.is_empty());
    assert!(plan.to_delete.is_empty());

    let post_deploy: PathMap = plan
        .to_upload
        .iter()
        .map(|f| (f.path.clone(), f.sha256.clone()))
        .collect();
    let paths: Vec<&String> = post_deploy.keys().collect();
    assert_eq!(paths, vec!["/css/app.css", "/index.html"]);
}

/// S2 — Partial server failure: a file succeeds as long as at least one
/// server reports success or already_existed.
#[test]
fn s2_partial_server_failure_is_still_file_success() {
    let file1 = FileOutcome {
        path: "/index.html".into(),
        sha256: "h1".into(),
        server_outcomes: vec![
            ServerOutcome {
                server: "s_a".into(),
                success: false,
                already_existed: false,
                error: Some("500 after 3 retries".into()),
            },
            ServerOutcome {
                server: "s_b".into(),
                success: true,
                already_existed: false,
                error: None,
            },
        ],
        event_id: None,
        success: true,
    };
    let file2 = FileOutcome {
        path: "/css/app.css".into(),
        sha256: "h2".into(),
        server_outcomes: vec![
            ServerOutcome {
                server: "s_b".into(),
                success: false,
                already_existed: true,
                error: None,
            },
            ServerOutcome {
                server: "s_a".into(),
                success: true,
                already_existed: false,
                error: None,
            },
        ],
        event_id: None,
        success: true,
    };

    assert!(file1.blob_successful());
    assert!(file2.blob_successful());

    let mut report = DeployReport::default();
    report.record_file_outcomes(&[file1, file2]);
    assert_eq!(report.files_succeeded, 2);
    assert_eq!(report.files_failed, 0);
}

/// S3 — All relays reject an otherwise-successful blob upload: the file
/// upload succeeded but zero relays accepted the event, so the deploy is
/// not a success even though no file failed to upload.
#[test]
fn s3_all_relays_reject_event_is_not_a_success() {
    let mut report = DeployReport::default();
    report.record_file_outcomes(&[FileOutcome {
        path: "/index.html".into(),
        sha256: "h1".into(),
        server_outcomes: vec![ServerOutcome {
            server: "s1".into(),
            success: true,
            already_existed: false,
            error: None,
        }],
        event_id: Some("eventid".into()),
        success: true,
    }]);
    // Manifest publish that got zero OKs across all relays.
    report.record_manifest(false);

    assert_eq!(report.files_failed, 0);
    assert!(!report.is_success());
}

/// S4 — Remote has a stale mapping for a path that still exists locally
/// with a different hash: the path is re-uploaded, not deleted.
#[test]
fn s4_stale_remote_mapping_is_reuploaded_not_deleted() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("index.html"), b"new content").unwrap();
    let scan = scanner::scan(dir.path()).unwrap();

    let mut remote = PathMap::new();
    remote.insert("/index.html".into(), "stale_hash".into());

    let plan = diff::diff(scan.files, &remote, false);
    assert_eq!(plan.to_upload.len(), 1);
    assert!(plan.to_delete.is_empty());
    assert_ne!(plan.to_upload[0].sha256, "stale_hash");
}

/// S5 — Purge: a remote-only path is queued for deletion, and its
/// addressable coordinate is built from the path-mapping kind.
#[test]
fn s5_purge_queues_remote_only_path_for_deletion() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("index.html"), b"x").unwrap();
    let scan = scanner::scan(dir.path()).unwrap();

    let mut remote = PathMap::new();
    remote.insert("/index.html".into(), scan.files[0].sha256.clone());
    remote.insert("/old.html".into(), "stale".into());

    let plan = diff::diff(scan.files, &remote, false);
    assert_eq!(plan.to_delete, vec!["/old.html".to_string()]);

    let coordinate = format!("{}:{}:{}", nsite_core::kind::PATH_MAPPING, "pubkeyhex", "/old.html");
    assert_eq!(coordinate, "34128:pubkeyhex:/old.html");
}

/// S6 — Re-signing an identical template (same kind/tags/content/created_at,
/// as happens on signer reconnect) must produce a byte-identical event id,
/// so no duplicate event is ever observed downstream.
#[tokio::test]
async fn s6_resigning_identical_template_is_idempotent() {
    let keypair = KeyPair::generate();
    let pubkey = keypair.public_key_hex();
    let signer = LocalSigner::new(keypair);

    let template = || EventTemplate {
        kind: nsite_core::kind::PATH_MAPPING,
        created_at: 1_700_000_000,
        tags: vec![
            vec!["d".into(), "/index.html".into()],
            vec!["x".into(), "h1".into()],
        ],
        content: String::new(),
    };

    let first = signer.sign(template()).await.unwrap();
    let second = signer.sign(template()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.sig, second.sig);
    assert_eq!(first.pubkey, pubkey);
}

/// Fakes for driving `Orchestrator`/`Publisher` against in-memory
/// `BlobTransport`/`RelayTransport` implementations instead of real HTTP and
/// WebSocket servers.
mod coordination {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use nsite_core::{Event, FileEntry, FileOutcome, Filter, RelayOutcome};
    use nsite_deploy::cancel::CancelToken;
    use nsite_deploy::config::Timing;
    use nsite_deploy::observer::NullObserver;
    use nsite_deploy::orchestrator::Orchestrator;
    use nsite_deploy::publisher::Publisher;
    use nsite_deploy::signer::LocalSigner;
    use nsite_core::crypto::KeyPair;
    use nsite_net::{BlobError, BlobTransport, RelayEvent, RelayTransport, UploadSuccess};
    use parking_lot::Mutex;
    use tokio::sync::broadcast;

    /// A blob server that always fails HEAD/upload for shas in
    /// `always_fail`, otherwise succeeds and remembers the sha as present so
    /// a later HEAD on the same server short-circuits the upload.
    struct FakeBlob {
        present: Mutex<HashSet<String>>,
        always_fail: Mutex<HashSet<String>>,
        head_calls: AtomicUsize,
        upload_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeBlob {
        fn new() -> Self {
            Self {
                present: Mutex::new(HashSet::new()),
                always_fail: Mutex::new(HashSet::new()),
                head_calls: AtomicUsize::new(0),
                upload_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn always_fail(&self, sha256: &str) {
            self.always_fail.lock().insert(sha256.to_string());
        }
    }

    #[async_trait]
    impl BlobTransport for FakeBlob {
        async fn head(&self, _server: &str, sha256: &str) -> Result<bool, BlobError> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.present.lock().contains(sha256))
        }

        async fn upload(
            &self,
            server: &str,
            sha256: &str,
            _bytes: &[u8],
            _content_type: &str,
            _auth_header: &str,
            _auth_json: &str,
            _attempt_timeout: Duration,
        ) -> Result<UploadSuccess, BlobError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.always_fail.lock().contains(sha256) {
                return Err(BlobError::AllStrategiesFailed {
                    server: server.to_string(),
                    sha256: sha256.to_string(),
                    attempts: vec!["fake upload always fails".into()],
                });
            }
            self.present.lock().insert(sha256.to_string());
            Ok(UploadSuccess {
                strategy_index: 0,
                descriptor: None,
            })
        }
    }

    /// A relay pool that records every published event and answers `query`
    /// from a canned event list.
    struct FakeRelay {
        urls: Vec<String>,
        accept: bool,
        query_events: Vec<Event>,
        published: Mutex<Vec<Event>>,
        events_tx: broadcast::Sender<RelayEvent>,
    }

    impl FakeRelay {
        fn new(urls: Vec<String>, accept: bool, query_events: Vec<Event>) -> Self {
            let (events_tx, _rx) = broadcast::channel(16);
            Self {
                urls,
                accept,
                query_events,
                published: Mutex::new(Vec::new()),
                events_tx,
            }
        }
    }

    #[async_trait]
    impl RelayTransport for FakeRelay {
        async fn publish(&self, event: &Event, _timeout: Duration) -> Vec<RelayOutcome> {
            self.published.lock().push(event.clone());
            self.urls
                .iter()
                .map(|relay| RelayOutcome {
                    relay: relay.clone(),
                    accepted: self.accept,
                    message: None,
                })
                .collect()
        }

        async fn query(&self, _filter: &Filter, _eose_timeout: Duration) -> Vec<Event> {
            self.query_events.clone()
        }

        fn relay_urls(&self) -> Vec<String> {
            self.urls.clone()
        }

        fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent> {
            self.events_tx.subscribe()
        }
    }

    fn file(path: &str, sha256: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            display_path: path.to_string(),
            size: 3,
            content_type: "text/plain".into(),
            sha256: sha256.to_string(),
            bytes: Some(b"abc".to_vec()),
        }
    }

    fn fast_timing() -> Timing {
        Timing {
            job_retries: 0,
            job_retry_backoff: Duration::from_millis(1),
            ..Timing::default()
        }
    }

    fn orchestrator(blob: Arc<dyn BlobTransport>, servers: Vec<String>, concurrency: usize) -> Orchestrator {
        Orchestrator::new(
            blob,
            Arc::new(LocalSigner::new(KeyPair::generate())),
            servers,
            concurrency,
            fast_timing(),
            Arc::new(NullObserver),
            CancelToken::new(),
        )
    }

    /// §8.4: a path-mapping event is published only for files the
    /// orchestrator reported as blob-successful, never for ones it didn't.
    #[tokio::test]
    async fn publishes_only_blob_successful_files() {
        let broken_sha = "b".repeat(64);
        let fake_blob = Arc::new(FakeBlob::new());
        fake_blob.always_fail(&broken_sha);
        let blob: Arc<dyn BlobTransport> = fake_blob.clone();

        let files = vec![
            file("/ok.html", &"a".repeat(64)),
            file("/broken.html", &broken_sha),
        ];
        let orch = orchestrator(blob, vec!["server-a".into()], 2);
        let outcomes = orch.upload_all(&files).await;

        let successful: Vec<FileOutcome> = outcomes.into_iter().filter(|f| f.success).collect();
        assert_eq!(successful.len(), 1);
        assert_eq!(successful[0].path, "/ok.html");

        let fake_relay = Arc::new(FakeRelay::new(vec!["wss://relay.example".into()], true, vec![]));
        let relays: Arc<dyn RelayTransport> = fake_relay.clone();
        let publisher = Publisher::new(
            relays,
            Arc::new(LocalSigner::new(KeyPair::generate())),
            Arc::new(NullObserver),
            Duration::from_secs(1),
            CancelToken::new(),
        );
        let published = publisher.publish_path_mappings(&successful).await.unwrap();

        assert_eq!(published.len(), 1);
        let sent = fake_relay.published.lock();
        assert_eq!(sent.len(), 1);
        let d_tag = sent[0]
            .tags
            .iter()
            .find(|t| t[0] == "d")
            .map(|t| t[1].clone());
        assert_eq!(d_tag, Some("/ok.html".to_string()));
        assert!(!sent.iter().any(|e| e.tags.iter().any(|t| t[0] == "d" && t[1] == "/broken.html")));
    }

    /// §8.6: at most `concurrency` uploads run at once, and the pool uses the
    /// full allowance it's given rather than serializing unnecessarily.
    #[tokio::test]
    async fn bounds_concurrency_to_configured_limit() {
        let fake_blob = Arc::new(FakeBlob::new());
        let blob: Arc<dyn BlobTransport> = fake_blob.clone();

        let files: Vec<FileEntry> = (0..6)
            .map(|i| file(&format!("/f{i}.html"), &format!("{:064x}", i)))
            .collect();

        let orch = orchestrator(blob, vec!["server-a".into()], 2);
        let outcomes = orch.upload_all(&files).await;

        assert!(outcomes.iter().all(|f| f.success));
        assert!(fake_blob.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(fake_blob.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(fake_blob.upload_calls.load(Ordering::SeqCst), 6);
    }

    /// §8.7: redeploying an unchanged file against a server that already has
    /// the blob is a no-op upload (HEAD short-circuits), so re-running the
    /// same deploy never re-sends bytes it doesn't need to.
    #[tokio::test]
    async fn head_short_circuits_repeat_uploads() {
        let fake_blob = Arc::new(FakeBlob::new());
        let sha = "b".repeat(64);
        let entry = file("/index.html", &sha);

        let blob: Arc<dyn BlobTransport> = fake_blob.clone();
        let first = orchestrator(blob, vec!["server-a".into()], 1)
            .upload_all(&[entry.clone()])
            .await;
        assert!(first[0].success);
        assert!(!first[0].server_outcomes[0].already_existed);
        assert_eq!(fake_blob.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake_blob.head_calls.load(Ordering::SeqCst), 1);

        let blob_again: Arc<dyn BlobTransport> = fake_blob.clone();
        let second = orchestrator(blob_again, vec!["server-a".into()], 1)
            .upload_all(&[entry])
            .await;
        assert!(second[0].success);
        assert!(second[0].server_outcomes[0].already_existed);
        assert_eq!(fake_blob.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake_blob.head_calls.load(Ordering::SeqCst), 2);
    }

    /// §8.8: cancelling before a deploy's upload/publish phases start leaves
    /// no blob or relay calls in flight.
    #[tokio::test]
    async fn cancellation_before_upload_runs_no_jobs() {
        let fake_blob = Arc::new(FakeBlob::new());
        let blob: Arc<dyn BlobTransport> = fake_blob.clone();
        let cancel = CancelToken::new();
        cancel.cancel();

        let orch = Orchestrator::new(
            blob,
            Arc::new(LocalSigner::new(KeyPair::generate())),
            vec!["server-a".into()],
            2,
            fast_timing(),
            Arc::new(NullObserver),
            cancel.clone(),
        );
        let outcomes = orch.upload_all(&[file("/a.html", &"c".repeat(64))]).await;

        assert!(outcomes.iter().all(|f| !f.success));
        assert_eq!(fake_blob.head_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fake_blob.upload_calls.load(Ordering::SeqCst), 0);

        let fake_relay = Arc::new(FakeRelay::new(vec!["wss://relay.example".into()], true, vec![]));
        let relays: Arc<dyn RelayTransport> = fake_relay.clone();
        let publisher = Publisher::new(
            relays,
            Arc::new(LocalSigner::new(KeyPair::generate())),
            Arc::new(NullObserver),
            Duration::from_secs(1),
            cancel,
        );
        let published = publisher
            .publish_path_mappings(&[FileOutcome {
                path: "/a.html".into(),
                sha256: "c".repeat(64),
                server_outcomes: vec![],
                event_id: None,
                success: true,
            }])
            .await
            .unwrap();
        assert!(published.is_empty());
        assert!(fake_relay.published.lock().is_empty());
    }
}
