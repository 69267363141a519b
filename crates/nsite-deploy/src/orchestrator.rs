//! Blob Upload Orchestrator (spec §4.7)
//!
//! A constant worker pool over a FIFO job queue, one job per `(file,
//! server)` pair. `buffer_unordered` gives exactly the semantics spec §8's
//! invariant 6 asks for: a new job starts the instant any worker frees, with
//! at most C in flight and never fewer while C+ jobs remain queued.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use futures_util::stream::{self, StreamExt};
use nsite_core::{kind, Event, EventTemplate, FileEntry, FileOutcome, ServerOutcome};
use nsite_net::BlobTransport;

use crate::cancel::CancelToken;
use crate::config::Timing;
use crate::observer::{Observer, ProgressEvent};
use crate::signer::Signer;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

async fn build_auth_event(
    signer: &dyn Signer,
    sha256: &str,
    ttl: Duration,
) -> Result<Event, crate::error::SignerError> {
    let now = now_unix();
    let template = EventTemplate {
        kind: kind::BLOB_AUTH,
        created_at: now,
        tags: vec![
            vec!["t".into(), "upload".into()],
            vec!["x".into(), sha256.into()],
            vec!["expiration".into(), (now + ttl.as_secs() as i64).to_string()],
            vec!["client".into(), "nsyte".into()],
        ],
        content: "Upload blob".into(),
    };
    signer.sign(template).await
}

fn auth_expiration(event: &Event) -> Option<i64> {
    event
        .tags
        .iter()
        .find(|t| t.first().map(String::as_str) == Some("expiration"))
        .and_then(|t| t.get(1))
        .and_then(|v| v.parse::<i64>().ok())
}

fn auth_header_value(event: &Event) -> String {
    let json = serde_json::to_string(event).unwrap_or_default();
    base64::engine::general_purpose::STANDARD.encode(json.as_bytes())
}

struct Job<'a> {
    file_index: usize,
    file: &'a FileEntry,
    server: String,
}

pub struct Orchestrator {
    blob_client: Arc<dyn BlobTransport>,
    signer: Arc<dyn Signer>,
    servers: Vec<String>,
    concurrency: usize,
    timing: Timing,
    observer: Arc<dyn Observer>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(
        blob_client: Arc<dyn BlobTransport>,
        signer: Arc<dyn Signer>,
        servers: Vec<String>,
        concurrency: usize,
        timing: Timing,
        observer: Arc<dyn Observer>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            blob_client,
            signer,
            servers,
            concurrency,
            timing,
            observer,
            cancel,
        }
    }

    /// Upload every file in `files` to every configured server, returning
    /// one `FileOutcome` per file in the same order as `files`.
    pub async fn upload_all(&self, files: &[FileEntry]) -> Vec<FileOutcome> {
        let mut jobs = Vec::with_capacity(files.len() * self.servers.len());
        for (file_index, file) in files.iter().enumerate() {
            for server in &self.servers {
                jobs.push(Job {
                    file_index,
                    file,
                    server: server.clone(),
                });
            }
        }

        let concurrency = self.concurrency.max(1);
        let results: Vec<(usize, ServerOutcome)> = stream::iter(jobs)
            .map(|job| async move {
                let outcome = self.run_job(&job).await;
                self.observer.on_event(ProgressEvent::ServerOutcome {
                    path: job.file.display_path.clone(),
                    outcome: outcome.clone(),
                });
                (job.file_index, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut per_file: Vec<Vec<ServerOutcome>> = vec![Vec::new(); files.len()];
        for (index, outcome) in results {
            per_file[index].push(outcome);
        }

        files
            .iter()
            .zip(per_file.into_iter())
            .map(|(file, server_outcomes)| {
                let success = !server_outcomes.is_empty() && server_outcomes.iter().any(ServerOutcome::is_ok);
                let outcome = FileOutcome {
                    path: file.display_path.clone(),
                    sha256: file.sha256.clone(),
                    server_outcomes,
                    event_id: None,
                    success,
                };
                self.observer.on_event(ProgressEvent::FileOutcome(outcome.clone()));
                outcome
            })
            .collect()
    }

    async fn run_job(&self, job: &Job<'_>) -> ServerOutcome {
        if self.cancel.is_cancelled() {
            return ServerOutcome {
                server: job.server.clone(),
                success: false,
                already_existed: false,
                error: Some("cancelled".into()),
            };
        }

        self.observer.on_event(ProgressEvent::FileJobStarted {
            path: job.file.display_path.clone(),
            server: job.server.clone(),
        });

        match self.blob_client.head(&job.server, &job.file.sha256).await {
            Ok(true) => {
                return ServerOutcome {
                    server: job.server.clone(),
                    success: false,
                    already_existed: true,
                    error: None,
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(server = %job.server, error = %e, "HEAD probe failed, attempting upload");
            }
        }

        let bytes = match &job.file.bytes {
            Some(b) => b,
            None => {
                return ServerOutcome {
                    server: job.server.clone(),
                    success: false,
                    already_existed: false,
                    error: Some("file bytes not loaded".into()),
                }
            }
        };

        let mut auth = match build_auth_event(self.signer.as_ref(), &job.file.sha256, self.timing.blob_auth_ttl).await {
            Ok(event) => event,
            Err(e) => {
                return ServerOutcome {
                    server: job.server.clone(),
                    success: false,
                    already_existed: false,
                    error: Some(format!("could not build auth event: {e}")),
                }
            }
        };

        let mut last_error = None;
        // attempt 0 is the initial try; attempts 1..=job_retries are the retries,
        // so job_retries=3 means up to 3 retries (4 attempts total), matching
        // spec's "retried up to R_job times (default 3)".
        for attempt in 0..=self.timing.job_retries {
            if self.cancel.is_cancelled() {
                last_error = Some("cancelled".into());
                break;
            }
            if attempt > 0 {
                self.observer.on_event(ProgressEvent::FileJobRetrying {
                    path: job.file.display_path.clone(),
                    server: job.server.clone(),
                    attempt,
                });
                tokio::time::sleep(self.timing.job_retry_backoff * attempt).await;

                if auth_expiration(&auth).map(|exp| exp <= now_unix()).unwrap_or(true) {
                    auth = match build_auth_event(self.signer.as_ref(), &job.file.sha256, self.timing.blob_auth_ttl).await {
                        Ok(event) => event,
                        Err(e) => {
                            last_error = Some(format!("could not rebuild expired auth event: {e}"));
                            break;
                        }
                    };
                }
            }

            let auth_header = auth_header_value(&auth);
            let auth_json = serde_json::to_string(&auth).unwrap_or_default();

            match self
                .blob_client
                .upload(
                    &job.server,
                    &job.file.sha256,
                    bytes,
                    &job.file.content_type,
                    &auth_header,
                    &auth_json,
                    self.timing.upload_attempt_timeout,
                )
                .await
            {
                Ok(_) => {
                    return ServerOutcome {
                        server: job.server.clone(),
                        success: true,
                        already_existed: false,
                        error: None,
                    }
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        ServerOutcome {
            server: job.server.clone(),
            success: false,
            already_existed: false,
            error: last_error,
        }
    }
}
