//! Observer interface (spec §9 design note #2, SPEC_FULL §10.5)
//!
//! Replaces "implicit global mutable progress/state" with an injected
//! observer the engine calls out to; the engine itself stays pure with
//! respect to I/O beyond network and disk.

use nsite_core::{FileOutcome, RelayOutcome, ServerOutcome};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    Initializing,
    ResolvingContext,
    ResolvingSigner,
    Discovering,
    Scanning,
    Diffing,
    Uploading,
    Publishing,
    Purging,
    Reporting,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    StateChanged(DeployState),
    FileJobStarted { path: String, server: String },
    FileJobRetrying { path: String, server: String, attempt: u32 },
    ServerOutcome { path: String, outcome: ServerOutcome },
    FileOutcome(FileOutcome),
    RelayOutcome { event_id: String, outcome: RelayOutcome },
    RelayNotice { relay: String, text: String },
    RelayDisconnected { relay: String },
    SignerReconnecting,
    SignerReconnected,
    Cancelled,
}

/// Single-method contract the engine calls out on; an external CLI or UI
/// implements this to drive progress bars/log lines of its own.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Default observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Default observer that logs through `tracing` at levels matching the
/// discipline in `gossipd::server` (info for phase transitions, warn for
/// retried/non-fatal failures).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StateChanged(state) => info!(?state, "deploy state changed"),
            ProgressEvent::FileJobStarted { path, server } => {
                tracing::debug!(path, server, "upload job started")
            }
            ProgressEvent::FileJobRetrying { path, server, attempt } => {
                warn!(path, server, attempt, "upload job retrying")
            }
            ProgressEvent::ServerOutcome { path, outcome } => {
                tracing::debug!(path, server = outcome.server, success = outcome.success, "server outcome")
            }
            ProgressEvent::FileOutcome(outcome) => {
                info!(path = outcome.path, success = outcome.success, "file outcome")
            }
            ProgressEvent::RelayOutcome { event_id, outcome } => {
                tracing::debug!(event_id, relay = outcome.relay, accepted = outcome.accepted, "relay outcome")
            }
            ProgressEvent::RelayNotice { relay, text } => warn!(relay, text, "relay notice"),
            ProgressEvent::RelayDisconnected { relay } => warn!(relay, "relay disconnected"),
            ProgressEvent::SignerReconnecting => warn!("signer reconnecting"),
            ProgressEvent::SignerReconnected => info!("signer reconnected"),
            ProgressEvent::Cancelled => warn!("deploy cancelled"),
        }
    }
}
