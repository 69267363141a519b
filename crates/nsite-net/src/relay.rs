//! Relay client pool (spec §4.3)
//!
//! Each relay gets one long-lived connection task, mirroring the
//! connection-per-peer model in `terrain-gossip-net::transport::Transport`:
//! one outbound channel feeds a writer, a reader dispatches inbound frames
//! to whichever `publish`/`query` call is waiting on them. Reconnection
//! lives inside the same task with capped exponential backoff, same shape
//! as the retry/backoff reasoning in `prober::scheduler::ProbeHistory`.

use crate::frame::{ClientFrame, FrameError, ServerFrame};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use nsite_core::{Event, Filter, RelayOutcome};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("connect error: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("relay timed out")]
    Timeout,
    #[error("relay {0} is not connected")]
    NotConnected(String),
}

/// Observable events a relay connection surfaces outside of direct
/// `publish`/`query` results (spec §9, design note #2; supplemented per
/// SPEC_FULL §11 for NOTICE/CLOSED).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Connected { relay: String },
    Disconnected { relay: String },
    Notice { relay: String, text: String },
    SubscriptionClosed { relay: String, sub_id: String, reason: String },
}

enum SubEvent {
    Event(Event),
    Eose,
    Closed(String),
}

struct Shared {
    pending_oks: Mutex<HashMap<String, oneshot::Sender<(bool, String)>>>,
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<SubEvent>>>,
}

/// A persistent connection to one relay.
pub struct RelayConnection {
    url: String,
    outbound: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
}

fn random_sub_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl RelayConnection {
    /// Spawn the connection's supervisor task and return a handle immediately;
    /// the actual socket is established in the background so that a slow or
    /// down relay never blocks pool construction.
    pub fn spawn(url: String, events_tx: broadcast::Sender<RelayEvent>) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending_oks: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        });
        let conn = Arc::new(Self {
            url: url.clone(),
            outbound: outbound_tx,
            shared: shared.clone(),
        });
        tokio::spawn(run(url, outbound_rx, shared, events_tx));
        conn
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Publish an event and await its OK, per spec §4.3's per-relay T_pub.
    pub async fn publish(&self, event: &Event, timeout: Duration) -> RelayOutcome {
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_oks
            .lock()
            .insert(event.id.clone(), tx);

        let frame = ClientFrame::Event(event.clone());
        let text = match frame.to_text() {
            Ok(t) => t,
            Err(e) => {
                self.shared.pending_oks.lock().remove(&event.id);
                return RelayOutcome {
                    relay: self.url.clone(),
                    accepted: false,
                    message: Some(e.to_string()),
                };
            }
        };

        if self.outbound.send(Message::Text(text)).is_err() {
            self.shared.pending_oks.lock().remove(&event.id);
            return RelayOutcome {
                relay: self.url.clone(),
                accepted: false,
                message: Some("relay not connected".into()),
            };
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok((accepted, message))) => RelayOutcome {
                relay: self.url.clone(),
                accepted,
                message: if message.is_empty() { None } else { Some(message) },
            },
            Ok(Err(_)) => RelayOutcome {
                relay: self.url.clone(),
                accepted: false,
                message: Some("relay connection dropped".into()),
            },
            Err(_) => {
                self.shared.pending_oks.lock().remove(&event.id);
                RelayOutcome {
                    relay: self.url.clone(),
                    accepted: false,
                    message: Some("timed out".into()),
                }
            }
        }
    }

    /// Query for events matching `filter`, collecting until EOSE, CLOSED, or
    /// `eose_timeout` elapses (spec §4.3), whichever comes first.
    pub async fn query(&self, filter: &Filter, eose_timeout: Duration) -> Result<Vec<Event>, RelayError> {
        let sub_id = random_sub_id();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.shared.subscriptions.lock().insert(sub_id.clone(), tx);

        let req = ClientFrame::Req {
            sub_id: sub_id.clone(),
            filter: filter.clone(),
        };
        let text = req.to_text()?;
        if self.outbound.send(Message::Text(text)).is_err() {
            self.shared.subscriptions.lock().remove(&sub_id);
            return Err(RelayError::NotConnected(self.url.clone()));
        }

        let mut events = Vec::new();
        let deadline = tokio::time::sleep(eose_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                msg = rx.recv() => {
                    match msg {
                        Some(SubEvent::Event(event)) => events.push(event),
                        Some(SubEvent::Eose) => break,
                        Some(SubEvent::Closed(reason)) => {
                            debug!(relay = %self.url, %reason, "subscription closed early");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        self.shared.subscriptions.lock().remove(&sub_id);
        let close = ClientFrame::Close { sub_id };
        if let Ok(text) = close.to_text() {
            let _ = self.outbound.send(Message::Text(text));
        }
        Ok(events)
    }
}

async fn run(
    url: String,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
    events_tx: broadcast::Sender<RelayEvent>,
) {
    let mut backoff = Duration::from_secs(1);
    const MAX_BACKOFF: Duration = Duration::from_secs(30);

    loop {
        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _response)) => {
                info!(relay = %url, "connected");
                let _ = events_tx.send(RelayEvent::Connected { relay: url.clone() });
                backoff = Duration::from_secs(1);
                let (mut sink, mut stream) = ws_stream.split();

                loop {
                    tokio::select! {
                        outbound = outbound_rx.recv() => {
                            match outbound {
                                Some(msg) => {
                                    if sink.send(msg).await.is_err() {
                                        break;
                                    }
                                }
                                None => return,
                            }
                        }
                        inbound = stream.next() => {
                            match inbound {
                                Some(Ok(Message::Text(text))) => {
                                    dispatch(&text, &shared, &url, &events_tx);
                                }
                                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!(relay = %url, error = %e, "read error");
                                    break;
                                }
                                None => break,
                            }
                        }
                    }
                }

                let _ = events_tx.send(RelayEvent::Disconnected { relay: url.clone() });
            }
            Err(e) => {
                warn!(relay = %url, error = %e, "connect failed");
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn dispatch(text: &str, shared: &Shared, url: &str, events_tx: &broadcast::Sender<RelayEvent>) {
    let frame = match ServerFrame::parse(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(relay = %url, error = %e, "malformed frame");
            return;
        }
    };

    match frame {
        ServerFrame::Event { sub_id, event } => {
            if let Some(tx) = shared.subscriptions.lock().get(&sub_id) {
                let _ = tx.send(SubEvent::Event(event));
            }
        }
        ServerFrame::Eose { sub_id } => {
            if let Some(tx) = shared.subscriptions.lock().get(&sub_id) {
                let _ = tx.send(SubEvent::Eose);
            }
        }
        ServerFrame::Ok {
            event_id,
            accepted,
            message,
        } => {
            if let Some(tx) = shared.pending_oks.lock().remove(&event_id) {
                let _ = tx.send((accepted, message));
            }
        }
        ServerFrame::Notice { text } => {
            let _ = events_tx.send(RelayEvent::Notice {
                relay: url.to_string(),
                text,
            });
        }
        ServerFrame::Closed { sub_id, reason } => {
            if let Some(tx) = shared.subscriptions.lock().get(&sub_id) {
                let _ = tx.send(SubEvent::Closed(reason.clone()));
            }
            let _ = events_tx.send(RelayEvent::SubscriptionClosed {
                relay: url.to_string(),
                sub_id,
                reason,
            });
        }
    }
}

/// Transport seam between the publisher/discovery/remote-state readers and
/// the relay layer, so tests can drive publish/query coordination against an
/// in-memory fake instead of real WebSocket connections.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn publish(&self, event: &Event, timeout: Duration) -> Vec<RelayOutcome>;
    async fn query(&self, filter: &Filter, eose_timeout: Duration) -> Vec<Event>;
    fn relay_urls(&self) -> Vec<String>;
    fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent>;
}

/// A set of relay connections operated on together (spec §4.3/§4.8 fan-out).
pub struct RelayPool {
    connections: Vec<Arc<RelayConnection>>,
    events_tx: broadcast::Sender<RelayEvent>,
}

impl RelayPool {
    pub fn connect(urls: &[String]) -> (Self, broadcast::Receiver<RelayEvent>) {
        let (events_tx, events_rx) = broadcast::channel(256);
        let connections = urls
            .iter()
            .map(|url| RelayConnection::spawn(url.clone(), events_tx.clone()))
            .collect();
        (
            Self {
                connections,
                events_tx,
            },
            events_rx,
        )
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events_tx.subscribe()
    }

    pub fn relay_urls(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.url().to_string()).collect()
    }

    /// Fan out `publish` to every connection; a single event's result per
    /// relay is independent of every other (spec §4.3 ordering guarantee).
    pub async fn publish(&self, event: &Event, timeout: Duration) -> Vec<RelayOutcome> {
        let futures = self
            .connections
            .iter()
            .map(|conn| conn.publish(event, timeout));
        futures_util::future::join_all(futures).await
    }

    /// Fan out `query` to every connection and merge results, deduplicating
    /// by event id (multiple relays may hold the same event).
    pub async fn query(&self, filter: &Filter, eose_timeout: Duration) -> Vec<Event> {
        let futures = self
            .connections
            .iter()
            .map(|conn| conn.query(filter, eose_timeout));
        let results = futures_util::future::join_all(futures).await;

        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();
        for events in results.into_iter().flatten() {
            for event in events {
                if seen.insert(event.id.clone()) {
                    merged.push(event);
                }
            }
        }
        merged
    }
}

#[async_trait]
impl RelayTransport for RelayPool {
    async fn publish(&self, event: &Event, timeout: Duration) -> Vec<RelayOutcome> {
        RelayPool::publish(self, event, timeout).await
    }

    async fn query(&self, filter: &Filter, eose_timeout: Duration) -> Vec<Event> {
        RelayPool::query(self, filter, eose_timeout).await
    }

    fn relay_urls(&self) -> Vec<String> {
        RelayPool::relay_urls(self)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent> {
        RelayPool::subscribe_events(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_sub_ids_are_distinct() {
        let a = random_sub_id();
        let b = random_sub_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }
}
