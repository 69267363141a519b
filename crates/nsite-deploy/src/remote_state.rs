//! Remote State Loader (spec §4.5)

use std::collections::HashMap;
use std::time::Duration;

use nsite_core::path::normalize_key;
use nsite_core::{kind, Event, Filter, PathMap};
use nsite_net::RelayTransport;

pub struct RemoteState {
    pub path_map: PathMap,
    pub source_relays: Vec<String>,
}

fn d_tag(event: &Event) -> Option<&str> {
    event
        .tags
        .iter()
        .find(|t| t.first().map(String::as_str) == Some("d"))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

fn x_tag(event: &Event) -> Option<&str> {
    event
        .tags
        .iter()
        .find(|t| t.first().map(String::as_str) == Some("x"))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

/// Reduce a raw stream of kind-P events to the current `{path -> sha256}`
/// map: kind P is replaceable per `(pubkey, kind, d-tag)`, so we keep the
/// max-`created_at` event per d-tag, breaking ties by lexicographically
/// smallest id (spec §4.5). Grouped by the normalized comparison key, not
/// the raw d-tag, so this map lands in the same lowercased key space
/// `diff()` compares against (spec §4.6).
fn reduce_path_mapping(events: Vec<Event>) -> PathMap {
    let mut latest: HashMap<String, &Event> = HashMap::new();
    for event in &events {
        let Some(path) = d_tag(event) else { continue };
        let key = normalize_key(path);
        match latest.get(&key) {
            Some(existing) => {
                let replace = event.created_at > existing.created_at
                    || (event.created_at == existing.created_at && event.id < existing.id);
                if replace {
                    latest.insert(key, event);
                }
            }
            None => {
                latest.insert(key, event);
            }
        }
    }

    latest
        .into_iter()
        .filter_map(|(path, event)| x_tag(event).map(|sha| (path, sha.to_string())))
        .collect()
}

/// Fetch the publisher's current path-mapping state from `relays`. A hard
/// query failure is non-fatal here (treated as "remote is empty"); the
/// caller enforces the purge-requires-nonempty-query policy from spec §4.5.
pub async fn load(pool: &dyn RelayTransport, pubkey: &str, timeout: Duration) -> RemoteState {
    let filter = Filter {
        authors: Some(vec![pubkey.to_string()]),
        kinds: Some(vec![kind::PATH_MAPPING]),
        ..Default::default()
    };
    let events = pool.query(&filter, timeout).await;
    RemoteState {
        path_map: reduce_path_mapping(events),
        source_relays: pool.relay_urls(),
    }
}
