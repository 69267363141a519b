//! Endpoint Discovery (spec §4.4)

use std::collections::HashSet;
use std::time::Duration;

use nsite_core::{kind, Event, Filter};
use nsite_net::RelayTransport;

use crate::error::DiscoveryError;

pub struct DiscoveryResult {
    pub relays: Vec<String>,
    pub servers: Vec<String>,
    pub profile: Option<String>,
}

fn latest_event(events: &[Event]) -> Option<&Event> {
    events.iter().max_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| b.id.cmp(&a.id))
    })
}

fn extract_urls(events: &[Event], tag_name: &str) -> Vec<String> {
    let Some(event) = latest_event(events) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for tag in &event.tags {
        if tag.first().map(String::as_str) == Some(tag_name) {
            if let Some(url) = tag.get(1) {
                if seen.insert(url.clone()) {
                    urls.push(url.clone());
                }
            }
        }
    }
    urls
}

/// Query the three publisher records in parallel under one shared wall
/// clock (spec §4.4's T_disc).
pub async fn discover(pool: &dyn RelayTransport, pubkey: &str, timeout: Duration) -> DiscoveryResult {
    let base = Filter {
        authors: Some(vec![pubkey.to_string()]),
        ..Default::default()
    };
    let relay_filter = Filter {
        kinds: Some(vec![kind::RELAY_LIST]),
        ..base.clone()
    };
    let server_filter = Filter {
        kinds: Some(vec![kind::BLOB_SERVER_LIST]),
        ..base.clone()
    };
    let profile_filter = Filter {
        kinds: Some(vec![kind::PROFILE]),
        ..base
    };

    let (relay_events, server_events, profile_events) = tokio::join!(
        pool.query(&relay_filter, timeout),
        pool.query(&server_filter, timeout),
        pool.query(&profile_filter, timeout),
    );

    DiscoveryResult {
        relays: extract_urls(&relay_events, "r"),
        servers: extract_urls(&server_events, "server"),
        profile: latest_event(&profile_events).map(|e| e.content.clone()),
    }
}

/// Merge discovered, operator-supplied, and (if enabled) fallback URLs into
/// the final operational set (spec §4.4). An empty result is a
/// `DiscoveryError`, per the Open Question policy fixed in SPEC_FULL §12.3:
/// fallback only applies when the flag is set, never silently.
pub fn resolve_operational_set(
    discovered: Vec<String>,
    operator: &[String],
    fallback: &[String],
    fallback_enable: bool,
    is_relay_set: bool,
) -> Result<Vec<String>, DiscoveryError> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for url in discovered.into_iter().chain(operator.iter().cloned()) {
        if seen.insert(url.clone()) {
            merged.push(url);
        }
    }
    if fallback_enable {
        for url in fallback {
            if seen.insert(url.clone()) {
                merged.push(url.clone());
            }
        }
    }

    if merged.is_empty() {
        return Err(if is_relay_set {
            DiscoveryError::NoRelays
        } else {
            DiscoveryError::NoServers
        });
    }
    Ok(merged)
}
