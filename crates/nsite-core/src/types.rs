//! Protocol and data-model types (spec §3)
//!
//! `FileEntry`/`PathMap`/`Event` mirror the shapes described in spec.md §3.
//! Field order matches the order the spec lists fields in, the same
//! convention the teacher follows in `terrain-gossip-core::types`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from normalized site path to blob sha256. A `BTreeMap` so that
/// iteration is always in lexicographic path order, which the site-manifest
/// event requires (spec §3, §4.8).
pub type PathMap = BTreeMap<String, String>;

/// A local or remote file entry (spec §3, §4.1).
///
/// Invariant: every entry used for upload has `sha256` and `bytes`; every
/// entry used for diffing has `sha256`.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    /// Normalized, lowercased comparison key (leading slash, no repeats).
    pub path: String,
    /// Normalized but case-preserving form, used for display/manifests.
    pub display_path: String,
    pub size: u64,
    pub content_type: String,
    /// Lowercase hex, 64 chars.
    pub sha256: String,
    /// Present once loaded; the scanner may defer this to bound memory.
    pub bytes: Option<Vec<u8>>,
}

impl FileEntry {
    /// A remote-derived entry never carries bytes and has no local size.
    pub fn remote(path: String, sha256: String) -> Self {
        Self {
            display_path: path.clone(),
            path,
            size: 0,
            content_type: String::new(),
            sha256,
            bytes: None,
        }
    }
}

/// Nostr event kinds this engine reads and writes. Values follow existing
/// NIPs/BUDs where one applies (deletion is NIP-09's kind 5; blob
/// authorization is Blossom's kind 24242; profile/relay-list/server-list are
/// NIP-01/NIP-65/BUD-03); path mapping and site manifest use addressable
/// (30000-39999) kind numbers reserved for this engine's own use.
pub mod kind {
    pub const PROFILE: u32 = 0;
    pub const DELETION: u32 = 5;
    pub const RELAY_LIST: u32 = 10002;
    pub const BLOB_SERVER_LIST: u32 = 10063;
    pub const BLOB_AUTH: u32 = 24242;
    pub const PATH_MAPPING: u32 = 34128;
    pub const SITE_MANIFEST: u32 = 34129;
}

/// A signed Nostr-style event (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

/// An event template awaiting a signature (input to the Signer abstraction).
#[derive(Clone, Debug, PartialEq)]
pub struct EventTemplate {
    pub kind: u32,
    pub created_at: i64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// A subscription filter for `query` (spec §4.3, §6 — NIP-01 shaped).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(rename = "#d", skip_serializing_if = "Option::is_none")]
    pub d_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Outcome of one blob-upload job against one server (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct ServerOutcome {
    pub server: String,
    pub success: bool,
    pub already_existed: bool,
    pub error: Option<String>,
}

impl ServerOutcome {
    pub fn is_ok(&self) -> bool {
        self.success || self.already_existed
    }
}

/// Outcome of one file across all configured servers, plus its published
/// path-mapping event id if any (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct FileOutcome {
    pub path: String,
    pub sha256: String,
    pub server_outcomes: Vec<ServerOutcome>,
    pub event_id: Option<String>,
    pub success: bool,
}

impl FileOutcome {
    /// Spec §4.7/§8 policy: successful iff at least one server reports
    /// success or already_existed; an all-failed set of outcomes is a
    /// failure even if non-empty.
    pub fn blob_successful(&self) -> bool {
        !self.server_outcomes.is_empty() && self.server_outcomes.iter().any(ServerOutcome::is_ok)
    }
}

/// Outcome of publishing one event to one relay (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct RelayOutcome {
    pub relay: String,
    pub accepted: bool,
    pub message: Option<String>,
}
