//! Shared protocol types and primitives for the deploy engine.
//!
//! Mirrors the split the teacher uses in `terrain-gossip-core`: wire/data
//! types, canonical encoding, and crypto each get their own module, with
//! `error` underpinning all of them.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod path;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    kind, Event, EventTemplate, FileEntry, FileOutcome, Filter, PathMap, RelayOutcome,
    ServerOutcome,
};
