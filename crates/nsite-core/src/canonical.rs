//! Canonical event encoding (spec §6)
//!
//! The event id is the SHA-256 of the canonical form
//! `[0, pubkey, created_at, kind, tags, content]`, serialized with no
//! whitespace and with string escaping limited to `\n \r \t \" \\` and
//! `\u00XX` for control characters below 0x20. This is narrower than
//! `serde_json`'s default escaping (which also emits `\b`/`\f` for 0x08/0x0C),
//! so the preimage is hand-built rather than produced by a general-purpose
//! JSON serializer — the same reasoning the teacher applies to its own
//! postcard-based canonical encoding in `canonical_bytes`.

use sha2::{Digest, Sha256};

/// Escape a string per the canonical form's restricted rule set, including
/// the surrounding quotes.
pub fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn canonical_tags(tags: &[Vec<String>]) -> String {
    let parts: Vec<String> = tags
        .iter()
        .map(|tag| {
            let items: Vec<String> = tag.iter().map(|s| escape_json_string(s)).collect();
            format!("[{}]", items.join(","))
        })
        .collect();
    format!("[{}]", parts.join(","))
}

/// Build the canonical preimage string for id computation.
pub fn canonical_preimage(
    pubkey: &str,
    created_at: i64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> String {
    format!(
        "[0,{},{},{},{},{}]",
        escape_json_string(pubkey),
        created_at,
        kind,
        canonical_tags(tags),
        escape_json_string(content),
    )
}

/// Compute the 32-byte event id (spec §3: `id = sha256(canonical(...))`).
pub fn compute_event_id(
    pubkey: &str,
    created_at: i64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> [u8; 32] {
    let preimage = canonical_preimage(pubkey, created_at, kind, tags, content);
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    hasher.finalize().into()
}
