//! Site path normalization (spec §3, FileEntry.path)
//!
//! Two forms of every site path exist: a display form that preserves the
//! caller's casing (used in reports and manifests), and a comparison key
//! that is lowercased (used for map lookups and diffing). Both forms share
//! the same slash normalization: forward slashes, single leading slash, no
//! repeated internal slashes, no trailing slash.

/// Normalize slashes and ensure exactly one leading slash, preserving case.
pub fn normalize_display_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut collapsed = String::with_capacity(unified.len() + 1);
    let mut last_was_slash = false;
    for c in unified.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
            collapsed.push('/');
        } else {
            last_was_slash = false;
            collapsed.push(c);
        }
    }
    if !collapsed.starts_with('/') {
        collapsed.insert(0, '/');
    }
    if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    collapsed
}

/// Normalize and lowercase, for use as a comparison/map key.
pub fn normalize_key(path: &str) -> String {
    normalize_display_path(path).to_lowercase()
}

/// Normalizing a path twice yields the same result (spec §8 round-trip law).
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent() {
        let once = normalize_display_path("//a//B/c.html");
        let twice = normalize_display_path(&once);
        assert_eq!(once, twice);

        let key_once = normalize_key("//a//B/c.html");
        let key_twice = normalize_key(&key_once);
        assert_eq!(key_once, key_twice);
    }

    #[test]
    fn adds_leading_slash() {
        assert_eq!(normalize_display_path("index.html"), "/index.html");
    }

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(normalize_display_path("/a//b///c"), "/a/b/c");
    }

    #[test]
    fn strips_trailing_slash_but_keeps_root() {
        assert_eq!(normalize_display_path("/a/b/"), "/a/b");
        assert_eq!(normalize_display_path("/"), "/");
    }

    #[test]
    fn key_lowercases_but_display_preserves_case() {
        assert_eq!(normalize_display_path("/CSS/App.css"), "/CSS/App.css");
        assert_eq!(normalize_key("/CSS/App.css"), "/css/app.css");
    }

    #[test]
    fn backslashes_become_forward_slashes() {
        assert_eq!(normalize_display_path("a\\b\\c"), "/a/b/c");
    }
}
