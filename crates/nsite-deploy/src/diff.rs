//! Diff Engine (spec §4.6)

use nsite_core::{FileEntry, PathMap};

/// The diff result. Immutable after construction (spec §3's DeploymentPlan
/// lifecycle note).
#[derive(Debug, Clone, Default)]
pub struct DeploymentPlan {
    pub to_upload: Vec<FileEntry>,
    pub unchanged: Vec<FileEntry>,
    pub to_delete: Vec<String>,
}

/// Compare local files against the remote path map.
///
/// With `force`, unchanged files are folded into `to_upload`. `to_delete` is
/// always computed but the caller only acts on it when `purge` is set
/// (spec §4.6: "with purge off, to_delete is empty" describes the acted-upon
/// set, not this structural diff, so purge gating happens at the publisher).
pub fn diff(local: Vec<FileEntry>, remote: &PathMap, force: bool) -> DeploymentPlan {
    let mut to_upload = Vec::new();
    let mut unchanged = Vec::new();

    let mut seen_paths = std::collections::HashSet::new();
    for entry in local {
        seen_paths.insert(entry.path.clone());
        let matches_remote = remote.get(&entry.path).map(|h| h == &entry.sha256).unwrap_or(false);
        if matches_remote && !force {
            unchanged.push(entry);
        } else {
            to_upload.push(entry);
        }
    }

    let to_delete: Vec<String> = remote
        .keys()
        .filter(|path| !seen_paths.contains(*path))
        .cloned()
        .collect();

    DeploymentPlan {
        to_upload,
        unchanged,
        to_delete,
    }
}

/// Whether the post-deploy manifest would differ from the last-known remote
/// mapping even when nothing was uploaded (SPEC_FULL §12.2 / spec §4.8's
/// "manifest republish is also performed when the upload set is empty but
/// the set of local files or the metadata differs from the prior
/// manifest"). `post_deploy` is the local-path -> sha256 set after the diff;
/// `remote` is what the last manifest/path-mappings actually say.
pub fn needs_manifest_republish(post_deploy: &PathMap, remote: &PathMap) -> bool {
    post_deploy != remote
}
