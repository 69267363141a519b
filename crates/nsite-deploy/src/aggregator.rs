//! Outcome Aggregator (spec §4.9)

use std::collections::HashMap;

use nsite_core::FileOutcome;

use crate::publisher::PublishedFile;

#[derive(Debug, Clone, Default)]
pub struct ServerTally {
    pub success: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RelayTally {
    pub accepted: u32,
    pub total: u32,
}

/// The only human-visible report the engine produces; every other component
/// feeds this one structured events instead of printing anything itself.
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub files_succeeded: u32,
    pub files_failed: u32,
    pub failed_file_paths: Vec<String>,
    pub server_tally: HashMap<String, ServerTally>,
    pub relay_tally: HashMap<String, RelayTally>,
    pub manifest_published: bool,
    pub manifest_accepted_by_any: bool,
    pub deleted_paths: Vec<String>,
    pub errors: Vec<String>,
}

impl DeployReport {
    /// spec §7: exit code reflects whether any file failed or any manifest
    /// publish produced zero OKs across all relays.
    pub fn is_success(&self) -> bool {
        self.files_failed == 0 && (!self.manifest_published || self.manifest_accepted_by_any)
    }

    pub fn record_file_outcomes(&mut self, outcomes: &[FileOutcome]) {
        for outcome in outcomes {
            if outcome.success {
                self.files_succeeded += 1;
            } else {
                self.files_failed += 1;
                self.failed_file_paths.push(outcome.path.clone());
            }
            for server_outcome in &outcome.server_outcomes {
                let tally = self.server_tally.entry(server_outcome.server.clone()).or_default();
                tally.total += 1;
                if server_outcome.is_ok() {
                    tally.success += 1;
                }
            }
        }
    }

    pub fn record_published_files(&mut self, published: &[PublishedFile]) {
        for file in published {
            for outcome in &file.relay_outcomes {
                let tally = self.relay_tally.entry(outcome.relay.clone()).or_default();
                tally.total += 1;
                if outcome.accepted {
                    tally.accepted += 1;
                }
            }
        }
    }

    pub fn record_manifest(&mut self, accepted_by_any: bool) {
        self.manifest_published = true;
        self.manifest_accepted_by_any = accepted_by_any;
    }

    pub fn record_deletion(&mut self, path: String) {
        self.deleted_paths.push(path);
    }

    pub fn record_error(&mut self, message: String) {
        self.errors.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsite_core::ServerOutcome;

    #[test]
    fn success_false_when_any_file_failed() {
        let mut report = DeployReport::default();
        report.record_file_outcomes(&[FileOutcome {
            path: "/a".into(),
            sha256: "h".into(),
            server_outcomes: vec![ServerOutcome {
                server: "s1".into(),
                success: false,
                already_existed: false,
                error: Some("500".into()),
            }],
            event_id: None,
            success: false,
        }]);
        assert!(!report.is_success());
        assert_eq!(report.files_failed, 1);
    }

    #[test]
    fn success_false_when_manifest_gets_zero_oks() {
        let mut report = DeployReport::default();
        report.record_manifest(false);
        assert!(!report.is_success());
    }

    #[test]
    fn success_true_with_no_failures_and_no_manifest() {
        let report = DeployReport::default();
        assert!(report.is_success());
    }
}
