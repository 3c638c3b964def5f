//! Sync run configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How remote filename collisions are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Ask the operator for every collision.
    Prompt,
    /// Keep the remote item, skip the local file.
    Skip,
    /// Remove the remote item and upload the local file.
    Replace,
}

/// Request-rate pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Pause between consecutive attach batches.
    pub between_batches: Duration,
    /// Pause after every this many files, except after the last one.
    pub every_n_files: usize,
    /// Length of the per-N-files pause.
    pub file_pause: Duration,
}

impl Pacing {
    /// No pauses at all.
    pub fn none() -> Self {
        Self {
            between_batches: Duration::ZERO,
            every_n_files: 0,
            file_pause: Duration::ZERO,
        }
    }

    /// Whether to pause after the `done`-th of `total` files (1-based).
    pub fn pause_after(&self, done: usize, total: usize) -> bool {
        self.every_n_files > 0
            && !self.file_pause.is_zero()
            && done % self.every_n_files == 0
            && done < total
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_batches: Duration::from_secs(1),
            every_n_files: 20,
            file_pause: Duration::from_secs(2),
        }
    }
}

/// Configuration for a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Skip files already recorded in the ledger.
    pub skip_existing: bool,
    /// Print the plan without any remote call or ledger write.
    pub dry_run: bool,
    /// Collision handling.
    pub duplicate_policy: DuplicatePolicy,
    /// Rate-limit pauses.
    pub pacing: Pacing,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            skip_existing: true,
            dry_run: false,
            duplicate_policy: DuplicatePolicy::Prompt,
            pacing: Pacing::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.skip_existing);
        assert!(!config.dry_run);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Prompt);
        assert_eq!(config.pacing.every_n_files, 20);
    }

    #[test]
    fn test_pause_after_every_twenty_but_not_last() {
        let pacing = Pacing::default();
        assert!(!pacing.pause_after(19, 45));
        assert!(pacing.pause_after(20, 45));
        assert!(pacing.pause_after(40, 45));
        assert!(!pacing.pause_after(40, 40));
        assert!(!Pacing::none().pause_after(20, 45));
    }

    #[test]
    fn test_policy_serialization() {
        let json = serde_json::to_string(&DuplicatePolicy::Replace).unwrap();
        assert_eq!(json, "\"replace\"");
    }
}
