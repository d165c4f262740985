use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A user-triggerable maintenance action on a host.
///
/// | Kind             | Request action       | Lifecycle tag prefixes           |
/// |------------------|----------------------|----------------------------------|
/// | `ToggleDatabase` | `toggle_mongo`       | `toggle_mongo`, `toggle`         |
/// | `RestoreBackup`  | `restore_backup`     | `restore_backup`, `restore`      |
/// | `FastPull`       | `fast_pull`          | `fast_pull`                      |
/// | `PullWithReload` | `pull_with_reload`   | `pull_with_reload`               |
///
/// The backend reports lifecycle progress for the first two kinds under their
/// short prefixes (`toggle_started`, `restore_failed`, ...), so both spellings
/// are accepted when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "toggle_mongo")]
    ToggleDatabase,
    #[serde(rename = "restore_backup")]
    RestoreBackup,
    #[serde(rename = "fast_pull")]
    FastPull,
    #[serde(rename = "pull_with_reload")]
    PullWithReload,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ToggleDatabase,
        OperationKind::RestoreBackup,
        OperationKind::FastPull,
        OperationKind::PullWithReload,
    ];

    /// Value of the `action` field in an outbound request.
    pub fn action(self) -> &'static str {
        match self {
            OperationKind::ToggleDatabase => "toggle_mongo",
            OperationKind::RestoreBackup => "restore_backup",
            OperationKind::FastPull => "fast_pull",
            OperationKind::PullWithReload => "pull_with_reload",
        }
    }

    /// Prefix the backend uses for this kind's lifecycle tags.
    pub fn tag_prefix(self) -> &'static str {
        match self {
            OperationKind::ToggleDatabase => "toggle",
            OperationKind::RestoreBackup => "restore",
            OperationKind::FastPull => "fast_pull",
            OperationKind::PullWithReload => "pull_with_reload",
        }
    }

    /// True when `prefix` names this kind in a lifecycle tag.
    pub fn matches_tag_prefix(self, prefix: &str) -> bool {
        prefix == self.action() || prefix == self.tag_prefix()
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationKind::ToggleDatabase => "Toggle database",
            OperationKind::RestoreBackup => "Restore backup",
            OperationKind::FastPull => "Fast pull",
            OperationKind::PullWithReload => "Pull with reload",
        }
    }

    pub fn confirmation_prompt(self) -> &'static str {
        match self {
            OperationKind::ToggleDatabase => {
                "Switch the database? The service may be briefly unavailable."
            }
            OperationKind::RestoreBackup => {
                "Restore the PostgreSQL dump? Current database contents will be overwritten."
            }
            OperationKind::FastPull => "Pull the latest code without restarting containers?",
            OperationKind::PullWithReload => "Pull the latest code and redeploy all containers?",
        }
    }

    pub fn started_message(self) -> &'static str {
        match self {
            OperationKind::ToggleDatabase => "Switching database...",
            OperationKind::RestoreBackup => "Restoring PostgreSQL dump...",
            OperationKind::FastPull => "Running git pull...",
            OperationKind::PullWithReload => "Pulling and redeploying...",
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            OperationKind::ToggleDatabase => "Database switched",
            OperationKind::RestoreBackup => "PostgreSQL dump restored",
            OperationKind::FastPull => "Git pull completed",
            OperationKind::PullWithReload => "Pull and redeploy completed",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            OperationKind::ToggleDatabase => "Database switch failed",
            OperationKind::RestoreBackup => "Dump restore failed",
            OperationKind::FastPull => "Git pull failed",
            OperationKind::PullWithReload => "Pull and redeploy failed",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation '{0}'. Valid values: toggle_mongo, restore_backup, fast_pull, pull_with_reload")]
pub struct ParseOperationKindError(pub String);

impl FromStr for OperationKind {
    type Err = ParseOperationKindError;

    /// Accepts request actions, tag prefixes, and their kebab-case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.matches_tag_prefix(&normalized))
            .ok_or_else(|| ParseOperationKindError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_request_actions() {
        for kind in OperationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.action()));
        }
    }

    #[test]
    fn parses_actions_aliases_and_kebab_case() {
        assert_eq!("toggle_mongo".parse::<OperationKind>(), Ok(OperationKind::ToggleDatabase));
        assert_eq!("toggle".parse::<OperationKind>(), Ok(OperationKind::ToggleDatabase));
        assert_eq!("restore".parse::<OperationKind>(), Ok(OperationKind::RestoreBackup));
        assert_eq!("Fast-Pull".parse::<OperationKind>(), Ok(OperationKind::FastPull));
        assert_eq!(
            "pull-with-reload".parse::<OperationKind>(),
            Ok(OperationKind::PullWithReload)
        );
    }

    #[test]
    fn rejects_unknown_operation() {
        let err = "reboot".parse::<OperationKind>().unwrap_err();
        assert_eq!(err.0, "reboot");
        assert!(err.to_string().contains("toggle_mongo"));
    }

    #[test]
    fn prompts_are_distinct_per_kind() {
        let prompts: std::collections::HashSet<_> = OperationKind::ALL
            .iter()
            .map(|k| k.confirmation_prompt())
            .collect();
        assert_eq!(prompts.len(), OperationKind::ALL.len());
    }
}
