//! Latest known display state of a host.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::cmp::Ordering;

const TEST_MARKERS: [&str; 2] = ["тестовая", "test"];
const PRODUCTION_MARKERS: [&str; 2] = ["продакшн", "production"];

/// Environment inferred from the backend's free-form status label.
///
/// Drives display color only, never behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Test,
    Production,
    Other,
}

impl Environment {
    /// Test markers win over production markers when a label carries both.
    pub fn classify(label: &str) -> Self {
        let lower = label.to_lowercase();
        if TEST_MARKERS.iter().any(|m| lower.contains(m)) {
            Environment::Test
        } else if PRODUCTION_MARKERS.iter().any(|m| lower.contains(m)) {
            Environment::Production
        } else {
            Environment::Other
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
            Environment::Other => write!(f, "other"),
        }
    }
}

/// A backend timestamp, kept verbatim for display and parsed leniently for
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    parsed: Option<DateTime<Utc>>,
}

impl Timestamp {
    /// Accepts RFC 3339 or a naive `YYYY-MM-DD[T ]HH:MM:SS[.fff]`, read as UTC.
    pub fn parse(raw: &str) -> Self {
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                    .map(|naive| naive.and_utc())
            });
        Self {
            raw: raw.to_string(),
            parsed,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn at(&self) -> Option<DateTime<Utc>> {
        self.parsed
    }

    /// Display form: `YYYY-MM-DD HH:MM UTC` when parseable, the raw text otherwise.
    pub fn display(&self) -> String {
        match self.parsed {
            Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
            None => self.raw.clone(),
        }
    }
}

/// Which of the update/commit timestamps should be highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    UpdateNewer,
    CommitNewer,
    Equal,
    OnlyUpdate,
    OnlyCommit,
    Unknown,
}

/// Latest known display state for a host.
///
/// Fields are written only by the status projector; everything else reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    config_label: Option<String>,
    last_update: Option<Timestamp>,
    last_commit: Option<Timestamp>,
    commit_hash: Option<String>,
}

impl StatusSnapshot {
    pub fn config_label(&self) -> Option<&str> {
        self.config_label.as_deref()
    }

    pub fn last_update(&self) -> Option<&Timestamp> {
        self.last_update.as_ref()
    }

    pub fn last_commit(&self) -> Option<&Timestamp> {
        self.last_commit.as_ref()
    }

    pub fn commit_hash(&self) -> Option<&str> {
        self.commit_hash.as_deref()
    }

    /// First 8 characters of the commit hash.
    pub fn short_commit(&self) -> Option<&str> {
        self.commit_hash
            .as_deref()
            .map(|hash| match hash.char_indices().nth(8) {
                Some((idx, _)) => &hash[..idx],
                None => hash,
            })
    }

    pub fn environment(&self) -> Environment {
        self.config_label
            .as_deref()
            .map(Environment::classify)
            .unwrap_or(Environment::Other)
    }

    pub fn freshness(&self) -> Freshness {
        match (&self.last_update, &self.last_commit) {
            (Some(update), Some(commit)) => match (update.at(), commit.at()) {
                (Some(u), Some(c)) => match u.cmp(&c) {
                    Ordering::Greater => Freshness::UpdateNewer,
                    Ordering::Less => Freshness::CommitNewer,
                    Ordering::Equal => Freshness::Equal,
                },
                _ => Freshness::Unknown,
            },
            (Some(_), None) => Freshness::OnlyUpdate,
            (None, Some(_)) => Freshness::OnlyCommit,
            (None, None) => Freshness::Unknown,
        }
    }

    pub(super) fn set_config_label(&mut self, label: String) {
        self.config_label = Some(label);
    }

    pub(super) fn set_last_update(&mut self, raw: &str) {
        self.last_update = Some(Timestamp::parse(raw));
    }

    pub(super) fn set_last_commit(&mut self, raw: &str) {
        self.last_commit = Some(Timestamp::parse(raw));
    }

    pub(super) fn set_commit_hash(&mut self, hash: String) {
        self.commit_hash = Some(hash);
    }
}
