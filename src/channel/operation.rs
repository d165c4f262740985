//! Per-host operation lifecycle.
//!
//! ```text
//! Idle ──begin──▶ AwaitingConfirmation ──confirm──▶ InFlight ──▶ Succeeded ─┐
//!   ▲                    │ decline / not connected          └──▶ Failed ────┤
//!   └────────────────────┴──────────── display window / next request ◀──────┘
//! ```
//!
//! Only the dispatcher moves an operation into `AwaitingConfirmation` or
//! `InFlight`; only the projector (or a lost connection) settles it.

use chrono::{DateTime, Utc};
use hostdeck_common::OperationKind;

use crate::errors::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    Idle,
    AwaitingConfirmation,
    InFlight,
    Succeeded,
    Failed,
}

impl std::fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationPhase::Idle => write!(f, "idle"),
            OperationPhase::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            OperationPhase::InFlight => write!(f, "in flight"),
            OperationPhase::Succeeded => write!(f, "succeeded"),
            OperationPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationState {
    kind: Option<OperationKind>,
    phase: OperationPhase,
    started_at: Option<DateTime<Utc>>,
    error_detail: Option<String>,
    progress: Option<String>,
}

impl Default for OperationState {
    fn default() -> Self {
        Self {
            kind: None,
            phase: OperationPhase::Idle,
            started_at: None,
            error_detail: None,
            progress: None,
        }
    }
}

impl OperationState {
    pub fn kind(&self) -> Option<OperationKind> {
        self.kind
    }

    pub fn phase(&self) -> OperationPhase {
        self.phase
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Latest progress text reported by the backend for the in-flight operation.
    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase == OperationPhase::InFlight
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            OperationPhase::Succeeded | OperationPhase::Failed
        )
    }

    /// The kind currently in flight, if any.
    pub fn in_flight_kind(&self) -> Option<OperationKind> {
        if self.is_in_flight() { self.kind } else { None }
    }

    pub(super) fn await_confirmation(&mut self, kind: OperationKind) -> Result<(), DispatchError> {
        match self.phase {
            OperationPhase::Idle | OperationPhase::Succeeded | OperationPhase::Failed => {
                *self = Self {
                    kind: Some(kind),
                    phase: OperationPhase::AwaitingConfirmation,
                    ..Self::default()
                };
                Ok(())
            }
            OperationPhase::AwaitingConfirmation | OperationPhase::InFlight => {
                Err(DispatchError::OperationBusy {
                    current: self.kind.unwrap_or(kind),
                })
            }
        }
    }

    /// Drop a pending confirmation. Returns the abandoned kind.
    pub(super) fn cancel(&mut self) -> Option<OperationKind> {
        if self.phase != OperationPhase::AwaitingConfirmation {
            return None;
        }
        let kind = self.kind;
        *self = Self::default();
        kind
    }

    pub(super) fn launch(&mut self, started_at: DateTime<Utc>) -> Option<OperationKind> {
        if self.phase != OperationPhase::AwaitingConfirmation {
            return None;
        }
        self.phase = OperationPhase::InFlight;
        self.started_at = Some(started_at);
        self.kind
    }

    pub(super) fn note_progress(&mut self, message: String) {
        if self.is_in_flight() {
            self.progress = Some(message);
        }
    }

    pub(super) fn succeed(&mut self) -> Option<OperationKind> {
        if !self.is_in_flight() {
            return None;
        }
        self.phase = OperationPhase::Succeeded;
        self.error_detail = None;
        self.progress = None;
        self.kind
    }

    pub(super) fn fail(&mut self, detail: String) -> Option<OperationKind> {
        if !self.is_in_flight() {
            return None;
        }
        self.phase = OperationPhase::Failed;
        self.error_detail = Some(detail);
        self.progress = None;
        self.kind
    }

    /// Clear a displayed terminal result.
    pub(super) fn reset(&mut self) -> bool {
        if !self.is_terminal() {
            return false;
        }
        *self = Self::default();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_flight(kind: OperationKind) -> OperationState {
        let mut op = OperationState::default();
        op.await_confirmation(kind).unwrap();
        op.launch(Utc::now());
        op
    }

    #[test]
    fn full_success_path() {
        let mut op = OperationState::default();
        op.await_confirmation(OperationKind::FastPull).unwrap();
        assert_eq!(op.phase(), OperationPhase::AwaitingConfirmation);
        assert!(op.started_at().is_none());

        assert_eq!(op.launch(Utc::now()), Some(OperationKind::FastPull));
        assert!(op.is_in_flight());
        assert!(op.started_at().is_some());

        assert_eq!(op.succeed(), Some(OperationKind::FastPull));
        assert_eq!(op.phase(), OperationPhase::Succeeded);
        assert!(op.error_detail().is_none());

        assert!(op.reset());
        assert_eq!(op, OperationState::default());
    }

    #[test]
    fn busy_while_in_flight_or_awaiting() {
        let mut op = in_flight(OperationKind::RestoreBackup);
        let before = op.clone();
        let err = op.await_confirmation(OperationKind::FastPull).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::OperationBusy {
                current: OperationKind::RestoreBackup
            }
        ));
        assert_eq!(op, before);

        let mut pending = OperationState::default();
        pending.await_confirmation(OperationKind::FastPull).unwrap();
        assert!(pending
            .await_confirmation(OperationKind::ToggleDatabase)
            .is_err());
    }

    #[test]
    fn terminal_phases_accept_a_new_request() {
        let mut op = in_flight(OperationKind::FastPull);
        op.fail("boom".into());
        assert_eq!(op.error_detail(), Some("boom"));

        op.await_confirmation(OperationKind::PullWithReload).unwrap();
        assert_eq!(op.kind(), Some(OperationKind::PullWithReload));
        assert!(op.error_detail().is_none());
    }

    #[test]
    fn settling_requires_in_flight() {
        let mut op = OperationState::default();
        assert_eq!(op.succeed(), None);
        assert_eq!(op.fail("x".into()), None);
        assert!(!op.reset());
        assert_eq!(op, OperationState::default());
    }

    #[test]
    fn cancel_only_drops_pending_confirmation() {
        let mut op = in_flight(OperationKind::FastPull);
        assert_eq!(op.cancel(), None);
        assert!(op.is_in_flight());

        let mut pending = OperationState::default();
        pending.await_confirmation(OperationKind::ToggleDatabase).unwrap();
        assert_eq!(pending.cancel(), Some(OperationKind::ToggleDatabase));
        assert_eq!(pending.phase(), OperationPhase::Idle);
    }
}
