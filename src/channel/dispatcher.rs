//! Operation dispatcher: turns a user action into exactly one outbound request.
//!
//! A request is split into [`begin`] (busy guard, enter `AwaitingConfirmation`,
//! hand back the prompt) and [`resolve`] (the user's answer). The connection is
//! checked only after the user confirms, so a host that drops while the prompt
//! is open still gets `NotConnected` instead of a queued send.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostdeck_common::{HostId, OperationKind, OperationRequest};
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::operation::{OperationPhase, OperationState};
use crate::errors::DispatchError;

/// Result of a resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request frame to transmit; the operation is now in flight.
    Sent { kind: OperationKind, payload: String },
    /// The user declined; nothing was sent.
    Declined(OperationKind),
}

/// Source of user confirmation for a pending operation.
///
/// Terminal binding: `ui::TerminalConfirm`. Unattended: [`AutoConfirm`].
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, host: &HostId, kind: OperationKind, prompt: &str) -> bool;
}

/// Approves every request (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _host: &HostId, _kind: OperationKind, _prompt: &str) -> bool {
        true
    }
}

/// Fixed answer, useful to script declines.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl Confirm for FixedAnswer {
    async fn confirm(&self, _host: &HostId, _kind: OperationKind, _prompt: &str) -> bool {
        self.0
    }
}

/// Guard and enter `AwaitingConfirmation`. Returns the confirmation prompt.
///
/// Fails with `OperationBusy`, leaving the operation untouched, while another
/// request is awaiting confirmation or in flight.
pub fn begin(op: &mut OperationState, kind: OperationKind) -> Result<&'static str, DispatchError> {
    if let Err(e) = op.await_confirmation(kind) {
        warn!(requested = %kind, error = %e, "request rejected");
        return Err(e);
    }
    debug!(kind = %kind, "awaiting confirmation");
    Ok(kind.confirmation_prompt())
}

/// Apply the user's answer to the pending request.
///
/// Declining, or confirming while the connection is not open, returns the
/// operation to `Idle` with nothing sent.
pub fn resolve(
    op: &mut OperationState,
    conn: &ConnectionManager,
    approved: bool,
    now: DateTime<Utc>,
) -> Result<RequestOutcome, DispatchError> {
    let kind = match (op.phase(), op.kind()) {
        (OperationPhase::AwaitingConfirmation, Some(kind)) => kind,
        _ => return Err(DispatchError::NothingPending),
    };

    if !approved {
        op.cancel();
        info!(host = %conn.host_id(), kind = %kind, "request declined");
        return Ok(RequestOutcome::Declined(kind));
    }

    if !conn.is_open() {
        op.cancel();
        warn!(host = %conn.host_id(), kind = %kind, state = %conn.state(), "not connected, request dropped");
        return Err(DispatchError::NotConnected {
            host: conn.host_id().clone(),
            state: conn.state(),
        });
    }

    let payload = match OperationRequest::new(kind).to_json() {
        Ok(payload) => payload,
        Err(e) => {
            op.cancel();
            return Err(e.into());
        }
    };
    op.launch(now);
    info!(host = %conn.host_id(), kind = %kind, "request sent");
    Ok(RequestOutcome::Sent { kind, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::connection::ReconnectPolicy;
    use tokio::time::Instant;

    fn conn(open: bool) -> ConnectionManager {
        let mut conn = ConnectionManager::new(
            HostId::from("h1"),
            "ws://localhost:8000/ws/core/h1/".into(),
            ReconnectPolicy::default(),
        );
        if open {
            let attempt = conn.open(Instant::now()).unwrap();
            conn.on_open(attempt.generation);
        }
        conn
    }

    #[test]
    fn confirmed_request_sends_one_frame() {
        let conn = conn(true);
        let mut op = OperationState::default();

        let prompt = begin(&mut op, OperationKind::FastPull).unwrap();
        assert_eq!(prompt, OperationKind::FastPull.confirmation_prompt());

        let outcome = resolve(&mut op, &conn, true, Utc::now()).unwrap();
        assert_eq!(
            outcome,
            RequestOutcome::Sent {
                kind: OperationKind::FastPull,
                payload: r#"{"action":"fast_pull"}"#.into()
            }
        );
        assert_eq!(op.phase(), OperationPhase::InFlight);
        assert!(op.started_at().is_some());
    }

    #[test]
    fn decline_returns_to_idle() {
        let conn = conn(true);
        let mut op = OperationState::default();
        begin(&mut op, OperationKind::RestoreBackup).unwrap();
        let outcome = resolve(&mut op, &conn, false, Utc::now()).unwrap();
        assert_eq!(outcome, RequestOutcome::Declined(OperationKind::RestoreBackup));
        assert_eq!(op.phase(), OperationPhase::Idle);
    }

    #[test]
    fn confirm_while_disconnected_is_not_connected() {
        let conn = conn(false);
        let mut op = OperationState::default();
        begin(&mut op, OperationKind::ToggleDatabase).unwrap();

        let err = resolve(&mut op, &conn, true, Utc::now()).unwrap_err();
        assert!(matches!(err, DispatchError::NotConnected { .. }));
        assert_eq!(op.phase(), OperationPhase::Idle);
        assert!(op.started_at().is_none());
    }

    #[test]
    fn busy_while_in_flight() {
        let conn = conn(true);
        let mut op = OperationState::default();
        begin(&mut op, OperationKind::FastPull).unwrap();
        resolve(&mut op, &conn, true, Utc::now()).unwrap();

        let before = op.clone();
        let err = begin(&mut op, OperationKind::PullWithReload).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::OperationBusy {
                current: OperationKind::FastPull
            }
        ));
        assert_eq!(op, before);
    }

    #[test]
    fn resolve_without_begin_is_nothing_pending() {
        let conn = conn(true);
        let mut op = OperationState::default();
        assert!(matches!(
            resolve(&mut op, &conn, true, Utc::now()),
            Err(DispatchError::NothingPending)
        ));
    }

    #[tokio::test]
    async fn auto_and_fixed_confirmers() {
        let host = HostId::from("h1");
        assert!(
            AutoConfirm
                .confirm(&host, OperationKind::FastPull, "sure?")
                .await
        );
        assert!(
            !FixedAnswer(false)
                .confirm(&host, OperationKind::FastPull, "sure?")
                .await
        );
    }
}
