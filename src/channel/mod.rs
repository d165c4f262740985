//! Host operation channel.
//!
//! [`HostChannel`] is the whole per-host state machine with no I/O: callers
//! feed it link events and clock ticks, and drain [`Output`]s describing what
//! to connect, transmit or close and which events to surface. The async
//! driver in [`crate::session`] is one such caller; the tests below are
//! another.

pub mod connection;
pub mod dispatcher;
pub mod operation;
pub mod projector;
pub mod status;

use chrono::{DateTime, Utc};
use hostdeck_common::{HostId, OperationKind};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub use connection::{
    BackendEndpoint, CloseOutcome, ConnectAttempt, ConnectionManager, ConnectionState,
    ReconnectPolicy, TimerEvent,
};
pub use dispatcher::{AutoConfirm, Confirm, FixedAnswer, RequestOutcome};
pub use operation::{OperationPhase, OperationState};
pub use status::{Environment, Freshness, StatusSnapshot, Timestamp};

use crate::errors::{ChannelError, DispatchError};

/// Close code sent when the client shuts a link down on purpose.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when a link dies without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

pub const CONNECTION_LOST: &str = "connection lost";
pub const CHANNEL_CLOSED: &str = "channel closed";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSettings {
    pub policy: ReconnectPolicy,
    /// How long a terminal result stays visible before the operation resets.
    pub display_window: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            display_window: Duration::from_secs(5),
        }
    }
}

/// Transient notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    /// Transport error on a live link; a close normally follows.
    ConnectionError(String),
    ConnectFailed {
        detail: String,
        retry_in: Duration,
    },
    ConnectTimeout {
        timeout: Duration,
        retry_in: Duration,
    },
    ConnectionLost {
        code: u16,
        reason: String,
        retry_in: Duration,
    },
    /// Backend error with no operation in flight.
    Notice(String),
    OperationDispatched(OperationKind),
    OperationAcknowledged {
        kind: OperationKind,
        message: String,
    },
    OperationSucceeded(OperationKind),
    OperationFailed {
        kind: OperationKind,
        detail: String,
    },
    OperationReset,
    Closed,
}

/// Snapshot of a channel, published after every input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelView {
    pub host_id: HostId,
    pub connection: ConnectionState,
    pub retry_count: u32,
    pub next_retry_delay: Duration,
    pub operation: OperationState,
    pub status: StatusSnapshot,
}

/// Work for the caller, drained through [`HostChannel::poll_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Start a connect attempt. Any previous link or attempt is obsolete.
    Connect(ConnectAttempt),
    /// Send one text frame on the open link.
    Transmit(String),
    /// Drop the current link or pending attempt, sending a close frame if a
    /// link is up.
    CloseLink { code: u16, reason: String },
    Event(ChannelEvent),
}

#[derive(Debug)]
pub struct HostChannel {
    conn: ConnectionManager,
    op: OperationState,
    status: StatusSnapshot,
    display_window: Duration,
    reset_at: Option<Instant>,
    outputs: VecDeque<Output>,
}

impl HostChannel {
    pub fn new(
        host_id: HostId,
        endpoint: &BackendEndpoint,
        settings: ChannelSettings,
    ) -> Result<Self, ChannelError> {
        let target = endpoint.target_for(&host_id)?;
        Ok(Self::with_target(host_id, target, settings))
    }

    pub fn with_target(host_id: HostId, target: String, settings: ChannelSettings) -> Self {
        Self {
            conn: ConnectionManager::new(host_id, target, settings.policy),
            op: OperationState::default(),
            status: StatusSnapshot::default(),
            display_window: settings.display_window,
            reset_at: None,
            outputs: VecDeque::new(),
        }
    }

    pub fn host_id(&self) -> &HostId {
        self.conn.host_id()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn operation(&self) -> &OperationState {
        &self.op
    }

    pub fn status(&self) -> &StatusSnapshot {
        &self.status
    }

    pub fn view(&self) -> ChannelView {
        ChannelView {
            host_id: self.conn.host_id().clone(),
            connection: self.conn.state(),
            retry_count: self.conn.retry_count(),
            next_retry_delay: self.conn.next_retry_delay(),
            operation: self.op.clone(),
            status: self.status.clone(),
        }
    }

    pub fn open(&mut self, now: Instant) {
        if let Some(attempt) = self.conn.open(now) {
            self.outputs.push_back(Output::Connect(attempt));
        }
    }

    /// Returns false when the attempt is stale and its link must be dropped.
    pub fn handle_open(&mut self, generation: u64) -> bool {
        if !self.conn.on_open(generation) {
            return false;
        }
        self.emit(ChannelEvent::Connected);
        true
    }

    pub fn handle_connect_failed(&mut self, generation: u64, detail: &str, now: Instant) {
        if let CloseOutcome::Reconnect { delay, .. } =
            self.conn.on_connect_failed(generation, detail, now)
        {
            self.emit(ChannelEvent::ConnectFailed {
                detail: detail.to_string(),
                retry_in: delay,
            });
        }
    }

    /// Apply one inbound text frame. A malformed frame changes nothing.
    pub fn handle_text(&mut self, raw: &str, now: Instant) -> Result<(), ChannelError> {
        let msg = self.conn.on_message(raw)?;
        let projection = projector::project(&mut self.status, &mut self.op, msg);
        if projection.settled {
            self.reset_at = Some(connection::deadline(now, self.display_window));
        }
        self.outputs
            .extend(projection.events.into_iter().map(Output::Event));
        Ok(())
    }

    pub fn handle_error(&mut self, detail: &str) {
        self.conn.on_error(detail);
        self.emit(ChannelEvent::ConnectionError(detail.to_string()));
    }

    pub fn handle_close(&mut self, code: u16, reason: &str, now: Instant) {
        let CloseOutcome::Reconnect { delay, .. } = self.conn.on_close(code, reason, now) else {
            return;
        };
        self.fail_in_flight(CONNECTION_LOST, now);
        self.emit(ChannelEvent::ConnectionLost {
            code,
            reason: reason.to_string(),
            retry_in: delay,
        });
    }

    /// Queue one raw text frame. Fails unless the link is Open.
    pub fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.conn.ensure_open()?;
        self.outputs.push_back(Output::Transmit(text));
        Ok(())
    }

    /// Guard and park a request until the user answers. Returns the prompt.
    pub fn begin_request(&mut self, kind: OperationKind) -> Result<&'static str, DispatchError> {
        let prompt = dispatcher::begin(&mut self.op, kind)?;
        self.reset_at = None;
        Ok(prompt)
    }

    pub fn resolve_request(
        &mut self,
        approved: bool,
        now: DateTime<Utc>,
    ) -> Result<RequestOutcome, DispatchError> {
        let outcome = dispatcher::resolve(&mut self.op, &self.conn, approved, now)?;
        if let RequestOutcome::Sent { kind, payload } = &outcome {
            self.outputs.push_back(Output::Transmit(payload.clone()));
            self.emit(ChannelEvent::OperationDispatched(*kind));
        }
        Ok(outcome)
    }

    /// Drop a pending confirmation without answering it.
    pub fn abandon_request(&mut self) -> Option<OperationKind> {
        let kind = self.op.cancel();
        if let Some(kind) = kind {
            debug!(host = %self.host_id(), kind = %kind, "pending confirmation abandoned");
        }
        kind
    }

    /// Begin and resolve in one step with a synchronous confirmation.
    pub fn request(
        &mut self,
        kind: OperationKind,
        confirm: impl FnOnce(&str) -> bool,
        now: DateTime<Utc>,
    ) -> Result<RequestOutcome, DispatchError> {
        let prompt = self.begin_request(kind)?;
        let approved = confirm(prompt);
        self.resolve_request(approved, now)
    }

    /// Caller-initiated shutdown. No reconnect follows.
    pub fn close(&mut self, now: Instant) {
        let was_live = self.conn.close();
        self.abandon_request();
        self.fail_in_flight(CHANNEL_CLOSED, now);
        self.reset_at = None;
        if was_live {
            self.outputs.push_back(Output::CloseLink {
                code: NORMAL_CLOSURE,
                reason: "closed by client".to_string(),
            });
        }
        self.emit(ChannelEvent::Closed);
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        match (self.conn.poll_timeout(), self.reset_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        match self.conn.handle_timeout(now) {
            Some(TimerEvent::ConnectTimedOut { timeout, retry_in }) => {
                self.outputs.push_back(Output::CloseLink {
                    code: NORMAL_CLOSURE,
                    reason: "connect timeout".to_string(),
                });
                self.emit(ChannelEvent::ConnectTimeout { timeout, retry_in });
            }
            Some(TimerEvent::Reconnect(attempt)) => {
                self.outputs.push_back(Output::Connect(attempt));
            }
            None => {}
        }
        if let Some(at) = self.reset_at
            && at <= now
        {
            self.reset_at = None;
            if self.op.reset() {
                debug!(host = %self.host_id(), "operation result cleared");
                self.emit(ChannelEvent::OperationReset);
            }
        }
    }

    pub fn poll_output(&mut self) -> Option<Output> {
        self.outputs.pop_front()
    }

    fn fail_in_flight(&mut self, detail: &str, now: Instant) {
        if let Some(kind) = self.op.fail(detail.to_string()) {
            info!(host = %self.host_id(), kind = %kind, detail, "in-flight operation abandoned");
            self.reset_at = Some(connection::deadline(now, self.display_window));
            self.emit(ChannelEvent::OperationFailed {
                kind,
                detail: detail.to_string(),
            });
        }
    }

    fn emit(&mut self, event: ChannelEvent) {
        self.outputs.push_back(Output::Event(event));
    }
}
