//! Connection lifecycle for one host.
//!
//! The manager never touches a socket. It records which connect attempt is
//! current, when the connect timeout and the next reconnect are due, and
//! whether the last close was requested by the caller. The session driver
//! performs the I/O and feeds the results back in.

use hostdeck_common::{HostId, InboundMessage};
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Fixed backend location every host channel connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub ws_path: String,
}

impl Default for BackendEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            secure: false,
            ws_path: "/ws/core/".to_string(),
        }
    }
}

impl BackendEndpoint {
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// `{ws|wss}://{host}:{port}{ws_path}{host_id}/`, with the host id encoded
    /// as a single path segment.
    pub fn target_for(&self, host_id: &HostId) -> Result<String, ChannelError> {
        let base = format!("{}://{}:{}/", self.scheme(), self.host, self.port);
        let mut url =
            Url::parse(&base).map_err(|e| ChannelError::InvalidTarget(format!("{base}: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ChannelError::InvalidTarget(base.clone()))?;
            segments.pop_if_empty();
            for segment in self.ws_path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
            segments.push(host_id.as_str());
            segments.push("");
        }
        Ok(url.to_string())
    }
}

/// Reconnect timing. `multiplier = 1.0` gives a constant delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub connect_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Multipliers above this are treated as this.
    pub const MAX_MULTIPLIER: f64 = 10.0;

    fn next_delay(&self, current: Duration) -> Duration {
        let cap = self.max_delay.max(self.base_delay);
        let factor = self.multiplier.clamp(1.0, Self::MAX_MULTIPLIER);
        Duration::try_from_secs_f64(current.as_secs_f64() * factor).map_or(cap, |d| d.min(cap))
    }
}

/// Deadlines never land further out than this.
const MAX_DEADLINE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// `now + after`, saturating instead of overflowing.
pub(crate) fn deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after.min(MAX_DEADLINE)).unwrap_or(now)
}

/// One connect attempt the driver should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub generation: u64,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Failure close; a reconnect is scheduled.
    Reconnect { delay: Duration, attempt: u32 },
    /// Already closed by the caller, or a stale attempt.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    ConnectTimedOut { timeout: Duration, retry_in: Duration },
    Reconnect(ConnectAttempt),
}

#[derive(Debug)]
pub struct ConnectionManager {
    host_id: HostId,
    target: String,
    policy: ReconnectPolicy,
    state: ConnectionState,
    generation: u64,
    retry_count: u32,
    next_retry_delay: Duration,
    connect_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl ConnectionManager {
    pub fn new(host_id: HostId, target: String, policy: ReconnectPolicy) -> Self {
        Self {
            host_id,
            target,
            next_retry_delay: policy.base_delay,
            policy,
            state: ConnectionState::Closed,
            generation: 0,
            retry_count: 0,
            connect_deadline: None,
            reconnect_at: None,
        }
    }

    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn next_retry_delay(&self) -> Duration {
        self.next_retry_delay
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a connect attempt. No-op while already open or connecting.
    pub fn open(&mut self, now: Instant) -> Option<ConnectAttempt> {
        if matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            debug!(host = %self.host_id, state = %self.state, "open ignored");
            return None;
        }
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.reconnect_at = None;
        self.connect_deadline = Some(deadline(now, self.policy.connect_timeout));
        info!(
            host = %self.host_id,
            target = %self.target,
            attempt = self.generation,
            "connecting"
        );
        Some(ConnectAttempt {
            generation: self.generation,
            target: self.target.clone(),
        })
    }

    /// The attempt `generation` reached the backend. Returns false for a stale
    /// attempt, whose link the driver must discard.
    pub fn on_open(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            debug!(host = %self.host_id, generation, "stale connect completion dropped");
            return false;
        }
        self.state = ConnectionState::Open;
        self.retry_count = 0;
        self.next_retry_delay = self.policy.base_delay;
        self.connect_deadline = None;
        self.reconnect_at = None;
        info!(host = %self.host_id, "connected");
        true
    }

    /// Parse one text frame. Malformed frames are logged and reported, never applied.
    pub fn on_message(&self, raw: &str) -> Result<InboundMessage, ChannelError> {
        InboundMessage::parse(raw).map_err(|e| {
            warn!(host = %self.host_id, error = %e, payload = %raw, "dropping malformed message");
            ChannelError::MalformedMessage(e)
        })
    }

    /// Transport error. State is left to the close that follows.
    pub fn on_error(&self, detail: &str) {
        warn!(host = %self.host_id, state = %self.state, detail, "connection error");
    }

    pub fn on_close(&mut self, code: u16, reason: &str, now: Instant) -> CloseOutcome {
        match self.state {
            ConnectionState::Closed | ConnectionState::Reconnecting => {
                debug!(host = %self.host_id, code, "close after teardown ignored");
                CloseOutcome::Ignored
            }
            ConnectionState::Open | ConnectionState::Connecting => {
                warn!(host = %self.host_id, code, reason, "connection closed unexpectedly");
                self.schedule_retry(now)
            }
        }
    }

    /// The attempt `generation` failed before reaching Open.
    pub fn on_connect_failed(&mut self, generation: u64, detail: &str, now: Instant) -> CloseOutcome {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            return CloseOutcome::Ignored;
        }
        warn!(host = %self.host_id, detail, "connect attempt failed");
        self.schedule_retry(now)
    }

    pub fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ChannelError::NotOpen { state: self.state })
        }
    }

    /// Caller-initiated shutdown. Cancels both timers; a later close or
    /// error from the old link is ignored. Returns true when a link or
    /// attempt was live.
    pub fn close(&mut self) -> bool {
        let was_live = matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        );
        self.state = ConnectionState::Closed;
        self.connect_deadline = None;
        self.reconnect_at = None;
        info!(host = %self.host_id, "closed by caller");
        was_live
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        match (self.connect_deadline, self.reconnect_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Option<TimerEvent> {
        if let Some(deadline) = self.connect_deadline
            && deadline <= now
            && self.state == ConnectionState::Connecting
        {
            warn!(
                host = %self.host_id,
                timeout = ?self.policy.connect_timeout,
                "connect timed out"
            );
            let CloseOutcome::Reconnect { delay, .. } = self.schedule_retry(now) else {
                return None;
            };
            return Some(TimerEvent::ConnectTimedOut {
                timeout: self.policy.connect_timeout,
                retry_in: delay,
            });
        }
        if let Some(at) = self.reconnect_at
            && at <= now
            && self.state == ConnectionState::Reconnecting
        {
            self.reconnect_at = None;
            self.state = ConnectionState::Closed;
            return self.open(now).map(TimerEvent::Reconnect);
        }
        None
    }

    fn schedule_retry(&mut self, now: Instant) -> CloseOutcome {
        let delay = self.next_retry_delay;
        self.state = ConnectionState::Reconnecting;
        self.connect_deadline = None;
        self.retry_count += 1;
        self.reconnect_at = Some(deadline(now, delay));
        self.next_retry_delay = self.policy.next_delay(delay);
        info!(
            host = %self.host_id,
            attempt = self.retry_count,
            delay = ?delay,
            "reconnect scheduled"
        );
        CloseOutcome::Reconnect {
            delay,
            attempt: self.retry_count,
        }
    }
}
