use console::{StyledObject, style};
use hostdeck_common::HostId;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::channel::{
    ChannelEvent, ChannelView, ConnectionState, Environment, Freshness, OperationPhase,
    StatusSnapshot,
};
use crate::ui::icons::{
    CHECK, CLOCK, COMMIT, CROSS, LINK_DOWN, LINK_RETRY, LINK_UP, QUESTION, RUNNING,
};

const PLACEHOLDER: &str = "-";

/// One spinner line per host, rendered via `indicatif`'s `MultiProgress`.
///
/// Hosts are added lazily the first time a view for them arrives and stay
/// in arrival order.
pub struct FleetCards {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: BTreeMap<HostId, ProgressBar>,
}

impl FleetCards {
    pub fn new() -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        Self {
            multi: MultiProgress::new(),
            style,
            bars: BTreeMap::new(),
        }
    }

    /// Redraw the card for every view given.
    pub fn update(&mut self, views: &[ChannelView]) {
        for view in views {
            let bar = self
                .bars
                .entry(view.host_id.clone())
                .or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new_spinner());
                    bar.set_style(self.style.clone());
                    bar.set_prefix(format!("host {}", view.host_id));
                    bar.enable_steady_tick(Duration::from_millis(120));
                    bar
                });
            bar.set_message(card_line(view));
        }
    }

    /// Print a line above the cards, falling back to `eprintln!` if the
    /// terminal is unavailable.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Stop every spinner, leaving the last message on screen.
    pub fn finish(&self) {
        for bar in self.bars.values() {
            bar.finish();
        }
    }
}

impl Default for FleetCards {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one host as a single styled line:
/// connection, environment label, update/commit times, commit hash, operation.
pub fn card_line(view: &ChannelView) -> String {
    let mut parts = vec![connection_part(view), label_part(&view.status)];
    parts.extend(timestamps_part(&view.status));
    parts.push(format!(
        "{}{}",
        COMMIT,
        view.status.short_commit().unwrap_or(PLACEHOLDER)
    ));
    if let Some(op) = operation_part(view) {
        parts.push(op);
    }
    parts.join("  ")
}

/// A one-off line for events worth printing above the cards.
///
/// Returns `None` for events the cards already show.
pub fn event_line(host: &HostId, event: &ChannelEvent) -> Option<String> {
    let prefix = style(format!("[host {host}]")).bold();
    let body = match event {
        ChannelEvent::Connected => format!("{}connected", LINK_UP),
        ChannelEvent::ConnectFailed { detail, retry_in } => format!(
            "{}connect failed: {} {}",
            LINK_DOWN,
            detail,
            style(format!("(retry in {}s)", retry_in.as_secs())).dim()
        ),
        ChannelEvent::ConnectTimeout { timeout, retry_in } => format!(
            "{}no connection after {}s {}",
            LINK_DOWN,
            timeout.as_secs(),
            style(format!("(retry in {}s)", retry_in.as_secs())).dim()
        ),
        ChannelEvent::ConnectionLost { code, retry_in, .. } => format!(
            "{}connection lost (code {}) {}",
            LINK_DOWN,
            code,
            style(format!("(retry in {}s)", retry_in.as_secs())).dim()
        ),
        ChannelEvent::Notice(message) => format!("{}{}", CROSS, style(message).red()),
        ChannelEvent::OperationSucceeded(kind) => {
            format!("{}{}", CHECK, style(kind.success_message()).green())
        }
        ChannelEvent::OperationFailed { kind, detail } => {
            format!("{}{}: {}", CROSS, style(kind.failure_message()).red(), detail)
        }
        ChannelEvent::ConnectionError(_)
        | ChannelEvent::OperationDispatched(_)
        | ChannelEvent::OperationAcknowledged { .. }
        | ChannelEvent::OperationReset
        | ChannelEvent::Closed => return None,
    };
    Some(format!("{} {}", prefix, body))
}

fn connection_part(view: &ChannelView) -> String {
    match view.connection {
        ConnectionState::Open => format!("{}{}", LINK_UP, style("open").green()),
        ConnectionState::Connecting => format!("{}{}", LINK_RETRY, style("connecting").yellow()),
        ConnectionState::Reconnecting => format!(
            "{}{} {}",
            LINK_RETRY,
            style("reconnecting").yellow(),
            style(format!("(attempt {})", view.retry_count)).dim()
        ),
        ConnectionState::Closed => format!("{}{}", LINK_DOWN, style("closed").red()),
    }
}

fn label_part(status: &StatusSnapshot) -> String {
    let label = status.config_label().unwrap_or(PLACEHOLDER);
    match status.environment() {
        Environment::Test => style(label).green().to_string(),
        Environment::Production => style(label).red().bold().to_string(),
        Environment::Other => style(label).dim().to_string(),
    }
}

fn timestamps_part(status: &StatusSnapshot) -> [String; 2] {
    let (update_hot, commit_hot) = match status.freshness() {
        Freshness::UpdateNewer | Freshness::OnlyUpdate => (true, false),
        Freshness::CommitNewer | Freshness::OnlyCommit => (false, true),
        Freshness::Equal | Freshness::Unknown => (false, false),
    };
    let update = status
        .last_update()
        .map(|t| t.display())
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    let commit = status
        .last_commit()
        .map(|t| t.display())
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    [
        format!("{}updated {}", CLOCK, highlight(update, update_hot)),
        format!("pulled {}", highlight(commit, commit_hot)),
    ]
}

fn highlight(text: String, hot: bool) -> StyledObject<String> {
    if hot {
        style(text).cyan().bold()
    } else {
        style(text)
    }
}

fn operation_part(view: &ChannelView) -> Option<String> {
    let op = &view.operation;
    let kind = op.kind()?;
    let line = match op.phase() {
        OperationPhase::Idle => return None,
        OperationPhase::AwaitingConfirmation => {
            format!("{}{} {}", QUESTION, kind.label(), style("awaiting confirmation").yellow())
        }
        OperationPhase::InFlight => {
            let progress = op.progress().unwrap_or("sent");
            format!("{}{} {}", RUNNING, style(kind.label()).yellow(), style(progress).dim())
        }
        OperationPhase::Succeeded => {
            format!("{}{}", CHECK, style(kind.success_message()).green())
        }
        OperationPhase::Failed => format!(
            "{}{}: {}",
            CROSS,
            style(kind.label()).red(),
            op.error_detail().unwrap_or(kind.failure_message())
        ),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelSettings, HostChannel, Output};
    use hostdeck_common::OperationKind;
    use tokio::time::Instant;

    fn open_channel() -> HostChannel {
        let mut ch = HostChannel::with_target(
            HostId::from("4"),
            "ws://localhost:8000/ws/core/4/".into(),
            ChannelSettings::default(),
        );
        ch.open(Instant::now());
        let Some(Output::Connect(attempt)) = ch.poll_output() else {
            panic!("expected connect");
        };
        assert!(ch.handle_open(attempt.generation));
        while ch.poll_output().is_some() {}
        ch
    }

    fn plain(view: &ChannelView) -> String {
        console::strip_ansi_codes(&card_line(view)).into_owned()
    }

    #[test]
    fn fresh_channel_shows_placeholders() {
        let ch = HostChannel::with_target(
            HostId::from("4"),
            "ws://localhost:8000/ws/core/4/".into(),
            ChannelSettings::default(),
        );
        let line = plain(&ch.view());
        assert!(line.contains("closed"));
        assert!(line.contains("updated -"));
        assert!(line.contains("pulled -"));
        assert!(!line.contains("awaiting"));
    }

    #[test]
    fn status_fields_are_rendered() {
        let mut ch = open_channel();
        ch.handle_text(
            r#"{"config_status":"Подключена продакшн Монго",
                "last_update":"2024-05-02T09:30:00Z",
                "last_commit":"2024-05-01T08:00:00Z",
                "commitHash":"0123456789abcdef"}"#,
            Instant::now(),
        )
        .unwrap();
        let line = plain(&ch.view());
        assert!(line.contains("open"));
        assert!(line.contains("Подключена продакшн Монго"));
        assert!(line.contains("updated 2024-05-02 09:30 UTC"));
        assert!(line.contains("pulled 2024-05-01 08:00 UTC"));
        assert!(line.contains("01234567"));
        assert!(!line.contains("89abcdef"));
    }

    #[test]
    fn operation_phase_is_rendered() {
        let mut ch = open_channel();
        ch.begin_request(OperationKind::FastPull).unwrap();
        assert!(plain(&ch.view()).contains("awaiting confirmation"));

        ch.resolve_request(true, chrono::Utc::now()).unwrap();
        let line = plain(&ch.view());
        assert!(line.contains(OperationKind::FastPull.label()));
        assert!(line.contains("sent"));

        ch.handle_text(r#"{"action":"fast_pull_failed","error":"disk full"}"#, Instant::now())
            .unwrap();
        assert!(plain(&ch.view()).contains("disk full"));
    }

    #[test]
    fn events_worth_a_line() {
        let host = HostId::from("4");
        let lost = ChannelEvent::ConnectionLost {
            code: 1006,
            reason: String::new(),
            retry_in: std::time::Duration::from_secs(3),
        };
        let line = console::strip_ansi_codes(&event_line(&host, &lost).unwrap()).into_owned();
        assert!(line.starts_with("[host 4]"));
        assert!(line.contains("code 1006"));
        assert!(line.contains("retry in 3s"));

        let failed = ChannelEvent::OperationFailed {
            kind: OperationKind::RestoreBackup,
            detail: "dump missing".into(),
        };
        assert!(event_line(&host, &failed).unwrap().contains("dump missing"));
        assert!(event_line(&host, &ChannelEvent::OperationReset).is_none());
        assert!(event_line(&host, &ChannelEvent::OperationDispatched(OperationKind::FastPull)).is_none());
    }

    #[test]
    fn reconnecting_shows_retry_count() {
        let mut ch = open_channel();
        ch.handle_close(1006, "", Instant::now());
        let line = plain(&ch.view());
        assert!(line.contains("reconnecting"));
        assert!(line.contains("(attempt 1)"));
    }
}
