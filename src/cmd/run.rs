//! Single operation command (`hostdeck run`).

use anyhow::{Result, bail};
use console::style;
use hostdeck::channel::{AutoConfirm, ChannelEvent, Confirm, HostChannel, RequestOutcome};
use hostdeck::config::HostdeckConfig;
use hostdeck::errors::DispatchError;
use hostdeck::session::{HostSession, WsConnector};
use hostdeck::ui::TerminalConfirm;
use hostdeck::ui::icons::{CHECK, CROSS};
use hostdeck_common::{HostId, OperationKind};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

enum Outcome {
    Succeeded(OperationKind),
    Failed(String),
    TimedOut,
}

pub async fn cmd_run(
    config: &HostdeckConfig,
    host: &str,
    action: &str,
    yes: bool,
    wait_secs: u64,
) -> Result<()> {
    let kind: OperationKind = action.parse()?;
    let wait = Duration::from_secs(wait_secs);
    let host = HostId::from(host);

    let channel = HostChannel::new(
        host.clone(),
        &config.toml.endpoint(),
        config.toml.channel_settings(),
    )?;
    let session = HostSession::spawn(channel, Arc::new(WsConnector));

    if session.wait_for_open(wait).await.is_none() {
        let view = session.view();
        session.close().await;
        bail!(
            "Host {} not reachable after {}s (state: {}, attempts: {})",
            host,
            wait_secs,
            view.connection,
            view.retry_count
        );
    }

    let confirm: Arc<dyn Confirm> = if yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(TerminalConfirm)
    };
    let mut events = session.subscribe();
    let outcome = match session.request(kind, confirm).await {
        Ok(outcome) => outcome,
        Err(e) => {
            session.close().await;
            return Err(e.into());
        }
    };
    if let RequestOutcome::Declined(_) = outcome {
        println!("Cancelled.");
        session.close().await;
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {prefix:.bold} {msg}")
            .expect("progress bar template is a valid static string"),
    );
    spinner.set_prefix(kind.label());
    spinner.set_message("sent");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);
    let result = loop {
        tokio::select! {
            _ = &mut deadline => break Outcome::TimedOut,
            event = events.recv() => match event {
                Ok(ChannelEvent::OperationAcknowledged { message, .. }) => {
                    spinner.set_message(message);
                }
                Ok(ChannelEvent::OperationSucceeded(kind)) => break Outcome::Succeeded(kind),
                Ok(ChannelEvent::OperationFailed { detail, .. }) => break Outcome::Failed(detail),
                Ok(ChannelEvent::ConnectionLost { code, .. }) => {
                    spinner.set_message(format!("connection lost (code {code})"));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break Outcome::Failed("session ended".to_string()),
            }
        }
    };
    spinner.finish_and_clear();
    session.close().await;

    match result {
        Outcome::Succeeded(kind) => {
            println!("{}{}", CHECK, style(kind.success_message()).green());
            Ok(())
        }
        Outcome::Failed(detail) => {
            println!("{}{}: {}", CROSS, style(kind.failure_message()).red(), detail);
            Err(DispatchError::OperationFailed { kind, detail }.into())
        }
        Outcome::TimedOut => bail!(
            "No outcome for {} on host {} after {}s",
            kind,
            host,
            wait_secs
        ),
    }
}
