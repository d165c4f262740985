use async_trait::async_trait;
use console::style;
use dialoguer::Confirm as Prompt;
use dialoguer::theme::ColorfulTheme;
use hostdeck_common::{HostId, OperationKind};
use tracing::warn;

use crate::channel::Confirm;

/// Asks on the terminal. Any prompt failure (no tty, ctrl-c) counts as a decline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirm;

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, host: &HostId, kind: OperationKind, prompt: &str) -> bool {
        let text = format!("{} {}", style(format!("[host {host}]")).bold(), prompt);
        let answer = tokio::task::spawn_blocking(move || {
            Prompt::with_theme(&ColorfulTheme::default())
                .with_prompt(text)
                .default(false)
                .interact()
        })
        .await;
        match answer {
            Ok(Ok(approved)) => approved,
            Ok(Err(e)) => {
                warn!(host = %host, action = %kind, error = %e, "confirmation prompt failed");
                false
            }
            Err(e) => {
                warn!(host = %host, action = %kind, error = %e, "confirmation task panicked");
                false
            }
        }
    }
}
