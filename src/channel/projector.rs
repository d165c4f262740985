//! Status projector: applies one inbound frame to the host's display state.
//!
//! Status fields are always applied, whatever the operation is doing. A
//! lifecycle tag only moves the operation when it names the in-flight kind.

use hostdeck_common::{ActionTag, InboundMessage, LifecycleStage};
use tracing::{debug, info, warn};

use super::ChannelEvent;
use super::operation::OperationState;
use super::status::StatusSnapshot;

/// What one frame changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub events: Vec<ChannelEvent>,
    pub status_changed: bool,
    /// The in-flight operation reached Succeeded or Failed.
    pub settled: bool,
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

pub fn project(
    status: &mut StatusSnapshot,
    op: &mut OperationState,
    msg: InboundMessage,
) -> Projection {
    let mut projection = Projection::default();

    if let Some(label) = present(msg.config_status) {
        status.set_config_label(label);
        projection.status_changed = true;
    }
    if let Some(raw) = present(msg.last_update) {
        status.set_last_update(&raw);
        projection.status_changed = true;
    }
    if let Some(raw) = present(msg.last_commit) {
        status.set_last_commit(&raw);
        projection.status_changed = true;
    }
    if let Some(hash) = present(msg.commit_hash) {
        status.set_commit_hash(hash);
        projection.status_changed = true;
    }

    let error = present(msg.error);
    let message = present(msg.message);
    let tag = present(msg.action).map(|tag| ActionTag::decode(&tag));

    match tag {
        Some(ActionTag::Lifecycle { kind, stage }) => {
            if op.in_flight_kind() != Some(kind) {
                warn!(
                    tag = %ActionTag::encode(kind, stage),
                    in_flight = ?op.in_flight_kind(),
                    "lifecycle event for an operation that is not in flight, ignored"
                );
                if let Some(detail) = error {
                    info!(detail = %detail, "backend notice");
                    projection.events.push(ChannelEvent::Notice(detail));
                }
                return projection;
            }
            match stage {
                LifecycleStage::Started => {
                    let text = message.unwrap_or_else(|| kind.started_message().to_string());
                    debug!(kind = %kind, progress = %text, "operation acknowledged");
                    op.note_progress(text.clone());
                    projection.events.push(ChannelEvent::OperationAcknowledged {
                        kind,
                        message: text,
                    });
                }
                LifecycleStage::Completed => {
                    op.succeed();
                    info!(kind = %kind, "operation succeeded");
                    projection.events.push(ChannelEvent::OperationSucceeded(kind));
                    projection.settled = true;
                }
                LifecycleStage::Failed => {
                    let detail = error
                        .or(message)
                        .unwrap_or_else(|| kind.failure_message().to_string());
                    op.fail(detail.clone());
                    warn!(kind = %kind, detail = %detail, "operation failed");
                    projection
                        .events
                        .push(ChannelEvent::OperationFailed { kind, detail });
                    projection.settled = true;
                }
            }
            return projection;
        }
        Some(ActionTag::Unrecognized(tag)) => {
            debug!(tag = %tag, "unrecognized action tag ignored");
        }
        None => {}
    }

    if let Some(detail) = error {
        match op.in_flight_kind() {
            Some(kind) => {
                op.fail(detail.clone());
                warn!(kind = %kind, detail = %detail, "backend error while operation in flight");
                projection
                    .events
                    .push(ChannelEvent::OperationFailed { kind, detail });
                projection.settled = true;
            }
            None => {
                info!(detail = %detail, "backend notice");
                projection.events.push(ChannelEvent::Notice(detail));
            }
        }
    }

    projection
}
