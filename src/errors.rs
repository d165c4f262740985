//! Typed error hierarchy for hostdeck.
//!
//! Three top-level enums cover the three subsystems:
//! - `ChannelError`: connection and transport failures of one host channel
//! - `DispatchError`: rejected or failed operation requests
//! - `DirectoryError`: REST host directory failures

use hostdeck_common::{HostId, OperationKind, WireError};
use thiserror::Error;

use crate::channel::ConnectionState;

/// Errors from a host channel's connection.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to connect to {target}: {detail}")]
    ConnectFailure { target: String, detail: String },

    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] WireError),

    #[error("Connection is {state}, cannot send")]
    NotOpen { state: ConnectionState },

    #[error("Link error: {0}")]
    Link(String),

    #[error("Invalid connection target: {0}")]
    InvalidTarget(String),
}

/// Errors from the operation dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{current} is already in progress")]
    OperationBusy { current: OperationKind },

    #[error("Host {host} is not connected (connection is {state})")]
    NotConnected {
        host: HostId,
        state: ConnectionState,
    },

    #[error("No operation is awaiting confirmation")]
    NothingPending,

    #[error("{kind} failed: {detail}")]
    OperationFailed { kind: OperationKind, detail: String },

    #[error("Unknown host {0}")]
    UnknownHost(HostId),

    #[error("Session for host {0} has shut down")]
    SessionClosed(HostId),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Errors from the REST host directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid directory URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_busy_names_current_kind() {
        let err = DispatchError::OperationBusy {
            current: OperationKind::RestoreBackup,
        };
        assert!(err.to_string().contains("restore_backup"));
    }

    #[test]
    fn not_connected_carries_host_and_state() {
        let err = DispatchError::NotConnected {
            host: HostId::from("h1"),
            state: ConnectionState::Reconnecting,
        };
        match &err {
            DispatchError::NotConnected { host, state } => {
                assert_eq!(host.as_str(), "h1");
                assert_eq!(*state, ConnectionState::Reconnecting);
            }
            _ => panic!("Expected NotConnected"),
        }
        assert!(err.to_string().contains("reconnecting"));
    }

    #[test]
    fn malformed_message_converts_from_wire_error() {
        let wire = hostdeck_common::InboundMessage::parse("[]").unwrap_err();
        let err: ChannelError = wire.into();
        assert!(matches!(err, ChannelError::MalformedMessage(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ChannelError::Link("x".into()));
        assert_std_error(&DispatchError::NothingPending);
        assert_std_error(&DirectoryError::InvalidUrl("x".into()));
    }
}
