//! Multi-host coordination.
//!
//! A [`Fleet`] owns one [`HostSession`] per monitored host. Sessions never
//! share state; the fleet only routes requests by host id and merges their
//! events into one stream tagged with the host.

use futures_util::future::join_all;
use hostdeck_common::{HostId, OperationKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::channel::{
    BackendEndpoint, ChannelEvent, ChannelSettings, ChannelView, Confirm, HostChannel,
    RequestOutcome,
};
use crate::errors::{ChannelError, DispatchError};
use crate::session::{Connector, HostSession};

const FLEET_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetEvent {
    pub host: HostId,
    pub event: ChannelEvent,
}

pub struct Fleet {
    endpoint: BackendEndpoint,
    settings: ChannelSettings,
    connector: Arc<dyn Connector>,
    sessions: BTreeMap<HostId, HostSession>,
    events: broadcast::Sender<FleetEvent>,
}

impl Fleet {
    pub fn new(
        endpoint: BackendEndpoint,
        settings: ChannelSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events, _) = broadcast::channel(FLEET_EVENT_BUFFER);
        Self {
            endpoint,
            settings,
            connector,
            sessions: BTreeMap::new(),
            events,
        }
    }

    /// Start a session for `host`. Opening a host that is already open is a no-op.
    pub fn open(&mut self, host: HostId) -> Result<(), ChannelError> {
        if self.sessions.contains_key(&host) {
            debug!(host = %host, "already open");
            return Ok(());
        }
        let channel = HostChannel::new(host.clone(), &self.endpoint, self.settings)?;
        let session = HostSession::spawn(channel, Arc::clone(&self.connector));
        self.forward_events(&session);
        info!(host = %host, "host channel opened");
        self.sessions.insert(host, session);
        Ok(())
    }

    /// Intentionally close one host. Returns false for an unknown host.
    pub async fn close(&mut self, host: &HostId) -> bool {
        match self.sessions.remove(host) {
            Some(session) => {
                session.close().await;
                info!(host = %host, "host channel closed");
                true
            }
            None => false,
        }
    }

    pub async fn request(
        &self,
        host: &HostId,
        kind: OperationKind,
        confirm: Arc<dyn Confirm>,
    ) -> Result<RequestOutcome, DispatchError> {
        let session = self
            .sessions
            .get(host)
            .ok_or_else(|| DispatchError::UnknownHost(host.clone()))?;
        session.request(kind, confirm).await
    }

    pub fn session(&self, host: &HostId) -> Option<&HostSession> {
        self.sessions.get(host)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostId> {
        self.sessions.keys()
    }

    /// Current view of every host, ordered by host id.
    pub fn views(&self) -> Vec<ChannelView> {
        self.sessions.values().map(HostSession::view).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every host concurrently.
    pub async fn shutdown(mut self) {
        let sessions = std::mem::take(&mut self.sessions);
        let count = sessions.len();
        join_all(sessions.into_values().map(HostSession::close)).await;
        info!(count, "fleet shut down");
    }

    fn forward_events(&self, session: &HostSession) {
        let host = session.host_id().clone();
        let mut rx = session.subscribe();
        let tx = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(FleetEvent {
                            host: host.clone(),
                            event,
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(host = %host, skipped, "event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AutoConfirm, ConnectionState, OperationPhase};
    use crate::session::memory::{MemoryConnector, PeerEvent};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(1);

    fn fleet(connector: Arc<MemoryConnector>) -> Fleet {
        Fleet::new(
            BackendEndpoint::default(),
            ChannelSettings::default(),
            connector,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn hosts_are_independent() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut fleet = fleet(connector.clone());
        fleet.open(HostId::from("1")).unwrap();
        fleet.open(HostId::from("2")).unwrap();
        fleet.open(HostId::from("1")).unwrap();
        assert_eq!(fleet.len(), 2);

        let mut first = peers.recv().await.unwrap();
        let mut second = peers.recv().await.unwrap();
        if first.target.ends_with("/2/") {
            std::mem::swap(&mut first, &mut second);
        }
        assert_eq!(first.target, "ws://localhost:8000/ws/core/1/");
        assert_eq!(connector.attempts(), 2);

        let one = HostId::from("1");
        let two = HostId::from("2");
        for host in [&one, &two] {
            fleet.session(host).unwrap().wait_for_open(WAIT).await.unwrap();
        }

        fleet
            .request(&one, OperationKind::RestoreBackup, Arc::new(AutoConfirm))
            .await
            .unwrap();
        // Host 2 is not blocked by host 1's in-flight operation.
        fleet
            .request(&two, OperationKind::RestoreBackup, Arc::new(AutoConfirm))
            .await
            .unwrap();
        assert!(matches!(
            first.next().await,
            Some(PeerEvent::Text(text)) if text.contains("restore_backup")
        ));

        // Losing host 1 fails only host 1's operation.
        first.drop_link();
        fleet
            .session(&one)
            .unwrap()
            .wait_until(WAIT, |v| v.connection == ConnectionState::Reconnecting)
            .await
            .unwrap();
        let views = fleet.views();
        assert_eq!(views[0].operation.phase(), OperationPhase::Failed);
        assert_eq!(views[1].operation.phase(), OperationPhase::InFlight);
    }

    #[tokio::test(start_paused = true)]
    async fn merged_events_carry_host_id() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut fleet = fleet(connector);
        let mut events = fleet.subscribe();
        fleet.open(HostId::from("7")).unwrap();
        let peer = peers.recv().await.unwrap();

        let FleetEvent { host, event } = events.recv().await.unwrap();
        assert_eq!(host, HostId::from("7"));
        assert_eq!(event, ChannelEvent::Connected);

        peer.push(r#"{"error":"Invalid JSON"}"#);
        let FleetEvent { event, .. } = events.recv().await.unwrap();
        assert_eq!(event, ChannelEvent::Notice("Invalid JSON".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn request_to_unknown_host_is_rejected() {
        let (connector, _peers) = MemoryConnector::new();
        let fleet = fleet(connector);
        let err = fleet
            .request(
                &HostId::from("missing"),
                OperationKind::FastPull,
                Arc::new(AutoConfirm),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownHost(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn close_and_shutdown_stop_sessions() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut fleet = fleet(connector.clone());
        fleet.open(HostId::from("a")).unwrap();
        fleet.open(HostId::from("b")).unwrap();
        let mut a = peers.recv().await.unwrap();
        let mut b = peers.recv().await.unwrap();
        for host in ["a", "b"] {
            fleet
                .session(&HostId::from(host))
                .unwrap()
                .wait_for_open(WAIT)
                .await
                .unwrap();
        }

        assert!(fleet.close(&HostId::from("a")).await);
        assert!(!fleet.close(&HostId::from("a")).await);
        assert_eq!(fleet.len(), 1);

        fleet.shutdown().await;
        assert_eq!(a.next().await, Some(PeerEvent::Closed(1000)));
        assert_eq!(b.next().await, Some(PeerEvent::Closed(1000)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 2);
    }
}
