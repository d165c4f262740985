//! In-memory transport for driver tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::transport::{Connector, Link, LinkFrame};
use crate::channel::ABNORMAL_CLOSURE;
use crate::errors::ChannelError;

/// How the next connect attempt behaves. Unscripted attempts are accepted.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    Accept,
    Refuse(&'static str),
    Hang,
}

/// What the client did on a link, seen from the backend side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PeerEvent {
    Text(String),
    Closed(u16),
}

/// Backend end of one accepted link.
pub(crate) struct Peer {
    pub target: String,
    to_client: Option<mpsc::UnboundedSender<LinkFrame>>,
    from_client: mpsc::UnboundedReceiver<PeerEvent>,
}

impl Peer {
    pub fn push(&self, raw: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(LinkFrame::Text(raw.to_string()));
        }
    }

    pub fn close(&self, code: u16, reason: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(LinkFrame::Closed {
                code,
                reason: reason.to_string(),
            });
        }
    }

    /// Vanish without a close frame.
    pub fn drop_link(&mut self) {
        self.to_client = None;
    }

    pub async fn next(&mut self) -> Option<PeerEvent> {
        self.from_client.recv().await
    }

    pub fn try_next(&mut self) -> Option<PeerEvent> {
        self.from_client.try_recv().ok()
    }
}

pub(crate) struct MemoryConnector {
    script: Mutex<VecDeque<Script>>,
    attempts: AtomicUsize,
    peers: mpsc::UnboundedSender<Peer>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            peers,
        });
        (connector, peer_rx)
    }

    pub fn script(&self, step: Script) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, target: &str) -> Result<Box<dyn Link>, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Accept);
        match step {
            Script::Accept => {
                let (to_client, incoming) = mpsc::unbounded_channel();
                let (outgoing, from_client) = mpsc::unbounded_channel();
                let _ = self.peers.send(Peer {
                    target: target.to_string(),
                    to_client: Some(to_client),
                    from_client,
                });
                Ok(Box::new(MemoryLink { incoming, outgoing }))
            }
            Script::Refuse(detail) => Err(ChannelError::ConnectFailure {
                target: target.to_string(),
                detail: detail.to_string(),
            }),
            Script::Hang => std::future::pending().await,
        }
    }
}

struct MemoryLink {
    incoming: mpsc::UnboundedReceiver<LinkFrame>,
    outgoing: mpsc::UnboundedSender<PeerEvent>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.outgoing
            .send(PeerEvent::Text(text))
            .map_err(|_| ChannelError::Link("peer gone".into()))
    }

    async fn recv(&mut self) -> LinkFrame {
        self.incoming.recv().await.unwrap_or(LinkFrame::Closed {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        })
    }

    async fn close(&mut self, code: u16, _reason: &str) {
        let _ = self.outgoing.send(PeerEvent::Closed(code));
    }
}
