//! Async driver for one host channel.
//!
//! [`HostSession::spawn`] starts a tokio task that owns the [`HostChannel`],
//! the transport link and every timer. The task selects over caller commands,
//! the pending connect attempt, link frames, a pending confirmation and the
//! channel's next deadline, so all mutation of one host is serialized.
//! Dropping the handle is an intentional close.

#[cfg(test)]
pub(crate) mod memory;
pub mod transport;

use chrono::Utc;
use futures_util::future::BoxFuture;
use hostdeck_common::{HostId, OperationKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

pub use transport::{Connector, Link, LinkFrame, WsConnector};

use crate::channel::{
    ABNORMAL_CLOSURE, ChannelEvent, ChannelView, Confirm, ConnectionState, HostChannel,
    NORMAL_CLOSURE, OperationPhase, Output, RequestOutcome,
};
use crate::errors::{ChannelError, DispatchError};

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 64;

type ConnectFuture = BoxFuture<'static, Result<Box<dyn Link>, ChannelError>>;
type RequestReply = oneshot::Sender<Result<RequestOutcome, DispatchError>>;

enum Command {
    Request {
        kind: OperationKind,
        confirm: Arc<dyn Confirm>,
        reply: RequestReply,
    },
    Close,
}

/// Handle to a running host session.
pub struct HostSession {
    host_id: HostId,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ChannelView>,
    events: broadcast::Sender<ChannelEvent>,
    task: JoinHandle<()>,
}

impl HostSession {
    /// Spawn the driver and start connecting.
    pub fn spawn(channel: HostChannel, connector: Arc<dyn Connector>) -> Self {
        let host_id = channel.host_id().clone();
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view) = watch::channel(channel.view());
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let driver = Driver {
            channel,
            connector,
            link: None,
            connecting: None,
            confirming: None,
            view: view_tx,
            events: events.clone(),
        };
        let span = info_span!("host_session", host = %host_id);
        let task = tokio::spawn(driver.run(command_rx).instrument(span));

        Self {
            host_id,
            commands,
            view,
            events,
            task,
        }
    }

    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    pub fn view(&self) -> ChannelView {
        self.view.borrow().clone()
    }

    /// Receiver that is updated after every input the channel processes.
    pub fn watch(&self) -> watch::Receiver<ChannelView> {
        self.view.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Request an operation. `confirm` is asked once the busy guard passes;
    /// frames keep flowing while it is pending. Dropping the returned future
    /// before the answer abandons the request.
    pub async fn request(
        &self,
        kind: OperationKind,
        confirm: Arc<dyn Confirm>,
    ) -> Result<RequestOutcome, DispatchError> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Request {
                kind,
                confirm,
                reply,
            })
            .await
            .map_err(|_| DispatchError::SessionClosed(self.host_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| DispatchError::SessionClosed(self.host_id.clone()))?
    }

    /// Wait until `pred` holds for the published view. `None` on timeout or
    /// when the session ended first.
    pub async fn wait_until(
        &self,
        timeout: Duration,
        pred: impl FnMut(&ChannelView) -> bool,
    ) -> Option<ChannelView> {
        let mut rx = self.view.clone();
        match tokio::time::timeout(timeout, rx.wait_for(pred)).await {
            Ok(Ok(view)) => Some(view.clone()),
            _ => None,
        }
    }

    pub async fn wait_for_open(&self, timeout: Duration) -> Option<ChannelView> {
        self.wait_until(timeout, |v| v.connection == ConnectionState::Open)
            .await
    }

    /// Wait for the current operation to reach Succeeded or Failed.
    pub async fn wait_for_outcome(&self, timeout: Duration) -> Option<ChannelView> {
        self.wait_until(timeout, |v| {
            matches!(
                v.operation.phase(),
                OperationPhase::Succeeded | OperationPhase::Failed
            )
        })
        .await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Intentional close; resolves once the driver has torn the link down.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close).await;
        if let Err(e) = self.task.await {
            warn!(host = %self.host_id, error = %e, "session task ended abnormally");
        }
    }
}

struct PendingConfirm {
    answer: BoxFuture<'static, bool>,
    reply: RequestReply,
}

struct Driver {
    channel: HostChannel,
    connector: Arc<dyn Connector>,
    link: Option<Box<dyn Link>>,
    connecting: Option<(u64, ConnectFuture)>,
    confirming: Option<PendingConfirm>,
    view: watch::Sender<ChannelView>,
    events: broadcast::Sender<ChannelEvent>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.channel.open(Instant::now());
        self.flush().await;

        loop {
            let deadline = self.channel.poll_timeout();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Request { kind, confirm, reply }) => {
                        self.on_request(kind, confirm, reply);
                    }
                    Some(Command::Close) | None => {
                        self.shutdown();
                        self.flush().await;
                        break;
                    }
                },
                (generation, result) = next_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connected(generation, result).await;
                }
                frame = next_frame(&mut self.link) => self.on_frame(frame),
                answer = next_answer(&mut self.confirming) => self.on_answer(answer),
                () = sleep_until(deadline) => self.channel.handle_timeout(Instant::now()),
            }
            self.flush().await;
        }
        debug!("session driver stopped");
    }

    fn on_request(&mut self, kind: OperationKind, confirm: Arc<dyn Confirm>, reply: RequestReply) {
        match self.channel.begin_request(kind) {
            Ok(prompt) => {
                let host = self.channel.host_id().clone();
                let answer: BoxFuture<'static, bool> =
                    Box::pin(async move { confirm.confirm(&host, kind, prompt).await });
                self.confirming = Some(PendingConfirm { answer, reply });
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    /// `None` means the requester went away before the user answered.
    fn on_answer(&mut self, answer: Option<bool>) {
        let Some(pending) = self.confirming.take() else {
            return;
        };
        match answer {
            Some(approved) => {
                let result = self.channel.resolve_request(approved, Utc::now());
                let _ = pending.reply.send(result);
            }
            None => {
                self.channel.abandon_request();
            }
        }
    }

    async fn on_connected(&mut self, generation: u64, result: Result<Box<dyn Link>, ChannelError>) {
        match result {
            Ok(mut link) => {
                if self.channel.handle_open(generation) {
                    self.link = Some(link);
                } else {
                    link.close(NORMAL_CLOSURE, "stale connection").await;
                }
            }
            Err(e) => {
                self.channel
                    .handle_connect_failed(generation, &e.to_string(), Instant::now());
            }
        }
    }

    fn on_frame(&mut self, frame: LinkFrame) {
        let now = Instant::now();
        match frame {
            LinkFrame::Text(raw) => {
                debug!(payload = %raw, "frame received");
                // Malformed frames are logged by the channel and change nothing.
                let _ = self.channel.handle_text(&raw, now);
            }
            LinkFrame::Closed { code, reason } => {
                self.link = None;
                self.channel.handle_close(code, &reason, now);
            }
            LinkFrame::Error(detail) => {
                self.link = None;
                self.channel.handle_error(&detail);
                self.channel.handle_close(ABNORMAL_CLOSURE, &detail, now);
            }
        }
    }

    fn shutdown(&mut self) {
        self.connecting = None;
        self.channel.close(Instant::now());
        if let Some(pending) = self.confirming.take() {
            let _ = pending
                .reply
                .send(Err(DispatchError::SessionClosed(self.channel.host_id().clone())));
        }
    }

    /// Carry out everything the channel asked for, then publish its view.
    async fn flush(&mut self) {
        while let Some(output) = self.channel.poll_output() {
            match output {
                Output::Connect(attempt) => {
                    if let Some(mut stale) = self.link.take() {
                        stale.close(NORMAL_CLOSURE, "reconnecting").await;
                    }
                    let connector = Arc::clone(&self.connector);
                    let target = attempt.target;
                    let future: ConnectFuture =
                        Box::pin(async move { connector.connect(&target).await });
                    self.connecting = Some((attempt.generation, future));
                }
                Output::Transmit(text) => {
                    let Some(link) = self.link.as_mut() else {
                        warn!("no link for outbound frame, dropped");
                        continue;
                    };
                    debug!(payload = %text, "frame sent");
                    if let Err(e) = link.send(text).await {
                        self.link = None;
                        self.channel.handle_error(&e.to_string());
                        self.channel
                            .handle_close(ABNORMAL_CLOSURE, "send failed", Instant::now());
                    }
                }
                Output::CloseLink { code, reason } => {
                    self.connecting = None;
                    if let Some(mut link) = self.link.take() {
                        link.close(code, &reason).await;
                    }
                }
                Output::Event(event) => {
                    // No subscribers is fine.
                    let _ = self.events.send(event);
                }
            }
        }
        self.view.send_replace(self.channel.view());
    }
}

async fn next_connect(
    slot: &mut Option<(u64, ConnectFuture)>,
) -> (u64, Result<Box<dyn Link>, ChannelError>) {
    match slot {
        Some((generation, future)) => (*generation, future.await),
        None => std::future::pending().await,
    }
}

async fn next_frame(slot: &mut Option<Box<dyn Link>>) -> LinkFrame {
    match slot {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_answer(slot: &mut Option<PendingConfirm>) -> Option<bool> {
    match slot {
        Some(pending) => tokio::select! {
            approved = &mut pending.answer => Some(approved),
            () = pending.reply.closed() => None,
        },
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
