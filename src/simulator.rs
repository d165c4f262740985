//! Simulated dashboard backend.
//!
//! Honours the host channel wire contract without touching any real server:
//! status is pushed on connect and then periodically, every request is
//! answered with `<tag>_started` followed by `<tag>_completed` or
//! `<tag>_failed`, and toggling flips the reported database label. Also
//! serves the two REST host endpoints the client reads.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use hostdeck_common::{HostId, InboundMessage, LifecycleStage, OperationKind};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::HostRecord;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong before considering the client gone.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

pub const TEST_LABEL: &str = "Подключена тестовая Монго";
pub const PRODUCTION_LABEL: &str = "Подключена продакшн Монго";

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub status_interval: Duration,
    /// Time between `<tag>_started` and the outcome.
    pub operation_delay: Duration,
    /// Kinds that always end in `<tag>_failed`.
    pub failing: HashSet<OperationKind>,
    pub hosts: Vec<(HostId, String)>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(5),
            operation_delay: Duration::from_secs(2),
            failing: HashSet::new(),
            hosts: vec![
                (HostId::from(1), "staging".to_string()),
                (HostId::from(2), "production".to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone)]
struct HostState {
    name: String,
    production: bool,
    last_update: DateTime<Utc>,
    last_commit: DateTime<Utc>,
    commit: String,
}

impl HostState {
    fn new(name: String, production: bool) -> Self {
        let now = Utc::now();
        Self {
            name,
            production,
            last_update: now,
            last_commit: now,
            commit: commit_hash(now),
        }
    }

    fn label(&self) -> &'static str {
        if self.production { PRODUCTION_LABEL } else { TEST_LABEL }
    }

    fn status_frame(&self) -> InboundMessage {
        InboundMessage {
            config_status: Some(self.label().to_string()),
            last_update: Some(self.last_update.to_rfc3339_opts(SecondsFormat::Secs, true)),
            last_commit: Some(self.last_commit.to_rfc3339_opts(SecondsFormat::Secs, true)),
            commit_hash: Some(self.commit.clone()),
            ..InboundMessage::default()
        }
    }

    fn record(&self, id: &HostId) -> HostRecord {
        HostRecord {
            id: id.clone(),
            name: self.name.clone(),
            host: Some(format!("{}.hosts.local", self.name)),
            last_update: Some(self.last_update.to_rfc3339_opts(SecondsFormat::Secs, true)),
            last_commit: Some(self.last_commit.to_rfc3339_opts(SecondsFormat::Secs, true)),
            commit: Some(self.commit.clone()),
        }
    }

    /// Effect of a completed operation on what the host reports.
    fn apply(&mut self, kind: OperationKind) {
        let now = Utc::now();
        match kind {
            OperationKind::ToggleDatabase => self.production = !self.production,
            OperationKind::RestoreBackup => self.last_update = now,
            OperationKind::FastPull | OperationKind::PullWithReload => {
                self.last_commit = now;
                self.commit = commit_hash(now);
            }
        }
    }
}

/// Deterministic 40-hex-digit stand-in for a git commit id.
fn commit_hash(at: DateTime<Utc>) -> String {
    let seed = at.timestamp_nanos_opt().unwrap_or_default() as u128;
    let mixed = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15_f39c_c060_5ced_c835);
    format!("{:032x}{:08x}", mixed, (seed as u32).rotate_left(13))
}

struct SimState {
    config: SimulatorConfig,
    hosts: Mutex<BTreeMap<HostId, HostState>>,
}

impl SimState {
    fn new(config: SimulatorConfig) -> Self {
        let hosts = config
            .hosts
            .iter()
            .enumerate()
            .map(|(i, (id, name))| (id.clone(), HostState::new(name.clone(), i % 2 == 1)))
            .collect();
        Self {
            config,
            hosts: Mutex::new(hosts),
        }
    }

    fn with_host<T>(&self, id: &HostId, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        let host = hosts
            .entry(id.clone())
            .or_insert_with(|| HostState::new(format!("host-{id}"), false));
        f(host)
    }
}

type SharedState = Arc<SimState>;

pub fn router(config: SimulatorConfig) -> Router {
    build_router(Arc::new(SimState::new(config)))
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/ws/core/{host_id}/", get(ws_handler))
        .route("/api/hosts/", get(list_hosts))
        .route("/api/hosts/{id}/", get(get_host))
        .with_state(state)
}

/// A bound simulator, ready to serve.
pub struct Simulator {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: SharedState,
}

impl Simulator {
    pub async fn bind(addr: SocketAddr, config: SimulatorConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(SimState::new(config)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        info!(addr = %self.local_addr, "simulated backend listening");
        axum::serve(self.listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .context("Simulator server error")
    }
}

// ── REST ─────────────────────────────────────────────────────────────

async fn list_hosts(State(state): State<SharedState>) -> Json<Vec<HostRecord>> {
    let hosts = state.hosts.lock().unwrap_or_else(|e| e.into_inner());
    Json(hosts.iter().map(|(id, host)| host.record(id)).collect())
}

async fn get_host(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<HostRecord>, StatusCode> {
    let id = HostId::from(id);
    let hosts = state.hosts.lock().unwrap_or_else(|e| e.into_inner());
    hosts
        .get(&id)
        .map(|host| Json(host.record(&id)))
        .ok_or(StatusCode::NOT_FOUND)
}

// ── WebSocket ────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(host_id): Path<String>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let host = HostId::from(host_id);
    ws.on_upgrade(move |socket| run_host_socket(socket, host, state))
}

/// Per-connection loop: periodic status, request handling and ping/pong
/// keepalive in one select.
async fn run_host_socket(socket: WebSocket, host: HostId, state: SharedState) {
    info!(host = %host, "client connected");
    let (mut sender, mut receiver) = socket.split();
    let (replies, mut reply_rx) = mpsc::unbounded_channel::<String>();

    // First tick fires immediately, so status goes out on connect.
    let mut status_tick = tokio::time::interval(state.config.status_interval);
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = status_tick.tick() => {
                let frame = state.with_host(&host, |h| h.status_frame());
                if !send_frame(&mut sender, &frame).await {
                    break;
                }
            }

            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    warn!(host = %host, "no pong, dropping client");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            Some(reply) = reply_rx.recv() => {
                if sender.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_request(text.as_str(), &host, &state, &replies)
                            && !send_frame(&mut sender, &reply).await
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(host = %host, error = %e, "socket error");
                        break;
                    }
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    info!(host = %host, "client disconnected");
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &InboundMessage,
) -> bool {
    match frame.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to serialize frame");
            true
        }
    }
}

/// Handle one client text frame. Returns the immediate reply; the outcome
/// is delivered later through `replies`.
fn handle_request(
    raw: &str,
    host: &HostId,
    state: &SharedState,
    replies: &mpsc::UnboundedSender<String>,
) -> Option<InboundMessage> {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        warn!(host = %host, payload = %raw, "unparseable request");
        return Some(InboundMessage {
            error: Some("Invalid JSON".to_string()),
            ..InboundMessage::default()
        });
    };
    let Some(kind) = value
        .get("action")
        .and_then(Value::as_str)
        .and_then(|action| serde_json::from_value::<OperationKind>(Value::from(action)).ok())
    else {
        warn!(host = %host, payload = %raw, "unknown action ignored");
        return None;
    };

    info!(host = %host, kind = %kind, "operation requested");
    let delay = state.config.operation_delay;
    let fails = state.config.failing.contains(&kind);
    let state = Arc::clone(state);
    let host = host.clone();
    let replies = replies.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let frames = if fails {
            let mut failed = InboundMessage::lifecycle(kind, LifecycleStage::Failed);
            failed.error = Some(format!("{} (simulated)", kind.failure_message()));
            vec![failed]
        } else {
            let status = state.with_host(&host, |h| {
                h.apply(kind);
                h.status_frame()
            });
            vec![InboundMessage::lifecycle(kind, LifecycleStage::Completed), status]
        };
        for frame in frames {
            match frame.to_json() {
                Ok(json) => {
                    let _ = replies.send(json);
                }
                Err(e) => warn!(error = %e, "failed to serialize frame"),
            }
        }
    });

    let mut started = InboundMessage::lifecycle(kind, LifecycleStage::Started);
    started.message = Some(kind.started_message().to_string());
    Some(started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{
        AutoConfirm, BackendEndpoint, ChannelSettings, Environment, HostChannel, OperationPhase,
    };
    use crate::session::{Connector, HostSession, LinkFrame, WsConnector};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn fast_config() -> SimulatorConfig {
        SimulatorConfig {
            status_interval: Duration::from_secs(60),
            operation_delay: Duration::from_millis(20),
            ..SimulatorConfig::default()
        }
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn start(config: SimulatorConfig) -> (SocketAddr, tokio::task::JoinHandle<Result<()>>) {
        let sim = Simulator::bind("127.0.0.1:0".parse().unwrap(), config)
            .await
            .unwrap();
        let addr = sim.local_addr();
        (addr, tokio::spawn(sim.serve()))
    }

    async fn next_text(link: &mut Box<dyn crate::session::Link>) -> InboundMessage {
        match link.recv().await {
            LinkFrame::Text(raw) => InboundMessage::parse(&raw).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lists_configured_hosts() {
        let app = router(SimulatorConfig::default());
        let request = Request::builder()
            .method("GET")
            .uri("/api/hosts/")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let hosts: Vec<HostRecord> = body_json(response.into_body()).await;
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].id, HostId::from(1));
        assert_eq!(hosts[0].name, "staging");
    }

    #[tokio::test]
    async fn unknown_host_detail_is_404() {
        let app = router(SimulatorConfig::default());
        let request = Request::builder()
            .method("GET")
            .uri("/api/hosts/99/")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn toggle_flips_label_and_pull_moves_commit() {
        let mut host = HostState::new("h".into(), false);
        assert_eq!(host.label(), TEST_LABEL);
        host.apply(OperationKind::ToggleDatabase);
        assert_eq!(host.label(), PRODUCTION_LABEL);

        let before = host.commit.clone();
        std::thread::sleep(Duration::from_millis(2));
        host.apply(OperationKind::FastPull);
        assert_ne!(host.commit, before);
        assert_eq!(host.commit.len(), 40);
    }

    #[tokio::test]
    async fn socket_pushes_status_and_answers_requests() {
        let (addr, server) = start(fast_config()).await;
        let mut link = WsConnector
            .connect(&format!("ws://{addr}/ws/core/1/"))
            .await
            .unwrap();

        let status = next_text(&mut link).await;
        assert_eq!(status.config_status.as_deref(), Some(TEST_LABEL));
        assert_eq!(status.commit_hash.as_ref().map(String::len), Some(40));

        link.send(r#"{"action":"toggle_mongo"}"#.into()).await.unwrap();
        let started = next_text(&mut link).await;
        assert_eq!(started.action.as_deref(), Some("toggle_started"));
        assert!(started.message.is_some());
        let completed = next_text(&mut link).await;
        assert_eq!(completed.action.as_deref(), Some("toggle_completed"));
        let status = next_text(&mut link).await;
        assert_eq!(status.config_status.as_deref(), Some(PRODUCTION_LABEL));

        link.send("not json".into()).await.unwrap();
        let error = next_text(&mut link).await;
        assert_eq!(error.error.as_deref(), Some("Invalid JSON"));
        server.abort();
    }

    #[tokio::test]
    async fn configured_failures_report_failed() {
        let mut config = fast_config();
        config.failing.insert(OperationKind::RestoreBackup);
        let (addr, server) = start(config).await;
        let mut link = WsConnector
            .connect(&format!("ws://{addr}/ws/core/2/"))
            .await
            .unwrap();
        next_text(&mut link).await;

        link.send(r#"{"action":"restore_backup"}"#.into()).await.unwrap();
        assert_eq!(
            next_text(&mut link).await.action.as_deref(),
            Some("restore_started")
        );
        let failed = next_text(&mut link).await;
        assert_eq!(failed.action.as_deref(), Some("restore_failed"));
        assert!(failed.error.is_some());
        server.abort();
    }

    #[tokio::test]
    async fn session_drives_an_operation_over_real_sockets() {
        let (addr, server) = start(fast_config()).await;
        let endpoint = BackendEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..BackendEndpoint::default()
        };
        let channel =
            HostChannel::new(HostId::from(2), &endpoint, ChannelSettings::default()).unwrap();
        let session = HostSession::spawn(channel, Arc::new(WsConnector));

        let view = session
            .wait_until(Duration::from_secs(5), |v| v.status.config_label().is_some())
            .await
            .unwrap();
        assert_eq!(view.status.environment(), Environment::Production);

        session
            .request(OperationKind::ToggleDatabase, Arc::new(AutoConfirm))
            .await
            .unwrap();
        let view = session
            .wait_for_outcome(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(view.operation.phase(), OperationPhase::Succeeded);

        let view = session
            .wait_until(Duration::from_secs(5), |v| {
                v.status.environment() == Environment::Test
            })
            .await
            .unwrap();
        assert_eq!(view.status.config_label(), Some(TEST_LABEL));

        session.close().await;
        server.abort();
    }
}
