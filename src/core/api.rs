//! HTTP + WebSocket pairing transport
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /status - Pairing phase, session id, stored record once paired
//! - GET /discover - Candidate devices
//! - POST /confirm - Confirm pairing (selects and stores the device)
//! - POST /monitor - Ask the launcher to start monitoring
//! - POST /stop - Stop the running monitor
//! - POST /settings - Validated settings update (refused while monitoring)
//! - WS /ws - Live sample reports while monitoring

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use qrcode::{render::unicode, QrCode};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{PairingSession, TrustStore};
use crate::error::{ProxlockError, Result};
use crate::types::{
    CandidateDevice, Confirmation, PairingPhase, SampleReport, SettingsUpdate, TrustRecord,
};

/// What the transport tells the process that launched it
#[derive(Debug, Clone, PartialEq)]
pub enum PairingEvent {
    Confirmed(TrustRecord),
    MonitorRequested(TrustRecord),
}

/// App state
pub struct AppState {
    pub session: Arc<Mutex<PairingSession>>,
    pub reports: broadcast::Sender<SampleReport>,
    store: TrustStore,
    /// Cancelled by POST /stop; the launcher hands it to the monitor
    stop: CancellationToken,
    events: mpsc::UnboundedSender<PairingEvent>,
}

impl AppState {
    /// State plus the receiving end of the launcher channel
    pub fn new(
        session: PairingSession,
        reports: broadcast::Sender<SampleReport>,
        stop: CancellationToken,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PairingEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Self {
            store: session.store().clone(),
            session: Arc::new(Mutex::new(session)),
            reports,
            stop,
            events,
        });
        (state, rx)
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    fn notify(&self, event: PairingEvent) {
        if self.events.send(event).is_err() {
            debug!("No launcher listening for pairing events");
        }
    }
}

/// Error envelope: `{ "success": false, "error": "..." }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: u16,
}

/// Settings update response
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub record: TrustRecord,
}

/// Stop response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub success: bool,
    pub was_monitoring: bool,
    pub message: String,
}

/// Handler error carrying the crate error
#[derive(Debug)]
pub struct ApiError(pub ProxlockError);

impl From<ProxlockError> for ApiError {
    fn from(err: ProxlockError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = ErrorResponse {
            success: false,
            error: self.0.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub phase: PairingPhase,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub session_id: String,
    pub phase: PairingPhase,
    pub candidate_count: usize,
    pub remaining_secs: Option<u64>,
    pub monitor_requested: bool,
    pub record: Option<TrustRecord>,
}

/// Discover response
#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub success: bool,
    pub session_id: String,
    pub candidates: Vec<CandidateDevice>,
}

/// Confirm response
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub device_name: String,
    pub device_address: String,
    pub rssi_threshold: i32,
    pub lock_delay: u64,
    pub message: String,
}

/// Begin-monitoring response
#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub success: bool,
    pub device_name: String,
    pub device_address: String,
    pub message: String,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/discover", get(discover))
        .route("/confirm", post(confirm))
        .route("/monitor", post(begin_monitoring))
        .route("/stop", post(stop_monitoring))
        .route("/settings", post(update_settings))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut session = state.session.lock().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        phase: session.expire_if_due(),
    })
}

/// Pairing status
async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let mut session = state.session.lock().await;
    let phase = session.expire_if_due();
    Json(StatusResponse {
        success: true,
        session_id: session.id().to_string(),
        phase,
        candidate_count: session.candidates().len(),
        remaining_secs: session.remaining().map(|d| d.as_secs()),
        monitor_requested: session.monitor_requested(),
        record: session.record().cloned(),
    })
}

/// Candidate list
async fn discover(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<DiscoverResponse>, ApiError> {
    let mut session = state.session.lock().await;
    match session.expire_if_due() {
        PairingPhase::TimedOut => return Err(ProxlockError::TimedOut.into()),
        PairingPhase::Cancelled => {
            return Err(ProxlockError::InvalidState { phase: PairingPhase::Cancelled }.into())
        }
        _ => {}
    }
    if session.candidates().is_empty() {
        return Err(ProxlockError::NoCandidates.into());
    }
    Ok(Json(DiscoverResponse {
        success: true,
        session_id: session.id().to_string(),
        candidates: session.candidates().to_vec(),
    }))
}

/// Confirm pairing; the body is optional
async fn confirm(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Option<Json<Confirmation>>,
) -> std::result::Result<Json<ConfirmResponse>, ApiError> {
    let mut confirmation = body.map(|Json(c)| c).unwrap_or_default();
    confirmation.remote_addr = peer.map(|ConnectInfo(addr)| addr.to_string());
    if confirmation.user_agent.is_none() {
        confirmation.user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }

    // guard held across the blocking write so confirms stay serialized
    let mut session = Arc::clone(&state.session).lock_owned().await;
    let record = tokio::task::spawn_blocking(move || session.confirm(&confirmation))
        .await
        .map_err(join_error)??;
    state.notify(PairingEvent::Confirmed(record.clone()));

    Ok(Json(ConfirmResponse {
        success: true,
        device_name: record.display_name().to_string(),
        device_address: record.address()?.to_string(),
        rssi_threshold: record.rssi_threshold,
        lock_delay: record.lock_delay_seconds,
        message: "Pairing completed".to_string(),
    }))
}

/// Begin monitoring; requires a completed pairing
async fn begin_monitoring(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<MonitorResponse>, ApiError> {
    let record = {
        let mut session = state.session.lock().await;
        session.begin_monitoring()?
    };
    state.notify(PairingEvent::MonitorRequested(record.clone()));

    Ok(Json(MonitorResponse {
        success: true,
        device_name: record.display_name().to_string(),
        device_address: record.address()?.to_string(),
        message: "Monitoring started".to_string(),
    }))
}

/// Stop the running monitor, if any
async fn stop_monitoring(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    let was_monitoring = state.store.monitoring_active();
    if was_monitoring {
        info!("Stop requested over HTTP");
        state.stop.cancel();
    }
    Json(StopResponse {
        success: true,
        was_monitoring,
        message: if was_monitoring {
            "Monitoring stopping".to_string()
        } else {
            "Not monitoring".to_string()
        },
    })
}

/// Apply and persist a settings change
async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> std::result::Result<Json<SettingsResponse>, ApiError> {
    let store = state.store.clone();
    let record = tokio::task::spawn_blocking(move || store.update_settings(&update))
        .await
        .map_err(join_error)??;
    Ok(Json(SettingsResponse {
        success: true,
        record,
    }))
}

fn join_error(e: tokio::task::JoinError) -> ProxlockError {
    ProxlockError::io("blocking task", std::io::Error::other(e))
}

/// WebSocket handler for live sample reports
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.reports.subscribe();
    ws.on_upgrade(move |socket| handle_websocket(socket, rx))
}

/// Forward reports until either side goes away
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<SampleReport>) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(report) => {
                    let json = serde_json::to_string(&report).unwrap_or_default();
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "WebSocket client lagging, reports dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

// =============================================================================
// PAIRING URL
// =============================================================================

/// URL a phone opens to reach `/discover`
///
/// An unspecified bind address is replaced by the LAN address, or localhost
/// when none is known.
pub fn pairing_url(bind: &str, lan_ip: Option<IpAddr>) -> String {
    match bind.parse::<SocketAddr>() {
        Ok(addr) if addr.ip().is_unspecified() => match lan_ip {
            Some(ip) => format!("http://{}/discover", SocketAddr::new(ip, addr.port())),
            None => format!("http://localhost:{}/discover", addr.port()),
        },
        _ => format!("http://{}/discover", bind),
    }
}

/// Address of the interface that routes outward; no packet is sent
pub async fn local_ip() -> Option<IpAddr> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("8.8.8.8:80").await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Terminal QR code for `url`
pub fn render_qr(url: &str) -> Option<String> {
    let code = match QrCode::new(url.as_bytes()) {
        Ok(code) => code,
        Err(e) => {
            debug!(error = %e, "QR code unavailable");
            return None;
        }
    };
    Some(
        code.render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build(),
    )
}

/// Run the API server until `shutdown` resolves
pub async fn run_server<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProxlockError::io(format!("binding {}", addr), e))?;

    info!(%addr, "Pairing server listening");
    info!("  GET  /health    - Health check");
    info!("  GET  /status    - Pairing status");
    info!("  GET  /discover  - Candidate devices");
    info!("  POST /confirm   - Confirm pairing");
    info!("  POST /monitor   - Start monitoring");
    info!("  POST /stop      - Stop monitoring");
    info!("  POST /settings  - Update settings");
    info!("  WS   /ws        - Live sample reports");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| ProxlockError::io("serving pairing API", e))
}
