//! Detection HTTP API.
//!
//! Minimal HTTP/1.1 over `TcpListener`, one thread per connection:
//! - `POST /api/detection/analyze`: run the pipeline on a base64 image
//! - `DELETE /api/detection/sessions/<id>`: end a dedup session
//! - `GET /health`, `GET /info`, `GET /`
//!
//! The detector is shared across connections without locking. Dedup state is
//! scoped by `metadata.session_id`; requests without one get a fresh tracker.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::color::ColorLabel;
use crate::config::ApiSettings;
use crate::frame::Frame;
use crate::pipeline::{FrameReport, Pipeline};
use crate::tracker::{SessionStore, DEFAULT_DISTANCE_THRESHOLD};

const MAX_HEADER_BYTES: usize = 8192;
const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;
const SESSIONS_PREFIX: &str = "/api/detection/sessions/";
const SERVICE_NAME: &str = "hallway-detection-service";
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_sessions: usize,
    /// Concurrent connections served; further ones get 503.
    pub max_connections: usize,
    pub distance_threshold: f32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5001".to_string(),
            max_sessions: crate::tracker::DEFAULT_MAX_SESSIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl ApiConfig {
    pub fn from_settings(settings: &ApiSettings, distance_threshold: f32) -> Self {
        Self {
            addr: settings.addr.clone(),
            max_sessions: settings.max_sessions,
            max_connections: settings.max_connections,
            distance_threshold,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Serialized detection: `{ "box": [x, y, w, h], "color": ..., "confidence": ... }`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionView {
    #[serde(rename = "box")]
    pub bbox: [i32; 4],
    pub color: ColorLabel,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyzeData {
    pub detections: Vec<DetectionView>,
    pub total_persons: usize,
}

/// Success body of `POST /api/detection/analyze`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyzeResponse {
    pub status: &'static str,
    pub data: AnalyzeData,
}

impl AnalyzeResponse {
    pub fn from_report(report: &FrameReport) -> Self {
        let detections = report
            .detections
            .iter()
            .map(|d| DetectionView {
                bbox: d.bbox.to_pixels(),
                color: d.color,
                confidence: d.confidence,
            })
            .collect();
        Self {
            status: "success",
            data: AnalyzeData {
                detections,
                total_persons: report.total_persons(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    image: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl AnalyzeRequest {
    fn session_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get("session_id")?
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

struct ApiState {
    pipeline: Arc<Pipeline>,
    sessions: SessionStore,
    max_connections: usize,
    active_connections: AtomicUsize,
}

/// Holds one connection slot; released on drop.
struct ConnectionSlot {
    state: Arc<ApiState>,
}

impl ConnectionSlot {
    fn acquire(state: &Arc<ApiState>) -> Option<Self> {
        let acquired = state
            .active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < state.max_connections).then_some(active + 1)
            })
            .is_ok();
        acquired.then(|| Self {
            state: state.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    pipeline: Arc<Pipeline>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { cfg, pipeline }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid api address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let state = Arc::new(ApiState {
            pipeline: self.pipeline,
            sessions: SessionStore::new(self.cfg.distance_threshold, self.cfg.max_sessions),
            max_connections: self.cfg.max_connections,
            active_connections: AtomicUsize::new(0),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("detection-api".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, state, shutdown_thread) {
                    log::error!("detection api stopped: {}", err);
                }
            })
            .map_err(|e| anyhow!("failed to spawn api thread: {}", e))?;

        log::info!("detection api listening on http://{}", addr);
        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, state: Arc<ApiState>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((mut stream, _)) => {
                let Some(slot) = ConnectionSlot::acquire(&state) else {
                    log::warn!(
                        "detection api saturated ({} connections); rejecting",
                        state.max_connections
                    );
                    if let Err(err) = reject_busy(&mut stream) {
                        log::debug!("failed to send 503: {}", err);
                    }
                    continue;
                };
                let spawned = std::thread::Builder::new()
                    .name("detection-api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &slot.state) {
                            log::warn!("detection api request rejected: {}", err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("failed to spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn reject_busy(stream: &mut TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(200)))?;
    stream.set_write_timeout(Some(Duration::from_secs(1)))?;
    // Drain what the client already sent so closing does not reset the connection.
    let mut buf = [0u8; 4096];
    let _ = stream.read(&mut buf);
    write_error(stream, 503, "server busy")?;
    stream.shutdown(Shutdown::Write)?;
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &ApiState) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_error(&mut stream, 400, &format!("malformed request: {}", err))?;
            return Err(err);
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => write_json(&mut stream, 200, &json!({ "status": "UP" })),
        ("GET", "/info") => write_json(
            &mut stream,
            200,
            &json!({
                "app_name": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "status": if state.pipeline.is_degraded() { "Degraded" } else { "Running" },
                "backend": state.pipeline.backend_name(),
            }),
        ),
        ("GET", "/") => write_json(
            &mut stream,
            200,
            &json!({ "message": "Hallway Detection Service is running" }),
        ),
        ("POST", "/api/detection/analyze") => handle_analyze(&mut stream, state, &request.body),
        ("DELETE", path) if path.starts_with(SESSIONS_PREFIX) => {
            handle_end_session(&mut stream, state, &path[SESSIONS_PREFIX.len()..])
        }
        (_, "/health" | "/info" | "/" | "/api/detection/analyze") => {
            write_error(&mut stream, 405, "method not allowed")
        }
        (_, path) if path.starts_with(SESSIONS_PREFIX) => {
            write_error(&mut stream, 405, "method not allowed")
        }
        _ => write_error(&mut stream, 404, "not found"),
    }
}

fn handle_analyze(stream: &mut TcpStream, state: &ApiState, body: &[u8]) -> Result<()> {
    let request: AnalyzeRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => return write_error(stream, 400, &format!("invalid JSON body: {}", err)),
    };
    let frame = match request.image.as_deref().map(decode_image) {
        Some(Ok(frame)) => frame,
        Some(Err(err)) => {
            log::warn!("rejecting analyze request: {:#}", err);
            return write_error(stream, 400, "Invalid image data");
        }
        None => return write_error(stream, 400, "missing image field"),
    };

    let outcome = match request.session_id() {
        Some(session_id) => run_in_session(state, &frame, session_id),
        None => run_ephemeral(state, &frame),
    };

    match outcome {
        Ok(report) => {
            let body = serde_json::to_vec(&AnalyzeResponse::from_report(&report))?;
            write_response(stream, 200, "application/json", &body)
        }
        Err(err) => {
            log::error!("error processing image: {:#}", err);
            write_error(stream, 500, &format!("{:#}", err))
        }
    }
}

fn run_in_session(state: &ApiState, frame: &Frame, session_id: &str) -> Result<FrameReport> {
    match state.sessions.session(session_id)? {
        Some(tracker) => {
            let mut guard = tracker
                .lock()
                .map_err(|_| anyhow!("session '{}' tracker lock poisoned", session_id))?;
            let report = state.pipeline.process(frame, &mut guard)?;
            Ok(report)
        }
        None => run_ephemeral(state, frame),
    }
}

fn run_ephemeral(state: &ApiState, frame: &Frame) -> Result<FrameReport> {
    let mut tracker = state.sessions.ephemeral();
    state.pipeline.process(frame, &mut tracker)
}

fn handle_end_session(stream: &mut TcpStream, state: &ApiState, session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.contains('/') {
        return write_error(stream, 404, "not found");
    }
    match state.sessions.end(session_id) {
        Ok(true) => {
            log::info!("ended dedup session '{}'", session_id);
            write_response(stream, 204, "application/json", b"")
        }
        Ok(false) => write_error(stream, 404, "unknown session"),
        Err(err) => write_error(stream, 500, &format!("{:#}", err)),
    }
}

/// Decode a base64 image payload. A `data:` URL prefix is tolerated.
pub fn decode_image(encoded: &str) -> Result<Frame> {
    let encoded = encoded.trim();
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("image is not valid base64")?;
    Frame::decode(&bytes)
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_error(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    write_json(
        stream,
        status,
        &json!({ "status": "error", "message": message }),
    )
}

fn write_json(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}
