//! mpv-backed `AudioOutput`, driven over mpv's JSON IPC socket.
//!
//! Architecture:
//!
//! ```text
//!   MpvOutput ── connection() ──▶ MpvDriver::spawn_and_connect()
//!                                       │
//!                                       ├── writer_task  ← MpvRequest via mpsc → socket
//!                                       └── reader_task  ← JSON lines from socket
//!                                              ├── response (request_id) → oneshot
//!                                              └── event / property-change → observer_task
//!                                                                   │
//!                                                     watch<Observed> ◀┘
//! ```
//!
//! `play()` unpauses and then waits on the observed state until mpv reports
//! `core-idle == false` (audio flowing) or an `end-file` error.  The caller
//! bounds that wait with its own timeout.
//!
//! Only Unix domain sockets are supported; elsewhere every operation fails
//! with an `Output` error.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

use crate::audio::AudioOutput;
use crate::error::{OutputError, PlaybackError};

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed observe_property IDs.
const OBS_CORE_IDLE: u64 = 1;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, OutputError>>>>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line, newline-terminated
    reply: oneshot::Sender<Result<Value, OutputError>>,
}

/// An unsolicited mpv event or property-change.
#[derive(Debug, Clone)]
struct MpvEvent {
    raw: Value,
}

impl MpvEvent {
    fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

/// What we have seen mpv report for the current source.
#[derive(Debug, Clone, Default, PartialEq)]
struct Observed {
    core_idle: Option<bool>,
    /// Set by an `end-file` with reason `error`.
    end_error: Option<String>,
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task of one IPC connection.
#[derive(Clone)]
struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    async fn send(&self, command: Value) -> Result<Value, OutputError> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = msg.to_string();
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| OutputError::Ipc("writer task gone".to_string()))?;

        tokio::time::timeout(REPLY_TIMEOUT, reply_rx)
            .await
            .map_err(|_| OutputError::Ipc(format!("timeout for req={req_id}")))?
            .map_err(|_| OutputError::Ipc(format!("reply channel dropped req={req_id}")))?
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<(), OutputError> {
        self.send(json!(["set_property", name, value])).await?;
        Ok(())
    }

    async fn observe_core_idle(&self) {
        match self
            .send(json!(["observe_property", OBS_CORE_IDLE, "core-idle"]))
            .await
        {
            Ok(_) => debug!("mpv: observing core-idle"),
            Err(e) => warn!("mpv: observe_property core-idle failed: {}", e),
        }
    }
}

fn volume_percent(volume: f32) -> f64 {
    (f64::from(volume) * 100.0).clamp(0.0, 100.0)
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    fn new() -> Self {
        Self {
            socket_name: airwave_proto::platform::mpv_socket_name(),
            process: None,
        }
    }

    fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                match status.code() {
                    Some(code) => warn!("mpv process exited with code: {}", code),
                    None => warn!("mpv process terminated by signal"),
                }
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    #[cfg(unix)]
    async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> Result<MpvHandle, OutputError> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning new process");
        let mpv_binary =
            airwave_proto::platform::find_mpv_binary().ok_or(OutputError::BinaryNotFound)?;

        let data_dir = airwave_proto::platform::data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let stderr_path = data_dir.join("mpv-stderr.log");
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;
        debug!("mpv: logging stderr to {:?}", stderr_path);

        let child = tokio::process::Command::new(&mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--quiet")
            .arg(airwave_proto::platform::mpv_socket_arg())
            .arg(format!("--volume={}", volume_percent(volume).round() as i64))
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .kill_on_drop(true)
            .spawn()?;
        info!("mpv: spawned process with pid {:?}", child.id());
        self.process = Some(child);

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            return Err(OutputError::SocketTimeout);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(start_io_tasks(stream, event_tx))
    }

    /// Attach to an mpv left running by a previous daemon.
    #[cfg(unix)]
    async fn try_reconnect(&mut self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let socket_path = std::path::PathBuf::from(&self.socket_name);
        if !socket_path.exists() {
            return None;
        }
        match UnixStream::connect(&socket_path).await {
            Ok(stream) => {
                info!("mpv: reconnected to existing IPC socket");
                Some(start_io_tasks(stream, event_tx))
            }
            Err(e) => {
                debug!("mpv: stale socket {:?}: {}", socket_path, e);
                None
            }
        }
    }

    #[cfg(not(unix))]
    async fn spawn_and_connect(
        &mut self,
        _volume: f32,
        _event_tx: mpsc::Sender<MpvEvent>,
    ) -> Result<MpvHandle, OutputError> {
        Err(OutputError::Ipc("mpv IPC requires a Unix socket".to_string()))
    }

    #[cfg(not(unix))]
    async fn try_reconnect(&mut self, _event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        None
    }
}

#[cfg(unix)]
fn start_io_tasks(stream: UnixStream, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle {
    let (read_half, write_half) = stream.into_split();
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(OutputError::Ipc(reason.to_string())));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    let Some(tx) = pending.lock().await.remove(&req_id) else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                        continue;
                    };
                    let result = match val["error"].as_str() {
                        Some("success") => Ok(val),
                        other => Err(OutputError::Rejected(
                            other.unwrap_or("unknown error").to_string(),
                        )),
                    };
                    let _ = tx.send(result);
                } else if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, &format!("read error: {e}")).await;
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: req={} {}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(OutputError::Ipc(format!("write error: {e}"))));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── observer task ─────────────────────────────────────────────────────────────

/// Fold unsolicited events into the shared `Observed` state.
async fn observer_task(mut rx: mpsc::Receiver<MpvEvent>, observed: Arc<watch::Sender<Observed>>) {
    while let Some(evt) = rx.recv().await {
        if let Some((id, data)) = evt.as_property_change() {
            if id == OBS_CORE_IDLE {
                let idle = data.as_bool();
                observed.send_if_modified(|o| {
                    let changed = o.core_idle != idle;
                    o.core_idle = idle;
                    changed
                });
            }
            continue;
        }

        match evt.event_name() {
            Some("start-file") => {
                debug!("mpv: start-file");
                observed.send_modify(|o| o.core_idle = Some(true));
            }
            Some("end-file") => {
                let reason = evt.raw["reason"].as_str().unwrap_or("unknown");
                info!("mpv: end-file reason={}", reason);
                if reason == "error" {
                    let detail = evt.raw["file_error"]
                        .as_str()
                        .unwrap_or("playback error")
                        .to_string();
                    observed.send_modify(|o| {
                        o.core_idle = Some(true);
                        o.end_error = Some(detail);
                    });
                }
            }
            _ => {}
        }
    }
    debug!("mpv observer: task exiting");
}

/// Map mpv's `file_error` text onto a playback error.
fn classify_end_error(detail: &str) -> PlaybackError {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("format") || lower.contains("unrecognized") || lower.contains("codec") {
        PlaybackError::Unsupported(detail.to_string())
    } else {
        PlaybackError::Unreachable(detail.to_string())
    }
}

// ── MpvOutput ─────────────────────────────────────────────────────────────────

struct Connection {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    volume: f32,
}

pub struct MpvOutput {
    conn: Mutex<Connection>,
    observed: Arc<watch::Sender<Observed>>,
}

impl Default for MpvOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl MpvOutput {
    pub fn new() -> Self {
        let (observed, _) = watch::channel(Observed::default());
        Self {
            conn: Mutex::new(Connection {
                driver: MpvDriver::new(),
                handle: None,
                volume: 1.0,
            }),
            observed: Arc::new(observed),
        }
    }

    /// Current handle, (re)spawning mpv if it is not running.  The lock is
    /// only held while connecting, never across a playback wait.
    async fn connection(&self) -> Result<MpvHandle, OutputError> {
        let mut conn = self.conn.lock().await;

        let writer_gone = conn.handle.as_ref().is_some_and(|h| h.tx.is_closed());
        let process_died = conn.driver.process.is_some() && !conn.driver.process_alive();
        if conn.handle.is_some() && (writer_gone || process_died) {
            warn!("mpv: connection lost, dropping handle");
            conn.handle = None;
        }
        if let Some(handle) = conn.handle.clone() {
            return Ok(handle);
        }

        let (event_tx, event_rx) = mpsc::channel::<MpvEvent>(64);
        tokio::spawn(observer_task(event_rx, Arc::clone(&self.observed)));
        self.observed.send_replace(Observed::default());

        let handle = match conn.driver.try_reconnect(event_tx.clone()).await {
            Some(h) => h,
            None => {
                let volume = conn.volume;
                conn.driver.spawn_and_connect(volume, event_tx).await?
            }
        };
        handle.observe_core_idle().await;
        conn.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Kill the mpv process.  Called once by the daemon on exit.
    pub async fn close(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(handle) = conn.handle.take() {
            let _ = handle.send(json!(["quit"])).await;
        }
        conn.driver.kill().await;
        info!("mpv: closed");
    }
}

#[async_trait]
impl AudioOutput for MpvOutput {
    async fn set_source(&self, url: &str) -> Result<(), PlaybackError> {
        let handle = self.connection().await?;
        handle.set_property("pause", json!(true)).await?;
        handle.send(json!(["loadfile", url])).await?;
        self.observed.send_modify(|o| {
            o.core_idle = None;
            o.end_error = None;
        });
        debug!("mpv: source set to {}", url);
        Ok(())
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        let handle = self.connection().await?;
        let mut rx = self.observed.subscribe();
        handle.set_property("pause", json!(false)).await?;

        let observed = rx
            .wait_for(|o| o.core_idle == Some(false) || o.end_error.is_some())
            .await
            .map_err(|_| PlaybackError::Output("mpv observer gone".to_string()))?
            .clone();

        match observed.end_error {
            Some(detail) => Err(classify_end_error(&detail)),
            None => Ok(()),
        }
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        let handle = self.connection().await?;
        handle.set_property("pause", json!(true)).await?;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        self.conn.lock().await.volume = volume;
        let handle = self.connection().await?;
        handle
            .set_property("volume", json!(volume_percent(volume)))
            .await?;
        Ok(())
    }

    async fn release(&self) -> Result<(), PlaybackError> {
        let handle = self.connection().await?;
        handle.send(json!(["stop"])).await?;
        self.observed.send_modify(|o| {
            o.core_idle = None;
            o.end_error = None;
        });
        Ok(())
    }
}
