//! Control surface
//!
//! Newline-delimited JSON over a Unix domain socket. Each request line names a
//! method and its arguments and is answered with exactly one response line:
//!
//! ```text
//! {"method":"switchFrontend"}
//! {"ok":true,"result":"current frontend is kodi"}
//! ```
//!
//! Requests are forwarded onto the controller queue; the server never touches
//! controller state itself.

use crate::error::ArbiterError;
use crate::event::{Event, Scheduler};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const ACCEPT_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ControlRequest {
    #[serde(alias = "checkFrontend")]
    Status,
    ToggleFrontend,
    SwitchFrontend,
    GetFrontend,
    Attach {
        #[serde(default)]
        options: Option<String>,
    },
    Detach,
    Resume,
    BeginExternal,
    EndExternal,
    SoftDetach,
    InitShutdown,
    SendShutdown {
        #[serde(default)]
        user: bool,
    },
    SetDisplay {
        #[serde(default)]
        display: Option<String>,
    },
    GetDisplay,
    TempDisplay,
    Quit,
}

impl ControlRequest {
    /// Build a request from a method name and its optional single argument
    pub fn from_args(method: &str, arg: Option<&str>) -> crate::error::Result<Self> {
        let mut object = serde_json::Map::new();
        object.insert("method".to_string(), Value::String(method.to_string()));
        if let Some(arg) = arg {
            let (key, value) = match method {
                "attach" => ("options", Value::String(arg.to_string())),
                "setDisplay" => ("display", Value::String(arg.to_string())),
                "sendShutdown" => {
                    let user = arg.parse::<bool>().map_err(|_| {
                        ArbiterError::InvalidRequest(format!("expected true or false, got {:?}", arg))
                    })?;
                    ("user", Value::Bool(user))
                }
                _ => {
                    return Err(ArbiterError::InvalidRequest(format!(
                        "{} takes no argument",
                        method
                    )))
                }
            };
            object.insert(key.to_string(), value);
        }
        serde_json::from_value(Value::Object(object))
            .map_err(|e| ArbiterError::InvalidRequest(e.to_string()))
    }
}

/// Result of a control call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ControlReply {
    Bool(bool),
    Int(i32),
    Text(String),
    Unit,
}

/// One response line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn success(reply: ControlReply) -> Self {
        Self {
            ok: true,
            result: serde_json::to_value(reply).ok(),
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Bind the control socket, replacing a stale one left by a previous run
pub async fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
    info!("Control socket listening on {}", socket_path.display());
    Ok(listener)
}

/// Accept connections until the controller goes away
pub async fn serve(listener: UnixListener, scheduler: Scheduler) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, scheduler).await {
                        warn!("control connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                warn!("failed to accept control connection: {}", e);
                match accept_backoff(&scheduler) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return,
                }
            }
        }
    }
}

/// Pause after a failed accept, or None once nobody consumes requests
fn accept_backoff(scheduler: &Scheduler) -> Option<Duration> {
    if scheduler.is_closed() {
        None
    } else {
        Some(ACCEPT_RETRY)
    }
}

async fn handle_connection(stream: UnixStream, scheduler: Scheduler) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatch(&line, &scheduler).await;
        let mut bytes = serde_json::to_vec(&response)?;
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn dispatch(line: &str, scheduler: &Scheduler) -> ControlResponse {
    let request: ControlRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("rejecting control request {:?}: {}", line, e);
            return ControlResponse::failure(ArbiterError::InvalidRequest(e.to_string()));
        }
    };
    debug!("control request: {:?}", request);

    let (reply, answer) = oneshot::channel();
    if !scheduler.post(Event::Control { request, reply }) {
        return ControlResponse::failure("controller is not running");
    }
    match answer.await {
        Ok(reply) => ControlResponse::success(reply),
        Err(_) => ControlResponse::failure("controller dropped the request"),
    }
}

/// Send one request to a running daemon and wait for its response
pub async fn call(socket_path: &Path, request: &ControlRequest) -> Result<ControlResponse> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();

    let mut bytes = serde_json::to_vec(request)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    let line = lines
        .next_line()
        .await?
        .context("daemon closed the connection without answering")?;
    Ok(serde_json::from_str(&line)?)
}
