//! mpv JSON IPC over the `--input-ipc-server` unix socket
//!
//! Requests are single JSON lines carrying a `request_id`; replies echo it.
//! Asynchronous event lines interleave with replies and are skipped.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::remote::{Connector, RemoteControl, SeekMode};
use crate::error::{Error, Result};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const PROPERTY_UNAVAILABLE: &str = "property unavailable";

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    request_id: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    event: Option<String>,
}

struct Channel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

pub struct MpvIpc {
    channel: Mutex<Channel>,
    next_request: AtomicU64,
}

impl MpvIpc {
    pub async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket)
            .await
            .map_err(|e| Error::control(format!("connect {:?}: {}", socket, e)))?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            channel: Mutex::new(Channel {
                reader: BufReader::new(reader),
                writer,
            }),
            next_request: AtomicU64::new(1),
        }
    }

    /// Send one command and wait for its reply.
    ///
    /// The channel stays locked for the round trip so replies cannot be
    /// picked up by another caller.
    async fn command(&self, args: Value) -> Result<Reply> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let mut line = json!({ "command": args, "request_id": request_id }).to_string();
        line.push('\n');
        trace!("mpv <- {}", line.trim_end());

        let mut channel = self.channel.lock().await;
        channel
            .writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::control(format!("write to mpv: {}", e)))?;

        tokio::time::timeout(REPLY_TIMEOUT, read_reply(&mut channel.reader, request_id))
            .await
            .map_err(|_| Error::control("timed out waiting for mpv reply"))?
    }

    async fn expect_success(&self, args: Value) -> Result<Value> {
        let reply = self.command(args).await?;
        match reply.error.as_deref() {
            Some("success") | None => Ok(reply.data),
            Some(err) => Err(Error::control(err)),
        }
    }

    /// Numeric property that reads as 0 while mpv has nothing loaded
    async fn get_seconds(&self, property: &str) -> Result<f64> {
        let reply = self.command(json!(["get_property", property])).await?;
        match reply.error.as_deref() {
            Some("success") | None => reply
                .data
                .as_f64()
                .ok_or_else(|| Error::control(format!("{} is not a number", property))),
            Some(PROPERTY_UNAVAILABLE) => Ok(0.0),
            Some(err) => Err(Error::control(format!("get {}: {}", property, err))),
        }
    }
}

async fn read_reply(reader: &mut BufReader<OwnedReadHalf>, request_id: u64) -> Result<Reply> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::control(format!("read from mpv: {}", e)))?;
        if read == 0 {
            return Err(Error::control("mpv closed the control socket"));
        }

        let reply: Reply = match serde_json::from_str(line.trim_end()) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Ignoring unparsable mpv line {:?}: {}", line.trim_end(), e);
                continue;
            }
        };

        if let Some(ref event) = reply.event {
            trace!("mpv event: {}", event);
            continue;
        }
        if reply.request_id == Some(request_id) {
            return Ok(reply);
        }
        debug!("Dropping stale mpv reply {:?}", reply.request_id);
    }
}

#[async_trait]
impl RemoteControl for MpvIpc {
    async fn load(&self, path: &Path) -> Result<()> {
        self.expect_success(json!(["loadfile", path.to_string_lossy(), "replace"]))
            .await
            .map(|_| ())
    }

    async fn set_pause(&self, paused: bool) -> Result<()> {
        self.expect_success(json!(["set_property", "pause", paused]))
            .await
            .map(|_| ())
    }

    async fn paused(&self) -> Result<bool> {
        let data = self.expect_success(json!(["get_property", "pause"])).await?;
        data.as_bool()
            .ok_or_else(|| Error::control("pause is not a boolean"))
    }

    async fn seek(&self, offset_secs: f64, mode: SeekMode) -> Result<()> {
        self.expect_success(json!(["seek", offset_secs, mode.as_str()]))
            .await
            .map(|_| ())
    }

    async fn position(&self) -> Result<f64> {
        self.get_seconds("time-pos").await
    }

    async fn duration(&self) -> Result<f64> {
        self.get_seconds("duration").await
    }
}

/// Connects to the socket mpv creates for `--input-ipc-server`
pub struct MpvConnector {
    socket: PathBuf,
}

impl MpvConnector {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }
}

#[async_trait]
impl Connector for MpvConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteControl>> {
        let ipc = MpvIpc::connect(&self.socket).await?;
        Ok(Arc::new(ipc))
    }
}
