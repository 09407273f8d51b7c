//! Newline-delimited JSON-RPC over a byte stream, plus local process spawning.
//!
//! A background reader task owns the read half and routes every incoming
//! frame:
//!
//! ```text
//! reader loop ─┬─ response (id = N)    → pending[N] oneshot
//!              ├─ server request       → "method not found" reply
//!              └─ notification         → trace log
//! ```
//!
//! A request registers its id before writing and deregisters on drop, so a
//! call abandoned by a timeout never leaves a stale slot. A response for an
//! id nobody waits for is discarded.

use super::error::{McpError, Result};
use super::protocol::{JsonRpcErrorReply, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use super::transport::{MessageKind, McpTransport, classify_message};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type SharedWriter = Arc<AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// JSON-RPC channel over any async byte stream.
pub struct RpcChannel {
    label: String,
    writer: SharedWriter,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcChannel {
    /// Start the reader loop and return the channel.
    pub fn spawn<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let label = label.into();
        let writer: SharedWriter = Arc::new(AsyncMutex::new(Box::new(writer)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(reader_loop(
            label.clone(),
            reader,
            Arc::clone(&pending),
            Arc::clone(&writer),
            Arc::clone(&alive),
        ));

        Self {
            label,
            writer,
            pending,
            alive,
            reader_task: Mutex::new(Some(task)),
        }
    }

    /// Number of requests currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    async fn write_frame<T: Serialize>(&self, frame: &T) -> Result<()> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed);
        }
        let result = write_line(&self.writer, frame).await;
        if result.is_err() {
            self.alive.store(false, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl McpTransport for RpcChannel {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = JsonRpcRequest::new(method, params);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request.id, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            id: request.id,
        };

        trace!(channel = %self.label, id = request.id, method, "Sending request");
        self.write_frame(&request).await?;

        let raw = rx.await.map_err(|_| McpError::TransportClosed)?;
        JsonRpcResponse::into_result(raw)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.write_frame(&JsonRpcNotification::new(method, params)).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        lock(&self.pending).clear();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        if let Some(task) = self
            .reader_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

/// Removes a request's pending entry when the request future ends,
/// whichever way it ends.
struct PendingSlot<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Value>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

async fn write_line<T: Serialize>(writer: &SharedWriter, frame: &T) -> Result<()> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn reader_loop<R>(
    label: String,
    reader: R,
    pending: PendingMap,
    writer: SharedWriter,
    alive: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(channel = %label, "Stream closed by peer");
                break;
            }
            Err(e) => {
                warn!(channel = %label, error = %e, "Read failed");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                // Servers sometimes print banners on stdout
                debug!(channel = %label, error = %e, "Skipping non-JSON line");
                continue;
            }
        };

        match classify_message(&message) {
            MessageKind::Response { id: Some(id) } => {
                let waiter = lock(&pending).remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(message);
                    }
                    None => debug!(channel = %label, id, "Discarding response nobody waits for"),
                }
            }
            MessageKind::Response { id: None } => {
                debug!(channel = %label, "Discarding response with foreign id");
            }
            MessageKind::IncomingRequest { id, method } => {
                debug!(channel = %label, method = %method, "Rejecting server request");
                let reply = JsonRpcErrorReply::method_not_found(id, &method);
                if let Err(e) = write_line(&writer, &reply).await {
                    warn!(channel = %label, error = %e, "Failed to answer server request");
                }
            }
            MessageKind::Notification { method } => {
                trace!(channel = %label, method = %method, "Server notification");
            }
            MessageKind::Invalid => {
                debug!(channel = %label, "Skipping message without id or method");
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with TransportClosed
    lock(&pending).clear();
}

/// A spawned MCP server process.
///
/// Killed on [`kill`](Self::kill) or, failing that, on drop. On Linux the
/// child also receives SIGTERM if this process dies first.
pub struct ChildProcess {
    label: String,
    child: Mutex<Option<Child>>,
}

impl ChildProcess {
    pub fn id(&self) -> Option<u32> {
        self.child
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Child::id)
    }

    /// Kill the process and reap it. Idempotent.
    pub async fn kill(&self) {
        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                debug!(source = %self.label, error = %e, "Kill failed (process already gone?)");
            }
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.get_mut().unwrap_or_else(|e| e.into_inner()).as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Spawn `command` with piped stdio and connect a channel to it.
///
/// `env` is added on top of the inherited environment. The child's stderr
/// is forwarded to the log at debug level.
pub fn spawn_process(
    source_name: &str,
    command: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
) -> std::io::Result<(ChildProcess, RpcChannel)> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(target_os = "linux")]
    {
        // SAFETY: prctl(PR_SET_PDEATHSIG) is async-signal-safe and only
        // affects the child being spawned.
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("child stdin unavailable"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout unavailable"))?;

    if let Some(stderr) = child.stderr.take() {
        let label = source_name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(source = %label, "stderr: {}", line);
            }
        });
    }

    debug!(source = %source_name, pid = ?child.id(), command, "Spawned tool process");

    let channel = RpcChannel::spawn(source_name, stdout, stdin);
    let process = ChildProcess {
        label: source_name.to_string(),
        child: Mutex::new(Some(child)),
    };
    Ok((process, channel))
}
