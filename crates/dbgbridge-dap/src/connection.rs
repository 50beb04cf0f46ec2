//! Live connection to a debug adapter process.
//!
//! A writer task drains framed requests into the adapter's stdin and a
//! reader task decodes its stdout: responses are routed to the waiting
//! request by `request_seq`, events are forwarded on a channel.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use dbgbridge_config::AdapterConfig;

use crate::error::DapError;
use crate::protocol::{Event, IncomingMessage, Request, Response};
use crate::transport::{encode_message, read_message};

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Response>>>>;

/// A request that has been written but not yet answered.
#[derive(Debug)]
pub struct PendingResponse {
    command: String,
    rx: oneshot::Receiver<Response>,
}

/// An adapter connection: stdin writer, stdout reader and the pending
/// request table.
pub struct DapConnection {
    writer_tx: mpsc::Sender<Vec<u8>>,
    pending: Pending,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl DapConnection {
    /// Spawn the adapter described by `adapter` and connect to its stdio.
    ///
    /// Adapter events are delivered on `events`. When the adapter's output
    /// ends, a `terminated` event is delivered and pending requests fail.
    pub fn spawn(
        adapter: &AdapterConfig,
        request_timeout: Duration,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<Self, DapError> {
        let mut child = Command::new(&adapter.command)
            .args(&adapter.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DapError::AdapterSpawnFailed {
                command: adapter.command.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DapError::Transport("could not capture adapter stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DapError::Transport("could not capture adapter stdout".into()))?;

        tracing::info!(command = %adapter.command, pid = ?child.id(), "debug adapter started");
        let mut connection = Self::from_io(stdout, stdin, request_timeout, events);
        connection.child = Some(child);
        Ok(connection)
    }

    /// Connect over an arbitrary byte stream pair.
    pub fn from_io<R, W>(
        reader: R,
        writer: W,
        request_timeout: Duration,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(msg) = writer_rx.recv().await {
                if writer.write_all(&msg).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(
            BufReader::new(reader),
            Arc::clone(&pending),
            events,
        ));

        Self {
            writer_tx,
            pending,
            request_timeout,
            reader,
            child: None,
        }
    }

    /// Write `request` without waiting for its response.
    pub async fn send(&self, request: &Request) -> Result<PendingResponse, DapError> {
        let value =
            serde_json::to_value(request).map_err(|e| DapError::Transport(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request.seq, tx);

        tracing::debug!(seq = request.seq, command = %request.command, "-> adapter");
        if self.writer_tx.send(encode_message(&value)).await.is_err() {
            self.pending.lock().await.remove(&request.seq);
            return Err(DapError::Transport("adapter input closed".into()));
        }
        Ok(PendingResponse {
            command: request.command.clone(),
            rx,
        })
    }

    /// Wait for the response to an earlier [`send`](Self::send).
    ///
    /// Returns the response body. An unsuccessful response is `Rejected`.
    pub async fn wait(
        &self,
        pending: PendingResponse,
    ) -> Result<Option<serde_json::Value>, DapError> {
        let PendingResponse { command, rx } = pending;
        let response = timeout(self.request_timeout, rx)
            .await
            .map_err(|_| DapError::Timeout {
                command: command.clone(),
            })?
            .map_err(|_| DapError::Transport("adapter closed the connection".into()))?;

        if !response.success {
            return Err(DapError::Rejected {
                message: response
                    .message
                    .unwrap_or_else(|| format!("{command} failed")),
            });
        }
        Ok(response.body)
    }

    /// Send `request` and wait for its response body.
    pub async fn request(&self, request: &Request) -> Result<Option<serde_json::Value>, DapError> {
        let pending = self.send(request).await?;
        self.wait(pending).await
    }

    /// Stop the reader and kill the adapter process, if one was spawned.
    pub async fn shutdown(mut self) {
        self.reader.abort();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!("failed to kill debug adapter: {e}");
            }
        }
    }
}

impl Drop for DapConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(
    mut reader: BufReader<R>,
    pending: Pending,
    events: mpsc::UnboundedSender<Event>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let value = match read_message(&mut reader).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!("debug adapter closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!("debug adapter stream failed: {e}");
                break;
            }
        };

        match IncomingMessage::from_value(value) {
            Ok(IncomingMessage::Response(response)) => {
                tracing::debug!(
                    request_seq = response.request_seq,
                    command = %response.command,
                    success = response.success,
                    "<- adapter"
                );
                match pending.lock().await.remove(&response.request_seq) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::warn!(
                        "response for unknown request seq {}",
                        response.request_seq
                    ),
                }
            }
            Ok(IncomingMessage::Event(event)) => {
                tracing::trace!(event = %event.event, "<- adapter");
                if events.send(event).is_err() {
                    break;
                }
            }
            Ok(IncomingMessage::Request(request)) => {
                tracing::debug!(command = %request.command, "ignoring reverse request");
            }
            Err(e) => tracing::warn!("malformed adapter message: {e}"),
        }
    }

    // Fail every outstanding request.
    pending.lock().await.clear();
    let _ = events.send(Event {
        seq: 0,
        message_type: "event".into(),
        event: "terminated".into(),
        body: None,
    });
}
