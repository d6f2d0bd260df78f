//! Single-in-flight command queue over a duplex byte stream.
//!
//! A dedicated worker task owns both stream halves after spawn; callers hand
//! it one command at a time and await the framed response. Responses are
//! delimited by a termination byte (the adapter's `>` prompt), commands by a
//! carriage return.

use core::fmt;
use std::sync::Mutex;
use std::time::Duration;

use canterm_interface::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{trace, warn};

/// Callback invoked with bytes that arrive while no command is active.
pub type UnsolicitedHandler = Box<dyn FnMut(&[u8]) + Send>;

/// Queue construction parameters.
pub struct QueueConfig {
    /// Byte that terminates a response (the adapter prompt).
    pub termination: u8,
    /// Observer for bytes received outside any command window.
    pub unsolicited: Option<UnsolicitedHandler>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            termination: b'>',
            unsolicited: None,
        }
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("termination", &(self.termination as char))
            .field("unsolicited", &self.unsolicited.is_some())
            .finish()
    }
}

struct CommandRequest {
    line: String,
    /// Per-command termination override (STN `STPX` waits for a bare CR).
    termination: Option<u8>,
    timeout: Duration,
    reply: oneshot::Sender<Result<String>>,
}

/// Handle to the I/O worker.
///
/// Commands are served strictly FIFO with at most one outstanding on the
/// wire; responses are matched to commands by position. [`shutdown`] is the
/// clean way out — dropping the handle instead tears the worker down without
/// resolving an in-flight command.
///
/// [`shutdown`]: StreamCommandQueue::shutdown
#[derive(Debug)]
pub struct StreamCommandQueue {
    requests: mpsc::Sender<CommandRequest>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRequest")
            .field("line", &self.line)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StreamCommandQueue {
    /// Spawn the worker with default configuration (`>` prompt framing).
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with_config(reader, writer, QueueConfig::default())
    }

    /// Spawn the worker, moving both stream halves into it.
    pub fn spawn_with_config<R, W>(reader: R, writer: W, config: QueueConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (requests, inbox) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(reader, writer, inbox, shutdown_rx, config));
        Self {
            requests,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Send one command and await its framed response.
    ///
    /// The timeout arms when the write completes; on expiry the command
    /// resolves with [`Error::Timeout`] and the queue is immediately ready
    /// for the next command.
    pub async fn send(&self, command: &str, timeout: Duration) -> Result<String> {
        self.send_expecting(command, None, timeout).await
    }

    /// Like [`send`](StreamCommandQueue::send), with a per-command
    /// termination byte replacing the configured prompt.
    pub async fn send_expecting(
        &self,
        command: &str,
        termination: Option<u8>,
        timeout: Duration,
    ) -> Result<String> {
        let (reply, receiver) = oneshot::channel();
        self.requests
            .send(CommandRequest {
                line: command.to_owned(),
                termination,
                timeout,
                reply,
            })
            .await
            .map_err(|_| Error::Shutdown)?;
        receiver.await.map_err(|_| Error::Shutdown)?
    }

    /// Resolve any in-flight command with [`Error::Shutdown`], stop the
    /// worker and release both stream halves.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let worker = self.worker.lock().expect("queue worker lock").take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl Drop for StreamCommandQueue {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(worker) = worker.take() {
                worker.abort();
            }
        }
    }
}

async fn run_worker<R, W>(
    mut reader: R,
    mut writer: W,
    mut inbox: mpsc::Receiver<CommandRequest>,
    mut shutdown: watch::Receiver<bool>,
    mut config: QueueConfig,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut scratch = [0u8; 512];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            request = inbox.recv() => {
                let Some(CommandRequest { line, termination, timeout, reply }) = request else {
                    break;
                };
                let termination = termination.unwrap_or(config.termination);
                let result = serve_command(
                    &mut reader,
                    &mut writer,
                    &mut shutdown,
                    &line,
                    termination,
                    timeout,
                    &mut scratch,
                )
                .await;
                let ended = matches!(result, Err(Error::Shutdown | Error::Disconnected));
                if reply.send(result).is_err() {
                    // The awaiting caller went away; the command already ran.
                    warn!(command = line.as_str(), "response discarded, waiter gone");
                }
                if ended {
                    break;
                }
            }
            read = reader.read(&mut scratch) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(count) => {
                        trace!(bytes = count, "unsolicited input");
                        if let Some(observer) = config.unsolicited.as_mut() {
                            observer(&scratch[..count]);
                        }
                    }
                }
            }
        }
    }
}

async fn serve_command<R, W>(
    reader: &mut R,
    writer: &mut W,
    shutdown: &mut watch::Receiver<bool>,
    line: &str,
    termination: u8,
    timeout: Duration,
    scratch: &mut [u8],
) -> Result<String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    trace!(command = line, "submit");
    let mut wire = Vec::with_capacity(line.len() + 1);
    wire.extend_from_slice(line.as_bytes());
    wire.push(b'\r');
    writer
        .write_all(&wire)
        .await
        .map_err(|err| Error::Bus(err.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|err| Error::Bus(err.to_string()))?;

    // The per-command timer arms once the write has gone out. Any stale
    // bytes from a timed-out predecessor are dropped with this fresh buffer.
    let deadline = Instant::now() + timeout;
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }
        tokio::select! {
            _ = shutdown.changed() => return Err(Error::Shutdown),
            read = tokio::time::timeout(remaining, reader.read(scratch)) => match read {
                Err(_) => return Err(Error::Timeout),
                Ok(Ok(0)) => return Err(Error::Disconnected),
                Ok(Err(err)) => return Err(Error::Bus(err.to_string())),
                Ok(Ok(count)) => {
                    pending.extend_from_slice(&scratch[..count]);
                    if let Some(position) = pending.iter().rposition(|&b| b == termination) {
                        let text = core::str::from_utf8(&pending[..position])
                            .map_err(|_| Error::InvalidCharacters)?;
                        let response = text
                            .trim_matches(|c: char| c == '\r' || c == '\n' || c == ' ')
                            .to_owned();
                        trace!(command = line, response = response.as_str(), "complete");
                        return Ok(response);
                    }
                }
            }
        }
    }
}
