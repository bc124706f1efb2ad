//! Stdio transport.
//!
//! Supervises a subprocess speaking newline-delimited JSON-RPC over its
//! standard streams: one UTF-8 JSON object per LF-terminated line on
//! stdin/stdout, stderr forwarded line-by-line to the logger. Useful for
//! local CLI-based MCP servers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ ExitStatus, Stdio };
use std::sync::{ Arc, Mutex as StdMutex };
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader };
use tokio::process::{ Child, Command };
use tokio::sync::{ mpsc, oneshot, Mutex };
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{ debug, error, warn };

use crate::errors::Error;
use crate::protocol::{ jsonrpc, JsonRpcMessage };
use crate::transport::{ StateCell, Transport, TransportState };

use async_trait::async_trait;

/// Default bound on a single inbound line.
const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Default grace period between closing stdin and killing the child.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the inbound message channel.
const INCOMING_BUFFER: usize = 64;

/// Configuration for spawning and supervising the server subprocess.
#[derive(Debug, Clone)]
pub struct StdioConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
    /// How long to wait for a graceful exit on close before killing.
    pub shutdown_timeout: Duration,
    /// Bound on a single inbound line; overruns are skipped as malformed.
    pub max_line_length: usize,
}

impl StdioConfig {
    /// Configuration for `program` with default tuning.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the argument list.
    pub fn args<I, S>(mut self, args: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the child's working directory.
    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Override the shutdown grace period.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Override the inbound line-length bound.
    pub fn max_line_length(mut self, limit: usize) -> Self {
        self.max_line_length = limit;
        self
    }
}

type Ack = oneshot::Sender<Result<(), Error>>;

/// A transport that owns a subprocess and frames messages over its
/// standard streams.
pub struct StdioTransport {
    config: StdioConfig,
    state: StateCell,
    /// Inbound messages; single consumer.
    incoming: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    /// Sender half, handed to the reader task on start.
    incoming_tx: StdMutex<Option<mpsc::Sender<JsonRpcMessage>>>,
    /// Outbound write queue; each entry acks once flushed.
    outgoing_tx: StdMutex<Option<mpsc::Sender<(String, Ack)>>>,
    /// The child, exclusively owned by this transport.
    child: Arc<Mutex<Option<Child>>>,
    /// Exit status, recorded once observed.
    exit_status: Arc<StdMutex<Option<ExitStatus>>>,
    /// Unblocks the reader if it is parked on a full inbound queue.
    closing: CancellationToken,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Create a transport for the given subprocess configuration. The
    /// child is not spawned until [`Transport::start`].
    pub fn new(config: StdioConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_BUFFER);
        Self {
            config,
            state: StateCell::new(),
            incoming: Mutex::new(incoming_rx),
            incoming_tx: StdMutex::new(Some(incoming_tx)),
            outgoing_tx: StdMutex::new(None),
            child: Arc::new(Mutex::new(None)),
            exit_status: Arc::new(StdMutex::new(None)),
            closing: CancellationToken::new(),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    /// The child's exit status, if it has been observed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit_status.lock().unwrap()
    }

    fn exit_cause(&self) -> Option<String> {
        self.exit_status().map(|status| format!("process exited with {status}"))
    }

    fn spawn_child(&self) -> Result<Child, Error> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            command.env(key, value);
        }
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }
        command
            .spawn()
            .map_err(|e| Error::NotConnected {
                cause: Some(format!("failed to spawn {}: {e}", self.config.program)),
            })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<(), Error> {
        if self.state.get() != TransportState::Unstarted {
            return Err(Error::Protocol("stdio transport already started".to_string()));
        }

        debug!(program = %self.config.program, "starting stdio transport");
        let mut child = self.spawn_child()?;

        let stdin = child.stdin
            .take()
            .ok_or_else(|| Error::Protocol("child stdin not piped".to_string()))?;
        let stdout = child.stdout
            .take()
            .ok_or_else(|| Error::Protocol("child stdout not piped".to_string()))?;
        let stderr = child.stderr
            .take()
            .ok_or_else(|| Error::Protocol("child stderr not piped".to_string()))?;

        let incoming_tx = self.incoming_tx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Protocol("stdio transport already started".to_string()))?;

        let (outgoing_tx, outgoing_rx) = mpsc::channel::<(String, Ack)>(32);
        *self.outgoing_tx.lock().unwrap() = Some(outgoing_tx);
        *self.child.lock().await = Some(child);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(write_lines(stdin, outgoing_rx)));
        tasks.push(tokio::spawn(forward_stderr(stderr)));

        let state = self.state.clone();
        let child_slot = self.child.clone();
        let exit_status = self.exit_status.clone();
        let max_line_length = self.config.max_line_length;
        let closing = self.closing.clone();
        tasks.push(
            tokio::spawn(async move {
                read_frames(stdout, max_line_length, incoming_tx, closing).await;
                // stdout closed: the child is gone or going
                record_exit(&child_slot, &exit_status, Duration::from_secs(2)).await;
                state.set(TransportState::Closed);
                debug!("stdio reader finished");
            })
        );
        *self.tasks.lock().unwrap() = tasks;

        self.state.set(TransportState::Connected);
        debug!("stdio transport connected");
        Ok(())
    }

    async fn send(&self, message: &JsonRpcMessage) -> Result<(), Error> {
        if !self.state.is_connected() {
            return Err(Error::NotConnected { cause: self.exit_cause() });
        }
        let line = jsonrpc::encode(message)?;

        let tx = self.outgoing_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::NotConnected { cause: self.exit_cause() })?;

        let (ack_tx, ack_rx) = oneshot::channel();
        tx
            .send((line, ack_tx)).await
            .map_err(|_| Error::NotConnected { cause: self.exit_cause() })?;

        // Blocks until the line is flushed, so wire order equals call order.
        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::NotConnected { cause: self.exit_cause() }),
        }
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        let mut incoming = self.incoming.lock().await;
        incoming.recv().await
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    async fn close(&self) -> Result<(), Error> {
        match self.state.get() {
            TransportState::Closed | TransportState::Closing => {
                return Ok(());
            }
            _ => {}
        }
        self.state.set(TransportState::Closing);
        self.closing.cancel();
        debug!("stdio transport closing");

        // Dropping the queue lets the writer drain, then drop stdin; EOF on
        // stdin is the graceful termination signal.
        drop(self.outgoing_tx.lock().unwrap().take());

        {
            let mut guard = self.child.lock().await;
            if let Some(child) = guard.as_mut() {
                match tokio::time::timeout(self.config.shutdown_timeout, child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!(%status, "child exited");
                        *self.exit_status.lock().unwrap() = Some(status);
                    }
                    Ok(Err(e)) => {
                        warn!("error waiting for child: {e}");
                    }
                    Err(_) => {
                        warn!(
                            timeout = ?self.config.shutdown_timeout,
                            "child did not exit in time, killing"
                        );
                        if let Err(e) = child.kill().await {
                            warn!("error killing child: {e}");
                        }
                        if let Ok(Some(status)) = child.try_wait() {
                            *self.exit_status.lock().unwrap() = Some(status);
                        }
                    }
                }
            }
            *guard = None;
        }

        // With the child gone all three I/O tasks run to completion.
        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("error joining stdio task: {e}");
            }
        }

        self.state.set(TransportState::Closed);
        debug!("stdio transport closed");
        Ok(())
    }
}

/// Serialize queued lines onto the child's stdin, acking each flush.
async fn write_lines(
    mut stdin: tokio::process::ChildStdin,
    mut outgoing_rx: mpsc::Receiver<(String, Ack)>
) {
    while let Some((line, ack)) = outgoing_rx.recv().await {
        let result = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
            Ok::<(), std::io::Error>(())
        }.await;

        match result {
            Ok(()) => {
                let _ = ack.send(Ok(()));
            }
            Err(e) => {
                let _ = ack.send(Err(Error::NotConnected { cause: Some(e.to_string()) }));
                break;
            }
        }
    }
    // stdin drops here, closing the child's input
}

/// Forward the child's stderr to the logger, line by line.
async fn forward_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "mcp_client::stdio", "server stderr: {line}"),
            Ok(None) => break,
            Err(e) => {
                warn!("error reading child stderr: {e}");
                break;
            }
        }
    }
}

/// Parse LF-delimited frames from the child's stdout.
///
/// Lines beyond `max_line_length` are skipped (with the rest of the line
/// discarded) rather than killing the stream; a partial line at EOF is
/// discarded.
async fn read_frames<R: AsyncRead + Unpin>(
    stdout: R,
    max_line_length: usize,
    incoming_tx: mpsc::Sender<JsonRpcMessage>,
    closing: CancellationToken
) {
    let mut reader = BufReader::new(stdout);
    let mut line: Vec<u8> = Vec::new();
    let mut discarding = false;

    'outer: loop {
        let (consumed, frame) = {
            let chunk = match reader.fill_buf().await {
                Ok(chunk) if chunk.is_empty() => break,
                Ok(chunk) => chunk,
                Err(e) => {
                    error!("error reading child stdout: {e}");
                    break;
                }
            };

            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let mut frame = None;
                    if discarding {
                        // tail of an overlong line
                        discarding = false;
                    } else if line.len() + pos > max_line_length {
                        warn!(limit = max_line_length, "dropping overlong line");
                    } else {
                        line.extend_from_slice(&chunk[..pos]);
                        frame = Some(std::mem::take(&mut line));
                    }
                    line.clear();
                    (pos + 1, frame)
                }
                None => {
                    if !discarding {
                        if line.len() + chunk.len() > max_line_length {
                            warn!(limit = max_line_length, "dropping overlong line");
                            discarding = true;
                            line.clear();
                        } else {
                            line.extend_from_slice(chunk);
                        }
                    }
                    (chunk.len(), None)
                }
            }
        };
        reader.consume(consumed);

        if let Some(frame) = frame {
            let text = match std::str::from_utf8(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("dropping non-UTF-8 line: {e}");
                    continue;
                }
            };
            match jsonrpc::decode(text) {
                Ok(message) => {
                    // A full queue must not wedge shutdown.
                    let delivered = tokio::select! {
                        result = incoming_tx.send(message) => result.is_ok(),
                        _ = closing.cancelled() => false,
                    };
                    if !delivered {
                        break 'outer;
                    }
                }
                Err(e) => {
                    warn!("dropping undecodable frame: {e}");
                }
            }
        }
    }
}

/// Record the child's exit status once it becomes observable.
async fn record_exit(
    child: &Mutex<Option<Child>>,
    exit_status: &StdMutex<Option<ExitStatus>>,
    patience: Duration
) {
    let deadline = Instant::now() + patience;
    loop {
        if exit_status.lock().unwrap().is_some() {
            return;
        }
        {
            let mut guard = child.lock().await;
            match guard.as_mut() {
                None => {
                    return;
                }
                Some(child) => {
                    if let Ok(Some(status)) = child.try_wait() {
                        *exit_status.lock().unwrap() = Some(status);
                        return;
                    }
                }
            }
        }
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
