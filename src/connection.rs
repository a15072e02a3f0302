use crate::config::ConnectionConfig;
use crate::error::{CvmError, Result};
use crate::position::PositionModel;
use crate::protocol::{parse_line, Command, CREDENTIAL_TERMINATOR};
use crate::signal::{Latch, Pulse};
use crate::subscription::PushCallback;
use crate::tracker::StatusTracker;
use crate::types::DeviceState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

const USER_PROMPT: &[u8] = b"User:";
const PASSWORD_PROMPT: &[u8] = b"Password:";
const CONNECTED_PROMPT: &[u8] = b"Connected:";
const PROMPT_END: u8 = b':';

/// State shared between the client and the read loop
///
/// The read loop is the only writer of the device state. Everyone else reads
/// published snapshots.
pub(crate) struct Shared {
    model: RwLock<Box<dyn PositionModel>>,
    state: watch::Sender<DeviceState>,
    online: AtomicBool,
    callback: Mutex<Option<PushCallback>>,
    updates: broadcast::Sender<DeviceState>,
    pub initialized: Latch,
    pub settled: Pulse,
}

impl Shared {
    pub fn new(model: Box<dyn PositionModel>) -> Self {
        let (state, _) = watch::channel(DeviceState::default());
        let (updates, _) = broadcast::channel(100);
        Self {
            model: RwLock::new(model),
            state,
            online: AtomicBool::new(false),
            callback: Mutex::new(None),
            updates,
            initialized: Latch::new(),
            settled: Pulse::new(),
        }
    }

    pub fn model(&self) -> RwLockReadGuard<'_, Box<dyn PositionModel>> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replace_model(&self, model: Box<dyn PositionModel>) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = model;
    }

    pub fn snapshot(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_callback(&self, callback: PushCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceState> {
        self.updates.subscribe()
    }

    /// Feed one received line through the parser and tracker
    pub(crate) fn handle_line(&self, tracker: &mut StatusTracker, line: &[u8]) {
        tracing::debug!("<- {:?}", String::from_utf8_lossy(line));
        if line.trim_ascii().is_empty() {
            return;
        }

        let Some(frame) = parse_line(line) else {
            tracing::warn!("Unexpected screen response: {:?}", String::from_utf8_lossy(line));
            return;
        };

        let outcome = {
            let model = self.model();
            tracker.apply(frame.event(), model.as_ref())
        };

        if outcome.changed {
            self.state.send_replace(tracker.state().clone());
        }
        if outcome.positioned {
            self.initialized.set();
        }
        if outcome.push {
            self.push(tracker.state().clone());
        }
        if outcome.settled {
            self.settled.fire();
        }
    }

    fn push(&self, state: DeviceState) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(state.clone());
        }
        // No subscribers is fine
        let _ = self.updates.send(state);
    }
}

/// Write half of a session, taken by whichever side tears it down first
type SharedWriter<W> = Arc<tokio::sync::Mutex<Option<W>>>;

/// An authenticated session with a running read loop
struct Session {
    writer: SharedWriter<OwnedWriteHalf>,
    listener: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Telnet connection to the CVM controller
///
/// Reconnects on demand: every command opens a new session first when the
/// previous one was lost.
pub(crate) struct Connection {
    config: ConnectionConfig,
    shared: Arc<Shared>,
    session: tokio::sync::Mutex<Option<Session>>,
    last_command: Mutex<Option<Instant>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig, shared: Arc<Shared>) -> Self {
        Self {
            config,
            shared,
            session: tokio::sync::Mutex::new(None),
            last_command: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a session unless one is already online
    pub async fn open(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        self.ensure_session(&mut slot).await
    }

    /// Log in and immediately disconnect again
    pub async fn probe(&self) -> Result<()> {
        let (_reader, mut writer) = self.handshake().await?;
        let _ = writer.shutdown().await;
        Ok(())
    }

    /// Close the current session, if any
    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            tracing::info!("Closing connection to {}", self.config.address());
            shutdown_writer(&session.writer).await;
        }
        self.shared.set_online(false);
    }

    /// Wait out or refuse a command that comes too soon after the last one
    ///
    /// Returns `false` when `wait` is not set and the command should be skipped.
    pub async fn throttle(&self, wait: bool) -> bool {
        let min_interval = self.config.timeouts.min_command_interval;
        let last = *self.last_command.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                if !wait {
                    return false;
                }
                sleep(min_interval - elapsed).await;
            }
        }
        true
    }

    /// Write one command, connecting first if needed
    pub async fn send(&self, command: Command) -> Result<()> {
        let mut slot = self.session.lock().await;
        self.ensure_session(&mut slot).await?;

        let Some(session) = slot.as_mut() else {
            return Err(CvmError::ConnectionClosed);
        };

        tracing::debug!("-> {}", command);
        let written = match session.writer.lock().await.as_mut() {
            Some(writer) => writer.write_all(&command.to_line()).await.map_err(CvmError::from),
            None => Err(CvmError::ConnectionClosed),
        };
        if let Err(e) = written {
            tracing::error!("Failed to send command: {}", e);
            *slot = None;
            self.shared.set_online(false);
            return Err(e);
        }

        *self.last_command.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        Ok(())
    }

    async fn ensure_session(&self, slot: &mut Option<Session>) -> Result<()> {
        if self.shared.is_online() && slot.is_some() {
            return Ok(());
        }

        // Drop whatever is left of a lost session
        *slot = None;

        let (reader, writer) = match self.handshake().await {
            Ok(halves) => halves,
            Err(e) => {
                self.shared.set_online(false);
                tracing::error!("Connect sequence error: {}", e);
                return Err(e);
            }
        };

        self.shared.set_online(true);
        let writer = Arc::new(tokio::sync::Mutex::new(Some(writer)));
        let listener = tokio::spawn(read_loop(reader, self.shared.clone(), writer.clone()));
        *slot = Some(Session { writer, listener });
        tracing::info!("Connected to {}", self.config.address());
        Ok(())
    }

    async fn handshake(&self) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
        let address = self.config.address();
        tracing::debug!("Establish new connection to {}", address);

        let stream = timeout(self.config.timeouts.connect, TcpStream::connect(&address))
            .await
            .map_err(|_| CvmError::Connection(format!("timed out connecting to {}", address)))?
            .map_err(|e| CvmError::Connection(format!("cannot connect to {}: {}", address, e)))?;

        let (read, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read);
        login(&mut reader, &mut writer, &self.config)
            .await
            .map_err(|e| CvmError::Connection(format!("login to {} failed: {}", address, e)))?;

        Ok((reader, writer))
    }
}

/// Run the `User:` / `Password:` / `Connected:` login sequence
pub(crate) async fn login<R, W>(reader: &mut R, writer: &mut W, config: &ConnectionConfig) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let limit = config.timeouts.login;

    expect_prompt(reader, USER_PROMPT, limit).await?;
    write_credential(writer, &config.username).await?;

    expect_prompt(reader, PASSWORD_PROMPT, limit).await?;
    write_credential(writer, &config.password).await?;

    expect_prompt(reader, CONNECTED_PROMPT, limit).await
}

async fn expect_prompt<R>(reader: &mut R, prompt: &[u8], limit: Duration) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    timeout(limit, read_prompt(reader, prompt))
        .await
        .map_err(|_| CvmError::LoginTimeout {
            prompt: String::from_utf8_lossy(prompt).into_owned(),
        })?
}

async fn read_prompt<R>(reader: &mut R, prompt: &[u8]) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut seen = Vec::new();
    loop {
        if reader.read_until(PROMPT_END, &mut seen).await? == 0 {
            return Err(CvmError::ConnectionClosed);
        }
        if seen.ends_with(prompt) {
            return Ok(());
        }
    }
}

async fn write_credential<W>(writer: &mut W, credential: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = credential.as_bytes().to_vec();
    line.extend_from_slice(CREDENTIAL_TERMINATOR);
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read status lines until the controller goes away, then close the session
async fn read_loop<R, W>(mut reader: R, shared: Arc<Shared>, writer: SharedWriter<W>)
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tracker = StatusTracker::resume(shared.snapshot());
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                tracing::error!("Connection lost during read: end of stream");
                break;
            }
            Ok(_) => shared.handle_line(&mut tracker, &line),
            Err(e) => {
                tracing::error!("Connection lost during read: {}", e);
                break;
            }
        }
    }

    shutdown_writer(&writer).await;
    shared.set_online(false);
}

async fn shutdown_writer<W>(writer: &SharedWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    if let Some(mut writer) = writer.lock().await.take() {
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Transport shutdown: {}", e);
        }
    }
}
