use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::FanCodec;
use crate::command::{CommandFrame, FanCommand};
use crate::error::FanError;
use crate::session::FanSession;
use crate::state::{ConnectionPhase, StateUpdate};

/// TCP port the fan listens on.
pub const DEFAULT_PORT: u16 = 31415;

const CHANNEL_CAPACITY: usize = 64;

// ── Settings ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    ip: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Timings of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Period of the keepalive frame; also used for TCP keepalive.
    pub keepalive_interval: Duration,
    /// Fixed wait between a socket error and the next attempt.
    pub reconnect_delay: Duration,
    /// Deadline for [`probe`].
    pub probe_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

// ── Connector ────────────────────────────────────────────────────

/// Opens the byte stream a connection runs over.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, addr: &str) -> io::Result<Self::Stream>;
}

/// Plain TCP with socket-level keepalive enabled.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    keepalive: Duration,
}

impl TcpConnector {
    pub fn new(keepalive: Duration) -> Self {
        Self { keepalive }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let socket = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new().with_time(self.keepalive);
        socket.set_tcp_keepalive(&keepalive)?;
        Ok(stream)
    }
}

/// Check that a fan answers on `info` within `timeout`.
pub async fn probe(info: &ConnectionInfo, timeout: Duration) -> Result<(), FanError> {
    match tokio::time::timeout(timeout, TcpStream::connect(info.to_string())).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(FanError::socket(e)),
        Err(_) => Err(FanError::Timeout(timeout)),
    }
}

// ── FanConnection ────────────────────────────────────────────────

/// Everything a connection reports to its owner, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum FanEvent {
    State(StateUpdate),
    Phase(ConnectionPhase),
}

/// Handle to a connection task that keeps one fan linked until shut down.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct FanConnection {
    tx: mpsc::Sender<FanCommand>,
    rx: mpsc::Receiver<FanEvent>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FanConnection {
    pub fn spawn(info: ConnectionInfo, config: ConnectionConfig) -> Self {
        let connector = TcpConnector::new(config.keepalive_interval);
        Self::spawn_with(info, config, connector)
    }

    pub fn spawn_with<C: Connector>(
        info: ConnectionInfo,
        config: ConnectionConfig,
        connector: C,
    ) -> Self {
        // User -> Fan
        let (user_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        // Fan -> User
        let (event_tx, user_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let worker = Worker {
            session: FanSession::new(info.to_string()),
            addr: info.to_string(),
            config,
            connector,
            phase: ConnectionPhase::default(),
            initialized: false,
            commands: command_rx,
            events: event_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            tx: user_tx,
            rx: user_rx,
            cancel,
            handle: Some(handle),
        }
    }

    /// Hand a command to the connection task. It is written if the link is
    /// up and dropped otherwise; nothing confirms that the fan applied it.
    pub async fn send(&self, command: FanCommand) -> Result<(), FanError> {
        self.tx.send(command).await?;
        Ok(())
    }

    pub fn sender(&self) -> mpsc::Sender<FanCommand> {
        self.tx.clone()
    }

    pub async fn recv(&mut self) -> Option<FanEvent> {
        self.rx.recv().await
    }

    /// Stop the task and wait for it to close the socket.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for FanConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Worker ───────────────────────────────────────────────────────

struct Worker<C: Connector> {
    session: FanSession,
    addr: String,
    config: ConnectionConfig,
    connector: C,
    phase: ConnectionPhase,
    /// The init frame goes out on the first connect only.
    initialized: bool,
    commands: mpsc::Receiver<FanCommand>,
    events: mpsc::Sender<FanEvent>,
    cancel: CancellationToken,
}

/// What woke the connected loop.
enum Wake {
    Cancelled,
    Frame(Option<io::Result<Bytes>>),
    Command(Option<FanCommand>),
    Keepalive,
}

impl<C: Connector> Worker<C> {
    async fn run(mut self) {
        loop {
            self.transition(ConnectionPhase::begin_connect);

            let attempt = while_disconnected(
                &self.cancel,
                &mut self.commands,
                &self.addr,
                self.connector.connect(&self.addr),
            )
            .await;
            let result = match attempt {
                None => break,
                Some(Ok(stream)) => {
                    self.transition(ConnectionPhase::complete_connect);
                    info!(addr = %self.addr, "connected");
                    self.maintain(stream).await
                }
                Some(Err(e)) => Err(e),
            };

            let err = match result {
                Ok(()) => break,
                Err(e) => FanError::socket(e),
            };
            if let FanError::Socket { kind, .. } = &err {
                warn!(addr = %self.addr, "{}: {err}", kind.diagnostic());
            }

            self.transition(ConnectionPhase::fail);
            self.transition(ConnectionPhase::schedule_reconnect);
            debug!(addr = %self.addr, delay = ?self.config.reconnect_delay, "reconnect pending");

            let backoff = tokio::time::sleep(self.config.reconnect_delay);
            if while_disconnected(&self.cancel, &mut self.commands, &self.addr, backoff)
                .await
                .is_none()
            {
                break;
            }
        }

        self.phase.force_disconnect();
        self.emit(FanEvent::Phase(self.phase.clone()));
        debug!(
            addr = %self.addr,
            mystery_codes = self.session.ledger().len(),
            "connection task stopped"
        );
    }

    /// Run one live session. `Ok` means stop for good; `Err` means reconnect.
    async fn maintain(&mut self, stream: C::Stream) -> io::Result<()> {
        let (mut sink, mut frames) = Framed::new(stream, FanCodec::new()).split();

        if !self.initialized {
            sink.send(CommandFrame::init()).await?;
            self.initialized = true;
            debug!(addr = %self.addr, "init frame sent");
        }

        let period = self.config.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake = tokio::select! {
                _ = self.cancel.cancelled() => Wake::Cancelled,
                frame = frames.next() => Wake::Frame(frame),
                command = self.commands.recv() => Wake::Command(command),
                _ = keepalive.tick() => Wake::Keepalive,
            };

            match wake {
                Wake::Cancelled | Wake::Command(None) => return Ok(()),
                Wake::Frame(Some(Ok(raw))) => {
                    for update in self.session.handle_frame(&raw) {
                        self.emit(FanEvent::State(update));
                    }
                }
                Wake::Frame(Some(Err(e))) => return Err(e),
                Wake::Frame(None) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by the fan",
                    ));
                }
                Wake::Command(Some(command)) => match self.session.issue(command) {
                    Ok(out) => {
                        for frame in out {
                            sink.send(frame).await?;
                        }
                    }
                    Err(e) => warn!(addr = %self.addr, "{e}"),
                },
                Wake::Keepalive => {
                    trace!(addr = %self.addr, "keepalive");
                    sink.send(CommandFrame::keepalive()).await?;
                }
            }
        }
    }

    fn transition(&mut self, step: fn(&mut ConnectionPhase) -> Result<(), FanError>) {
        let from = self.phase.to_string();
        if let Err(e) = step(&mut self.phase) {
            warn!(addr = %self.addr, %from, "{e}");
            return;
        }
        info!(addr = %self.addr, %from, to = %self.phase, "phase");
        self.emit(FanEvent::Phase(self.phase.clone()));
    }

    /// Hand an event to the owner without waiting. A full channel drops the
    /// event so that a slow consumer never stalls the link.
    fn emit(&self, event: FanEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(addr = %self.addr, ?event, "event channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                trace!(addr = %self.addr, "event receiver gone");
            }
        }
    }
}

/// Wait for `fut` while the link is down. Commands that arrive meanwhile are
/// dropped, never replayed on the next link. `None` means cancelled.
async fn while_disconnected<F: Future>(
    cancel: &CancellationToken,
    commands: &mut mpsc::Receiver<FanCommand>,
    addr: &str,
    fut: F,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            out = &mut fut => return Some(out),
            Some(command) = commands.recv() => {
                warn!(addr, ?command, "not connected, command dropped");
            }
        }
    }
}
