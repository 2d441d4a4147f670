//! Integration tests — connection lifecycle, command writes and the
//! reconnect cycle, over localhost TCP and scripted streams.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fanlink_core::{
    ConnectionConfig, ConnectionInfo, ConnectionPhase, Connector, FanCommand, FanConnection,
    FanEvent, INIT_FRAME, KEEPALIVE_FRAME, StateUpdate,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_test::io::{Builder, Mock};
use tokio_util::either::Either;

const FAN_ON_FRAME: [u8; 11] = [
    0xC0, 0x12, 0x07, 0x12, 0x05, 0x1A, 0x03, 0xD8, 0x02, 0x01, 0xC0,
];

// ── Helpers ──────────────────────────────────────────────────────

async fn ephemeral_listener() -> (TcpListener, ConnectionInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
    (listener, info)
}

async fn next_event(conn: &mut FanConnection) -> FanEvent {
    tokio::time::timeout(Duration::from_secs(5), conn.recv())
        .await
        .expect("timeout")
        .expect("event channel closed")
}

/// Receive the next state update, skipping phase changes.
async fn next_update(conn: &mut FanConnection) -> StateUpdate {
    loop {
        if let FanEvent::State(update) = next_event(conn).await {
            return update;
        }
    }
}

async fn read_exact_frame(stream: &mut (impl AsyncReadExt + Unpin), len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timeout")
        .unwrap();
    buf
}

/// Hands out pre-built streams in order and records when each attempt was made.
struct ScriptedConnector {
    script: Mutex<VecDeque<Either<Mock, DuplexStream>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Stream = Either<Mock, DuplexStream>;

    async fn connect(&self, _addr: &str) -> io::Result<Self::Stream> {
        self.attempts.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        next.ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

// ── Live TCP ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_init_frame_then_command() {
    let (listener, info) = ephemeral_listener().await;
    let mut conn = FanConnection::spawn(info, ConnectionConfig::default());

    let (mut fan, _) = listener.accept().await.unwrap();
    assert_eq!(read_exact_frame(&mut fan, INIT_FRAME.len()).await, INIT_FRAME);

    assert_eq!(next_event(&mut conn).await, FanEvent::Phase(ConnectionPhase::Connecting));
    assert!(matches!(
        next_event(&mut conn).await,
        FanEvent::Phase(ConnectionPhase::Connected { .. })
    ));

    conn.send(FanCommand::FanOn(true)).await.unwrap();
    assert_eq!(read_exact_frame(&mut fan, FAN_ON_FRAME.len()).await, FAN_ON_FRAME);

    conn.send(FanCommand::RotationSpeed(0)).await.unwrap();
    let pair = read_exact_frame(&mut fan, 22).await;
    assert_eq!(&pair[7..10], &[0xF8, 0x02, 0x01]);
    assert_eq!(&pair[18..21], &[0xF0, 0x02, 0x00]);
}

#[tokio::test]
async fn test_inbound_frames_become_updates() {
    let (listener, info) = ephemeral_listener().await;
    let mut conn = FanConnection::spawn(info, ConnectionConfig::default());

    let (mut fan, _) = listener.accept().await.unwrap();
    read_exact_frame(&mut fan, INIT_FRAME.len()).await;

    // noise, a frame split over two writes, then a malformed frame
    fan.write_all(&[0x00, 0x01]).await.unwrap();
    fan.write_all(&FAN_ON_FRAME[..4]).await.unwrap();
    fan.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    fan.write_all(&FAN_ON_FRAME[4..]).await.unwrap();
    fan.write_all(&[0xC0, 0x12, 0x09, 0x12, 0x05, 0x1A, 0x03, 0xA8, 0x04, 0x32, 0xC0])
        .await
        .unwrap();
    fan.write_all(&[0xC0, 0x12, 0x07, 0x12, 0x05, 0x1A, 0x03, 0xA8, 0x04, 0x32, 0xC0])
        .await
        .unwrap();

    assert_eq!(next_update(&mut conn).await, StateUpdate::FanOn(true));
    assert_eq!(next_update(&mut conn).await, StateUpdate::Brightness(50));
}

#[tokio::test]
async fn test_shutdown_closes_socket() {
    let (listener, info) = ephemeral_listener().await;
    let conn = FanConnection::spawn(info, ConnectionConfig::default());

    let (mut fan, _) = listener.accept().await.unwrap();
    read_exact_frame(&mut fan, INIT_FRAME.len()).await;

    conn.shutdown().await;

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), fan.read(&mut buf))
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_undrained_events_do_not_stall_link() {
    let (listener, info) = ephemeral_listener().await;
    let mut conn = FanConnection::spawn(info, ConnectionConfig::default());

    let (mut fan, _) = listener.accept().await.unwrap();
    read_exact_frame(&mut fan, INIT_FRAME.len()).await;

    // far more updates than the event channel holds, none of them received
    for _ in 0..100 {
        fan.write_all(&FAN_ON_FRAME).await.unwrap();
    }
    fan.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    conn.send(FanCommand::LightOn(true)).await.unwrap();
    let frame = read_exact_frame(&mut fan, FAN_ON_FRAME.len()).await;
    assert_eq!(&frame[7..10], &[0xA0, 0x04, 0x01]);

    let mut buffered = 0;
    while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(100), conn.recv()).await {
        buffered += 1;
    }
    assert!(buffered > 0 && buffered <= 64, "buffered = {buffered}");
}

// ── Reconnect cycle ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_reset_reconnects_without_init() {
    let first = Builder::new()
        .write(&INIT_FRAME)
        .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
        .build();
    let (second, mut fan) = tokio::io::duplex(256);

    let attempts = Arc::new(Mutex::new(Vec::new()));
    let connector = ScriptedConnector {
        script: Mutex::new(VecDeque::from([Either::Left(first), Either::Right(second)])),
        attempts: attempts.clone(),
    };
    let config = ConnectionConfig::default();
    let mut conn = FanConnection::spawn_with(
        ConnectionInfo::new("fan.test", 31415),
        config,
        connector,
    );

    let mut phases = Vec::new();
    while phases.len() < 6 {
        if let FanEvent::Phase(phase) = next_event(&mut conn).await {
            phases.push(phase.to_string());
        }
    }
    assert_eq!(
        phases,
        [
            "Connecting",
            "Connected",
            "Disconnected",
            "ReconnectPending",
            "Connecting",
            "Connected",
        ]
    );

    {
        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - attempts[0] >= config.reconnect_delay);
    }

    // the first bytes on the new link are the keepalive, not a second init
    let mut buf = vec![0u8; KEEPALIVE_FRAME.len()];
    fan.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, KEEPALIVE_FRAME);
}

#[tokio::test(start_paused = true)]
async fn test_refused_connect_keeps_retrying() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let connector = ScriptedConnector {
        script: Mutex::new(VecDeque::new()),
        attempts: attempts.clone(),
    };
    let mut conn = FanConnection::spawn_with(
        ConnectionInfo::new("fan.test", 31415),
        ConnectionConfig::default(),
        connector,
    );

    let mut pending = 0;
    while pending < 3 {
        if next_event(&mut conn).await == FanEvent::Phase(ConnectionPhase::ReconnectPending) {
            pending += 1;
        }
    }
    assert!(attempts.lock().unwrap().len() >= 3);
    conn.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_command_during_backoff_is_dropped() {
    let first = Builder::new()
        .write(&INIT_FRAME)
        .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
        .build();
    let (second, mut fan) = tokio::io::duplex(256);

    let connector = ScriptedConnector {
        script: Mutex::new(VecDeque::from([Either::Left(first), Either::Right(second)])),
        attempts: Arc::new(Mutex::new(Vec::new())),
    };
    let mut conn = FanConnection::spawn_with(
        ConnectionInfo::new("fan.test", 31415),
        ConnectionConfig::default(),
        connector,
    );

    while next_event(&mut conn).await != FanEvent::Phase(ConnectionPhase::ReconnectPending) {}
    conn.send(FanCommand::FanOn(true)).await.unwrap();

    loop {
        if let FanEvent::Phase(ConnectionPhase::Connected { .. }) = next_event(&mut conn).await {
            break;
        }
    }

    // nothing is replayed: the keepalive is the first write on the new link
    let mut buf = vec![0u8; KEEPALIVE_FRAME.len()];
    fan.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, KEEPALIVE_FRAME);
}
