//! Monitor service core logic.
//!
//! Keeps one `FanConnection` per configured device, prints every event it
//! reports and forwards commands typed on stdin.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use fanlink_core::command::speed_to_percent;
use fanlink_core::{FanCommand, FanConnection, FanEvent, StateUpdate, probe};

use crate::config::MonitorConfig;

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// A command line read from stdin:
/// `{"device": "Office", "send": {"command": "fan_on", "value": true}}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandLine {
    pub device: String,
    pub send: FanCommand,
}

pub fn parse_command_line(line: &str) -> Result<CommandLine, serde_json::Error> {
    serde_json::from_str(line)
}

/// Render one event for stdout.
pub fn render_event(format: OutputFormat, device: &str, event: &FanEvent) -> String {
    match (format, event) {
        (OutputFormat::Text, FanEvent::State(StateUpdate::FanSpeed(speed))) => {
            format!("{device}: fan_speed = {speed} ({}%)", speed_to_percent(*speed))
        }
        (OutputFormat::Text, FanEvent::State(update)) => {
            let value = serde_json::to_value(update).unwrap_or_default();
            format!(
                "{device}: {} = {}",
                value["field"].as_str().unwrap_or("?"),
                value["value"]
            )
        }
        (OutputFormat::Text, FanEvent::Phase(phase)) => format!("{device}: [{phase}]"),
        (OutputFormat::Json, FanEvent::State(update)) => {
            serde_json::json!({ "device": device, "update": update }).to_string()
        }
        (OutputFormat::Json, FanEvent::Phase(phase)) => {
            serde_json::json!({ "device": device, "phase": phase.to_string() }).to_string()
        }
    }
}

// ── MonitorService ───────────────────────────────────────────────

pub struct MonitorService {
    config: MonitorConfig,
    format: OutputFormat,
    running: Arc<AtomicBool>,
}

impl MonitorService {
    pub fn new(config: MonitorConfig, format: OutputFormat) -> Self {
        Self {
            config,
            format,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from another
    /// task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Try each device once and report whether it answered. Returns the
    /// number of fans that did.
    pub async fn probe_all(&self) -> usize {
        let settings = &self.config.connection;
        let timeout = settings.to_connection_config().probe_timeout;
        let mut reachable = 0;

        for device in &self.config.devices {
            let label = device.label();
            let info = match device.connection_info(settings.port) {
                Ok(info) => info,
                Err(e) => {
                    warn!("skipping device: {e}");
                    continue;
                }
            };
            match probe(&info, timeout).await {
                Ok(()) => {
                    reachable += 1;
                    println!("{label}: reachable at {info}");
                }
                Err(e) => println!("{label}: {e}"),
            }
        }
        reachable
    }

    /// Run until stopped.
    ///
    /// 1. Spawns a connection per device with an address; others are skipped.
    /// 2. Prints events from all connections as they arrive.
    /// 3. Forwards stdin command lines to the named device.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);

        let settings = &self.config.connection;
        let conn_config = settings.to_connection_config();
        let (event_tx, mut event_rx) = mpsc::channel::<(String, FanEvent)>(256);
        let mut senders = HashMap::new();
        let mut forwarders = Vec::new();

        for device in &self.config.devices {
            let info = match device.connection_info(settings.port) {
                Ok(info) => info,
                Err(e) => {
                    warn!("skipping device: {e}");
                    continue;
                }
            };
            let label = device.label();
            info!("connecting to {label} at {info}");

            let mut conn = FanConnection::spawn(info, conn_config);
            senders.insert(label.clone(), conn.sender());

            let tx = event_tx.clone();
            forwarders.push(tokio::spawn(async move {
                while let Some(event) = conn.recv().await {
                    if tx.send((label.clone(), event)).await.is_err() {
                        break;
                    }
                }
                conn.shutdown().await;
            }));
        }
        drop(event_tx);

        if senders.is_empty() {
            warn!("no devices configured; nothing to monitor");
            self.running.store(false, Ordering::SeqCst);
            return Ok(());
        }

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some((device, event)) => {
                        println!("{}", render_event(self.format, &device, &event));
                    }
                    None => break,
                },
                line = stdin.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => self.dispatch_line(&line, &senders),
                    Ok(None) | Err(_) => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                },
                _ = Self::wait_for_stop(&self.running) => break,
            }
        }

        // an aborted forwarder drops its handle, which cancels the connection task
        for forwarder in forwarders {
            forwarder.abort();
            let _ = forwarder.await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!("monitor stopped");
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────

    fn dispatch_line(&self, line: &str, senders: &HashMap<String, mpsc::Sender<FanCommand>>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let cmd = match parse_command_line(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("ignoring command line: {e}");
                return;
            }
        };
        match senders.get(&cmd.device) {
            Some(tx) => match tx.try_send(cmd.send) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!("{}: command queue full, dropped", cmd.device),
                Err(TrySendError::Closed(_)) => warn!("{}: connection task is gone", cmd.device),
            },
            None => warn!("no device named {:?}", cmd.device),
        }
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fanlink_core::ConnectionPhase;

    #[test]
    fn service_creates_with_defaults() {
        let svc = MonitorService::new(MonitorConfig::default(), OutputFormat::Text);
        assert!(!svc.is_running());
    }

    #[test]
    fn stop_handle_works() {
        let svc = MonitorService::new(MonitorConfig::default(), OutputFormat::Text);
        let handle = svc.stop_handle();
        handle.store(true, Ordering::SeqCst);
        assert!(svc.is_running());
        svc.stop();
        assert!(!svc.is_running());
    }

    #[test]
    fn parses_command_lines() {
        let cmd =
            parse_command_line(r#"{"device":"Office","send":{"command":"brightness","value":40}}"#)
                .unwrap();
        assert_eq!(cmd.device, "Office");
        assert_eq!(cmd.send, FanCommand::Brightness(40));

        let cmd = parse_command_line(
            r#"{"device":"Office","send":{"command":"direction","value":"reverse"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd.send,
            FanCommand::Direction(fanlink_core::RotationDirection::Reverse)
        );

        assert!(parse_command_line("fan on").is_err());
    }

    #[test]
    fn renders_text_and_json() {
        let event = FanEvent::State(StateUpdate::Humidity(41.5));
        assert_eq!(
            render_event(OutputFormat::Text, "Office", &event),
            "Office: humidity = 41.5"
        );
        assert_eq!(
            render_event(OutputFormat::Json, "Office", &event),
            r#"{"device":"Office","update":{"field":"humidity","value":41.5}}"#
        );

        let speed = FanEvent::State(StateUpdate::FanSpeed(7));
        assert_eq!(
            render_event(OutputFormat::Text, "Office", &speed),
            "Office: fan_speed = 7 (100%)"
        );

        let phase = FanEvent::Phase(ConnectionPhase::ReconnectPending);
        assert_eq!(
            render_event(OutputFormat::Text, "Office", &phase),
            "Office: [ReconnectPending]"
        );
    }

    #[test]
    fn dispatch_drops_command_when_queue_full() {
        let svc = MonitorService::new(MonitorConfig::default(), OutputFormat::Text);
        let (tx, mut rx) = mpsc::channel(1);
        let senders = HashMap::from([("Office".to_string(), tx)]);

        for line in [
            r#"{"device":"Office","send":{"command":"fan_on","value":true}}"#,
            r#"{"device":"Office","send":{"command":"fan_on","value":false}}"#,
            r#"{"device":"Porch","send":{"command":"fan_on","value":false}}"#,
        ] {
            svc.dispatch_line(line, &senders);
        }

        assert_eq!(rx.try_recv().unwrap(), FanCommand::FanOn(true));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_without_devices_returns() {
        let svc = MonitorService::new(MonitorConfig::default(), OutputFormat::Text);
        svc.run().await.unwrap();
        assert!(!svc.is_running());
    }
}
