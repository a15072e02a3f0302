//! Scripted CVM controller for integration tests

#![allow(dead_code)]

use cvm_mask::{ConnectionConfig, Timeouts};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";

/// Behavior and observations of the mock controller
#[derive(Debug, Default)]
pub struct MockState {
    /// Motor position reached by each preset
    pub preset_positions: HashMap<usize, f64>,
    /// Presets that never report back after a recall
    pub silent_presets: HashSet<usize>,
    /// Current motor position
    pub position: f64,
    /// Do not answer position queries
    pub silent_queries: bool,
    /// Hang up after the next STOP command
    pub hang_up_on_stop: bool,
    /// Answer a recall with the same position twice instead of a STOP
    pub settle_by_position: bool,
    /// Half-close the connection right after login
    pub half_close_after_login: bool,
    /// The client closed its side after a half-close
    pub client_closed: bool,
    /// Every command line received, in order
    pub received: Vec<String>,
    /// Number of logged-in sessions
    pub sessions: usize,
}

pub struct MockDevice {
    pub port: u16,
    pub state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub async fn start(state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(state));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone()));
            }
        });

        Self { port, state }
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn sessions(&self) -> usize {
        self.state.lock().unwrap().sessions
    }

    pub fn config(&self) -> ConnectionConfig {
        test_config(self.port)
    }
}

/// Config with short timeouts and no command throttling
pub fn test_config(port: u16) -> ConnectionConfig {
    ConnectionConfig::new("127.0.0.1", USERNAME, PASSWORD)
        .with_port(port)
        .with_timeouts(Timeouts {
            connect: Duration::from_secs(1),
            login: Duration::from_millis(500),
            min_command_interval: Duration::ZERO,
            calibrate: Duration::from_millis(300),
            settle_delay: Duration::from_millis(10),
        })
}

/// Standard four-preset mask: 1.78 / 2.00 / 2.35 / 2.40
pub fn four_presets() -> MockState {
    MockState {
        preset_positions: HashMap::from([(1, 1200.0), (2, 800.0), (3, 300.0), (4, 0.0)]),
        position: 800.0,
        ..Default::default()
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

async fn serve(stream: TcpStream, state: Arc<Mutex<MockState>>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut buf = Vec::new();

    write.write_all(b"\r\nCVM Telnet\r\nUser:").await.unwrap();
    buf.clear();
    reader.read_until(b'\r', &mut buf).await.unwrap();
    let username = String::from_utf8_lossy(&buf).trim().to_string();

    write.write_all(b"\r\nPassword:").await.unwrap();
    buf.clear();
    reader.read_until(b'\r', &mut buf).await.unwrap();
    let password = String::from_utf8_lossy(&buf).trim().to_string();

    if username != USERNAME || password != PASSWORD {
        return;
    }
    let half_close = {
        let mut state = state.lock().unwrap();
        state.sessions += 1;
        state.half_close_after_login
    };
    write.write_all(b"\r\nConnected:\r\n").await.unwrap();

    if half_close {
        write.shutdown().await.unwrap();
        let mut rest = Vec::new();
        if reader.read_to_end(&mut rest).await.is_ok() {
            state.lock().unwrap().client_closed = true;
        }
        return;
    }

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = String::from_utf8_lossy(&buf).trim().to_string();
        if command.is_empty() {
            continue;
        }

        let (lines, hang_up) = respond(&state, &command);
        for line in lines {
            if write.write_all(format!("{}\r\n", line).as_bytes()).await.is_err() {
                return;
            }
        }
        if hang_up {
            return;
        }
    }
}

fn respond(state: &Arc<Mutex<MockState>>, command: &str) -> (Vec<String>, bool) {
    let mut state = state.lock().unwrap();
    state.received.push(command.to_string());

    if command == "#1.1.1.MOTOR.POSITION=?" {
        if state.silent_queries {
            return (vec![], false);
        }
        return (vec![format!("!1.1.1.MOTOR.POSITION={}", state.position)], false);
    }

    if let Some(preset) = command
        .strip_prefix("#1.1.0.MOTOR=RECALL,")
        .and_then(|rest| rest.strip_suffix(';'))
        .and_then(|n| n.parse::<usize>().ok())
    {
        if state.silent_presets.contains(&preset) {
            return (vec![], false);
        }
        let Some(&target) = state.preset_positions.get(&preset) else {
            return (vec!["!1.1.0.MOTOR=ERROR".to_string()], false);
        };
        let moving = if target > state.position { "EXTENDING" } else { "RETRACTING" };
        state.position = target;
        if state.settle_by_position {
            return (
                vec![
                    command.to_string(),
                    format!("!1.1.0.MOTOR.STATUS={}", moving),
                    format!("!1.1.1.MOTOR.POSITION={}", target),
                    format!("!1.1.1.MOTOR.POSITION={}", target),
                ],
                false,
            );
        }
        return (
            vec![
                command.to_string(),
                format!("!1.1.0.MOTOR.STATUS={}", moving),
                format!("!1.1.1.MOTOR.POSITION={}", target),
                "!1.1.0.MOTOR.STATUS=STOP".to_string(),
            ],
            false,
        );
    }

    match command {
        "#1.1.0.MOTOR=RETRACT;" => {
            state.position = 0.0;
            (
                vec![
                    "!1.1.0.MOTOR.STATUS=RETRACTING".to_string(),
                    "!1.1.1.MOTOR.POSITION=0".to_string(),
                    "!1.1.0.MOTOR.STATUS=STOP".to_string(),
                ],
                false,
            )
        }
        "#1.1.0.MOTOR=STOP;" => {
            let hang_up = state.hang_up_on_stop;
            (
                vec![
                    "!1.1.0.MOTOR.STATUS=STOP".to_string(),
                    "!1.1.0.MOTOR.STATUS=STOP".to_string(),
                    "!1.1.0.MOTOR.STATUS=STOP".to_string(),
                ],
                hang_up,
            )
        }
        _ => (vec!["?? unknown command".to_string()], false),
    }
}
