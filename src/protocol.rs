//! CVM Telnet wire format
//!
//! Outgoing commands are single ASCII lines terminated by CRLF. Incoming
//! lines look like `!1.1.1.MOTOR.POSITION=1234.5` or `#1.1.0.MOTOR=RECALL,2;`,
//! possibly preceded by prompt noise.

use crate::types::{MotorStatus, RawPosition};
use regex::bytes::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Terminator appended to every command
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";

/// Terminator appended to login credentials
pub const CREDENTIAL_TERMINATOR: &[u8] = b"\r";

/// Motor channel that reports positions
const POSITION_CHANNEL: u8 = 1;

static FRAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^!#]*([!#])1\.1\.([0-9])\.MOTOR(\.[^=]+)?=([?.0-9A-Z]+)")
        .expect("Invalid frame regex")
});

/// Who a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `#`: command echo or request
    Request,
    /// `!`: response or unsolicited status
    Status,
}

/// One parsed line from the controller
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub direction: Direction,
    pub channel: u8,
    /// Dotted attribute suffix including the dot, e.g. `.POSITION`
    pub attribute: Option<String>,
    pub value: String,
}

/// What a frame means for the device state
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// The controller echoed a recall, the motor is about to move
    MotionStarted,
    Position(RawPosition),
    Status(MotorStatus),
    /// Valid frame that does not affect state
    Ignored,
}

/// Match a raw line against the frame grammar
///
/// Returns `None` when the line does not look like a motor frame.
pub fn parse_line(line: &[u8]) -> Option<Frame> {
    let caps = FRAME_REGEX.captures(line)?;

    let direction = match caps.get(1)?.as_bytes() {
        b"#" => Direction::Request,
        _ => Direction::Status,
    };
    let channel = caps.get(2)?.as_bytes()[0] - b'0';
    let attribute = caps
        .get(3)
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned());
    let value = String::from_utf8_lossy(caps.get(4)?.as_bytes()).into_owned();

    Some(Frame {
        direction,
        channel,
        attribute,
        value,
    })
}

impl Frame {
    /// Classify the frame
    pub fn event(&self) -> FrameEvent {
        match (self.direction, self.attribute.as_deref()) {
            (Direction::Request, None) if self.value == "RECALL" => FrameEvent::MotionStarted,
            (Direction::Status, Some(".POSITION")) if self.channel == POSITION_CHANNEL => {
                match self.value.parse::<f64>() {
                    Ok(position) => FrameEvent::Position(position),
                    Err(_) => {
                        tracing::warn!("Non-numeric position value: {}", self.value);
                        FrameEvent::Ignored
                    }
                }
            }
            (Direction::Status, Some(".STATUS")) => {
                FrameEvent::Status(MotorStatus::from_token(&self.value))
            }
            _ => FrameEvent::Ignored,
        }
    }
}

/// Commands sent to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Move to a stored preset (1-based)
    Recall(usize),
    /// Open the mask fully
    Retract,
    Stop,
    QueryPosition,
}

impl Command {
    /// Wire bytes including the line terminator
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = self.to_string().into_bytes();
        line.extend_from_slice(COMMAND_TERMINATOR);
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Recall(preset) => write!(f, "#1.1.0.MOTOR=RECALL,{};", preset),
            Command::Retract => f.write_str("#1.1.0.MOTOR=RETRACT;"),
            Command::Stop => f.write_str("#1.1.0.MOTOR=STOP;"),
            Command::QueryPosition => f.write_str("#1.1.1.MOTOR.POSITION=?"),
        }
    }
}
