use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Default Telnet port of the CVM controller
pub const DEFAULT_PORT: u16 = 23;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MIN_COMMAND_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_CALIBRATE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Which end of the motor travel is cover position 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverDirection {
    /// Largest motor position is cover 0
    #[default]
    Inverted,
    /// Smallest motor position is cover 0
    Direct,
}

impl CoverDirection {
    /// Map a fraction of the motor travel (0.0..=1.0) to a cover percentage
    pub fn cover_from_fraction(self, fraction: f64) -> u8 {
        let fraction = fraction.clamp(0.0, 1.0);
        let percent = match self {
            CoverDirection::Inverted => (1.0 - fraction) * 100.0,
            CoverDirection::Direct => fraction * 100.0,
        };
        percent.round() as u8
    }
}

/// Bounded waits used by the client
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Time allowed to open the TCP transport
    #[serde(deserialize_with = "duration_secs")]
    pub connect: Duration,

    /// Time allowed for each login prompt and for the first position frame
    #[serde(deserialize_with = "duration_secs")]
    pub login: Duration,

    /// Minimum spacing between two commands
    #[serde(deserialize_with = "duration_secs")]
    pub min_command_interval: Duration,

    /// Time allowed for one preset to settle during calibration
    #[serde(deserialize_with = "duration_secs")]
    pub calibrate: Duration,

    /// Pause after a settle signal before the position is recorded
    #[serde(deserialize_with = "duration_secs")]
    pub settle_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            login: DEFAULT_LOGIN_TIMEOUT,
            min_command_interval: DEFAULT_MIN_COMMAND_INTERVAL,
            calibrate: DEFAULT_CALIBRATE_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Connection parameters for one CVM controller
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub username: String,
    pub password: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub direction: CoverDirection,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn duration_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl ConnectionConfig {
    /// Create a config with the default port, timeouts and direction
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            port: DEFAULT_PORT,
            timeouts: Timeouts::default(),
            direction: CoverDirection::default(),
        }
    }

    /// Set the command port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replace all timeouts
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the cover direction
    pub fn with_direction(mut self, direction: CoverDirection) -> Self {
        self.direction = direction;
        self
    }

    /// `host:port` address of the controller
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
