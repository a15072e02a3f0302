use serde::{Deserialize, Serialize};
use std::fmt;

/// Cover position, 0 (narrowest) to 100 (widest)
pub type CoverPosition = u8;

/// Raw motor encoder value reported by the controller
pub type RawPosition = f64;

/// Lowest cover position (narrowest mask)
pub const MIN_COVER_POSITION: CoverPosition = 0;

/// Highest cover position (widest mask)
pub const MAX_COVER_POSITION: CoverPosition = 100;

/// One aspect ratio preset stored on the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEntry {
    /// Aspect ratio name as configured (e.g. "2.35")
    pub name: String,

    /// Numeric aspect ratio parsed from the name
    pub aspect: f64,

    /// 1-based preset index on the controller
    pub preset: usize,

    /// Calibrated raw motor position of this preset
    pub motor_position: RawPosition,

    /// Cover position derived from the motor position
    pub cover_position: CoverPosition,
}

/// Motor status as reported by `STATUS` frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorStatus {
    Stop,
    Extending,
    Retracting,
    /// Any other token the controller sends
    Other(String),
}

impl MotorStatus {
    /// Parse a status token from the wire
    pub fn from_token(token: &str) -> Self {
        match token {
            "STOP" => MotorStatus::Stop,
            "EXTENDING" => MotorStatus::Extending,
            "RETRACTING" => MotorStatus::Retracting,
            other => MotorStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MotorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorStatus::Stop => f.write_str("STOP"),
            MotorStatus::Extending => f.write_str("EXTENDING"),
            MotorStatus::Retracting => f.write_str("RETRACTING"),
            MotorStatus::Other(token) => f.write_str(token),
        }
    }
}

/// Last known state of the screen mask
///
/// All fields start out empty and are filled in by status frames. Values are
/// kept after the connection drops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub cover_position: Option<CoverPosition>,
    pub motor_status: Option<MotorStatus>,
    pub motor_position: Option<RawPosition>,
    pub aspect_ratio: Option<f64>,
    pub aspect_ratio_name: Option<String>,
    pub preset: Option<usize>,

    /// A recall was echoed and the motor has not settled yet
    pub moving: bool,
}

impl DeviceState {
    /// Mask is at its narrowest
    pub fn is_closed(&self) -> bool {
        self.cover_position == Some(MIN_COVER_POSITION)
    }

    /// Mask is at its widest
    pub fn is_open(&self) -> bool {
        self.cover_position == Some(MAX_COVER_POSITION)
    }

    /// Motor is extending towards a narrower aspect
    pub fn is_closing(&self) -> bool {
        self.motor_status == Some(MotorStatus::Extending)
    }

    /// Motor is retracting towards a wider aspect
    pub fn is_opening(&self) -> bool {
        self.motor_status == Some(MotorStatus::Retracting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_status_tokens() {
        assert_eq!(MotorStatus::from_token("STOP"), MotorStatus::Stop);
        assert_eq!(MotorStatus::from_token("EXTENDING"), MotorStatus::Extending);
        assert_eq!(MotorStatus::from_token("RETRACTING"), MotorStatus::Retracting);
        assert_eq!(
            MotorStatus::from_token("FAULT"),
            MotorStatus::Other("FAULT".to_string())
        );
        assert_eq!(MotorStatus::Other("FAULT".to_string()).to_string(), "FAULT");
    }

    #[test]
    fn test_state_helpers() {
        let mut state = DeviceState::default();
        assert!(!state.is_closed());
        assert!(!state.is_open());

        state.cover_position = Some(0);
        state.motor_status = Some(MotorStatus::Extending);
        assert!(state.is_closed());
        assert!(state.is_closing());
        assert!(!state.is_opening());
    }
}
