use crate::position::PositionModel;
use crate::protocol::FrameEvent;
use crate::types::{DeviceState, MotorStatus};

/// Effect of one frame on the tracked state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    /// Stored state differs from before the frame
    pub changed: bool,
    /// Listeners should be told about the new state
    pub push: bool,
    /// Motor stopped moving
    pub settled: bool,
    /// A new position was recorded
    pub positioned: bool,
}

/// Folds frame events into a [`DeviceState`]
#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    state: DeviceState,
}

impl StatusTracker {
    /// Continue from a previously published state
    pub fn resume(state: DeviceState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn apply(&mut self, event: FrameEvent, model: &dyn PositionModel) -> Outcome {
        let mut outcome = Outcome::default();

        match event {
            FrameEvent::MotionStarted => {
                tracing::debug!("screen moving");
                outcome.changed = self.set_moving(true);
            }
            FrameEvent::Position(position) => {
                if self.state.motor_position == Some(position) {
                    outcome.changed = self.set_moving(false);
                    outcome.settled = true;
                } else {
                    let preset = model.raw_motor_position_to_preset(position);
                    let cover = model.cover_position_for_raw(position);
                    tracing::debug!(
                        "Mask position: motor={:.2} position={} aspect={} preset={}",
                        position,
                        cover,
                        preset.name,
                        preset.preset
                    );
                    self.state.motor_position = Some(position);
                    self.state.cover_position = Some(cover);
                    self.state.aspect_ratio = Some(preset.aspect);
                    self.state.aspect_ratio_name = Some(preset.name.clone());
                    self.state.preset = Some(preset.preset);
                    outcome.changed = true;
                    outcome.push = true;
                    outcome.positioned = true;
                }
            }
            FrameEvent::Status(status) => {
                if status == MotorStatus::Stop {
                    outcome.changed = self.set_moving(false);
                    outcome.settled = true;
                }
                if self.state.motor_status.as_ref() != Some(&status) {
                    tracing::debug!("Mask status: {}", status);
                    self.state.motor_status = Some(status);
                    outcome.changed = true;
                    outcome.push = true;
                }
            }
            FrameEvent::Ignored => {}
        }

        outcome
    }

    fn set_moving(&mut self, moving: bool) -> bool {
        std::mem::replace(&mut self.state.moving, moving) != moving
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoverDirection;
    use crate::position::PresetTable;

    fn model() -> PresetTable {
        PresetTable::from_csv("1.78,2.00,2.35", "1200,800,0", CoverDirection::Inverted).unwrap()
    }

    #[test]
    fn test_first_position_pushes() {
        let model = model();
        let mut tracker = StatusTracker::default();

        let outcome = tracker.apply(FrameEvent::Position(790.0), &model);
        assert!(outcome.push && outcome.positioned && !outcome.settled);

        let state = tracker.state();
        assert_eq!(state.motor_position, Some(790.0));
        assert_eq!(state.cover_position, Some(33));
        assert_eq!(state.aspect_ratio_name.as_deref(), Some("2.00"));
        assert_eq!(state.aspect_ratio, Some(2.0));
        assert_eq!(state.preset, Some(2));
    }

    #[test]
    fn test_repeated_position_settles_without_push() {
        let model = model();
        let mut tracker = StatusTracker::default();
        tracker.apply(FrameEvent::MotionStarted, &model);
        tracker.apply(FrameEvent::Position(400.0), &model);
        assert!(tracker.state().moving);

        let outcome = tracker.apply(FrameEvent::Position(400.0), &model);
        assert_eq!(
            outcome,
            Outcome {
                changed: true,
                push: false,
                settled: true,
                positioned: false,
            }
        );
        assert!(!tracker.state().moving);
    }

    #[test]
    fn test_repeated_status_is_suppressed() {
        let model = model();
        let mut tracker = StatusTracker::default();

        let first = tracker.apply(FrameEvent::Status(MotorStatus::Extending), &model);
        assert!(first.push);
        let second = tracker.apply(FrameEvent::Status(MotorStatus::Extending), &model);
        assert_eq!(second, Outcome::default());
    }

    #[test]
    fn test_stop_always_settles() {
        let model = model();
        let mut tracker = StatusTracker::default();

        let first = tracker.apply(FrameEvent::Status(MotorStatus::Stop), &model);
        assert!(first.push && first.settled);
        let second = tracker.apply(FrameEvent::Status(MotorStatus::Stop), &model);
        assert!(!second.push && second.settled);
    }

    #[test]
    fn test_resume_keeps_previous_values() {
        let model = model();
        let previous = DeviceState {
            motor_position: Some(0.0),
            cover_position: Some(100),
            ..Default::default()
        };
        let mut tracker = StatusTracker::resume(previous);

        let outcome = tracker.apply(FrameEvent::Position(0.0), &model);
        assert!(outcome.settled && !outcome.push);
        assert_eq!(tracker.state().cover_position, Some(100));
    }

    #[test]
    fn test_ignored_event_changes_nothing() {
        let model = model();
        let mut tracker = StatusTracker::default();
        assert_eq!(tracker.apply(FrameEvent::Ignored, &model), Outcome::default());
        assert_eq!(tracker.state(), &DeviceState::default());
    }
}
