use crate::connection::{Connection, Shared};
use crate::error::{CvmError, Result};
use crate::position::{join_positions, split_names, PresetTable};
use crate::protocol::Command;
use crate::signal::WaitError;
use crate::types::RawPosition;
use tokio::time::sleep;

/// Result of a completed calibration sweep
#[derive(Debug)]
pub(crate) struct CalibrationResult {
    pub table: PresetTable,
    /// Recorded motor positions in preset order, comma-joined
    pub positions: String,
}

/// Visits every preset once and records where the motor settles
pub(crate) struct Calibration<'a> {
    connection: &'a Connection,
    shared: &'a Shared,
}

impl<'a> Calibration<'a> {
    pub fn new(connection: &'a Connection, shared: &'a Shared) -> Self {
        Self { connection, shared }
    }

    /// Sweep the presets named in `names_csv`, in the order given
    ///
    /// Nothing is committed here; the caller swaps in the returned table.
    pub async fn run(&self, names_csv: &str) -> Result<CalibrationResult> {
        let names = split_names(names_csv);
        if names.is_empty() {
            return Err(CvmError::InvalidConfig("no presets to calibrate".to_string()));
        }
        if let Some(bad) = names.iter().find(|name| name.parse::<f64>().is_err()) {
            return Err(CvmError::InvalidConfig(format!(
                "aspect ratio name is not numeric: {:?}",
                bad
            )));
        }

        tracing::info!("Calibrating {} presets", names.len());
        let mut positions = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let preset = i + 1;
            let position = self.settle_on(preset).await?;
            tracing::debug!("Calibrated {} preset={} motor={:.2}", name, preset, position);
            positions.push(position);
        }

        let direction = self.connection.config().direction;
        let table = PresetTable::new(&names, &positions, direction)?;
        tracing::info!("Calibration complete");

        Ok(CalibrationResult {
            table,
            positions: join_positions(&positions),
        })
    }

    /// Recall one preset and return the motor position it settles at
    async fn settle_on(&self, preset: usize) -> Result<RawPosition> {
        let timeouts = self.connection.config().timeouts;

        // Arm before sending so a fast STOP is not missed
        let settled = self.shared.settled.arm();
        self.connection.throttle(true).await;
        self.connection.send(Command::Recall(preset)).await?;

        settled
            .wait(timeouts.calibrate)
            .await
            .map_err(|e| match e {
                WaitError::Elapsed => CvmError::CalibrationTimeout { preset },
                WaitError::Closed => CvmError::Calibration(format!("preset {}: {}", preset, e)),
            })?;
        sleep(timeouts.settle_delay).await;

        self.shared
            .snapshot()
            .motor_position
            .ok_or_else(|| CvmError::Calibration(format!("no motor position for preset {}", preset)))
    }
}
