use crate::calibration::Calibration;
use crate::config::ConnectionConfig;
use crate::connection::{Connection, Shared};
use crate::error::{CvmError, Result};
use crate::position::{PositionModel, PresetTable};
use crate::protocol::Command;
use crate::signal::WaitError;
use crate::subscription::StateReceiver;
use crate::types::{CoverPosition, DeviceState, PresetEntry, MIN_COVER_POSITION};
use std::sync::Arc;

/// Client for a Stewart CVM screen mask controller
///
/// The `CvmClient` owns the Telnet session, keeps the last reported state of
/// the mask and translates cover positions and aspect ratios into preset
/// recalls. Commands do not wait for the mask to move; the effect shows up
/// later in [`CvmClient::data`], the push callback and [`CvmClient::subscribe`].
pub struct CvmClient {
    connection: Connection,
    shared: Arc<Shared>,
    device_id: String,
}

impl CvmClient {
    /// Create a client from comma-separated preset names and motor positions
    ///
    /// No connection is made until the first command.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cvm_mask::{ConnectionConfig, CvmClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = ConnectionConfig::new("192.168.1.50", "admin", "password");
    ///     let client = CvmClient::new(config, "1.78,2.00,2.35", "1200,800,0")?;
    ///     let state = client.initialize(|state| println!("{:?}", state)).await?;
    ///     println!("Mask at {:?}", state.cover_position);
    ///     client.select_aspect("2.35").await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(config: ConnectionConfig, presets_csv: &str, positions_csv: &str) -> Result<Self> {
        let table = PresetTable::from_csv(presets_csv, positions_csv, config.direction)?;
        Ok(Self::with_model(config, Box::new(table)))
    }

    /// Create a client with an explicit position model
    pub fn with_model(config: ConnectionConfig, model: Box<dyn PositionModel>) -> Self {
        let device_id = format!("CVM:{}", config.host);
        let shared = Arc::new(Shared::new(model));
        Self {
            connection: Connection::new(config, shared.clone()),
            shared,
            device_id,
        }
    }

    /// Stable identifier for the host layer, `CVM:<host>`
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Whether a logged-in session with a live read loop exists
    pub fn online(&self) -> bool {
        self.shared.is_online()
    }

    /// Snapshot of the last known mask state
    pub fn data(&self) -> DeviceState {
        self.shared.snapshot()
    }

    /// Aspect ratio names in ascending aspect order
    pub fn aspect_names(&self) -> Vec<String> {
        self.shared.model().aspect_names()
    }

    /// Current presets in ascending aspect order
    pub fn presets(&self) -> Vec<PresetEntry> {
        self.shared.model().presets().to_vec()
    }

    /// Subscribe to pushed state snapshots
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.shared.subscribe())
    }

    /// Check that the controller accepts our credentials
    ///
    /// Logs in and disconnects right away without starting a session.
    pub async fn test_connection(&self) -> bool {
        match self.connection.probe().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Connection test failed: {}", e);
                false
            }
        }
    }

    /// Open a session now instead of on the first command
    pub async fn connect(&self) -> Result<()> {
        self.connection.open().await
    }

    /// Close the session; the next command reconnects
    pub async fn disconnect(&self) {
        self.connection.close().await;
    }

    /// Register the push callback, query the position and wait for the answer
    pub async fn initialize<F>(&self, callback: F) -> Result<DeviceState>
    where
        F: Fn(DeviceState) + Send + Sync + 'static,
    {
        self.shared.set_callback(Arc::new(callback));
        self.query_position().await?;

        self.shared
            .initialized
            .wait(self.connection.config().timeouts.login)
            .await
            .map_err(|e| match e {
                WaitError::Elapsed => CvmError::InitializationTimeout,
                WaitError::Closed => CvmError::ChannelError(e.to_string()),
            })?;

        Ok(self.data())
    }

    /// Ask the controller for its position
    ///
    /// Skipped when a command went out too recently; returns whether the
    /// query was sent.
    pub async fn query_position(&self) -> Result<bool> {
        if !self.connection.throttle(false).await {
            return Ok(false);
        }
        self.connection.send(Command::QueryPosition).await?;
        Ok(true)
    }

    /// Move to the preset matching a cover position
    pub async fn set_position(&self, position: CoverPosition) -> Result<()> {
        let preset = self.shared.model().cover_position_to_preset(position).preset;
        tracing::debug!("set_position: {} => preset={}", position, preset);
        self.recall(preset).await
    }

    /// Move to the preset with the given aspect ratio name
    pub async fn select_aspect(&self, name: &str) -> Result<()> {
        let preset = {
            let model = self.shared.model();
            let entry = model
                .aspect_name_to_preset(name)
                .ok_or_else(|| CvmError::AspectNotFound(name.to_string()))?;
            tracing::debug!(
                "select_aspect: {} => {:.2} cover={} motor={:.2} preset={}",
                name,
                entry.aspect,
                entry.cover_position,
                entry.motor_position,
                entry.preset
            );
            entry.preset
        };
        self.recall(preset).await
    }

    /// Open the mask fully
    pub async fn open(&self) -> Result<()> {
        self.connection.send(Command::Retract).await
    }

    /// Close the mask to its narrowest preset
    pub async fn close(&self) -> Result<()> {
        self.set_position(MIN_COVER_POSITION).await
    }

    /// Stop the motor wherever it is
    pub async fn stop(&self) -> Result<()> {
        self.connection.send(Command::Stop).await
    }

    /// Recalibrate the motor position of every preset
    ///
    /// Recalls each preset in the order given and records where the motor
    /// settles. On success the preset table is rebuilt and the recorded
    /// positions are returned comma-joined for the host to persist. On any
    /// failure the current table is kept and `None` is returned.
    pub async fn recalibrate(&self, presets_csv: &str) -> Option<String> {
        match Calibration::new(&self.connection, &self.shared).run(presets_csv).await {
            Ok(result) => {
                self.shared.replace_model(Box::new(result.table));
                Some(result.positions)
            }
            Err(CvmError::CalibrationTimeout { preset }) => {
                tracing::error!("Calibration timeout on preset {}", preset);
                None
            }
            Err(e) => {
                tracing::error!("Calibration error: {}", e);
                None
            }
        }
    }

    async fn recall(&self, preset: usize) -> Result<()> {
        self.connection.throttle(true).await;
        self.connection.send(Command::Recall(preset)).await
    }
}
