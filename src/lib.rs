//! Rust library for controlling Stewart CVM motorized screen masks
//!
//! This library provides an async API for driving a CVM masking controller
//! over its Telnet command port. It supports:
//!
//! - Login handshake and on-demand reconnection
//! - Cover position (0-100) and aspect ratio preset control
//! - Open, close and stop commands
//! - Tracking of unsolicited position and status frames
//! - Push callbacks and state update subscriptions
//! - Calibration of preset motor positions
//!
//! # Quick Start
//!
//! ```no_run
//! use cvm_mask::{ConnectionConfig, CvmClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("192.168.1.50", "admin", "password");
//!     let client = CvmClient::new(config, "1.78,2.00,2.35,2.40", "1200,800,300,0")?;
//!
//!     // Register a push callback and wait for the first position report
//!     let state = client.initialize(|state| println!("Update: {:?}", state)).await?;
//!     println!("Mask is showing {:?}", state.aspect_ratio_name);
//!
//!     // Move to a preset by aspect ratio or by cover position
//!     client.select_aspect("2.35").await?;
//!     client.set_position(50).await?;
//!
//!     // Or watch updates as a stream
//!     let mut updates = client.subscribe();
//!     while let Ok(update) = updates.recv().await {
//!         println!("State update: {:?}", update);
//!         break;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Calibration
//!
//! The motor position of each preset can be measured by sweeping through all
//! presets. The returned string is meant to be stored by the host and passed
//! back to [`CvmClient::new`] on the next start:
//!
//! ```no_run
//! # use cvm_mask::{ConnectionConfig, CvmClient};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let client = CvmClient::new(ConnectionConfig::new("cvm", "u", "p"), "1.78,2.35", "1000,0")?;
//! if let Some(positions) = client.recalibrate("1.78,2.35").await {
//!     println!("Store motor positions: {}", positions);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Client**: caller-facing operations and state access
//! - **Calibration**: preset sweep on top of the connection
//! - **Connection**: Telnet transport, login and the read loop
//! - **Tracker**: folds status frames into the device state
//! - **Protocol**: wire frame grammar and command formatting
//! - **Position**: cover position / preset / motor unit conversions

mod calibration;
mod client;
mod config;
mod connection;
mod error;
mod position;
mod protocol;
mod signal;
mod subscription;
mod tracker;
mod types;

// Public exports
pub use client::CvmClient;
pub use config::{ConnectionConfig, CoverDirection, Timeouts, DEFAULT_PORT};
pub use error::{CvmError, Result};
pub use position::{
    join_positions, parse_positions, split_names, LinearInterpolation, PositionModel, PresetTable,
};
pub use protocol::{parse_line, Command, Direction, Frame, FrameEvent};
pub use subscription::{PushCallback, StateReceiver};
pub use types::{
    CoverPosition, DeviceState, MotorStatus, PresetEntry, RawPosition, MAX_COVER_POSITION,
    MIN_COVER_POSITION,
};
