use thiserror::Error;

/// Result type for CVM operations
pub type Result<T> = std::result::Result<T, CvmError>;

/// Errors that can occur when talking to a CVM screen mask
#[derive(Error, Debug)]
pub enum CvmError {
    /// I/O error on the Telnet transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport could not be opened or the login sequence failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// A login prompt did not arrive in time
    ///
    /// Callers of the client see this inside [`CvmError::Connection`].
    #[error("Login timeout waiting for {prompt:?}")]
    LoginTimeout {
        /// Prompt that was being waited for
        prompt: String,
    },

    /// No position frame arrived after the initial query
    #[error("Initialization timeout")]
    InitializationTimeout,

    /// A preset did not settle during a calibration sweep
    #[error("Calibration timeout on preset {preset}")]
    CalibrationTimeout {
        /// 1-based preset index
        preset: usize,
    },

    /// Calibration sweep failed for another reason
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Aspect ratio name is not in the preset table
    #[error("Aspect ratio not found: {0}")]
    AspectNotFound(String),

    /// Preset or connection parameters are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Subscription channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
