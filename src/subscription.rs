use crate::error::{CvmError, Result};
use crate::types::DeviceState;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Callback invoked by the read loop with every pushed state snapshot
pub type PushCallback = Arc<dyn Fn(DeviceState) + Send + Sync>;

/// Receiver for pushed state snapshots
pub struct StateReceiver {
    rx: broadcast::Receiver<DeviceState>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<DeviceState>) -> Self {
        Self { rx }
    }

    /// Receive the next pushed snapshot
    ///
    /// Fails with `ConnectionClosed` once the client has been dropped.
    pub async fn recv(&mut self) -> Result<DeviceState> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => CvmError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                CvmError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive a snapshot without blocking
    pub fn try_recv(&mut self) -> Result<Option<DeviceState>> {
        match self.rx.try_recv() {
            Ok(state) => Ok(Some(state)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(CvmError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(CvmError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
