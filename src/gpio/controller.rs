//! Owner of the single GPIO output line.

use super::line::OutputLine;
use crate::error::HardwareError;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Cached level of the output line.
///
/// Only ever reflects a value the hardware accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub pin: u8,
    pub level: bool,
}

impl PinState {
    /// `"on"` or `"off"`, as reported by the HTTP API.
    pub fn label(&self) -> &'static str {
        if self.level {
            "on"
        } else {
            "off"
        }
    }
}

/// Serializes writes to one output line and caches its state.
///
/// Reads never touch the hardware; the line is write-only for this device
/// class. Dropping the controller releases the line.
pub struct PinController {
    pin: u8,
    line: Mutex<Option<Box<dyn OutputLine>>>,
    state: watch::Sender<PinState>,
}

impl PinController {
    /// Take ownership of `line`. The line is assumed to start low.
    pub fn new(pin: u8, line: Box<dyn OutputLine>) -> Self {
        let (state, _) = watch::channel(PinState { pin, level: false });
        Self {
            pin,
            line: Mutex::new(Some(line)),
            state,
        }
    }

    /// Drive the line. The cached state changes only if the write succeeds.
    pub async fn set(&self, level: bool) -> Result<PinState, HardwareError> {
        let mut slot = self.line.lock().await;
        let line = slot
            .as_mut()
            .ok_or(HardwareError::Released { pin: self.pin })?;

        if let Err(e) = line.write(level) {
            warn!("GPIO{} write failed, keeping last known state: {}", self.pin, e);
            return Err(e);
        }

        let state = PinState {
            pin: self.pin,
            level,
        };
        self.state.send_replace(state);
        debug!("GPIO{} set {}", self.pin, state.label());
        Ok(state)
    }

    /// Last successfully written state.
    pub fn get(&self) -> PinState {
        *self.state.borrow()
    }

    /// Drive the line low and release it. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mut slot = self.line.lock().await;
        if let Some(line) = slot.take() {
            self.release_line(line);
        }
    }

    fn release_line(&self, mut line: Box<dyn OutputLine>) {
        match line.release() {
            Ok(()) => info!("GPIO{} driven low and released", self.pin),
            Err(e) => debug!("Ignoring GPIO{} release error: {}", self.pin, e),
        }
        self.state.send_replace(PinState {
            pin: self.pin,
            level: false,
        });
    }
}

impl Drop for PinController {
    fn drop(&mut self) {
        if let Some(line) = self.line.get_mut().take() {
            self.release_line(line);
        }
    }
}
