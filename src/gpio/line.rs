//! Digital output line backends.
//!
//! The rppal backend is feature-gated so the crate builds on machines without
//! Raspberry Pi GPIO. [`MemoryLine`] stands in everywhere else.

use crate::error::HardwareError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A single write-only digital output.
pub trait OutputLine: Send {
    /// Drive the line to `level`.
    fn write(&mut self, level: bool) -> Result<(), HardwareError>;

    /// Drive the line low and give the underlying handle back to the OS.
    ///
    /// Called at most once by the controller.
    fn release(&mut self) -> Result<(), HardwareError>;
}

#[cfg(feature = "gpio")]
mod raspberry_pi {
    use super::*;
    use rppal::gpio::{Gpio, OutputPin};

    /// Output line backed by rppal.
    pub struct RppalLine {
        pin: u8,
        output: Option<OutputPin>,
    }

    impl RppalLine {
        /// Claim `pin` as an output, initially low.
        pub fn open(chip: u8, pin: u8) -> Result<Self, HardwareError> {
            if chip != 0 {
                tracing::warn!(
                    "rppal selects the GPIO chip automatically; ignoring chip index {}",
                    chip
                );
            }

            let gpio = Gpio::new().map_err(|e| HardwareError::Open {
                chip,
                pin,
                reason: e.to_string(),
            })?;
            let output = gpio
                .get(pin)
                .map_err(|e| HardwareError::Open {
                    chip,
                    pin,
                    reason: e.to_string(),
                })?
                .into_output_low();

            Ok(Self {
                pin,
                output: Some(output),
            })
        }
    }

    impl OutputLine for RppalLine {
        fn write(&mut self, level: bool) -> Result<(), HardwareError> {
            let output = self
                .output
                .as_mut()
                .ok_or(HardwareError::Released { pin: self.pin })?;
            if level {
                output.set_high();
            } else {
                output.set_low();
            }
            Ok(())
        }

        fn release(&mut self) -> Result<(), HardwareError> {
            if let Some(mut output) = self.output.take() {
                output.set_low();
                // rppal resets the pin mode when the OutputPin is dropped
                output.set_reset_on_drop(true);
            }
            Ok(())
        }
    }
}

#[cfg(feature = "gpio")]
pub use raspberry_pi::RppalLine;

/// Shared view into a [`MemoryLine`], for observing writes from tests.
#[derive(Debug, Clone, Default)]
pub struct LineProbe {
    level: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl LineProbe {
    /// Level last driven onto the line.
    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Number of successful writes, not counting release.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail with [`HardwareError::Write`].
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

/// In-memory output line for hosts without GPIO.
pub struct MemoryLine {
    pin: u8,
    probe: LineProbe,
}

impl MemoryLine {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            probe: LineProbe::default(),
        }
    }

    /// A handle that keeps observing the line after it is moved into a controller.
    pub fn probe(&self) -> LineProbe {
        self.probe.clone()
    }
}

impl OutputLine for MemoryLine {
    fn write(&mut self, level: bool) -> Result<(), HardwareError> {
        if self.probe.is_released() {
            return Err(HardwareError::Released { pin: self.pin });
        }
        if self.probe.fail_writes.load(Ordering::SeqCst) {
            return Err(HardwareError::Write {
                pin: self.pin,
                reason: "injected write failure".to_string(),
            });
        }
        self.probe.level.store(level, Ordering::SeqCst);
        self.probe.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) -> Result<(), HardwareError> {
        self.probe.level.store(false, Ordering::SeqCst);
        self.probe.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Open the line the build supports: rppal with the `gpio` feature unless
/// `mock` is set, otherwise an in-memory line.
pub fn open_default(chip: u8, pin: u8, mock: bool) -> Result<Box<dyn OutputLine>, HardwareError> {
    #[cfg(feature = "gpio")]
    {
        if !mock {
            return Ok(Box::new(RppalLine::open(chip, pin)?));
        }
    }

    #[cfg(not(feature = "gpio"))]
    {
        if !mock {
            tracing::warn!(
                "GPIO support not compiled in; GPIO{} on chip {} is simulated in memory",
                pin,
                chip
            );
        }
    }

    Ok(Box::new(MemoryLine::new(pin)))
}
