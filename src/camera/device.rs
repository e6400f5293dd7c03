//! Camera device backends.
//!
//! Every method here blocks; [`super::CameraSession`] only calls them from the
//! blocking thread pool while holding the device token.

use super::frame::{Frame, FrameEncoding};
use crate::config::Resolution;
use crate::error::CaptureError;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Exclusive handle to an imaging sensor.
pub trait CameraDevice: Send {
    /// Block until the next frame is available and return it.
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    /// Stop any continuous acquisition. The next `capture` restarts it.
    fn suspend(&mut self) {}

    /// Shut the sensor down for good.
    fn release(&mut self);
}

/// Reads raw I420 frames from a long-running `rpicam-vid` process.
///
/// The process is started on the first capture and stopped by `suspend`, so
/// the sensor only runs while someone is consuming frames. Widths that are a
/// multiple of 64 avoid stride padding in the raw output.
pub struct RpicamDevice {
    command: String,
    resolution: Resolution,
    framerate: u32,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl RpicamDevice {
    pub fn new(command: impl Into<String>, resolution: Resolution, framerate: u32) -> Self {
        Self {
            command: command.into(),
            resolution,
            framerate,
            child: None,
            stdout: None,
        }
    }

    fn frame_len(&self) -> usize {
        let Resolution { width, height } = self.resolution;
        Frame::expected_len(FrameEncoding::Yuv420, width, height).unwrap_or_default()
    }

    fn ensure_started(&mut self) -> Result<(), CaptureError> {
        if self.stdout.is_some() {
            return Ok(());
        }

        let Resolution { width, height } = self.resolution;
        info!(
            "Starting {}: {}x{} @ {}fps",
            self.command, width, height, self.framerate
        );

        let mut child = Command::new(&self.command)
            .args(["-t", "0", "-n", "--codec", "yuv420", "--flush"])
            .args(["--width", &width.to_string()])
            .args(["--height", &height.to_string()])
            .args(["--framerate", &self.framerate.to_string()])
            .args(["-o", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::Unavailable(format!("failed to start {}: {}", self.command, e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::Unavailable(format!("{} has no stdout", self.command))
        })?;
        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    fn stop_process(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("{} already exited: {}", self.command, e);
            }
            let _ = child.wait();
            debug!("{} stopped", self.command);
        }
    }
}

impl CameraDevice for RpicamDevice {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.ensure_started()?;

        let mut data = vec![0u8; self.frame_len()];
        let read = match self.stdout.as_mut() {
            Some(stdout) => stdout.read_exact(&mut data),
            None => return Err(CaptureError::Unavailable("camera not started".into())),
        };

        if let Err(e) = read {
            warn!("{} stream ended: {}", self.command, e);
            self.stop_process();
            return Err(CaptureError::Unavailable(format!(
                "{} stream ended: {}",
                self.command, e
            )));
        }

        Ok(Frame::new(
            data,
            self.resolution.width,
            self.resolution.height,
            FrameEncoding::Yuv420,
        ))
    }

    fn suspend(&mut self) {
        self.stop_process();
    }

    fn release(&mut self) {
        self.stop_process();
    }
}

impl Drop for RpicamDevice {
    fn drop(&mut self) {
        self.stop_process();
    }
}

/// Counters shared with a [`TestPatternDevice`] after it has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct DeviceProbe {
    captures: Arc<AtomicU64>,
    suspends: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl DeviceProbe {
    /// Capture calls made against the device, including failed ones.
    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn suspends(&self) -> usize {
        self.suspends.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Synthetic RGB frames: a gradient that shifts every frame.
///
/// Used for development off the Pi and by the test suite.
pub struct TestPatternDevice {
    resolution: Resolution,
    frame_time: Duration,
    corrupt_every: Option<u64>,
    probe: DeviceProbe,
}

impl TestPatternDevice {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            frame_time: Duration::ZERO,
            corrupt_every: None,
            probe: DeviceProbe::default(),
        }
    }

    /// Block this long inside every capture, like a sensor exposing a frame.
    pub fn with_frame_time(mut self, frame_time: Duration) -> Self {
        self.frame_time = frame_time;
        self
    }

    /// Every `n`th capture returns a truncated buffer that fails to encode.
    pub fn with_corrupt_every(mut self, n: u64) -> Self {
        self.corrupt_every = Some(n.max(1));
        self
    }

    pub fn probe(&self) -> DeviceProbe {
        self.probe.clone()
    }
}

impl CameraDevice for TestPatternDevice {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        if self.probe.is_released() {
            return Err(CaptureError::Closed);
        }
        if !self.frame_time.is_zero() {
            std::thread::sleep(self.frame_time);
        }

        let n = self.probe.captures.fetch_add(1, Ordering::SeqCst) + 1;
        let Resolution { width, height } = self.resolution;

        if self.corrupt_every.is_some_and(|every| n % every == 0) {
            return Ok(Frame::new(vec![0; 3], width, height, FrameEncoding::Rgb8));
        }

        let shift = (n * 4) as usize;
        let mut data = Vec::with_capacity(self.resolution.pixels() * 3);
        for y in 0..height as usize {
            for x in 0..width as usize {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        Ok(Frame::new(data, width, height, FrameEncoding::Rgb8))
    }

    fn suspend(&mut self) {
        self.probe.suspends.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.probe.released.store(true, Ordering::SeqCst);
    }
}
