//! Exclusive camera ownership: still captures and the continuous feed.

use super::device::CameraDevice;
use super::frame::{EncodedFrame, Frame};
use crate::config::ImageFormat;
use crate::error::CaptureError;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after a failed device read before trying again.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_secs(1);

type DeviceSlot = Option<Box<dyn CameraDevice>>;

/// Receives every frame the continuous feed produces.
pub trait FrameSink: Send + Sync + 'static {
    /// Deliver one frame. Returning `false` ends the feed.
    fn publish(&self, frame: Arc<EncodedFrame>) -> bool;
}

/// Stops the feed when told to or when dropped.
pub struct FeedHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Ask the loop to exit after its current capture.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Stop and wait for the loop to finish.
    pub async fn stop_and_wait(self) {
        self.stop();
        if let Err(e) = self.task.await {
            debug!("Camera feed task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Sole owner of the camera device.
///
/// The device lives behind a fair async mutex that acts as the ownership
/// token: exactly one capture runs against the sensor at a time, and waiters
/// are served in arrival order.
pub struct CameraSession {
    device: Arc<Mutex<DeviceSlot>>,
    capture_timeout: Duration,
    jpeg_quality: u8,
    active_feeds: Arc<AtomicUsize>,
}

impl CameraSession {
    pub fn new(device: Box<dyn CameraDevice>, capture_timeout: Duration, jpeg_quality: u8) -> Self {
        Self {
            device: Arc::new(Mutex::new(Some(device))),
            capture_timeout,
            jpeg_quality,
            active_feeds: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capture_timeout(&self) -> Duration {
        self.capture_timeout
    }

    /// Whether a continuous feed loop is currently running.
    pub fn feed_active(&self) -> bool {
        self.active_feeds.load(Ordering::SeqCst) > 0
    }

    /// Capture and encode one still image.
    ///
    /// Waits behind any capture already in progress, for at most the
    /// configured timeout, then fails with [`CaptureError::Busy`].
    pub async fn capture_still(&self, format: ImageFormat) -> Result<Bytes, CaptureError> {
        let started = Instant::now();
        let guard = tokio::time::timeout(self.capture_timeout, self.device.clone().lock_owned())
            .await
            .map_err(|_| {
                warn!("Still capture gave up waiting for the camera");
                CaptureError::Busy(self.capture_timeout)
            })?;

        let idle_after = !self.feed_active();
        let frame = capture_blocking(guard, idle_after).await?;

        let quality = self.jpeg_quality;
        let bytes = run_blocking(move || frame.encode(format, quality)).await?;
        debug!(
            "Captured {:?} still ({} bytes) in {:?}",
            format,
            bytes.len(),
            started.elapsed()
        );
        Ok(bytes)
    }

    /// Start a continuous capture loop that hands JPEG frames to `sink`.
    ///
    /// Device reads and encoding run on the blocking pool; the loop yields
    /// between frames. A frame that fails to encode is logged and skipped.
    pub fn open_feed(&self, sink: Arc<dyn FrameSink>) -> FeedHandle {
        let (stop, stop_rx) = watch::channel(false);
        self.active_feeds.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(feed_loop(
            self.device.clone(),
            self.active_feeds.clone(),
            self.jpeg_quality,
            sink,
            stop_rx,
        ));
        info!("Camera feed started");
        FeedHandle { stop, task }
    }

    /// Release the sensor. Waits up to `wait` for in-flight captures.
    ///
    /// Calling this twice is harmless. If the device cannot be reclaimed in
    /// time it is released when the session is dropped instead.
    pub async fn release(&self, wait: Duration) {
        let slot = match tokio::time::timeout(wait, self.device.clone().lock_owned()).await {
            Ok(slot) => slot,
            Err(_) => {
                warn!("Camera still in use after {:?}; deferring release", wait);
                return;
            }
        };

        let released = run_blocking(move || {
            let mut slot = slot;
            match slot.take() {
                Some(mut device) => {
                    device.release();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await;

        match released {
            Ok(true) => info!("Camera released"),
            Ok(false) => debug!("Camera already released"),
            Err(e) => debug!("Ignoring camera release error: {}", e),
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.device.try_lock() {
            if let Some(mut device) = slot.take() {
                device.release();
            }
        }
    }
}

async fn feed_loop(
    device: Arc<Mutex<DeviceSlot>>,
    active_feeds: Arc<AtomicUsize>,
    jpeg_quality: u8,
    sink: Arc<dyn FrameSink>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut sequence = 0u64;
    let mut dropped = 0u64;

    loop {
        let guard = tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            guard = device.clone().lock_owned() => guard,
        };

        let frame = match capture_blocking(guard, false).await {
            Ok(frame) => frame,
            Err(CaptureError::Closed) => {
                debug!("Camera closed, ending feed");
                break;
            }
            Err(e) => {
                warn!("Feed capture failed: {}", e);
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(CAPTURE_RETRY_DELAY) => continue,
                }
            }
        };
        let captured_at = Instant::now();

        if stop_requested(&stop_rx) {
            break;
        }

        sequence += 1;
        let (width, height) = (frame.width, frame.height);
        let encoded = run_blocking(move || frame.encode(ImageFormat::Jpeg, jpeg_quality)).await;

        match encoded {
            Ok(jpeg) => {
                let frame = Arc::new(EncodedFrame {
                    sequence,
                    width,
                    height,
                    jpeg,
                    captured_at,
                });
                if !sink.publish(frame) {
                    debug!("Frame sink closed, ending feed");
                    break;
                }
            }
            Err(e) => {
                dropped += 1;
                warn!("Dropping frame {}: {}", sequence, e);
            }
        }

        tokio::task::yield_now().await;
    }

    let remaining = active_feeds.fetch_sub(1, Ordering::SeqCst) - 1;
    if remaining == 0 {
        // Idle the sensor once nobody is streaming. A feed opened while we
        // waited for the token owns the device now, so leave it running.
        let slot = device.lock_owned().await;
        if active_feeds.load(Ordering::SeqCst) == 0 {
            let _ = run_blocking(move || {
                let mut slot = slot;
                if let Some(device) = slot.as_mut() {
                    device.suspend();
                }
                Ok(())
            })
            .await;
        } else {
            debug!("Camera feed restarted before idling; sensor left running");
        }
    }

    info!(
        "Camera feed stopped after {} frames ({} dropped)",
        sequence, dropped
    );
}

fn stop_requested(stop_rx: &watch::Receiver<bool>) -> bool {
    // A dropped FeedHandle counts as a stop request
    *stop_rx.borrow() || stop_rx.has_changed().is_err()
}

/// Read one frame while holding the device token, on the blocking pool.
async fn capture_blocking(
    guard: OwnedMutexGuard<DeviceSlot>,
    suspend_after: bool,
) -> Result<Frame, CaptureError> {
    run_blocking(move || {
        let mut guard = guard;
        let device = guard.as_mut().ok_or(CaptureError::Closed)?;
        let frame = device.capture();
        if suspend_after {
            device.suspend();
        }
        frame
    })
    .await
}

async fn run_blocking<T, F>(f: F) -> Result<T, CaptureError>
where
    F: FnOnce() -> Result<T, CaptureError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap_or_else(|e| {
        error!("Camera worker task failed: {}", e);
        Err(CaptureError::Unavailable(format!("camera worker failed: {}", e)))
    })
}
