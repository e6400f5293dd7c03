//! Camera access: device backends, the exclusive session and the stream broker.

pub mod broker;
pub mod device;
pub mod frame;
pub mod session;

pub use broker::{FrameBroker, FrameSubscriber};
pub use device::{CameraDevice, DeviceProbe, RpicamDevice, TestPatternDevice};
pub use frame::{EncodedFrame, Frame, FrameEncoding};
pub use session::{CameraSession, FeedHandle, FrameSink};

use crate::config::{CameraBackend, DeviceConfig};

/// Build the device selected in `config`.
pub fn open_device(config: &DeviceConfig) -> Box<dyn CameraDevice> {
    match config.camera {
        CameraBackend::Rpicam => Box::new(RpicamDevice::new(
            config.rpicam_command.clone(),
            config.resolution,
            config.framerate,
        )),
        CameraBackend::TestPattern => Box::new(
            TestPatternDevice::new(config.resolution).with_frame_time(config.frame_interval()),
        ),
    }
}
