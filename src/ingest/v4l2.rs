//! V4L2 frame source.
//!
//! This module provides `V4l2Source` for pulling frames from a local
//! camera through libv4l:
//! - The device is `/dev/video<index>` unless an explicit path is configured
//! - RGB3 is requested; NV12 and YUYV replies are normalized to RGB24
//! - Frames are captured in-memory through an mmap buffer stream
//!
//! A failed grab is reported as `SourceError::Read`. The source never
//! reconnects by itself.

use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceError};
use crate::frame::{unix_now, Frame};

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Explicit device path. When `None`, `/dev/video<index>` is used.
    pub device: Option<String>,
    /// Requested frame rate. Zero leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: None,
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

pub struct V4l2Source {
    config: V4l2Config,
    device_path: String,
    state: Option<DeviceV4l2State>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        let device_path = config
            .device
            .clone()
            .unwrap_or_else(|| "/dev/video0".to_string());
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            device_path,
            state: None,
            format: PixelFormat::Rgb24,
        }
    }

    fn open_error(&self, reason: impl std::fmt::Display) -> SourceError {
        SourceError::Open {
            device: self.device_path.clone(),
            reason: reason.to_string(),
        }
    }

    fn read_error(&self, reason: impl std::fmt::Display) -> SourceError {
        SourceError::Read {
            device: self.device_path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl FrameSource for V4l2Source {
    fn open(&mut self, camera_index: u32) -> Result<(), SourceError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        self.device_path = self
            .config
            .device
            .clone()
            .unwrap_or_else(|| format!("/dev/video{}", camera_index));

        let device = v4l::Device::with_path(&self.device_path)
            .map_err(|err| self.open_error(format!("open v4l2 device: {}", err)))?;
        let mut format = device
            .format()
            .map_err(|err| self.open_error(format!("read v4l2 format: {}", err)))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.device_path,
                    err
                );
                device
                    .format()
                    .map_err(|err| self.open_error(format!("read v4l2 format: {}", err)))?
            }
        };

        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            self.open_error(format!("unsupported pixel format {}", format.fourcc))
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.device_path,
                    err
                );
            }
        }

        let state = DeviceV4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| self.open_error(format!("create v4l2 buffer stream: {}", err)))?;

        self.state = Some(state);
        self.format = pixel_format;
        self.active_width = format.width;
        self.active_height = format.height;

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.device_path,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        use v4l::io::traits::CaptureStream;

        let width = self.active_width;
        let height = self.active_height;
        let format = self.format;
        let Some(state) = self.state.as_mut() else {
            return Err(SourceError::NotOpen {
                device: self.device_path.clone(),
            });
        };

        let pixels = state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, _meta)| normalize_to_rgb(buf, width, height, format))
            })
            .map_err(|err| self.read_error(format!("capture v4l2 frame: {}", err)))?
            .map_err(|err| self.read_error(err))?;

        Frame::from_rgb(pixels, width, height, unix_now()).map_err(|err| self.read_error(err))
    }

    fn close(&mut self) {
        // Dropping the state stops streaming and releases the device node.
        if self.state.take().is_some() {
            log::debug!("V4l2Source: closed {}", self.device_path);
        }
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}
