//! V4L2 webcam source.
//!
//! Opens a local device node (e.g. `/dev/video0`) and negotiates the first pixel format the
//! driver accepts at the configured size, in the order RGB24, YUYV, MJPEG, NV12. Every format
//! is normalized to packed RGB before it leaves this module.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::Instant;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::http::decode_jpeg;
use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{health_grace, CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;

const MMAP_BUFFERS: u32 = 4;

/// Requested in this order; the driver may substitute its own choice.
const PREFERRED_FOURCCS: [&[u8; 4]; 4] = [b"RGB3", b"YUYV", b"MJPG", b"NV12"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Raw(PixelFormat),
    Mjpeg,
}

impl Encoding {
    fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Raw(PixelFormat::Rgb24)),
            b"YUYV" => Some(Self::Raw(PixelFormat::Yuyv)),
            b"NV12" => Some(Self::Raw(PixelFormat::Nv12)),
            b"MJPG" => Some(Self::Mjpeg),
            _ => None,
        }
    }
}

/// What the driver actually agreed to.
#[derive(Clone, Copy, Debug)]
struct Negotiated {
    width: u32,
    height: u32,
    encoding: Encoding,
}

#[self_referencing]
struct Capturing {
    device: Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, Device>,
}

pub struct V4l2Source {
    config: CameraConfig,
    capturing: Option<Capturing>,
    negotiated: Option<Negotiated>,
    frames: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

impl V4l2Source {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if !config.url.starts_with("/dev/") {
            return Err(anyhow!("v4l2 source expects a /dev path, got {}", config.url));
        }
        Ok(Self {
            config,
            capturing: None,
            negotiated: None,
            frames: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    fn negotiate(&self, device: &Device) -> Result<Negotiated> {
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        for fourcc in PREFERRED_FOURCCS {
            format.fourcc = FourCC::new(fourcc);
            match device.set_format(&format) {
                Ok(accepted) => {
                    if let Some(encoding) = Encoding::from_fourcc(&accepted.fourcc.repr) {
                        return Ok(Negotiated {
                            width: accepted.width,
                            height: accepted.height,
                            encoding,
                        });
                    }
                }
                Err(err) => log::debug!(
                    "V4l2Source: {} rejected {}: {}",
                    self.config.url,
                    String::from_utf8_lossy(fourcc),
                    err
                ),
            }
        }
        Err(anyhow!(
            "{} offers none of the supported pixel formats (RGB3, YUYV, MJPG, NV12)",
            self.config.url
        ))
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        let device = Device::with_path(&self.config.url)
            .with_context(|| format!("open v4l2 device {}", self.config.url))?;
        let negotiated = self.negotiate(&device)?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Source: {} ignored fps request: {}", self.config.url, err);
            }
        }

        let capturing = CapturingTryBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .context("map v4l2 capture buffers")
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(format!("{:#}", err));
            err
        })?;

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.url,
            negotiated.width,
            negotiated.height,
            negotiated.encoding
        );
        self.capturing = Some(capturing);
        self.negotiated = Some(negotiated);
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let (Some(capturing), Some(negotiated)) = (self.capturing.as_mut(), self.negotiated)
        else {
            return Err(anyhow!("v4l2 device not connected; call connect() first"));
        };
        let buffer = capturing
            .with_stream_mut(|stream| stream.next().map(|(data, _meta)| data.to_vec()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("dequeue v4l2 buffer")
            })?;

        let frame = match negotiated.encoding {
            Encoding::Mjpeg => decode_jpeg(&buffer)?,
            Encoding::Raw(format) => Frame::from_rgb(
                normalize_to_rgb(&buffer, negotiated.width, negotiated.height, format)?,
                negotiated.width,
                negotiated.height,
            )?,
        };
        self.frames += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }

    fn is_healthy(&self) -> bool {
        self.capturing.is_some()
            && self.last_error.is_none()
            && self
                .last_frame_at
                .map(|at| at.elapsed() <= health_grace(self.config.target_fps))
                .unwrap_or(true)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames,
            source: self.config.url.clone(),
        }
    }
}
