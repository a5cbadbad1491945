//! HTTP camera source.
//!
//! Handles webcams and camera bridges that publish either a `multipart/x-mixed-replace`
//! MJPEG stream or a single JPEG snapshot per request. Frames are decoded in memory.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{frame_interval, health_grace, CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK: usize = 8 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// A connected source that has not produced a frame yet stays healthy this long.
const FIRST_FRAME_GRACE: Duration = Duration::from_secs(5);

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub struct HttpSource {
    config: CameraConfig,
    agent: ureq::Agent,
    transport: Option<Transport>,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    frames: u64,
    last_error: Option<String>,
}

enum Transport {
    /// Long-lived multipart response, split into JPEGs as bytes arrive.
    Stream {
        body: Box<dyn Read + Send>,
        splitter: JpegSplitter,
    },
    /// One GET per frame.
    Snapshot,
}

impl HttpSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse camera url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(REQUEST_TIMEOUT)
            .timeout_read(REQUEST_TIMEOUT)
            .build();
        Ok(Self {
            config,
            agent,
            transport: None,
            connected_at: None,
            last_frame_at: None,
            frames: 0,
            last_error: None,
        })
    }

    fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        match self.transport.as_mut() {
            None => Err(anyhow!("http camera not connected; call connect() first")),
            Some(Transport::Snapshot) => fetch_snapshot(&self.agent, &self.config.url),
            Some(Transport::Stream { body, splitter }) => {
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    if let Some(jpeg) = splitter.next_jpeg() {
                        return Ok(jpeg);
                    }
                    let read = body.read(&mut chunk).context("read mjpeg stream")?;
                    if read == 0 {
                        return Err(anyhow!("mjpeg stream ended"));
                    }
                    splitter.push(&chunk[..read]);
                }
            }
        }
    }
}

impl FrameSource for HttpSource {
    fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("connect to camera {}", self.config.url))?;
        let multipart = response
            .header("Content-Type")
            .map(|value| value.to_ascii_lowercase().starts_with("multipart/"))
            .unwrap_or(false);
        self.transport = Some(if multipart {
            Transport::Stream {
                body: response.into_reader(),
                splitter: JpegSplitter::default(),
            }
        } else {
            Transport::Snapshot
        });
        log::info!(
            "HttpSource: connected to {} ({})",
            self.config.url,
            if multipart { "mjpeg" } else { "snapshot" }
        );
        self.connected_at = Some(Instant::now());
        self.last_error = None;
        Ok(())
    }

    /// Skips JPEGs that arrive faster than `target_fps` allows.
    fn next_frame(&mut self) -> Result<Frame> {
        let spacing = frame_interval(self.config.target_fps);
        loop {
            let jpeg = match self.next_jpeg() {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    self.last_error = Some(format!("{:#}", err));
                    return Err(err);
                }
            };
            let now = Instant::now();
            let too_soon = self
                .last_frame_at
                .map(|last| now.duration_since(last) < spacing)
                .unwrap_or(false);
            if too_soon {
                continue;
            }
            let frame = decode_jpeg(&jpeg)?;
            self.frames += 1;
            self.last_frame_at = Some(now);
            return Ok(frame);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        match (self.connected_at, self.last_frame_at) {
            (None, _) => false,
            (Some(connected), None) => connected.elapsed() <= FIRST_FRAME_GRACE,
            (Some(_), Some(last)) => last.elapsed() <= health_grace(self.config.target_fps),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames,
            source: self.config.url.clone(),
        }
    }
}

/// Incremental SOI..EOI splitter for MJPEG bodies.
///
/// Boundary lines and part headers between images are discarded. The search resumes where
/// the previous one stopped, so each byte is scanned once.
#[derive(Default)]
struct JpegSplitter {
    buffer: Vec<u8>,
    start: Option<usize>,
    scanned: usize,
}

impl JpegSplitter {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > MAX_JPEG_BYTES * 2 {
            log::warn!(
                "mjpeg buffer exceeded {} bytes without a complete frame; resyncing",
                MAX_JPEG_BYTES * 2
            );
            let keep = self.buffer.len() - 1;
            self.buffer.drain(..keep);
            self.start = None;
            self.scanned = 0;
        }
    }

    fn next_jpeg(&mut self) -> Option<Vec<u8>> {
        let start = match self.start {
            Some(start) => start,
            None => {
                let Some(start) = find_marker(&self.buffer, 0, SOI) else {
                    let junk = self.buffer.len().saturating_sub(1);
                    self.buffer.drain(..junk);
                    return None;
                };
                self.start = Some(start);
                self.scanned = start + SOI.len();
                start
            }
        };
        let eoi = match find_marker(&self.buffer, self.scanned, EOI) {
            Some(eoi) => eoi,
            None => {
                // The last byte may be the first half of a marker.
                self.scanned = self.buffer.len().saturating_sub(1).max(start + SOI.len());
                return None;
            }
        };
        let end = eoi + EOI.len();
        let jpeg = self.buffer[start..end].to_vec();
        self.buffer.drain(..end);
        self.start = None;
        self.scanned = 0;
        Some(jpeg)
    }
}

fn find_marker(buffer: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|pair| pair == marker)
        .map(|offset| from + offset)
}

fn fetch_snapshot(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("camera {} returned an empty snapshot", url));
    }
    Ok(bytes)
}

pub(crate) fn decode_jpeg(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .context("decode jpeg")?;
    Ok(Frame::from_image(image.into_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 80)
            .encode_image(&image)
            .unwrap();
        bytes
    }

    fn part(jpeg: &[u8]) -> Vec<u8> {
        let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        body.extend_from_slice(jpeg);
        body.extend_from_slice(b"\r\n");
        body
    }

    #[test]
    fn splits_marker_delimited_frames() {
        let mut splitter = JpegSplitter::default();
        splitter.push(&[0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x03]);
        assert_eq!(splitter.next_jpeg(), Some(vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]));
        assert_eq!(splitter.next_jpeg(), None);
    }

    #[test]
    fn marker_split_across_chunks() {
        let mut splitter = JpegSplitter::default();
        splitter.push(&[0xFF]);
        assert_eq!(splitter.next_jpeg(), None);
        splitter.push(&[0xD8, 0x10, 0xFF]);
        assert_eq!(splitter.next_jpeg(), None);
        splitter.push(&[0xD9]);
        assert_eq!(splitter.next_jpeg(), Some(vec![0xFF, 0xD8, 0x10, 0xFF, 0xD9]));
    }

    #[test]
    fn decodes_frames_from_multipart_body() -> Result<()> {
        let mut body = part(&jpeg(8, 6));
        body.extend(part(&jpeg(4, 4)));

        let mut splitter = JpegSplitter::default();
        let mut frames = Vec::new();
        for chunk in body.chunks(97) {
            splitter.push(chunk);
            while let Some(jpeg) = splitter.next_jpeg() {
                frames.push(decode_jpeg(&jpeg)?);
            }
        }
        let sizes: Vec<(u32, u32)> = frames.iter().map(Frame::dimensions).collect();
        assert_eq!(sizes, vec![(8, 6), (4, 4)]);
        Ok(())
    }

    #[test]
    fn rejects_non_http_url() {
        let config = CameraConfig {
            url: "ftp://camera/stream".to_string(),
            ..CameraConfig::default()
        };
        assert!(HttpSource::new(config).is_err());
    }

    #[test]
    fn unconnected_source_is_unhealthy() -> Result<()> {
        let mut source = HttpSource::new(CameraConfig {
            url: "http://127.0.0.1:9/stream".to_string(),
            ..CameraConfig::default()
        })?;
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        assert!(!source.is_healthy());
        Ok(())
    }
}
