//! Detection loop.
//!
//! Each tick reads one frame, asks the landmark providers for hands then poses, freezes the
//! result into a [`DetectionSnapshot`] and redraws the overlay. The next tick only starts
//! once the previous detection returned, so slow detection drops frames instead of queueing
//! them.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceStats};
use crate::landmarks::ProviderRegistry;
use crate::overlay::OverlayRenderer;
use crate::snapshot::DetectionSnapshot;

/// Decides when the next tick starts.
pub trait Ticker {
    /// Block until the next tick is due. Returns `false` once the ticker is exhausted.
    fn wait_next(&mut self) -> bool;
}

/// Ticks at a fixed rate. A late tick resets the schedule rather than bursting to catch up.
pub struct FixedRateTicker {
    interval: Duration,
    next_due: Option<Instant>,
    remaining: Option<u64>,
}

impl FixedRateTicker {
    pub fn new(fps: u32) -> Self {
        let interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / fps as f64)
        };
        Self {
            interval,
            next_due: None,
            remaining: None,
        }
    }

    /// Stop after `ticks` ticks.
    pub fn limit(mut self, ticks: u64) -> Self {
        self.remaining = Some(ticks);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Ticker for FixedRateTicker {
    fn wait_next(&mut self) -> bool {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return false;
            }
            *remaining -= 1;
        }
        let now = Instant::now();
        match self.next_due {
            Some(due) if due > now => {
                thread::sleep(due - now);
                self.next_due = Some(due + self.interval);
            }
            _ => self.next_due = Some(now + self.interval),
        }
        true
    }
}

/// Fires a fixed number of ticks immediately. Used by tests and one-shot runs.
pub struct ManualTicker {
    remaining: u64,
}

impl ManualTicker {
    pub fn new(ticks: u64) -> Self {
        Self { remaining: ticks }
    }
}

impl Ticker for ManualTicker {
    fn wait_next(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// A frame together with the detections made on it.
#[derive(Clone)]
pub struct Observation {
    pub frame: Arc<Frame>,
    pub snapshot: Arc<DetectionSnapshot>,
    /// Markers drawn on the overlay for this snapshot.
    pub markers: usize,
    pub detect_elapsed: Duration,
}

pub struct DetectionLoop {
    source: Box<dyn FrameSource>,
    registry: ProviderRegistry,
    overlay: Option<OverlayRenderer>,
    max_hands: usize,
    sequence: u64,
    latest: Option<Observation>,
}

impl DetectionLoop {
    pub fn new(source: Box<dyn FrameSource>, registry: ProviderRegistry, max_hands: usize) -> Self {
        Self {
            source,
            registry,
            overlay: None,
            max_hands,
            sequence: 0,
            latest: None,
        }
    }

    /// Use a preconfigured overlay instead of one sized to the first frame.
    pub fn with_overlay(mut self, overlay: OverlayRenderer) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn overlay(&self) -> Option<&OverlayRenderer> {
        self.overlay.as_ref()
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.latest.as_ref()
    }

    pub fn source_stats(&self) -> SourceStats {
        self.source.stats()
    }

    pub fn source_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    /// Run one detection cycle.
    ///
    /// Camera errors propagate. Provider errors are logged and produce an empty snapshot so
    /// the loop keeps running.
    pub fn tick(&mut self) -> Result<Observation> {
        let frame = self.source.next_frame().context("read camera frame")?;
        self.sequence += 1;

        let started = Instant::now();
        let (hands, poses) = match self.registry.estimate(&frame, self.max_hands) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("landmark detection failed on frame {}: {:#}", self.sequence, err);
                (Vec::new(), Vec::new())
            }
        };
        let detect_elapsed = started.elapsed();

        let (width, height) = frame.dimensions();
        let snapshot = DetectionSnapshot::new(
            self.sequence,
            width,
            height,
            hands,
            poses,
            self.max_hands,
        );

        let overlay = self
            .overlay
            .get_or_insert_with(|| OverlayRenderer::new(width, height));
        let markers = overlay.render(&snapshot);

        log::debug!(
            "frame {}: {} hands, {} poses, {} markers in {:?}",
            snapshot.sequence(),
            snapshot.hands().len(),
            snapshot.poses().len(),
            markers,
            detect_elapsed
        );

        let observation = Observation {
            frame: Arc::new(frame),
            snapshot: Arc::new(snapshot),
            markers,
            detect_elapsed,
        };
        self.latest = Some(observation.clone());
        Ok(observation)
    }

    /// Tick until `ticker` is exhausted or `on_tick` returns `false`. Returns the tick count.
    pub fn run<T, F>(&mut self, ticker: &mut T, mut on_tick: F) -> Result<u64>
    where
        T: Ticker,
        F: FnMut(&Observation) -> Result<bool>,
    {
        let mut ticks = 0;
        while ticker.wait_next() {
            let observation = self.tick()?;
            ticks += 1;
            if !on_tick(&observation)? {
                break;
            }
        }
        Ok(ticks)
    }
}
