use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::scripted::ScriptedProvider;
use crate::frame::Frame;
use crate::keypoint::{Hand, Pose};
use crate::landmarks::provider::{LandmarkCapability, LandmarkProvider};
use crate::snapshot::DetectionRecord;

/// Plays back detections recorded as JSON Lines, one `{"hands": [...], "poses": [...]}`
/// object per frame. Blank lines and lines starting with `#` are skipped.
pub struct ReplayProvider {
    inner: ScriptedProvider,
}

impl ReplayProvider {
    pub fn open(path: &Path, looping: bool) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open landmark recording {}", path.display()))?;
        let records = parse_records(file)
            .with_context(|| format!("parse landmark recording {}", path.display()))?;
        log::info!(
            "ReplayProvider: loaded {} records from {}",
            records.len(),
            path.display()
        );
        Ok(Self::from_records(records, looping))
    }

    pub fn from_records(records: Vec<DetectionRecord>, looping: bool) -> Self {
        let inner = ScriptedProvider::new(records).renamed("replay");
        let inner = if looping { inner } else { inner.once() };
        Self { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl LandmarkProvider for ReplayProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn supports(&self, capability: LandmarkCapability) -> bool {
        self.inner.supports(capability)
    }

    fn estimate_hands(&mut self, frame: &Frame, max_hands: usize) -> Result<Vec<Hand>> {
        self.inner.estimate_hands(frame, max_hands)
    }

    fn estimate_poses(&mut self, frame: &Frame) -> Result<Vec<Pose>> {
        self.inner.estimate_poses(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        if self.inner.is_empty() {
            return Err(anyhow!("landmark recording contains no records"));
        }
        Ok(())
    }
}

pub fn parse_records<R: Read>(reader: R) -> Result<Vec<DetectionRecord>> {
    let mut records = Vec::new();
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.context("read recording line")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: DetectionRecord = serde_json::from_str(trimmed)
            .map_err(|e| anyhow!("line {}: invalid detection record: {}", index + 1, e))?;
        records.push(record);
    }
    Ok(records)
}
