use anyhow::anyhow;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{CaptureClient, CaptureError, SubmitMode};
use crate::frame::Frame;
use crate::snapshot::DetectionSnapshot;
use crate::upload::PredictionResult;

/// Whether a new capture may start while another is still uploading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InFlightPolicy {
    /// Every trigger starts a request. A later request may complete before an earlier one.
    #[default]
    Concurrent,
    /// Triggers are rejected with `CaptureBusy` while a request is in flight.
    AtMostOne,
}

impl fmt::Display for InFlightPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InFlightPolicy::Concurrent => f.write_str("concurrent"),
            InFlightPolicy::AtMostOne => f.write_str("at-most-one"),
        }
    }
}

impl FromStr for InFlightPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(InFlightPolicy::Concurrent),
            "at-most-one" | "at_most_one" | "single" => Ok(InFlightPolicy::AtMostOne),
            other => Err(anyhow!(
                "unknown in-flight policy '{}'; expected concurrent or at-most-one",
                other
            )),
        }
    }
}

/// Result of one background capture.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub id: u64,
    /// Sequence number of the snapshot the capture was taken from.
    pub snapshot_sequence: u64,
    pub mode: SubmitMode,
    pub elapsed: Duration,
    pub result: Result<PredictionResult, CaptureError>,
}

/// Runs uploads off the detection loop.
///
/// Validation and encoding happen synchronously in [`CaptureDispatcher::submit`], so rejected
/// captures fail immediately and never reach the network. The upload itself runs on its own
/// thread and reports back through a channel the loop drains with [`CaptureDispatcher::poll`].
pub struct CaptureDispatcher {
    client: Arc<CaptureClient>,
    policy: InFlightPolicy,
    in_flight: Arc<AtomicUsize>,
    next_id: u64,
    tx: Sender<CaptureOutcome>,
    rx: Receiver<CaptureOutcome>,
}

impl CaptureDispatcher {
    pub fn new(client: Arc<CaptureClient>, policy: InFlightPolicy) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            client,
            policy,
            in_flight: Arc::new(AtomicUsize::new(0)),
            next_id: 0,
            tx,
            rx,
        }
    }

    pub fn policy(&self) -> InFlightPolicy {
        self.policy
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start a capture. Returns the capture id once the upload has been handed to a worker.
    pub fn submit(
        &mut self,
        frame: &Frame,
        snapshot: &DetectionSnapshot,
    ) -> Result<u64, CaptureError> {
        if self.policy == InFlightPolicy::AtMostOne && self.in_flight() > 0 {
            return Err(CaptureError::CaptureBusy);
        }
        let prepared = self.client.prepare(frame, snapshot)?;

        self.next_id += 1;
        let id = self.next_id;
        let snapshot_sequence = snapshot.sequence();
        let mode = prepared.mode();
        let client = Arc::clone(&self.client);
        let in_flight = Arc::clone(&self.in_flight);
        let tx = self.tx.clone();

        in_flight.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", id))
            .spawn(move || {
                let started = Instant::now();
                let result = client.submit(&prepared);
                // The receiver only goes away when the dispatcher is dropped during shutdown.
                let _ = tx.send(CaptureOutcome {
                    id,
                    snapshot_sequence,
                    mode,
                    elapsed: started.elapsed(),
                    result,
                });
                // Only after the send, so a zero count means every outcome is queued.
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        if let Err(err) = spawned {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(CaptureError::upload(format!(
                "failed to start capture worker: {}",
                err
            )));
        }
        log::debug!(
            "capture #{} dispatched ({}, snapshot {})",
            id,
            mode,
            snapshot_sequence
        );
        Ok(id)
    }

    /// Outcomes that completed since the last call, without blocking.
    pub fn poll(&self) -> Vec<CaptureOutcome> {
        self.rx.try_iter().collect()
    }

    /// Block up to `timeout` for the next outcome.
    pub fn wait(&self, timeout: Duration) -> Option<CaptureOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CropSettings, EncodedImage};
    use crate::keypoint::{Hand, Keypoint, HAND_KEYPOINT_COUNT};
    use crate::region::RegionStrategy;
    use crate::upload::{LandmarkPayload, PredictionService};

    struct SlowService;

    impl PredictionService for SlowService {
        fn predict_image(&self, _image: &EncodedImage) -> Result<PredictionResult, CaptureError> {
            Err(CaptureError::upload("image mode not used"))
        }

        fn predict_landmarks(
            &self,
            _payload: &LandmarkPayload,
        ) -> Result<PredictionResult, CaptureError> {
            thread::sleep(Duration::from_millis(20));
            Ok(PredictionResult {
                predicted_class: "a".to_string(),
                confidence: None,
                image_url: None,
                filename: None,
            })
        }
    }

    fn one_hand_snapshot(sequence: u64) -> anyhow::Result<DetectionSnapshot> {
        let keypoints = (0..HAND_KEYPOINT_COUNT)
            .map(|i| Keypoint::new(10.0 + i as f32, 20.0 + i as f32))
            .collect();
        Ok(DetectionSnapshot::new(
            sequence,
            64,
            48,
            vec![Hand::new(keypoints)?],
            Vec::new(),
            2,
        ))
    }

    #[test]
    fn parses_policies() {
        assert_eq!(
            "at-most-one".parse::<InFlightPolicy>().unwrap(),
            InFlightPolicy::AtMostOne
        );
        assert_eq!(
            "Concurrent".parse::<InFlightPolicy>().unwrap(),
            InFlightPolicy::Concurrent
        );
        assert!("serial".parse::<InFlightPolicy>().is_err());
        assert_eq!(InFlightPolicy::AtMostOne.to_string(), "at-most-one");
    }

    #[test]
    fn outcomes_are_queued_before_in_flight_drops() -> anyhow::Result<()> {
        let client = Arc::new(CaptureClient::new(
            Arc::new(SlowService),
            RegionStrategy::default(),
            CropSettings::default(),
            SubmitMode::Landmarks,
        ));
        let mut dispatcher = CaptureDispatcher::new(client, InFlightPolicy::Concurrent);
        let frame = Frame::filled(64, 48, [0, 0, 0]);
        for sequence in 1..=3 {
            dispatcher.submit(&frame, &one_hand_snapshot(sequence)?)?;
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while dispatcher.in_flight() > 0 {
            assert!(Instant::now() < deadline, "captures never finished");
            thread::sleep(Duration::from_millis(1));
        }
        let mut sequences: Vec<u64> = dispatcher
            .poll()
            .iter()
            .map(|outcome| outcome.snapshot_sequence)
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, vec![1, 2, 3]);
        Ok(())
    }
}
