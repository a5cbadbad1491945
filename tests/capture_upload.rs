//! Capture → upload → display, against a loopback stub of the prediction service.
//!
//! These tests verify that:
//! 1. Image mode crops, pads and posts a multipart JPEG to /predict
//! 2. Landmark mode posts normalized keypoints to /predict_json
//! 3. Failed detections are rejected before any network call
//! 4. Non-success statuses surface as upload errors in the display
//! 5. The in-flight policy is honored by the dispatcher

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sign_capture::capture::EncodedImage;
use sign_capture::keypoint::HAND_KEYPOINT_COUNT;
use sign_capture::upload::{LandmarkPayload, IMAGE_FIELD};
use sign_capture::{
    CaptureClient, CaptureDispatcher, CaptureError, CropSettings, DetectionSnapshot,
    DisplayState, Frame, Hand, HttpPredictionClient, InFlightPolicy, Keypoint, Pose,
    PredictionResult, PredictionService, RegionStrategy, SubmitMode,
};

const FRAME_W: u32 = 960;
const FRAME_H: u32 = 680;

// ----------------------------------------------------------------------------
// Stub prediction service
// ----------------------------------------------------------------------------

struct Recorded {
    method: String,
    path: String,
    content_type: String,
    body: Vec<u8>,
}

/// Answer one request per entry in `responses`, in order, then stop.
fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    let handle = thread::spawn(move || {
        let mut recorded = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            recorded.push(read_request(&mut stream));
            let reason = if status == 200 { "OK" } else { "Error" };
            write!(
                stream,
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            )
            .expect("write response");
        }
        recorded
    });
    (base, handle)
}

fn read_request(stream: &mut TcpStream) -> Recorded {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    reader.read_line(&mut request_line).expect("request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut content_type = String::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("header line");
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            match key.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().expect("length"),
                "content-type" => content_type = value.trim().to_string(),
                _ => {}
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).expect("body");
    Recorded {
        method,
        path,
        content_type,
        body,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

fn hand_spanning(x0: f32, y0: f32, x1: f32, y1: f32) -> Hand {
    let mut points = vec![Keypoint::new((x0 + x1) / 2.0, (y0 + y1) / 2.0); HAND_KEYPOINT_COUNT];
    points[0] = Keypoint::new(x0, y0).with_z(-0.5);
    points[HAND_KEYPOINT_COUNT - 1] = Keypoint::new(x1, y1);
    Hand::new(points).expect("21 keypoints")
}

fn hand_snapshot(sequence: u64) -> DetectionSnapshot {
    DetectionSnapshot::new(
        sequence,
        FRAME_W,
        FRAME_H,
        vec![hand_spanning(100.0, 50.0, 200.0, 150.0)],
        vec![Pose::new(vec![
            Keypoint::new(480.0, 340.0).with_score(0.9),
            Keypoint::new(960.0, 680.0).with_score(0.2),
        ])],
        2,
    )
}

fn client_for(service: Arc<dyn PredictionService>, mode: SubmitMode) -> CaptureClient {
    CaptureClient::new(
        service,
        RegionStrategy::default(),
        CropSettings::default(),
        mode,
    )
}

fn http_service(base: &str) -> Arc<dyn PredictionService> {
    Arc::new(HttpPredictionClient::new(base, Duration::from_secs(5)).expect("client"))
}

/// Counts calls and blocks each one until released through the returned sender.
struct GatedService {
    calls: AtomicUsize,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl GatedService {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let service = Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Mutex::new(rx),
        });
        (service, tx)
    }

    fn answer(&self, class: &str) -> Result<PredictionResult, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .gate
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5));
        Ok(PredictionResult {
            predicted_class: class.to_string(),
            confidence: Some(0.5),
            image_url: None,
            filename: None,
        })
    }
}

impl PredictionService for GatedService {
    fn predict_image(&self, _image: &EncodedImage) -> Result<PredictionResult, CaptureError> {
        self.answer("image")
    }

    fn predict_landmarks(
        &self,
        _payload: &LandmarkPayload,
    ) -> Result<PredictionResult, CaptureError> {
        self.answer("landmarks")
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[test]
fn image_capture_posts_multipart_jpeg() {
    let (base, server) = serve(vec![(
        200,
        r#"{"filename":"hand.jpg","predicted_class":"A","confidence":0.93,"image_url":"/img/a.jpg"}"#,
    )]);
    let client = client_for(http_service(&base), SubmitMode::Image);
    let frame = Frame::filled(FRAME_W, FRAME_H, [30, 60, 90]);

    let result = client
        .capture(&frame, &hand_snapshot(1))
        .expect("prediction");
    let mut display = DisplayState::new();
    display.apply_prediction_at(&result, SubmitMode::Image, 1_700_000_000_000);

    assert_eq!(display.label(), Some("A"));
    assert_eq!(display.image_src(), Some("/img/a.jpg?t=1700000000000"));
    assert_eq!(display.error(), None);

    let requests = server.join().expect("stub server");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/predict");
    assert!(request.content_type.starts_with("multipart/form-data; boundary="));
    let disposition = format!(
        "Content-Disposition: form-data; name=\"{}\"; filename=\"hand.jpg\"",
        IMAGE_FIELD
    );
    assert!(contains(&request.body, disposition.as_bytes()));
    assert!(contains(&request.body, b"Content-Type: image/jpeg"));
    assert!(contains(&request.body, &[0xFF, 0xD8]));
}

#[test]
fn encoded_crop_has_padding_bands() {
    let (service, _gate) = GatedService::new();
    let client = client_for(service.clone(), SubmitMode::Image);
    let frame = Frame::filled(FRAME_W, FRAME_H, [30, 60, 90]);

    let hands_only = DetectionSnapshot::new(
        1,
        FRAME_W,
        FRAME_H,
        vec![hand_spanning(100.0, 50.0, 200.0, 150.0)],
        Vec::new(),
        2,
    );
    // A confident pose point at (480, 340) widens the box to x in [0, 580], y in [0, 440].
    for (snapshot, expected) in [
        (hands_only, (300, 250 + 2 * 100)),
        (hand_snapshot(2), (580, 440 + 2 * 100)),
    ] {
        let prepared = client.prepare(&frame, &snapshot).expect("prepared capture");
        match prepared {
            sign_capture::capture::PreparedCapture::Image(image) => {
                assert_eq!((image.width, image.height), expected);
                assert_eq!(image.filename, "hand.jpg");
                assert_eq!(image.content_type, "image/jpeg");
            }
            other => panic!("expected an image capture, got {:?}", other.mode()),
        }
    }
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn landmark_capture_posts_normalized_json() {
    let (base, server) = serve(vec![(200, r#"{"predicted_class":"B","confidence":0.87}"#)]);
    let client = client_for(http_service(&base), SubmitMode::Landmarks);
    let frame = Frame::filled(FRAME_W, FRAME_H, [0, 0, 0]);

    let result = client
        .capture(&frame, &hand_snapshot(7))
        .expect("prediction");
    let mut display = DisplayState::new();
    display.apply_prediction(&result, SubmitMode::Landmarks);
    assert_eq!(display.label(), Some("B (0.87)"));
    assert_eq!(display.image_src(), None);

    let requests = server.join().expect("stub server");
    let request = &requests[0];
    assert_eq!(request.path, "/predict_json");
    assert_eq!(request.content_type, "application/json");

    let payload: LandmarkPayload = serde_json::from_slice(&request.body).expect("json body");
    assert_eq!(payload.hands.len(), HAND_KEYPOINT_COUNT);
    assert_eq!(payload.pose.len(), 2);
    for point in payload.hands.iter().chain(payload.pose.iter()) {
        assert!((0.0..=1.0).contains(&point.x), "{:?}", point);
        assert!((0.0..=1.0).contains(&point.y), "{:?}", point);
    }
    assert_eq!(payload.hands[0].z, -0.5);
    assert_eq!(payload.hands[1].z, 0.0);
    assert!(payload.pose.iter().all(|point| point.z == 0.0));
}

#[test]
fn empty_snapshot_is_rejected_before_network() {
    let (service, _gate) = GatedService::new();
    let frame = Frame::filled(FRAME_W, FRAME_H, [0, 0, 0]);
    let faint_pose = Pose::new(vec![Keypoint::new(10.0, 10.0).with_score(0.3)]);
    let snapshot = DetectionSnapshot::new(1, FRAME_W, FRAME_H, Vec::new(), vec![faint_pose], 2);

    let image_client = client_for(service.clone(), SubmitMode::Image);
    assert!(matches!(
        image_client.capture(&frame, &snapshot),
        Err(CaptureError::NoDetection)
    ));

    let landmark_client = client_for(service.clone(), SubmitMode::Landmarks);
    assert!(matches!(
        landmark_client.capture(&frame, &DetectionSnapshot::empty(2, FRAME_W, FRAME_H)),
        Err(CaptureError::NoDetection)
    ));

    let mut dispatcher = CaptureDispatcher::new(Arc::new(image_client), InFlightPolicy::Concurrent);
    assert!(matches!(
        dispatcher.submit(&frame, &snapshot),
        Err(CaptureError::NoDetection)
    ));
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn error_status_is_shown_instead_of_result() {
    let (base, server) = serve(vec![(500, r#"{"detail":"model not loaded"}"#)]);
    let client = client_for(http_service(&base), SubmitMode::Image);
    let frame = Frame::filled(FRAME_W, FRAME_H, [0, 0, 0]);

    let mut display = DisplayState::new();
    display.apply_prediction_at(
        &PredictionResult {
            predicted_class: "old".to_string(),
            confidence: None,
            image_url: Some("/img/old.jpg".to_string()),
            filename: None,
        },
        SubmitMode::Image,
        1,
    );

    let err = client
        .capture(&frame, &hand_snapshot(1))
        .expect_err("server error");
    match &err {
        CaptureError::Upload { status, message } => {
            assert_eq!(*status, Some(500));
            assert!(message.contains("model not loaded"), "{}", message);
        }
        other => panic!("expected upload error, got {}", other),
    }
    assert!(err.is_recoverable());

    display.apply_error(&err);
    assert_eq!(display.label(), None);
    assert_eq!(display.image_src(), None);
    assert!(display.error().unwrap().starts_with("Error: "));
    server.join().expect("stub server");
}

#[test]
fn unreachable_service_is_an_upload_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let client = client_for(http_service(&base), SubmitMode::Landmarks);
    let frame = Frame::filled(FRAME_W, FRAME_H, [0, 0, 0]);
    assert!(matches!(
        client.capture(&frame, &hand_snapshot(1)),
        Err(CaptureError::Upload { status: None, .. })
    ));
}

#[test]
fn at_most_one_rejects_while_in_flight() {
    let (service, release) = GatedService::new();
    let client = Arc::new(client_for(service.clone(), SubmitMode::Landmarks));
    let mut dispatcher = CaptureDispatcher::new(client, InFlightPolicy::AtMostOne);
    let frame = Frame::filled(FRAME_W, FRAME_H, [0, 0, 0]);

    let first = dispatcher.submit(&frame, &hand_snapshot(1)).expect("first");
    assert!(matches!(
        dispatcher.submit(&frame, &hand_snapshot(2)),
        Err(CaptureError::CaptureBusy)
    ));

    release.send(()).expect("release");
    let outcome = dispatcher
        .wait(Duration::from_secs(5))
        .expect("first outcome");
    assert_eq!(outcome.id, first);
    assert_eq!(outcome.snapshot_sequence, 1);
    assert_eq!(outcome.mode, SubmitMode::Landmarks);
    assert_eq!(
        outcome.result.expect("prediction").predicted_class,
        "landmarks"
    );
    assert_eq!(dispatcher.in_flight(), 0);

    let second = dispatcher.submit(&frame, &hand_snapshot(3)).expect("second");
    assert!(second > first);
    release.send(()).expect("release");
    assert!(dispatcher.wait(Duration::from_secs(5)).is_some());
}

#[test]
fn concurrent_policy_allows_overlapping_requests() {
    let (service, release) = GatedService::new();
    let client = Arc::new(client_for(service.clone(), SubmitMode::Image));
    let mut dispatcher = CaptureDispatcher::new(client, InFlightPolicy::Concurrent);
    let frame = Frame::filled(FRAME_W, FRAME_H, [0, 0, 0]);

    let a = dispatcher.submit(&frame, &hand_snapshot(1)).expect("a");
    let b = dispatcher.submit(&frame, &hand_snapshot(2)).expect("b");
    assert_ne!(a, b);
    assert!(dispatcher.in_flight() >= 1);

    release.send(()).expect("release");
    release.send(()).expect("release");
    let mut ids: Vec<u64> = (0..2)
        .filter_map(|_| dispatcher.wait(Duration::from_secs(5)))
        .map(|outcome| outcome.id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    assert!(dispatcher.poll().is_empty());
}
