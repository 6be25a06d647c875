use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hallway_detector::config::Thresholds;
use hallway_detector::detect::backends::stub::person_row;
use hallway_detector::{
    ApiConfig, ApiHandle, ApiServer, Notification, NotificationSink, Notifier, Pipeline,
    PredictionGrid, StubBackend,
};

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

struct TestApi {
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(pipeline: Pipeline) -> Result<Self> {
        Self::with_config(pipeline, ApiConfig::default())
    }

    fn with_config(pipeline: Pipeline, api_config: ApiConfig) -> Result<Self> {
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            ..api_config
        };
        let api_handle = ApiServer::new(api_config, Arc::new(pipeline)).spawn()?;
        Ok(Self {
            api_handle: Some(api_handle),
        })
    }

    fn two_people_pipeline(notifier: Notifier) -> Result<Pipeline> {
        let grid = PredictionGrid::from_rows(&[
            person_row(0.25, 0.5, 0.2, 0.5, 0.9),
            person_row(0.75, 0.5, 0.2, 0.5, 0.9),
        ])?;
        Ok(Pipeline::new(
            Some(Arc::new(StubBackend::new(vec![grid]))),
            Thresholds::default(),
            0,
            notifier,
        ))
    }

    fn with_two_people() -> Result<Self> {
        Self::new(Self::two_people_pipeline(Notifier::disabled())?)
    }

    fn addr(&self) -> std::net::SocketAddr {
        self.api_handle.as_ref().expect("api running").addr
    }

    fn request(&self, method: &str, path: &str, body: Option<&str>) -> Result<(u16, Value)> {
        let mut stream = TcpStream::connect(self.addr())?;
        let body = body.unwrap_or("");
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
            method = method,
            path = path,
            len = body.len(),
            body = body
        );
        stream.write_all(request.as_bytes())?;
        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        let mut parts = response.splitn(2, "\r\n\r\n");
        let headers = parts.next().unwrap_or("");
        let status = headers
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        let body = parts.next().unwrap_or("");
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body)?
        };
        Ok((status, value))
    }

    fn analyze(&self, payload: &Value) -> Result<(u16, Value)> {
        self.request("POST", "/api/detection/analyze", Some(&payload.to_string()))
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            let _ = handle.stop();
        }
    }
}

fn encoded_two_tone_png() -> String {
    let mut image = RgbImage::new(200, 100);
    for (x, _, px) in image.enumerate_pixels_mut() {
        *px = if x < 100 {
            Rgb([10, 20, 230])
        } else {
            Rgb([20, 200, 30])
        };
    }
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    STANDARD.encode(bytes)
}

#[test]
fn analyze_returns_detections() -> Result<()> {
    let api = TestApi::with_two_people()?;
    let (status, body) = api.analyze(&json!({ "image": encoded_two_tone_png() }))?;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["total_persons"], 2);
    let detections = body["data"]["detections"].as_array().expect("detections");
    assert_eq!(detections[0]["box"], json!([30, 25, 40, 50]));
    assert_eq!(detections[0]["color"], "blue");
    assert_eq!(detections[1]["box"], json!([130, 25, 40, 50]));
    assert_eq!(detections[1]["color"], "green");
    let confidence = detections[0]["confidence"].as_f64().expect("confidence");
    assert!((confidence - 0.9).abs() < 1e-6);
    Ok(())
}

#[test]
fn invalid_image_data_is_a_client_error() -> Result<()> {
    let api = TestApi::with_two_people()?;

    let (status, body) = api.analyze(&json!({ "image": STANDARD.encode(b"not an image") }))?;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Invalid image data");

    let (status, _) = api.analyze(&json!({ "image": "%%%" }))?;
    assert_eq!(status, 400);

    let (status, _) = api.analyze(&json!({ "metadata": {} }))?;
    assert_eq!(status, 400);

    let (status, _) = api.request("POST", "/api/detection/analyze", Some("{not json"))?;
    assert_eq!(status, 400);
    Ok(())
}

#[test]
fn degraded_service_reports_no_detections() -> Result<()> {
    let api = TestApi::new(Pipeline::new(
        None,
        Thresholds::default(),
        0,
        Notifier::disabled(),
    ))?;
    let (status, body) = api.analyze(&json!({ "image": encoded_two_tone_png() }))?;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total_persons"], 0);
    assert_eq!(body["data"]["detections"], json!([]));

    let (_, info) = api.request("GET", "/info", None)?;
    assert_eq!(info["status"], "Degraded");
    Ok(())
}

#[test]
fn sessions_scope_dedup_and_can_be_ended() -> Result<()> {
    let sink = Arc::new(RecordingSink::default());
    let api = TestApi::new(TestApi::two_people_pipeline(Notifier::inline(sink.clone()))?)?;
    let image = encoded_two_tone_png();
    let in_session = json!({ "image": image, "metadata": { "session_id": "hallway-1" } });
    let no_session = json!({ "image": image });

    // Same session: the second call sees the same two people.
    for _ in 0..2 {
        let (status, body) = api.analyze(&in_session)?;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["total_persons"], 2);
    }
    assert_eq!(sink.count(), 2);

    // Without a session id every call starts from an empty tracker.
    for _ in 0..2 {
        let (status, _) = api.analyze(&no_session)?;
        assert_eq!(status, 200);
    }
    assert_eq!(sink.count(), 6);

    let (status, _) = api.request("DELETE", "/api/detection/sessions/hallway-1", None)?;
    assert_eq!(status, 204);
    let (status, body) = api.request("DELETE", "/api/detection/sessions/hallway-1", None)?;
    assert_eq!(status, 404);
    assert_eq!(body["status"], "error");

    // An ended session starts over.
    let (status, _) = api.analyze(&in_session)?;
    assert_eq!(status, 200);
    assert_eq!(sink.count(), 8);
    Ok(())
}

#[test]
fn saturated_server_answers_busy() -> Result<()> {
    let api = TestApi::with_config(
        TestApi::two_people_pipeline(Notifier::disabled())?,
        ApiConfig {
            max_connections: 1,
            ..ApiConfig::default()
        },
    )?;

    // Hold the only slot with a connection that never finishes its request.
    let mut idle = TcpStream::connect(api.addr())?;
    idle.write_all(b"GET /health HTTP/1.1\r\n")?;
    std::thread::sleep(Duration::from_millis(300));

    let (status, body) = api.request("GET", "/health", None)?;
    assert_eq!(status, 503);
    assert_eq!(body["status"], "error");

    // Finishing the first request frees the slot.
    idle.write_all(b"\r\n")?;
    let mut response = String::new();
    idle.read_to_string(&mut response)?;
    assert!(response.starts_with("HTTP/1.1 200"));
    drop(idle);
    std::thread::sleep(Duration::from_millis(100));

    let (status, _) = api.request("GET", "/health", None)?;
    assert_eq!(status, 200);
    Ok(())
}

#[test]
fn service_endpoints_and_routing() -> Result<()> {
    let api = TestApi::with_two_people()?;

    let (status, body) = api.request("GET", "/health", None)?;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "UP" }));

    let (status, body) = api.request("GET", "/info", None)?;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "Running");
    assert_eq!(body["backend"], "stub");

    let (status, body) = api.request("GET", "/", None)?;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Hallway Detection Service is running");

    let (status, _) = api.request("GET", "/api/detection/analyze", None)?;
    assert_eq!(status, 405);
    let (status, _) = api.request("GET", "/missing", None)?;
    assert_eq!(status, 404);
    Ok(())
}
