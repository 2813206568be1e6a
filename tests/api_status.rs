use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use curl_counter::api::{ApiConfig, ApiServer};
use curl_counter::{landmarks_for_angle, Arm, LiveFeed, PoseDetection, Session, SessionConfig};

fn spawn(video_enabled: bool) -> (curl_counter::api::ApiHandle, LiveFeed) {
    let feed = LiveFeed::new();
    let handle = ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            video_enabled,
        },
        feed.clone(),
    )
    .spawn()
    .expect("spawn api");
    (handle, feed)
}

fn request(addr: SocketAddr, method: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    write!(stream, "{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read");
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[test]
fn health_and_index_are_served() {
    let (handle, _feed) = spawn(true);
    let (status, body) = request(handle.addr, "GET", "/health");
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"status":"ok"}"#);

    let (status, body) = request(handle.addr, "GET", "/");
    assert_eq!(status, 200);
    assert!(body.contains("/video_feed"));
    handle.stop().unwrap();
}

#[test]
fn status_reflects_published_frames() {
    let (handle, feed) = spawn(true);

    let (status, body) = request(handle.addr, "GET", "/status");
    assert_eq!(status, 200);
    let initial: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(initial["seq"], 0);
    assert_eq!(initial["count"], 0);
    assert_eq!(initial["stage"], "unknown");
    assert!(initial["angle"].is_null());

    let mut session = Session::new(SessionConfig::default()).unwrap();
    for angle in [170.0, 10.0] {
        let detection = PoseDetection::Detected(landmarks_for_angle(Arm::Left, angle));
        let report = session.process(&detection);
        feed.publish(report, session.stats(), None).unwrap();
    }

    let (status, body) = request(handle.addr, "GET", "/status?verbose=1");
    assert_eq!(status, 200);
    let latest: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(latest["seq"], 2);
    assert_eq!(latest["count"], 1);
    assert_eq!(latest["stage"], "up");
    assert!((latest["angle"].as_f64().unwrap() - 10.0).abs() < 1e-3);
    assert_eq!(latest["frames_processed"], 2);
    handle.stop().unwrap();
}

#[test]
fn unknown_routes_and_methods_are_rejected() {
    let (handle, _feed) = spawn(true);
    assert_eq!(request(handle.addr, "GET", "/events").0, 404);
    assert_eq!(request(handle.addr, "POST", "/status").0, 405);
    handle.stop().unwrap();
}

#[test]
fn video_feed_is_unavailable_when_disabled() {
    let (handle, _feed) = spawn(false);
    let (status, body) = request(handle.addr, "GET", "/video_feed");
    assert_eq!(status, 503);
    assert!(body.contains("video_disabled"));
    handle.stop().unwrap();
}

#[test]
fn video_feed_streams_published_jpeg_parts() {
    let (handle, feed) = spawn(true);
    let mut stream = TcpStream::connect(handle.addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    write!(stream, "GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n").expect("write");

    let mut session = Session::new(SessionConfig::default()).unwrap();
    let report = session.process(&PoseDetection::NotDetected);
    // Publish until the client has subscribed and received a part.
    let payload = vec![0xff, 0xd8, 0xff, 0xd9];
    let mut received = Vec::new();
    let mut buf = [0u8; 512];
    for _ in 0..50 {
        feed.publish(report, session.stats(), Some(payload.clone())).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        stream.set_nonblocking(true).expect("nonblocking");
        if let Ok(n) = stream.read(&mut buf) {
            received.extend_from_slice(&buf[..n]);
        }
        if String::from_utf8_lossy(&received).contains("Content-Type: image/jpeg") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&received);
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(text.contains("--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4"));

    drop(stream);
    feed.close();
    handle.stop().unwrap();
}
