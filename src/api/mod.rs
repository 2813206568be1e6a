//! Local HTTP surface for the live counter.
//!
//! - `GET /` small viewer page
//! - `GET /health`
//! - `GET /status` latest count, stage and angle as JSON
//! - `GET /video_feed` annotated frames as `multipart/x-mixed-replace` JPEG
//!
//! The server only reads from a [`LiveFeed`]; it never touches session state.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::angle::Point2D;
use crate::counter::Stage;
use crate::feed::{FeedSnapshot, LiveFeed};

const MAX_REQUEST_BYTES: usize = 8192;
const STREAM_BOUNDARY: &str = "frame";
const STREAM_WAIT: Duration = Duration::from_secs(1);

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><title>curl counter</title></head>
<body>
<h1>Bicep curl counter</h1>
<img src="/video_feed" alt="live feed">
<pre id="status"></pre>
<script>
setInterval(async () => {
  const r = await fetch('/status');
  document.getElementById('status').textContent = JSON.stringify(await r.json(), null, 2);
}, 500);
</script>
</body>
</html>
"#;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Serve `/video_feed`. When false the route answers 503.
    pub video_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8790".to_string(),
            video_enabled: true,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
struct StatusBody {
    seq: u64,
    stage: Stage,
    count: u32,
    angle: Option<f64>,
    elbow: Option<Point2D>,
    frames_processed: u64,
    frames_skipped: u64,
}

impl From<&FeedSnapshot> for StatusBody {
    fn from(snapshot: &FeedSnapshot) -> Self {
        Self {
            seq: snapshot.seq,
            stage: snapshot.stats.stage,
            count: snapshot.stats.count,
            angle: snapshot.report.and_then(|r| r.angle),
            elbow: snapshot.report.and_then(|r| r.elbow),
            frames_processed: snapshot.stats.frames_processed,
            frames_skipped: snapshot.stats.frames_skipped,
        }
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    feed: LiveFeed,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, feed: LiveFeed) -> Self {
        Self { cfg, feed }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let feed = self.feed;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, feed, shutdown_thread) {
                log::error!("api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    feed: LiveFeed,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &cfg, &feed, &shutdown) {
                    log::warn!("api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    feed: &LiveFeed,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/" => write_response(&mut stream, 200, "text/html; charset=utf-8", INDEX_HTML.as_bytes()),
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/status" => {
            let snapshot = feed.snapshot()?;
            let payload = serde_json::to_vec(&StatusBody::from(&snapshot))?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/video_feed" => {
            if !cfg.video_enabled {
                return write_json_response(&mut stream, 503, r#"{"error":"video_disabled"}"#);
            }
            let feed = feed.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                let peer = stream.peer_addr().ok();
                if let Err(err) = stream_frames(stream, &feed, &shutdown) {
                    log::debug!("video stream to {:?} ended: {}", peer, err);
                }
            });
            Ok(())
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

/// Push every newly published JPEG to one client until it disconnects, the
/// feed closes or the server shuts down.
fn stream_frames(mut stream: TcpStream, feed: &LiveFeed, shutdown: &AtomicBool) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let mut last_seq = 0;
    while !shutdown.load(Ordering::SeqCst) {
        let jpeg = match feed.wait_for_frame(last_seq, STREAM_WAIT)? {
            Some(snapshot) => {
                last_seq = snapshot.seq;
                snapshot.jpeg
            }
            None if feed.is_closed() => break,
            None => None,
        };
        match jpeg {
            Some(jpeg) => write_part(&mut stream, &jpeg)?,
            // Nothing written this round, so a dropped client would go unnoticed.
            None if peer_closed(&stream)? => break,
            None => {}
        }
    }
    Ok(())
}

/// True once the client has hung up. Clients send nothing after the request,
/// so any readable EOF or reset means the connection is gone.
fn peer_closed(stream: &TcpStream) -> Result<bool> {
    stream.set_nonblocking(true)?;
    let mut probe = [0u8; 1];
    let closed = match stream.peek(&mut probe) {
        Ok(0) => true,
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => false,
        Err(_) => true,
    };
    stream.set_nonblocking(false)?;
    Ok(closed)
}

fn write_part(stream: &mut TcpStream, jpeg: &[u8]) -> Result<()> {
    let part_header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        STREAM_BOUNDARY,
        jpeg.len()
    );
    stream.write_all(part_header.as_bytes())?;
    stream.write_all(jpeg)?;
    stream.write_all(b"\r\n")?;
    stream.flush()?;
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn peer_closed_tracks_client_hangup() {
        let (server, client) = connected_pair();
        assert!(!peer_closed(&server).unwrap());
        drop(client);
        std::thread::sleep(Duration::from_millis(100));
        assert!(peer_closed(&server).unwrap());
    }

    #[test]
    fn stream_ends_when_client_leaves_without_jpeg_frames() {
        let (server, mut client) = connected_pair();
        let feed = LiveFeed::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let (tx, rx) = mpsc::channel();
        let thread_feed = feed.clone();
        let thread_shutdown = shutdown.clone();
        std::thread::spawn(move || {
            let result = stream_frames(server, &thread_feed, &thread_shutdown);
            let _ = tx.send(result.is_ok());
        });

        let mut header = [0u8; 64];
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let n = client.read(&mut header).unwrap();
        assert!(n > 0);
        drop(client);

        // Frames keep arriving, but none carry a JPEG.
        for _ in 0..5 {
            feed.publish(
                crate::session::FrameReport {
                    stage: Stage::Unknown,
                    count: 0,
                    angle: None,
                    elbow: None,
                    rep_completed: false,
                },
                Default::default(),
                None,
            )
            .unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }

        let finished = rx.recv_timeout(Duration::from_secs(5));
        assert_eq!(finished, Ok(true));
        assert!(!shutdown.load(Ordering::SeqCst));
    }
}
