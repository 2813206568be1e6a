//! curld - live bicep-curl counter daemon
//!
//! This daemon:
//! 1. Pulls frames from the configured camera source
//! 2. Runs the selected pose backend on each frame
//! 3. Updates the rep counter and annotates the frame
//! 4. Publishes status and MJPEG frames on the local HTTP API

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use curl_counter::api::{ApiConfig, ApiServer};
use curl_counter::config::CounterConfig;
#[cfg(feature = "stream-mjpeg")]
use curl_counter::render;
use curl_counter::{
    BackendRegistry, CameraConfig, CameraSource, Frame, FrameReport, LiveFeed, PoseDetection,
    ScriptedBackend, Session,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or .json). Overrides CURL_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Camera url (stub://name or a V4L2 device path).
    #[arg(long)]
    source: Option<String>,
    /// HTTP API listen address.
    #[arg(long)]
    api_addr: Option<String>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Disable the MJPEG video route and skip JPEG encoding.
    #[arg(long)]
    no_video: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => CounterConfig::load_from(path)?,
        None => CounterConfig::load()?,
    };
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(addr) = args.api_addr {
        cfg.api_addr = addr;
    }
    if args.no_video {
        cfg.stream.enabled = false;
    }
    cfg.validate()?;

    let mut registry = build_registry(&cfg)?;
    registry.warm_up_all()?;
    log::info!(
        "pose backend={} available={:?}",
        registry.default_name().unwrap_or("none"),
        registry.list()
    );

    let mut source = CameraSource::new(CameraConfig {
        url: cfg.source.url.clone(),
        target_fps: cfg.source.target_fps,
        width: cfg.source.width,
        height: cfg.source.height,
    })?;
    source.connect()?;

    let feed = LiveFeed::new();
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
            video_enabled: cfg.stream.enabled,
        },
        feed.clone(),
    )
    .spawn()?;
    log::info!("counter api listening on {}", api_handle.addr);

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let encoder = if cfg.stream.enabled {
        Some(StreamEncoder::new(cfg.stream.jpeg_quality)?)
    } else {
        None
    };

    let mut session = Session::new(cfg.session_config())?;
    let frame_interval = Duration::from_secs_f64(1.0 / cfg.source.target_fps as f64);
    let mut last_health_log = Instant::now();
    let mut frames = 0u64;

    log::info!(
        "curld running. arm={} source={} thresholds={}/{}",
        session.config().arm.as_str(),
        cfg.source.url,
        session.config().thresholds.down_above,
        session.config().thresholds.up_below
    );

    while running.load(Ordering::SeqCst) {
        if args.max_frames.is_some_and(|max| frames >= max) {
            log::info!("frame limit reached");
            break;
        }
        let started = Instant::now();

        let mut frame = source.next_frame()?;
        frames += 1;

        let detection = match registry.detect(&frame) {
            Ok(detection) => detection,
            Err(e) => {
                log::warn!("pose detection failed on frame {}: {}", frame.index, e);
                PoseDetection::NotDetected
            }
        };
        let report = session.process(&detection);

        let jpeg = encoder
            .as_ref()
            .and_then(|encoder| encoder.encode(&mut frame, &report, &detection));
        feed.publish(report, session.stats(), jpeg)?;

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            let counts = session.stats();
            log::info!(
                "source health={} frames={} url={} reps={} stage={} skipped={}",
                source.is_healthy(),
                stats.frames_captured,
                stats.url,
                counts.count,
                counts.stage,
                counts.frames_skipped
            );
            last_health_log = Instant::now();
        }

        if let Some(remaining) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    log::info!("shutting down, stopping API server...");
    feed.close();
    api_handle.stop()?;

    let stats = session.stats();
    log::info!(
        "session finished: reps={} stage={} frames={} skipped={}",
        stats.count,
        stats.stage,
        stats.frames_processed,
        stats.frames_skipped
    );
    Ok(())
}

fn build_registry(cfg: &CounterConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(ScriptedBackend::curl_cycle().with_arm(cfg.counter.arm));

    #[cfg(feature = "backend-tract")]
    if let Some(path) = &cfg.backend.model_path {
        let backend = curl_counter::TractBackend::new(
            path,
            cfg.backend.model_width,
            cfg.backend.model_height,
        )?
        .with_threshold(cfg.backend.score_threshold)
        .with_arm(cfg.counter.arm);
        registry.register(backend);
    }
    #[cfg(not(feature = "backend-tract"))]
    if cfg.backend.model_path.is_some() {
        log::warn!("backend.model_path set but built without backend-tract; ignoring");
    }

    registry.set_default(&cfg.backend.name)?;
    Ok(registry)
}

/// Annotates frames and encodes them for `/video_feed`.
#[cfg(feature = "stream-mjpeg")]
struct StreamEncoder {
    overlay: render::Overlay,
    quality: u8,
}

#[cfg(feature = "stream-mjpeg")]
impl StreamEncoder {
    fn new(quality: u8) -> Result<Self> {
        Ok(Self {
            overlay: render::Overlay::new()?,
            quality,
        })
    }

    fn encode(
        &self,
        frame: &mut Frame,
        report: &FrameReport,
        detection: &PoseDetection,
    ) -> Option<Vec<u8>> {
        if let Err(e) = self.overlay.annotate(frame, report, detection.landmarks()) {
            log::warn!("overlay failed on frame {}: {}", frame.index, e);
        }
        match render::encode_jpeg(frame, self.quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                log::warn!("jpeg encode failed on frame {}: {}", frame.index, e);
                None
            }
        }
    }
}

#[cfg(not(feature = "stream-mjpeg"))]
struct StreamEncoder;

#[cfg(not(feature = "stream-mjpeg"))]
impl StreamEncoder {
    fn new(_quality: u8) -> Result<Self> {
        log::warn!("built without stream-mjpeg; /video_feed will not carry frames");
        Ok(Self)
    }

    fn encode(
        &self,
        _frame: &mut Frame,
        _report: &FrameReport,
        _detection: &PoseDetection,
    ) -> Option<Vec<u8>> {
        None
    }
}
