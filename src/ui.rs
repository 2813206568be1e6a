use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Instant;

use crate::session::{FrameReport, SessionStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Progress display for replaying a recorded session.
///
/// Pretty mode draws a bar with the running rep count on stderr; plain mode
/// prints one line per completed rep.
pub struct ReplayProgress {
    bar: Option<ProgressBar>,
    start: Instant,
}

impl ReplayProgress {
    pub fn new(mode: UiMode, is_tty: bool, total_frames: u64) -> Self {
        let use_pretty = match mode {
            UiMode::Pretty => true,
            UiMode::Auto => is_tty,
            UiMode::Plain => false,
        };
        let bar = use_pretty.then(|| {
            let bar = ProgressBar::new(total_frames);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} frames {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        Self {
            bar,
            start: Instant::now(),
        }
    }

    pub fn frame(&self, report: &FrameReport) {
        match &self.bar {
            Some(bar) => {
                bar.inc(1);
                bar.set_message(format!("reps={} stage={}", report.count, report.stage));
            }
            None => {
                if report.rep_completed {
                    eprintln!("==> rep {}", report.count);
                }
            }
        }
    }

    pub fn finish(self, stats: &SessionStats) {
        let message = format!(
            "✔ {} reps, stage {} ({} frames, {} skipped, {:.2}s)",
            stats.count,
            stats.stage,
            stats.frames_processed,
            stats.frames_skipped,
            self.start.elapsed().as_secs_f64()
        );
        match self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}
