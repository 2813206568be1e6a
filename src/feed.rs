//! Latest-frame publication between the capture loop and observers.
//!
//! The capture loop is the only writer. Observers (HTTP handlers) read
//! snapshots or block until a newer frame is published. Session state itself
//! never leaves the capture loop; only copies of its report do.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::session::{FrameReport, SessionStats};

/// Point-in-time copy of the feed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FeedSnapshot {
    /// Number of frames published so far; 0 before the first frame.
    pub seq: u64,
    pub report: Option<FrameReport>,
    pub stats: SessionStats,
    #[serde(skip)]
    pub jpeg: Option<Arc<Vec<u8>>>,
}

#[derive(Default)]
struct FeedState {
    snapshot: FeedSnapshot,
    closed: bool,
}

/// Cloneable handle to the shared feed.
#[derive(Clone, Default)]
pub struct LiveFeed {
    inner: Arc<(Mutex<FeedState>, Condvar)>,
}

impl LiveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the outcome of one frame. Returns the new sequence number.
    pub fn publish(
        &self,
        report: FrameReport,
        stats: SessionStats,
        jpeg: Option<Vec<u8>>,
    ) -> Result<u64> {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().map_err(|_| anyhow!("feed lock poisoned"))?;
        state.snapshot.seq += 1;
        state.snapshot.report = Some(report);
        state.snapshot.stats = stats;
        state.snapshot.jpeg = jpeg.map(Arc::new);
        let seq = state.snapshot.seq;
        cvar.notify_all();
        Ok(seq)
    }

    /// Mark the feed finished; waiting observers wake up and see `None`.
    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut state) = lock.lock() {
            state.closed = true;
            cvar.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|state| state.closed).unwrap_or(true)
    }

    pub fn snapshot(&self) -> Result<FeedSnapshot> {
        let (lock, _) = &*self.inner;
        let state = lock.lock().map_err(|_| anyhow!("feed lock poisoned"))?;
        Ok(state.snapshot.clone())
    }

    /// Wait for a frame newer than `after_seq`.
    ///
    /// Returns `Ok(None)` on timeout or once the feed is closed.
    pub fn wait_for_frame(
        &self,
        after_seq: u64,
        timeout: Duration,
    ) -> Result<Option<FeedSnapshot>> {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut state = lock.lock().map_err(|_| anyhow!("feed lock poisoned"))?;
        loop {
            if state.snapshot.seq > after_seq {
                return Ok(Some(state.snapshot.clone()));
            }
            if state.closed {
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (next, _) = cvar
                .wait_timeout(state, deadline - now)
                .map_err(|_| anyhow!("feed lock poisoned"))?;
            state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::Stage;

    fn report(count: u32) -> FrameReport {
        FrameReport {
            stage: Stage::Up,
            count,
            angle: Some(12.0),
            elbow: None,
            rep_completed: true,
        }
    }

    #[test]
    fn snapshot_reflects_latest_publish() {
        let feed = LiveFeed::new();
        assert_eq!(feed.snapshot().unwrap().seq, 0);

        feed.publish(report(1), SessionStats::default(), None).unwrap();
        let seq = feed
            .publish(report(2), SessionStats::default(), Some(vec![0xff, 0xd8]))
            .unwrap();
        let snapshot = feed.snapshot().unwrap();
        assert_eq!(seq, 2);
        assert_eq!(snapshot.report.unwrap().count, 2);
        assert_eq!(snapshot.jpeg.unwrap().as_slice(), &[0xff, 0xd8]);
    }

    #[test]
    fn waiter_wakes_on_publish() {
        let feed = LiveFeed::new();
        let publisher = feed.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            publisher
                .publish(report(1), SessionStats::default(), None)
                .unwrap();
        });
        let snapshot = feed
            .wait_for_frame(0, Duration::from_secs(5))
            .unwrap()
            .expect("frame published");
        assert_eq!(snapshot.seq, 1);
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_and_close_releases() {
        let feed = LiveFeed::new();
        assert!(feed
            .wait_for_frame(0, Duration::from_millis(10))
            .unwrap()
            .is_none());
        feed.close();
        assert!(feed.is_closed());
        assert!(feed
            .wait_for_frame(0, Duration::from_secs(5))
            .unwrap()
            .is_none());
    }
}
