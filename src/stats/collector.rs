//! Per-session statistics polling

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::events::{Event, EventBus};
use crate::peer::{PeerSession, SessionState};
use crate::stats::StatsSnapshot;

/// Drives the per-session stats timers
///
/// One polling task per enabled stream. Each tick queries the session's
/// capability, reduces the raw records into a [`StatsSnapshot`], derives
/// bitrate fields from the previous tick, and emits [`Event::Stats`].
pub struct StatsCollector {
    bus: EventBus,
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl StatsCollector {
    /// Create a collector publishing on the given bus
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start polling a session's stats
    ///
    /// Enabling a stream that already has an active timer replaces the
    /// existing one; two timers never run for the same stream.
    pub fn enable(&self, session: Arc<PeerSession>, poll_interval: Duration) {
        let stream_id = session.stream_id().to_string();
        let bus = self.bus.clone();
        let tasks = Arc::clone(&self.tasks);

        let task = tokio::spawn({
            let stream_id = stream_id.clone();
            async move {
                let mut ticker = interval(poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // interval fires immediately; swallow the zeroth tick so the
                // first snapshot lands one full period after enable.
                ticker.tick().await;

                let mut previous: Option<(StatsSnapshot, Instant)> = None;
                loop {
                    ticker.tick().await;
                    // A session closed outside the client's stop path still
                    // releases its timer.
                    if session.state() == SessionState::Closed {
                        debug!(stream_id = %stream_id, "session closed, releasing stats timer");
                        tasks
                            .lock()
                            .expect("stats collector lock poisoned")
                            .remove(&stream_id);
                        break;
                    }
                    let records = match session.query_stats().await {
                        Ok(records) => records,
                        Err(err) => {
                            debug!(stream_id = %stream_id, error = %err, "stats poll failed");
                            continue;
                        }
                    };

                    let now = Instant::now();
                    let mut snapshot = StatsSnapshot::reduce(&records);
                    if let Some((prior, at)) = &previous {
                        snapshot.compute_rates(prior, now.duration_since(*at));
                    }
                    previous = Some((snapshot.clone(), now));

                    bus.emit(Event::Stats {
                        stream_id: stream_id.clone(),
                        snapshot,
                    });
                }
            }
        });

        let mut tasks = self.tasks.lock().expect("stats collector lock poisoned");
        if let Some(old) = tasks.insert(stream_id, task) {
            old.abort();
        }
    }

    /// Stop polling a stream; a stream with no active timer is a no-op
    pub fn disable(&self, stream_id: &str) {
        let mut tasks = self.tasks.lock().expect("stats collector lock poisoned");
        if let Some(task) = tasks.remove(stream_id) {
            task.abort();
        }
    }

    /// Whether a timer is active for the stream
    pub fn is_enabled(&self, stream_id: &str) -> bool {
        self.tasks
            .lock()
            .expect("stats collector lock poisoned")
            .contains_key(stream_id)
    }

    /// Stop every active timer
    pub fn disable_all(&self) {
        let mut tasks = self.tasks.lock().expect("stats collector lock poisoned");
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

impl Drop for StatsCollector {
    fn drop(&mut self) {
        self.disable_all();
    }
}
