//! Change detection for streaming consumers.
//!
//! A `ChangeFeed` remembers the newest timestamp it has emitted and only
//! yields a snapshot when the store holds something newer.

use futures_core::Stream;
use std::sync::Arc;
use std::time::Duration;

use crate::store::{Snapshot, TimeSeriesStore};

/// Default polling period of the event stream.
pub const FEED_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Watermark-based change detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeFeed {
    watermark: f64,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watermark(&self) -> f64 {
        self.watermark
    }

    /// Returns the snapshot if any series has a point newer than the
    /// watermark, advancing the watermark to that point.
    pub fn poll(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        let newest = newest_timestamp(&snapshot)?;
        if newest > self.watermark {
            self.watermark = newest;
            Some(snapshot)
        } else {
            None
        }
    }

    /// Polls the store every `period` and yields each changed snapshot.
    ///
    /// The first poll happens after one period; nothing is pushed on
    /// subscription.
    pub fn stream(
        mut self,
        store: Arc<TimeSeriesStore>,
        period: Duration,
    ) -> impl Stream<Item = Snapshot> + Send + 'static {
        async_stream::stream! {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + period,
                period,
            );
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Some(snapshot) = self.poll(store.snapshot()) {
                    yield snapshot;
                }
            }
        }
    }
}

/// Newest timestamp across the last point of every series.
pub fn newest_timestamp(snapshot: &Snapshot) -> Option<f64> {
    snapshot
        .values()
        .filter_map(|s| s.newest_timestamp())
        .reduce(f64::max)
}
