//! Server-sent events endpoint.
//!
//! Each connection owns its own `ChangeFeed`; a full snapshot is pushed
//! whenever any group receives a newer point.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use serde_json::json;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::feed::{ChangeFeed, FEED_POLL_PERIOD};
use crate::state::SharedState;

static SSE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Counts one open event stream for as long as it lives.
struct SseGuard;

impl SseGuard {
    fn new() -> Self {
        let active = SSE_CONNECTIONS.fetch_add(1, Ordering::Relaxed) + 1;
        info!(active_connections = active, "SSE client connected");
        SseGuard
    }
}

impl Drop for SseGuard {
    fn drop(&mut self) {
        let active = SSE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed) - 1;
        info!(active_connections = active, "SSE client disconnected");
    }
}

/// Number of open event streams.
pub fn active_connections() -> usize {
    SSE_CONNECTIONS.load(Ordering::Relaxed)
}

/// Handler for the /events endpoint.
pub async fn events_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    // Moved into the stream so an unpolled response still decrements on drop.
    let guard = SseGuard::new();
    let snapshots = ChangeFeed::new().stream(Arc::clone(&state.store), FEED_POLL_PERIOD);

    let stream = async_stream::stream! {
        let _guard = guard;
        for await snapshot in snapshots {
            match serde_json::to_string(&json!({ "data": snapshot })) {
                Ok(payload) => {
                    yield Ok(Event::default().data(payload));
                }
                Err(e) => error!(error = %e, "failed to serialize snapshot"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{LocalCollector, Mode};
    use crate::config::Config;
    use crate::process::Matcher;
    use crate::sampler::{Sampler, WinRmConnector};
    use crate::state::AppState;
    use crate::store::TimeSeriesStore;
    use std::time::Duration;

    fn state() -> SharedState {
        let store = Arc::new(TimeSeriesStore::new(10, None, Duration::from_secs(10)));
        let sampler = Arc::new(Sampler::new(
            Arc::clone(&store),
            Matcher::with_builtin_groups(Vec::new()),
            Mode::Local,
            Duration::from_secs(5),
            Arc::new(LocalCollector::default()),
            Arc::new(WinRmConnector),
        ));
        Arc::new(AppState::new(store, sampler, Config::default()).expect("registry"))
    }

    #[tokio::test]
    async fn test_unpolled_streams_release_their_slot() {
        let before = active_connections();

        let responses = vec![
            events_handler(State(state())).await,
            events_handler(State(state())).await,
            events_handler(State(state())).await,
        ];
        assert_eq!(active_connections(), before + 3);

        drop(responses);
        assert_eq!(active_connections(), before);
    }
}
