// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fetching and polling for a single log group.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::BackoffState;
use crate::config::Config;
use crate::error::{FetchError, TailError};
use crate::event::{millis_since_epoch, Event};
use crate::store::{FetchRequest, Page};

/// Where the next request of a group starts. Lives on the tailer's own stack frame.
#[derive(Debug)]
struct Cursor {
    next_token: Option<String>,
    start_time_ms: i64,
    /// Latest entry timestamp seen in the group, or the initial start time.
    watermark_ms: i64,
}

/// What to do once a page has been delivered.
enum Next {
    Fetch,
    Stop,
}

pub(crate) struct GroupTailer {
    config: Arc<Config>,
    name: String,
    cancel_token: CancellationToken,
}

impl GroupTailer {
    pub(crate) fn new(config: Arc<Config>, name: String, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            name,
            cancel_token,
        }
    }

    /// Pushes every entry of the group onto `tx` until the group is exhausted (or forever in
    /// follow mode), the group fails, the receiver goes away or the token is cancelled.
    ///
    /// A missing group and a dropped receiver both end the group without error.
    pub(crate) async fn run(self, tx: mpsc::Sender<Event>) -> Result<(), TailError> {
        debug!(group = %self.name, "enter");
        let result = self.tail(&tx).await;
        match &result {
            Ok(()) => debug!(group = %self.name, "exit"),
            Err(TailError::Cancelled) => debug!(group = %self.name, "cancelled"),
            Err(e) => warn!(group = %self.name, "exit with error: {e}"),
        }
        result
    }

    async fn tail(&self, tx: &mpsc::Sender<Event>) -> Result<(), TailError> {
        let start_time_ms = millis_since_epoch(self.config.start_time);
        let mut cursor = Cursor {
            next_token: None,
            start_time_ms,
            watermark_ms: start_time_ms,
        };
        let mut backoff = BackoffState::new(self.config.backoff);

        loop {
            if self.cancel_token.is_cancelled() {
                return Err(TailError::Cancelled);
            }
            if tx.is_closed() {
                debug!(group = %self.name, "receiver dropped");
                return Ok(());
            }

            let request = FetchRequest {
                group_name: self.name.clone(),
                filter_pattern: self.config.filter_pattern.clone(),
                start_time_ms: cursor.start_time_ms,
                next_token: cursor.next_token.clone(),
            };
            debug!(group = %self.name, start = cursor.start_time_ms, "request");

            let response = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => return Err(TailError::Cancelled),
                response = self.config.store.fetch_page(&request) => response,
            };

            let page = match response {
                Ok(page) => {
                    backoff.register_success();
                    page
                }
                Err(FetchError::NotFound) => {
                    debug!(group = %self.name, "not found");
                    return Ok(());
                }
                Err(FetchError::Throttled) => {
                    let Some(delay) = backoff.register_throttle() else {
                        return Err(TailError::RetryBudgetExhausted {
                            group: self.name.clone(),
                            attempts: backoff.attempts(),
                        });
                    };
                    debug!(group = %self.name, ?delay, "throttled");
                    self.pause(delay).await?;
                    continue;
                }
                Err(source) => {
                    return Err(TailError::Group {
                        group: self.name.clone(),
                        source,
                    })
                }
            };

            match self.deliver(page, &mut cursor, tx).await? {
                Next::Fetch => {}
                Next::Stop => return Ok(()),
            }
        }
    }

    /// Pushes a page's entries downstream and advances the cursor past it.
    async fn deliver(
        &self,
        page: Page,
        cursor: &mut Cursor,
        tx: &mpsc::Sender<Event>,
    ) -> Result<Next, TailError> {
        for raw in page.events {
            cursor.watermark_ms = cursor.watermark_ms.max(raw.timestamp_ms);
            let event = Event::from_millis(raw.timestamp_ms, self.name.as_str(), raw.message);

            let sent = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => return Err(TailError::Cancelled),
                sent = tx.send(event) => sent,
            };
            if sent.is_err() {
                debug!(group = %self.name, "receiver dropped");
                return Ok(Next::Stop);
            }
        }

        match page.next_token {
            // Pagination within a window keeps the window's start time.
            Some(token) => {
                cursor.next_token = Some(token);
                Ok(Next::Fetch)
            }
            None if self.config.follow => {
                self.pause(self.config.poll_interval).await?;
                cursor.next_token = None;
                cursor.start_time_ms = cursor.watermark_ms.saturating_add(1);
                debug!(group = %self.name, start = cursor.start_time_ms, "poll");
                Ok(Next::Fetch)
            }
            None => Ok(Next::Stop),
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), TailError> {
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => Err(TailError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffConfig;
    use crate::memory::MemoryLogStore;
    use crate::store::RawEvent;
    use std::time::UNIX_EPOCH;
    use tokio::time::Instant;
    use tracing_test::traced_test;

    fn tailer(store: Arc<MemoryLogStore>, follow: bool) -> GroupTailer {
        let mut config = Config::new(store, ["api"], UNIX_EPOCH + Duration::from_millis(100));
        config.filter_pattern = "ERROR".to_string();
        config.follow = follow;
        config.poll_interval = Duration::from_secs(5);
        GroupTailer::new(Arc::new(config), "api".to_string(), CancellationToken::new())
    }

    async fn collect(tailer: GroupTailer) -> (Vec<Event>, Result<(), TailError>) {
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(tailer.run(tx));
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (events, task.await.expect("tailer task panicked"))
    }

    fn messages(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn test_paginates_until_last_page() {
        let store = Arc::new(
            MemoryLogStore::new()
                .with_page("api", vec![RawEvent::new(200, "a"), RawEvent::new(300, "b")], Some("t1"))
                .with_page("api", vec![RawEvent::new(400, "c")], None),
        );

        let (events, result) = collect(tailer(Arc::clone(&store), false)).await;

        assert!(result.is_ok());
        assert_eq!(messages(&events), vec!["a", "b", "c"]);
        assert!(events.iter().all(|e| e.group_name == "api"));
        assert_eq!(events[2].timestamp, UNIX_EPOCH + Duration::from_millis(400));

        let requests = store.requests_for("api");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].next_token, None);
        assert_eq!(requests[0].filter_pattern, "ERROR");
        assert_eq!(requests[1].next_token.as_deref(), Some("t1"));
        // Continuation keeps the window's start time.
        assert_eq!(requests[0].start_time_ms, 100);
        assert_eq!(requests[1].start_time_ms, 100);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_not_found_ends_quietly() {
        let store = Arc::new(MemoryLogStore::new());

        let (events, result) = collect(tailer(Arc::clone(&store), true)).await;

        assert!(result.is_ok());
        assert!(events.is_empty());
        assert_eq!(store.requests().len(), 1);
        assert!(logs_contain("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_retries_same_request_after_backoff() {
        let store = Arc::new(
            MemoryLogStore::new()
                .with_error("api", FetchError::Throttled)
                .with_page("api", vec![RawEvent::new(200, "a")], Some("t1"))
                .with_error("api", FetchError::Throttled)
                .with_error("api", FetchError::Throttled)
                .with_page("api", vec![RawEvent::new(300, "b")], None),
        );
        let started = Instant::now();

        let (events, result) = collect(tailer(Arc::clone(&store), false)).await;

        assert!(result.is_ok());
        assert_eq!(messages(&events), vec!["a", "b"]);
        assert!(started.elapsed() >= Duration::from_secs(6));

        let requests = store.requests_for("api");
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[2], requests[3]);
        assert_eq!(requests[3], requests[4]);
        assert_eq!(requests[4].next_token.as_deref(), Some("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhaustion_fails_group() {
        let store = Arc::new(
            MemoryLogStore::new()
                .with_error("api", FetchError::Throttled)
                .with_error("api", FetchError::Throttled),
        );
        let mut tailer = tailer(Arc::clone(&store), false);
        let mut config = (*tailer.config).clone();
        config.backoff = BackoffConfig::default().with_max_retries(1);
        tailer.config = Arc::new(config);

        let (events, result) = collect(tailer).await;

        assert!(events.is_empty());
        assert!(matches!(
            result,
            Err(TailError::RetryBudgetExhausted { ref group, attempts: 1 }) if group == "api"
        ));
    }

    #[tokio::test]
    async fn test_other_error_is_fatal_and_keeps_earlier_entries() {
        let store = Arc::new(
            MemoryLogStore::new()
                .with_page("api", vec![RawEvent::new(200, "a")], Some("t1"))
                .with_error("api", FetchError::other("access denied")),
        );

        let (events, result) = collect(tailer(Arc::clone(&store), true)).await;

        assert_eq!(messages(&events), vec!["a"]);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "log \"api\": access denied");
        assert_eq!(store.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_resumes_after_watermark() {
        let store = Arc::new(
            MemoryLogStore::new()
                .with_page("api", vec![RawEvent::new(900, "a")], Some("t1"))
                .with_page("api", vec![RawEvent::new(700, "b")], None)
                .with_page("api", vec![RawEvent::new(1_500, "c")], None),
        );
        let tailer = tailer(Arc::clone(&store), true);
        let cancel_token = tailer.cancel_token.clone();
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(tailer.run(tx));

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.expect("event").message);
        }
        assert_eq!(received, vec!["a", "b", "c"]);

        // Let one more empty poll happen, then stop.
        tokio::time::sleep(Duration::from_secs(6)).await;
        cancel_token.cancel();
        assert!(matches!(task.await.unwrap(), Err(TailError::Cancelled)));
        assert!(rx.recv().await.is_none());

        let starts: Vec<i64> = store
            .requests_for("api")
            .iter()
            .map(|r| r.start_time_ms)
            .collect();
        // The watermark spans both pages of the first window, not only the last one.
        assert_eq!(starts[..4], [100, 100, 901, 1_501]);
        assert!(store.requests_for("api")[2..].iter().all(|r| r.next_token.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_polls_do_not_move_start_past_watermark() {
        let store = Arc::new(MemoryLogStore::new().with_group("api"));
        let tailer = tailer(Arc::clone(&store), true);
        let cancel_token = tailer.cancel_token.clone();
        let (tx, _rx) = mpsc::channel(1);
        let task = tokio::spawn(tailer.run(tx));

        tokio::time::sleep(Duration::from_secs(11)).await;
        cancel_token.cancel();
        assert!(matches!(task.await.unwrap(), Err(TailError::Cancelled)));

        let starts: Vec<i64> = store
            .requests_for("api")
            .iter()
            .map(|r| r.start_time_ms)
            .collect();
        // Nothing was observed, so every poll after the first resumes at the same instant.
        assert_eq!(starts, vec![100, 101, 101]);
    }

    #[tokio::test]
    async fn test_backpressure_blocks_next_fetch() {
        let store = Arc::new(
            MemoryLogStore::new()
                .with_page(
                    "api",
                    vec![RawEvent::new(200, "a"), RawEvent::new(300, "b"), RawEvent::new(400, "c")],
                    Some("t1"),
                )
                .with_page("api", vec![RawEvent::new(500, "d")], None),
        );
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(tailer(Arc::clone(&store), false).run(tx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.requests().len(), 1);
        assert!(!task.is_finished());

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.message);
        }
        assert_eq!(received, vec!["a", "b", "c", "d"]);
        assert!(task.await.unwrap().is_ok());
        assert_eq!(store.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_without_error() {
        let store = Arc::new(
            MemoryLogStore::new()
                .with_page("api", vec![RawEvent::new(200, "a"), RawEvent::new(300, "b")], Some("t1")),
        );
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = tailer(Arc::clone(&store), true).run(tx).await;

        assert!(result.is_ok());
        assert!(store.requests().is_empty());
    }

    #[tokio::test]
    async fn test_receiver_dropped_mid_page_stops_without_error() {
        let store = Arc::new(MemoryLogStore::new().with_page(
            "api",
            vec![RawEvent::new(200, "a"), RawEvent::new(300, "b"), RawEvent::new(400, "c")],
            Some("t1"),
        ));
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(tailer(Arc::clone(&store), true).run(tx));

        assert_eq!(rx.recv().await.expect("event").message, "a");
        drop(rx);

        assert!(task.await.unwrap().is_ok());
        // The continuation token is never followed once nobody is listening.
        assert_eq!(store.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = Arc::new(MemoryLogStore::new().with_group("api"));
        let tailer = tailer(Arc::clone(&store), true);
        tailer.cancel_token.cancel();
        let (tx, _rx) = mpsc::channel(1);

        let result = tailer.run(tx).await;

        assert!(matches!(result, Err(TailError::Cancelled)));
        assert!(store.requests().is_empty());
    }
}
