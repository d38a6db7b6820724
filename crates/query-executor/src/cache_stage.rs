//! Pipeline stage that populates the result cache

use crate::pipeline::ResponseStage;
use crate::response::QueryResponse;
use async_trait::async_trait;
use query_cache::CachePolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Default)]
struct WriteTracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when a write finishes or is dropped
struct InFlight(Arc<WriteTracker>);

impl InFlight {
    fn start(tracker: &Arc<WriteTracker>) -> Self {
        tracker.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(tracker))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Offers every backend response to the cache
///
/// The response passes through untouched. The write itself runs on a detached
/// task, so it neither delays the response nor is cancelled with the request.
/// Outside a Tokio runtime the write runs inline instead.
#[derive(Debug)]
pub struct CacheWriteStage {
    policy: Arc<CachePolicy>,
    tracker: Arc<WriteTracker>,
}

impl CacheWriteStage {
    pub fn new(policy: Arc<CachePolicy>) -> Self {
        Self {
            policy,
            tracker: Arc::new(WriteTracker::default()),
        }
    }

    pub fn policy(&self) -> &Arc<CachePolicy> {
        &self.policy
    }

    /// Writes submitted but not yet finished
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every submitted write has finished
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.tracker.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

#[async_trait]
impl ResponseStage for CacheWriteStage {
    async fn process(&self, response: QueryResponse) -> QueryResponse {
        if response.is_from_cache() || !self.policy.is_enabled() {
            return response;
        }

        let policy = Arc::clone(&self.policy);
        let query = Arc::clone(&response.query);
        let payload = Arc::clone(&response.payload);
        let ticket = response.cache_ticket.clone();
        let verdict = response.cacheability();
        let guard = InFlight::start(&self.tracker);

        let write = async move {
            let outcome = match ticket {
                Some(ticket) => {
                    policy
                        .write_with_ticket(ticket, &payload, &query, verdict)
                        .await
                }
                None => policy.write(&payload, &query, verdict).await,
            };
            trace!(outcome = ?outcome, "Cache write finished");
            drop(guard);
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(write);
            }
            Err(_) => write.await,
        }
        response
    }

    fn name(&self) -> &str {
        "cache"
    }
}
