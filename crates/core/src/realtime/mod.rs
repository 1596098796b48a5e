//! Client-side request cache kept fresh by the store's change feed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::request::{Request, RequestId};
use crate::store::{ChangeFeed, ChangeKind, RequestChange, RequestFilter, RequestStore, StoreError};

#[derive(Clone, Debug, Default)]
pub struct RequestCache {
    entries: HashMap<RequestId, Request>,
    order: Vec<RequestId>,
}

impl RequestCache {
    pub fn replace(&mut self, requests: Vec<Request>) {
        self.order = requests.iter().map(|request| request.id.clone()).collect();
        self.entries = requests.into_iter().map(|request| (request.id.clone(), request)).collect();
    }

    /// Cached requests in the order they were fetched.
    pub fn requests(&self) -> Vec<Request> {
        self.order.iter().filter_map(|id| self.entries.get(id).cloned()).collect()
    }

    pub fn get(&self, id: &RequestId) -> Option<&Request> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Only status and signature changes matter to queue views.
    pub fn needs_refresh(&self, change: &RequestChange) -> bool {
        if change.kind == ChangeKind::Deleted {
            return true;
        }
        match self.entries.get(&change.request.id) {
            None => true,
            Some(cached) => {
                cached.status != change.request.status
                    || cached.signatures() != change.request.signatures()
            }
        }
    }
}

/// Collapses bursts of relevant changes into one refetch per window.
#[derive(Clone, Copy, Debug)]
pub struct RefreshDebouncer {
    window: Duration,
}

impl RefreshDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Runs until the feed closes and returns how many refetches were issued.
    pub async fn run<F, Fut>(
        &self,
        mut changes: broadcast::Receiver<RequestChange>,
        cache: Arc<RwLock<RequestCache>>,
        mut refetch: F,
    ) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<Request>, StoreError>>,
    {
        let mut refetches = 0;
        loop {
            let first = changes.recv().await;
            let relevant = match &first {
                Ok(change) => cache.read().await.needs_refresh(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(event_name = "realtime.feed_lagged", skipped, "change feed lagged");
                    true
                }
                Err(broadcast::error::RecvError::Closed) => return refetches,
            };
            if !relevant {
                debug!(event_name = "realtime.change_ignored", "change does not affect views");
                continue;
            }

            let closed = self.drain_window(&mut changes).await;
            match refetch().await {
                Ok(requests) => {
                    debug!(
                        event_name = "realtime.refetched",
                        count = requests.len(),
                        "cache refreshed"
                    );
                    cache.write().await.replace(requests);
                }
                Err(error) => warn!(
                    event_name = "realtime.refetch_failed",
                    error = %error,
                    "cache refresh failed; keeping previous snapshot"
                ),
            }
            refetches += 1;
            if closed {
                return refetches;
            }
        }
    }

    /// Swallows everything arriving inside the window. Returns true if the feed closed.
    async fn drain_window(&self, changes: &mut broadcast::Receiver<RequestChange>) -> bool {
        let deadline = Instant::now() + self.window;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return false,
                received = changes.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = received {
                        return true;
                    }
                }
            }
        }
    }
}

/// A filtered request list kept current in the background from the store's feed.
pub struct RequestWatcher {
    cache: Arc<RwLock<RequestCache>>,
    task: JoinHandle<usize>,
}

impl RequestWatcher {
    /// Subscribes before the first fetch so no commit between the two is lost.
    pub async fn start<S>(
        store: Arc<S>,
        filter: RequestFilter,
        window: Duration,
    ) -> Result<Self, StoreError>
    where
        S: RequestStore + ChangeFeed + 'static,
    {
        let changes = store.subscribe();
        let mut initial = RequestCache::default();
        initial.replace(store.list(&filter).await?);
        let cache = Arc::new(RwLock::new(initial));

        let debouncer = RefreshDebouncer::new(window);
        let shared = cache.clone();
        let task = tokio::spawn(async move {
            debouncer
                .run(changes, shared, move || {
                    let store = store.clone();
                    let filter = filter.clone();
                    async move { store.list(&filter).await }
                })
                .await
        });
        Ok(Self { cache, task })
    }

    pub async fn snapshot(&self) -> Vec<Request> {
        self.cache.read().await.requests()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
