//! Aggregating delay queue (spec §4.G): coalesces bursty "regenerate
//! topology" submissions into a single deferred computation, keyed by
//! request content hash, and keeps a bounded LRU of past results.

use crate::error::Error;
use crate::model::{ResultRecord, TopologyRequest};
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};

pub type Handler = Arc<dyn Fn(TopologyRequest) -> BoxFuture<'static, Result<Vec<u8>, Error>> + Send + Sync>;

/// Bounded `id -> ResultRecord` map that evicts least-recently-inserted
/// entries once `capacity` is exceeded (spec §3 Lifecycle / §4.G
/// "RequestHistorySize").
struct ResultStore {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, ResultRecord>,
}

impl ResultStore {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, id: String, record: ResultRecord) {
        if !self.entries.contains_key(&id) {
            self.order.push_back(id.clone());
        }
        self.entries.insert(id, record);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn get(&self, id: &str) -> Option<ResultRecord> {
        self.entries.get(id).cloned()
    }
}

struct Inner {
    pending_item: Option<TopologyRequest>,
    pending_id: Option<String>,
    last_submit_at: Option<Instant>,
    results: ResultStore,
}

/// Coalesces regeneration requests keyed by [`TopologyRequest::content_hash`]
/// and runs the handler for at most one in-flight burst at a time.
pub struct Queue {
    inner: Mutex<Inner>,
    handler: Handler,
    delay: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl Queue {
    /// `request_history_size` bounds the result LRU (spec default: 100).
    pub fn new(delay: Duration, request_history_size: usize, handler: Handler) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue = Arc::new(Self {
            inner: Mutex::new(Inner {
                pending_item: None,
                pending_id: None,
                last_submit_at: None,
                results: ResultStore::new(request_history_size),
            }),
            handler,
            delay,
            shutdown_tx,
        });
        tokio::spawn(Self::run_ticker(queue.clone(), shutdown_rx));
        queue
    }

    pub fn submit(&self, item: TopologyRequest) -> String {
        let id = item.content_hash();
        let mut inner = self.inner.lock().unwrap();
        if inner.pending_id.as_deref() == Some(id.as_str()) {
            inner.last_submit_at = Some(Instant::now());
        } else {
            inner.pending_item = Some(item);
            inner.pending_id = Some(id.clone());
            inner.last_submit_at = Some(Instant::now());
            inner.results.insert(id.clone(), ResultRecord::pending());
        }
        id
    }

    pub fn get(&self, id: &str) -> ResultRecord {
        let inner = self.inner.lock().unwrap();
        inner.results.get(id).unwrap_or_else(|| ResultRecord::not_found(id))
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn run_ticker(queue: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(queue.delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let fired = queue.take_due_item();
                    if let Some((item, id)) = fired {
                        queue.run_handler(item, id).await;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("aggregating queue shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn take_due_item(&self) -> Option<(TopologyRequest, String)> {
        let mut inner = self.inner.lock().unwrap();
        let due = inner
            .last_submit_at
            .is_some_and(|last| last.elapsed() >= self.delay);
        if due && inner.pending_item.is_some() {
            let item = inner.pending_item.take().unwrap();
            let id = inner.pending_id.take().unwrap();
            inner.last_submit_at = None;
            Some((item, id))
        } else {
            None
        }
    }

    async fn run_handler(&self, item: TopologyRequest, id: String) {
        let result = (self.handler)(item).await;
        let record = match result {
            Ok(bytes) => ResultRecord::ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => {
                error!(%id, error = %err.message(), "regeneration handler failed");
                ResultRecord::error(err.status().as_u16(), err.message().to_string())
            }
        };
        self.inner.lock().unwrap().results.insert(id, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(calls: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_req| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(b"ok".to_vec())
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_submissions_within_delay_share_one_id_and_one_handler_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = Queue::new(Duration::from_millis(50), 100, counting_handler(calls.clone()));

        let id1 = queue.submit(TopologyRequest::default());
        tokio::time::advance(Duration::from_millis(10)).await;
        let id2 = queue.submit(TopologyRequest::default());
        assert_eq!(id1, id2);

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let record = queue.get(&id1);
        assert_eq!(record.status, 200);
    }

    #[tokio::test]
    async fn unknown_id_returns_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = Queue::new(Duration::from_secs(60), 100, counting_handler(calls));
        let record = queue.get("unknown");
        assert_eq!(record.status, 404);
        assert_eq!(record.message, "request ID unknown not found");
    }

    #[test]
    fn result_store_evicts_oldest_beyond_capacity() {
        let mut store = ResultStore::new(2);
        store.insert("a".into(), ResultRecord::pending());
        store.insert("b".into(), ResultRecord::pending());
        store.insert("c".into(), ResultRecord::pending());
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }
}
