//! Fan-out broker for server-sent events.
//!
//! Every subscriber owns a bounded queue. Publishing never waits: a full
//! queue loses that message for that subscriber only, and a closed queue is
//! forgotten.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default SSE event name.
pub const DEFAULT_EVENT: &str = "otp";

/// Render one SSE frame: optional `event:` line, one `data:` line per line
/// of `data`, then a blank line.
pub fn encode_frame(event: Option<&str>, data: &str) -> String {
    let mut frame = String::with_capacity(data.len() + 32);
    if let Some(event) = event.filter(|e| !e.is_empty()) {
        frame.push_str("event: ");
        frame.push_str(event);
        frame.push('\n');
    }
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

struct Inner {
    event: Option<String>,
    capacity: usize,
    next_id: AtomicU64,
    closed: AtomicBool,
    clients: Mutex<HashMap<u64, mpsc::Sender<String>>>,
}

/// Cheap to clone; all clones share the same subscriber table.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Broker {
    /// `capacity` below 1 is raised to 1.
    pub fn new(event: Option<String>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                event,
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                clients: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<u64, mpsc::Sender<String>>> {
        self.inner
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn event(&self) -> Option<&str> {
        self.inner.event.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Register a new subscriber. After [`close`](Self::close) the returned
    /// subscription is already finished.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        {
            let mut clients = self.clients();
            // Checked under the lock so a concurrent close cannot miss us.
            if self.inner.closed.load(Ordering::Acquire) {
                drop(tx);
            } else {
                clients.insert(id, tx);
                log::debug!("subscriber {} joined", id);
            }
        }
        Subscription {
            id,
            rx,
            broker: self.clone(),
        }
    }

    /// Offer `message` to every subscriber. Returns how many accepted it.
    pub fn publish(&self, message: &str) -> usize {
        let mut delivered = 0;
        self.clients().retain(|id, tx| match tx.try_send(message.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                log::debug!("subscriber {} is lagging, message dropped", id);
                true
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("subscriber {} went away", id);
                false
            }
        });
        delivered
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.clients().remove(&id).is_some() {
            log::debug!("subscriber {} left", id);
        }
    }

    /// Drop every queue so all subscription streams end.
    pub fn close(&self) {
        let mut clients = self.clients();
        self.inner.closed.store(true, Ordering::Release);
        log::info!("closing broker with {} subscribers", clients.len());
        clients.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.clients().len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(Some(DEFAULT_EVENT.to_string()), DEFAULT_QUEUE_CAPACITY)
    }
}

/// One subscriber's receiving end. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<String>,
    broker: Broker,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message, or `None` once the broker dropped this queue.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Encoded SSE frames, one per message. The subscription lives inside
    /// the stream.
    pub fn into_frames(self) -> impl Stream<Item = String> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            let message = sub.recv().await?;
            let frame = encode_frame(sub.broker.event(), &message);
            Some((frame, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.unsubscribe(self.id);
    }
}
