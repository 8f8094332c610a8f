//! Shared streams: one upstream, many subscribers.
//!
//! A [`SharedStream`] starts inert. The first call to [`SharedStream::subscribe`]
//! takes the one-shot connector, builds the upstream and spawns a pump task that
//! copies every element into one bounded queue per subscriber. Subscribers
//! attaching later see the elements produced from then on; subscribers attaching
//! after the upstream completed see an already finished stream.
//!
//! Connecting is two-phase. A connector usually subscribes to other shared
//! streams, which may connect in turn. Pumps started while the outermost
//! connector runs are held back until it returns, so every subscription in the
//! newly wired graph is registered before any element flows. A stream feeding
//! two branches of one graph therefore delivers its first element to both.

use crate::{streamid::AnyStreamId, telemetry::PoolMetrics, types::Value};
use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use std::{
    cell::RefCell,
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, trace};

thread_local! {
    /// Pumps waiting for the outermost connector on this thread to return
    static PENDING_PUMPS: RefCell<Option<Vec<PendingPump>>> = const { RefCell::new(None) };
}

/// Builds the upstream of a shared stream on first subscription
pub type Connector = Box<dyn FnOnce() -> BoxStream<'static, Value> + Send>;

/// Runtime resources a shared stream needs to run its pump
#[derive(Clone)]
pub struct MulticastContext {
    /// Runtime the pump tasks are spawned on
    pub handle: Handle,
    /// Queue length per subscriber
    pub subscriber_buffer: usize,
    /// Counters of the owning discovery service
    pub metrics: Arc<PoolMetrics>,
}

impl fmt::Debug for MulticastContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MulticastContext")
            .field("subscriber_buffer", &self.subscriber_buffer)
            .finish_non_exhaustive()
    }
}

/// Multicast handle over a lazily connected upstream.
///
/// Cloning shares the same upstream.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<SharedInner>,
}

struct SharedInner {
    id: AnyStreamId,
    connector: Mutex<Option<Connector>>,
    subscribers: Mutex<Subscribers>,
    context: MulticastContext,
}

#[derive(Default)]
struct Subscribers {
    senders: Vec<mpsc::Sender<Value>>,
    terminated: bool,
}

impl SharedStream {
    /// Share an existing stream; it is first polled when the first subscriber attaches
    pub fn new(
        id: AnyStreamId,
        upstream: BoxStream<'static, Value>,
        context: MulticastContext,
    ) -> Self {
        Self::deferred(id, move || upstream, context)
    }

    /// Share a stream built by `connector` when the first subscriber attaches
    pub fn deferred<F>(id: AnyStreamId, connector: F, context: MulticastContext) -> Self
    where
        F: FnOnce() -> BoxStream<'static, Value> + Send + 'static,
    {
        Self {
            inner: Arc::new(SharedInner {
                id,
                connector: Mutex::new(Some(Box::new(connector))),
                subscribers: Mutex::new(Subscribers::default()),
                context,
            }),
        }
    }

    /// Identity this stream was built for
    #[must_use]
    pub fn id(&self) -> &AnyStreamId {
        &self.inner.id
    }

    /// True when both handles share one upstream
    #[must_use]
    pub fn same_stream(&self, other: &SharedStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True once the upstream has been connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connector.lock().is_none()
    }

    /// Attach a new subscriber, connecting the upstream if this is the first one
    pub fn subscribe(&self) -> RawSubscription {
        let (sender, receiver) = mpsc::channel(self.inner.context.subscriber_buffer.max(1));
        self.inner.context.metrics.record_subscription();

        {
            let mut subscribers = self.inner.subscribers.lock();
            if subscribers.terminated {
                trace!(id = ?self.inner.id, "Subscribed to a completed shared stream");
                return RawSubscription { receiver };
            }
            subscribers.senders.push(sender);
        }

        let connector = self.inner.connector.lock().take();
        if let Some(connect) = connector {
            debug!(id = ?self.inner.id, "Connecting shared stream");
            let batch = ConnectBatch::enter();
            let upstream = connect();
            batch.defer(PendingPump { inner: Arc::clone(&self.inner), upstream });
        }

        RawSubscription { receiver }
    }
}

impl fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStream")
            .field("id", &self.inner.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct PendingPump {
    inner: Arc<SharedInner>,
    upstream: BoxStream<'static, Value>,
}

impl PendingPump {
    fn start(self) {
        let handle = self.inner.context.handle.clone();
        handle.spawn(pump(self.inner, self.upstream));
    }
}

/// Scope of one connector run; the outermost scope starts the collected pumps on exit
struct ConnectBatch {
    outermost: bool,
}

impl ConnectBatch {
    fn enter() -> Self {
        let outermost = PENDING_PUMPS.with(|pending| {
            let mut pending = pending.borrow_mut();
            if pending.is_some() {
                false
            } else {
                *pending = Some(Vec::new());
                true
            }
        });
        Self { outermost }
    }

    fn defer(&self, pump: PendingPump) {
        PENDING_PUMPS.with(|pending| match pending.borrow_mut().as_mut() {
            Some(batch) => batch.push(pump),
            None => pump.start(),
        });
    }
}

impl Drop for ConnectBatch {
    fn drop(&mut self) {
        if !self.outermost {
            return;
        }
        let pumps = PENDING_PUMPS.with(|pending| pending.borrow_mut().take()).unwrap_or_default();
        trace!(pumps = pumps.len(), "Starting connected pumps");
        for pump in pumps {
            pump.start();
        }
    }
}

async fn pump(inner: Arc<SharedInner>, mut upstream: BoxStream<'static, Value>) {
    while let Some(value) = upstream.next().await {
        let senders = inner.subscribers.lock().senders.clone();
        let mut any_closed = false;
        for sender in &senders {
            if sender.send(Arc::clone(&value)).await.is_err() {
                any_closed = true;
            }
        }
        if any_closed {
            inner.subscribers.lock().senders.retain(|sender| !sender.is_closed());
        }
    }

    finish(&inner);
}

fn finish(inner: &SharedInner) {
    let mut subscribers = inner.subscribers.lock();
    subscribers.terminated = true;
    subscribers.senders.clear();
    debug!(id = ?inner.id, "Shared stream completed");
}

/// Untyped subscription to a [`SharedStream`]
#[derive(Debug)]
pub struct RawSubscription {
    receiver: mpsc::Receiver<Value>,
}

impl Stream for RawSubscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        streamid::StreamId,
        types::{downcast, erase},
    };
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> MulticastContext {
        MulticastContext {
            handle: Handle::current(),
            subscriber_buffer: 16,
            metrics: Arc::new(PoolMetrics::new()),
        }
    }

    fn ints(values: Vec<Value>) -> Vec<i32> {
        values.iter().filter_map(|v| downcast::<i32>(v).copied()).collect()
    }

    #[tokio::test]
    async fn test_connects_once_on_first_subscribe() {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connects);
        let shared = SharedStream::deferred(
            StreamId::<i32>::named("ints").into_any(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                stream::iter(vec![erase(1_i32), erase(2_i32)]).boxed()
            },
            context(),
        );

        assert!(!shared.is_connected());
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        let first = shared.subscribe();
        let second = shared.clone().subscribe();

        assert!(shared.is_connected());
        assert_eq!(ints(first.collect().await), vec![1, 2]);
        assert_eq!(ints(second.collect().await), vec![1, 2]);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribe_after_completion_is_empty() {
        let shared = SharedStream::new(
            StreamId::<i32>::named("once").into_any(),
            stream::iter(vec![erase(5_i32)]).boxed(),
            context(),
        );

        assert_eq!(ints(shared.subscribe().collect().await), vec![5]);
        tokio::task::yield_now().await;

        let late: Vec<Value> = shared.subscribe().collect().await;
        assert!(late.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_upstream_feeds_every_branch() {
        for _ in 0..50 {
            let context = context();
            let root = SharedStream::new(
                StreamId::<i32>::named("root").into_any(),
                stream::iter((0..100).map(erase::<i32>)).boxed(),
                context.clone(),
            );
            let branch = |name: &str| {
                let root = root.clone();
                SharedStream::deferred(
                    StreamId::<i32>::named(name).into_any(),
                    move || root.subscribe().boxed(),
                    context.clone(),
                )
            };
            let (left, right) = (branch("left"), branch("right"));
            let joined = SharedStream::deferred(
                StreamId::<i32>::named("joined").into_any(),
                move || stream::select(left.subscribe(), right.subscribe()).boxed(),
                context.clone(),
            );

            let values: Vec<Value> = joined.subscribe().collect().await;
            assert_eq!(values.len(), 200);
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_stall_others() {
        let shared = SharedStream::new(
            StreamId::<i32>::named("range").into_any(),
            stream::iter((0..100).map(erase::<i32>)).boxed(),
            context(),
        );

        let dropped = shared.subscribe();
        let kept = shared.subscribe();
        drop(dropped);

        assert_eq!(ints(kept.collect().await), (0..100).collect::<Vec<_>>());
    }
}
