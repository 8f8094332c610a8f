//! Drop-oldest overflow buffer
//!
//! Sits between a producer that must never block (a delay timer, a window
//! coordinator) and a downstream consumer. When full, the oldest element is
//! discarded to admit the new one; every discard is counted and optionally logged.

use crate::{streamid::AnyStreamId, telemetry::PoolMetrics, types::Value};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::Notify;
use tracing::warn;

/// Bounded single-consumer queue with drop-oldest overflow
pub(crate) struct OverflowBuffer {
    state: Mutex<BufferState>,
    notify: Notify,
    capacity: usize,
    log_drops: bool,
    id: AnyStreamId,
    metrics: Arc<PoolMetrics>,
}

struct BufferState {
    queue: VecDeque<Value>,
    closed: bool,
}

enum Next {
    Item(Value),
    Empty,
    Closed,
}

impl OverflowBuffer {
    pub(crate) fn new(
        id: AnyStreamId,
        capacity: usize,
        log_drops: bool,
        metrics: Arc<PoolMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BufferState {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            log_drops,
            id,
            metrics,
        })
    }

    /// Enqueue `value`, discarding the oldest element when full.
    ///
    /// Returns true when an element was discarded.
    pub(crate) fn push(&self, value: Value) -> bool {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = if state.queue.len() >= self.capacity {
                state.queue.pop_front().is_some()
            } else {
                false
            };
            state.queue.push_back(value);
            dropped
        };

        if dropped {
            self.metrics.record_drop();
            if self.log_drops {
                warn!(id = ?self.id, capacity = self.capacity, "Dropping value on backpressure");
            }
        }
        self.notify.notify_one();
        dropped
    }

    /// Mark the producer finished; buffered elements are still delivered
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn try_next(&self) -> Next {
        let mut state = self.state.lock();
        match state.queue.pop_front() {
            Some(value) => Next::Item(value),
            None if state.closed => Next::Closed,
            None => Next::Empty,
        }
    }

    /// Drain the buffer as a stream that ends once closed and empty
    pub(crate) fn into_stream(self: Arc<Self>) -> BoxStream<'static, Value> {
        stream::unfold(self, |buffer| async move {
            loop {
                match buffer.try_next() {
                    Next::Item(value) => return Some((value, buffer)),
                    Next::Closed => return None,
                    Next::Empty => buffer.notify.notified().await,
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        streamid::StreamId,
        types::{downcast, erase},
    };

    fn buffer(capacity: usize, metrics: &Arc<PoolMetrics>) -> Arc<OverflowBuffer> {
        OverflowBuffer::new(
            StreamId::<i32>::named("buffer").into_any(),
            capacity,
            true,
            Arc::clone(metrics),
        )
    }

    fn ints(values: Vec<Value>) -> Vec<i32> {
        values.iter().filter_map(|v| downcast::<i32>(v).copied()).collect()
    }

    #[tokio::test]
    async fn test_drops_oldest_when_full() {
        let metrics = Arc::new(PoolMetrics::new());
        let buffer = buffer(2, &metrics);

        assert!(!buffer.push(erase(1_i32)));
        assert!(!buffer.push(erase(2_i32)));
        assert!(buffer.push(erase(3_i32)));
        assert_eq!(buffer.len(), 2);
        buffer.close();

        let drained: Vec<Value> = buffer.into_stream().collect().await;
        assert_eq!(ints(drained), vec![2, 3]);
        assert_eq!(metrics.snapshot().dropped_elements, 1);
    }

    #[tokio::test]
    async fn test_consumer_waits_for_producer() {
        let metrics = Arc::new(PoolMetrics::new());
        let buffer = buffer(8, &metrics);
        let producer = Arc::clone(&buffer);

        let consumer = tokio::spawn(buffer.into_stream().collect::<Vec<Value>>());
        tokio::task::yield_now().await;

        producer.push(erase(7_i32));
        producer.push(erase(8_i32));
        producer.close();

        let drained = consumer.await.unwrap();
        assert_eq!(ints(drained), vec![7, 8]);
        assert_eq!(metrics.snapshot().dropped_elements, 0);
    }
}
