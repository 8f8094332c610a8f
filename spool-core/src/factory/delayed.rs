//! Delayed streams.
//!
//! Every element of the target is held back for a fixed duration and then handed
//! to a drop-oldest overflow buffer, so a slow consumer never stalls the timer.

use crate::{
    discovery::DiscoveryService,
    factory::StreamFactory,
    stream::{OverflowBuffer, StreamPair},
    streamid::{AnyStreamId, IdKind},
    types::Value,
    Result,
};
use futures::{
    future,
    stream::{BoxStream, StreamExt},
};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Builds [`IdKind::Delayed`] streams
#[derive(Debug, Default, Clone, Copy)]
pub struct DelayedStreamFactory;

impl DelayedStreamFactory {
    /// Create the factory
    pub fn new() -> Self {
        Self
    }
}

impl StreamFactory for DelayedStreamFactory {
    fn create(&self, id: &AnyStreamId, discovery: &DiscoveryService) -> Result<StreamPair> {
        let IdKind::Delayed { target, delay, capacity } = id.kind() else {
            return Ok(StreamPair::empty());
        };

        let source = discovery.resolve(target)?;
        let buffer = discovery.overflow_buffer(id, *capacity);
        let handle = discovery.handle().clone();
        let delay = *delay;
        let upstream_source = source.clone();

        let data = discovery.share_deferred(id, move || {
            handle.spawn(run_delay(upstream_source.subscribe_data(), delay, Arc::clone(&buffer)));
            buffer.into_stream()
        });

        debug!(?id, ?delay, ?capacity, "Delayed stream created");
        Ok(StreamPair::new(Some(data), source.error_stream().cloned()))
    }

    fn name(&self) -> &str {
        "delayed"
    }
}

async fn sleep_until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending::<()>().await,
    }
}

/// Move elements from `upstream` into `buffer`, each `delay` after it arrived
async fn run_delay(
    mut upstream: BoxStream<'static, Value>,
    delay: Duration,
    buffer: Arc<OverflowBuffer>,
) {
    let mut pending: VecDeque<(Instant, Value)> = VecDeque::new();
    let mut upstream_open = true;

    while upstream_open || !pending.is_empty() {
        let next_due = pending.front().map(|(due, _)| *due);
        tokio::select! {
            biased;
            () = sleep_until_due(next_due) => {
                if let Some((_, value)) = pending.pop_front() {
                    buffer.push(value);
                }
            },
            item = upstream.next(), if upstream_open => match item {
                Some(value) => pending.push_back((Instant::now() + delay, value)),
                None => upstream_open = false,
            },
        }
    }

    buffer.close();
}
