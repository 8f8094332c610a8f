//! # Overlap-Buffered Streams
//!
//! Windows over a source stream, opened by the values of a start stream and closed
//! by whichever comes first: a matching end value or the timeout. Windows may
//! overlap; an element arriving while several windows are open is captured by
//! each of them.
//!
//! Nothing is subscribed until the buffered stream itself gets its first
//! subscriber. Its upstreams are then subscribed in a fixed order (end streams,
//! timeout stream, start stream, source) so no closing signal can be missed once
//! windows start opening.
//!
//! Within one scheduling step closing signals are handled before opening
//! signals, and opening signals before source elements. An end value arriving
//! together with a start value therefore closes the windows open before it and
//! never the new one.
//!
//! When the source completes, the windows still open are emitted and the stream
//! ends. When the start stream completes, the stream ends as soon as no window
//! is left open.

use crate::{
    discovery::DiscoveryService,
    error::StreamError,
    factory::{error_channel, StreamFactory},
    stream::{OverflowBuffer, StreamPair},
    streamid::{AnyStreamId, Assembler, Behavior, IdKind, MatchFn, Timeout},
    types::{erase, Value},
    Result,
};
use futures::{
    channel::mpsc::{self, UnboundedSender},
    future,
    stream::{self, BoxStream, StreamExt},
};
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

/// Builds [`IdKind::OverlapBuffer`] streams
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlapBufferStreamFactory;

impl OverlapBufferStreamFactory {
    /// Create the factory
    pub fn new() -> Self {
        Self
    }
}

/// Resolved fallback closing condition
#[derive(Clone)]
enum WindowTimeout {
    After(Duration),
    Stream(StreamPair),
}

impl StreamFactory for OverlapBufferStreamFactory {
    fn create(&self, id: &AnyStreamId, discovery: &DiscoveryService) -> Result<StreamPair> {
        let IdKind::OverlapBuffer { source, specification, capacity, assembler } = id.kind()
        else {
            return Ok(StreamPair::empty());
        };

        let source_pair = discovery.resolve(source)?;
        let start_pair = discovery.resolve(specification.start())?;
        let end_pairs = specification
            .end_matchers()
            .iter()
            .map(|matcher| -> Result<_> {
                Ok((discovery.resolve(&matcher.end)?, matcher.matching.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let timeout = match specification.timeout() {
            Timeout::After(duration) => WindowTimeout::After(*duration),
            Timeout::Stream(timeout_id) => WindowTimeout::Stream(discovery.resolve(timeout_id)?),
        };

        let mut upstream_pairs: Vec<StreamPair> =
            end_pairs.iter().map(|(pair, _)| pair.clone()).collect();
        if let WindowTimeout::Stream(pair) = &timeout {
            upstream_pairs.push(pair.clone());
        }
        upstream_pairs.push(start_pair.clone());
        upstream_pairs.push(source_pair.clone());

        let buffer = discovery.overflow_buffer(id, *capacity);
        let handle = discovery.handle().clone();
        let (failures_tx, failures_rx) = mpsc::unbounded();
        let assembler = *assembler;
        let coordinator_id = id.clone();

        let data = discovery.share_deferred(id, move || {
            let (ends, matchers): (Vec<_>, Vec<_>) = end_pairs
                .iter()
                .map(|(pair, matching)| (pair.subscribe_data(), matching.clone()))
                .unzip();
            let (timeouts, window_timeout) = match &timeout {
                WindowTimeout::Stream(pair) => (pair.subscribe_data(), None),
                WindowTimeout::After(duration) => (stream::empty().boxed(), Some(*duration)),
            };
            let starts = start_pair.subscribe_data();
            let items = source_pair.subscribe_data();

            let coordinator = WindowCoordinator {
                id: coordinator_id,
                matchers,
                window_timeout,
                assembler,
                windows: Vec::new(),
                buffer: Arc::clone(&buffer),
                failures: failures_tx,
            };
            handle.spawn(coordinator.run(ends, timeouts, starts, items));
            buffer.into_stream()
        });
        let error = error_channel(discovery, id, failures_rx, upstream_pairs);

        debug!(?id, ?capacity, "Overlap buffer created");
        Ok(StreamPair::data_and_error(data, error))
    }

    fn name(&self) -> &str {
        "overlap-buffer"
    }
}

struct Window {
    opening: Value,
    items: Vec<Value>,
    deadline: Option<Instant>,
}

struct WindowCoordinator {
    id: AnyStreamId,
    matchers: Vec<Behavior<MatchFn>>,
    window_timeout: Option<Duration>,
    assembler: Assembler,
    windows: Vec<Window>,
    buffer: Arc<OverflowBuffer>,
    failures: UnboundedSender<Value>,
}

async fn sleep_until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending::<()>().await,
    }
}

impl WindowCoordinator {
    async fn run(
        mut self,
        ends: Vec<BoxStream<'static, Value>>,
        mut timeouts: BoxStream<'static, Value>,
        mut starts: BoxStream<'static, Value>,
        mut items: BoxStream<'static, Value>,
    ) {
        let mut ends = stream::select_all(
            ends.into_iter()
                .enumerate()
                .map(|(index, end)| end.map(move |value| (index, value)).boxed()),
        );
        let mut ends_open = !ends.is_empty();
        let mut timeouts_open = true;
        let mut starts_open = true;

        loop {
            let next_deadline = self.windows.iter().filter_map(|window| window.deadline).min();

            let step = tokio::select! {
                biased;
                end = ends.next(), if ends_open => match end {
                    Some((index, value)) => self.close_matching(index, &value),
                    None => {
                        ends_open = false;
                        Ok(())
                    },
                },
                tick = timeouts.next(), if timeouts_open => {
                    match tick {
                        Some(_) => self.close_all(),
                        None => timeouts_open = false,
                    }
                    Ok(())
                },
                () = sleep_until_due(next_deadline) => {
                    self.close_expired(Instant::now());
                    Ok(())
                },
                opening = starts.next(), if starts_open => {
                    match opening {
                        Some(value) => self.open(value),
                        None => starts_open = false,
                    }
                    Ok(())
                },
                item = items.next() => match item {
                    Some(value) => {
                        for window in &mut self.windows {
                            window.items.push(Arc::clone(&value));
                        }
                        Ok(())
                    },
                    None => {
                        trace!(id = ?self.id, open = self.windows.len(), "Source completed");
                        self.close_all();
                        break;
                    },
                },
            };

            if let Err(error) = step {
                warn!(id = ?self.id, %error, "Window matcher failed");
                // The error channel may have no subscriber left.
                let _ = self.failures.unbounded_send(erase(error));
                break;
            }

            if !starts_open && self.windows.is_empty() {
                break;
            }
        }

        self.buffer.close();
        debug!(id = ?self.id, "Overlap buffer completed");
    }

    fn open(&mut self, opening: Value) {
        let deadline = self.window_timeout.map(|timeout| Instant::now() + timeout);
        self.windows.push(Window { opening, items: Vec::new(), deadline });
        trace!(id = ?self.id, open = self.windows.len(), "Window opened");
    }

    fn emit(&self, window: Window) {
        self.buffer.push(self.assembler.assemble(window.items));
    }

    /// Close every window whose opening value matches `candidate` under matcher `index`
    fn close_matching(
        &mut self,
        index: usize,
        candidate: &Value,
    ) -> std::result::Result<(), StreamError> {
        let Some(matching) = self.matchers.get(index) else {
            return Ok(());
        };

        let mut kept = Vec::with_capacity(self.windows.len());
        let mut closing = Vec::new();
        for window in std::mem::take(&mut self.windows) {
            match (matching.get())(&window.opening, candidate) {
                Ok(true) => closing.push(window),
                Ok(false) => kept.push(window),
                Err(error) => {
                    self.windows = kept;
                    return Err(error);
                },
            }
        }
        self.windows = kept;

        for window in closing {
            self.emit(window);
        }
        Ok(())
    }

    fn close_expired(&mut self, now: Instant) {
        let (expired, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.windows)
            .into_iter()
            .partition(|window| window.deadline.is_some_and(|deadline| deadline <= now));
        self.windows = open;
        for window in expired {
            self.emit(window);
        }
    }

    fn close_all(&mut self) {
        for window in std::mem::take(&mut self.windows) {
            self.emit(window);
        }
    }
}
