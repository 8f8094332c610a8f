//! Typed views over shared streams.

use crate::{
    stream::{RawSubscription, SharedStream},
    streamid::AnyStreamId,
    types::{downcast, short_type_name, Payload},
};
use futures::{
    ready,
    stream::{Stream, StreamExt},
};
use std::{
    fmt,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};
use tracing::warn;

/// A discovered stream of `T` values.
///
/// Cheap to clone; every clone refers to the same shared upstream. Each call to
/// [`Flow::subscribe`] opens an independent subscription.
pub struct Flow<T> {
    shared: SharedStream,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Flow<T> {
    pub(crate) fn new(shared: SharedStream) -> Self {
        Self { shared, _payload: PhantomData }
    }

    /// Open a subscription
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription { raw: self.shared.subscribe(), _payload: PhantomData }
    }
}

impl<T> Flow<T> {
    /// True when both flows are backed by the same construction
    #[must_use]
    pub fn same_stream(&self, other: &Flow<T>) -> bool {
        self.shared.same_stream(&other.shared)
    }

    /// Identity the flow was resolved for
    #[must_use]
    pub fn id(&self) -> &AnyStreamId {
        self.shared.id()
    }

    /// The untyped shared stream
    #[must_use]
    pub fn shared(&self) -> &SharedStream {
        &self.shared
    }
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone(), _payload: PhantomData }
    }
}

impl<T> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Flow").field(&self.shared).finish()
    }
}

/// Subscription yielding the `T` values of a [`Flow`].
///
/// Elements of another type are skipped with a warning.
pub struct Subscription<T> {
    raw: RawSubscription,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        loop {
            match ready!(self.raw.poll_next_unpin(cx)) {
                Some(value) => match downcast::<T>(&value) {
                    Some(typed) => return Poll::Ready(Some(typed.clone())),
                    None => {
                        warn!(
                            expected = short_type_name::<T>(),
                            "Skipping element of unexpected type"
                        );
                    },
                },
                None => return Poll::Ready(None),
            }
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.raw).finish()
    }
}
