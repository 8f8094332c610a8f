//! Resolution results: a data channel and an error channel.

use crate::{
    error::StreamError,
    stream::{Flow, SharedStream},
    types::{Payload, Value},
};
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;

/// Untyped resolution result produced by factories.
///
/// The empty pair (no data, no error channel) means the factory does not handle the
/// identity; it is not the same as a stream that never yields.
#[derive(Debug, Clone, Default)]
pub struct StreamPair {
    data: Option<SharedStream>,
    error: Option<SharedStream>,
}

impl StreamPair {
    /// The declining result
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A pair from optional channels
    #[must_use]
    pub fn new(data: Option<SharedStream>, error: Option<SharedStream>) -> Self {
        Self { data, error }
    }

    /// A data channel without an error channel
    #[must_use]
    pub fn data(data: SharedStream) -> Self {
        Self { data: Some(data), error: None }
    }

    /// Both channels
    #[must_use]
    pub fn data_and_error(data: SharedStream, error: SharedStream) -> Self {
        Self { data: Some(data), error: Some(error) }
    }

    /// Only an error channel
    #[must_use]
    pub fn error(error: SharedStream) -> Self {
        Self { data: None, error: Some(error) }
    }

    /// Fill a missing data channel with the stream `empty` builds
    pub(crate) fn or_empty_data(mut self, empty: impl FnOnce() -> SharedStream) -> Self {
        if self.data.is_none() {
            self.data = Some(empty());
        }
        self
    }

    /// True for the declining result
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    /// The data channel
    #[must_use]
    pub fn data_stream(&self) -> Option<&SharedStream> {
        self.data.as_ref()
    }

    /// The error channel
    #[must_use]
    pub fn error_stream(&self) -> Option<&SharedStream> {
        self.error.as_ref()
    }

    /// Subscribe to the data channel; finishes immediately when there is none
    pub fn subscribe_data(&self) -> BoxStream<'static, Value> {
        match &self.data {
            Some(data) => data.subscribe().boxed(),
            None => stream::empty().boxed(),
        }
    }

    /// Subscribe to the error channel; finishes immediately when there is none
    pub fn subscribe_error(&self) -> BoxStream<'static, Value> {
        match &self.error {
            Some(error) => error.subscribe().boxed(),
            None => stream::empty().boxed(),
        }
    }
}

/// Typed resolution result returned by
/// [`DiscoveryService::discover_pair`](crate::DiscoveryService::discover_pair).
pub struct DataErrorPair<T> {
    data: Option<Flow<T>>,
    error: Option<Flow<StreamError>>,
}

impl<T: Payload> DataErrorPair<T> {
    pub(crate) fn from_pair(pair: &StreamPair) -> Self {
        Self {
            data: pair.data.clone().map(Flow::new),
            error: pair.error.clone().map(Flow::new),
        }
    }
}

impl<T> DataErrorPair<T> {
    /// The data channel
    #[must_use]
    pub fn data(&self) -> Option<&Flow<T>> {
        self.data.as_ref()
    }

    /// The error channel
    #[must_use]
    pub fn error(&self) -> Option<&Flow<StreamError>> {
        self.error.as_ref()
    }

    /// Split into both channels
    #[must_use]
    pub fn into_parts(self) -> (Option<Flow<T>>, Option<Flow<StreamError>>) {
        (self.data, self.error)
    }
}

impl<T> Clone for DataErrorPair<T> {
    fn clone(&self) -> Self {
        Self { data: self.data.clone(), error: self.error.clone() }
    }
}

impl<T> fmt::Debug for DataErrorPair<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataErrorPair")
            .field("data", &self.data)
            .field("error", &self.error)
            .finish()
    }
}
