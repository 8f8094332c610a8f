//! # Discovery Service
//!
//! Resolves identities into shared streams. A resolution is looked up in the
//! registry first; on a miss the factory chain is walked in order and the first
//! non-empty [`StreamPair`] is memoized. Concurrent first discoveries of one
//! identity walk the chain once; the other callers block until the result is
//! stored. Failed walks are not memoized.
//!
//! Factories resolve the identities they depend on through the same service, so
//! a composite identity is built bottom-up, each node cached on its own.
//!
//! Resolution must not revisit an identity that is still being resolved: a
//! custom factory that discovers its own identity blocks forever.

mod registry;

use crate::{
    config::{ConfigValidator, PoolConfig},
    factory::{default_factories, StreamFactory},
    stream::{DataErrorPair, Flow, MulticastContext, OverflowBuffer, SharedStream, StreamPair},
    streamid::{AnyStreamId, StreamId},
    telemetry::{PoolMetrics, PoolMetricsSnapshot},
    types::{erase, Payload, Value},
    Error, Result,
};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use registry::StreamRegistry;
use std::{fmt, sync::Arc};
use tokio::runtime::Handle;
use tracing::{debug, info, trace};

/// Registry of lazily built, shared streams.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct DiscoveryService {
    inner: Arc<Inner>,
}

struct Inner {
    registry: StreamRegistry,
    factories: Vec<Arc<dyn StreamFactory>>,
    config: PoolConfig,
    context: MulticastContext,
}

impl DiscoveryService {
    /// Service with the default factory chain and default configuration.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new() -> Result<Self> {
        Self::builder().with_default_factories().build()
    }

    /// Start configuring a service
    pub fn builder() -> DiscoveryServiceBuilder {
        DiscoveryServiceBuilder::default()
    }

    /// Resolve `id` into its stream of `T` values.
    ///
    /// Resolutions that only produced an error channel yield a flow that ends
    /// without elements. That flow is memoized like any other.
    pub fn discover<T: Payload>(&self, id: &StreamId<T>) -> Result<Flow<T>> {
        let pair = self.resolve(id.as_any())?;
        let shared = match pair.data_stream() {
            Some(data) => data.clone(),
            None => self.empty_stream(id.as_any()),
        };
        Ok(Flow::new(shared))
    }

    /// Resolve `id` into its data and error channels
    pub fn discover_pair<T: Payload>(&self, id: &StreamId<T>) -> Result<DataErrorPair<T>> {
        Ok(DataErrorPair::from_pair(&self.resolve(id.as_any())?))
    }

    /// Resolve an untyped identity.
    ///
    /// This is what factories call to obtain the streams they build upon.
    pub fn resolve(&self, id: &AnyStreamId) -> Result<StreamPair> {
        if let Some(pair) = self.inner.registry.get(id) {
            self.inner.context.metrics.record_cache_hit();
            trace!(?id, "Resolved from registry");
            return Ok(pair);
        }

        let slot = self.inner.registry.slot(id);
        let mut walked = false;
        let pair = match slot.get_or_try_init(|| {
            walked = true;
            self.walk_factories(id)
        }) {
            Ok(pair) => pair.clone(),
            Err(error) => {
                self.inner.registry.discard_vacant(id, &slot);
                return Err(error);
            },
        };

        if !walked {
            self.inner.context.metrics.record_cache_hit();
        }
        Ok(pair)
    }

    fn walk_factories(&self, id: &AnyStreamId) -> Result<StreamPair> {
        for factory in &self.inner.factories {
            let pair = factory.create(id, self)?;
            if !pair.is_empty() {
                debug!(?id, factory = factory.name(), "Stream created");
                self.inner.context.metrics.record_resolution();
                return Ok(pair.or_empty_data(|| self.empty_stream(id)));
            }
        }

        self.inner.context.metrics.record_factory_miss();
        debug!(?id, factories = self.inner.factories.len(), "No factory recognised identity");
        Err(Error::UnresolvedIdentity { id: format!("{id:?}") })
    }

    fn empty_stream(&self, id: &AnyStreamId) -> SharedStream {
        self.share(id, stream::empty().boxed())
    }

    /// Register `source` as the stream behind `id`.
    ///
    /// Fails with [`Error::DuplicateRegistration`] when `id` is already backed by a
    /// stream, whether provided or resolved.
    pub fn provide<T, St>(&self, id: &StreamId<T>, source: St) -> Result<()>
    where
        T: Payload,
        St: Stream<Item = T> + Send + 'static,
    {
        let shared = self.share(id.as_any(), source.map(erase).boxed());
        self.inner
            .registry
            .slot(id.as_any())
            .set(StreamPair::data(shared))
            .map_err(|_| Error::DuplicateRegistration { id: format!("{id:?}") })?;

        self.inner.context.metrics.record_provided();
        info!(?id, "Stream provided");
        Ok(())
    }

    /// Register `source` under a freshly minted identity
    pub fn provide_unique<T, St>(&self, source: St) -> Result<StreamId<T>>
    where
        T: Payload,
        St: Stream<Item = T> + Send + 'static,
    {
        let id = StreamId::unique();
        self.provide(&id, source)?;
        Ok(id)
    }

    /// Forget every registered stream.
    ///
    /// Intended for test isolation. Subscriptions already open keep running; the
    /// next discovery of a forgotten identity builds a new stream.
    pub fn unregister_all(&self) {
        let removed = self.inner.registry.clear();
        info!(removed, "Unregistered all streams");
    }

    /// True when `id` is backed by a stream
    #[must_use]
    pub fn is_registered(&self, id: &AnyStreamId) -> bool {
        self.inner.registry.get(id).is_some()
    }

    /// Number of identities backed by a stream
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Share `upstream` under `id`; it is first polled when subscribed
    pub fn share(&self, id: &AnyStreamId, upstream: BoxStream<'static, Value>) -> SharedStream {
        SharedStream::new(id.clone(), upstream, self.inner.context.clone())
    }

    /// Share the stream `connector` builds on first subscription
    pub fn share_deferred<F>(&self, id: &AnyStreamId, connector: F) -> SharedStream
    where
        F: FnOnce() -> BoxStream<'static, Value> + Send + 'static,
    {
        SharedStream::deferred(id.clone(), connector, self.inner.context.clone())
    }

    /// Overflow buffer for `id`; `None` takes the configured default capacity
    pub(crate) fn overflow_buffer(
        &self,
        id: &AnyStreamId,
        capacity: Option<usize>,
    ) -> Arc<OverflowBuffer> {
        OverflowBuffer::new(
            id.clone(),
            capacity.unwrap_or(self.inner.config.backpressure.default_capacity),
            self.inner.config.backpressure.log_drops,
            Arc::clone(&self.inner.context.metrics),
        )
    }

    /// Runtime the service spawns its tasks on
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.inner.context.handle
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Current counter values
    #[must_use]
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.inner.context.metrics.snapshot()
    }
}

impl fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories: Vec<&str> =
            self.inner.factories.iter().map(|factory| factory.name()).collect();
        f.debug_struct("DiscoveryService")
            .field("factories", &factories)
            .field("registered", &self.inner.registry.len())
            .finish()
    }
}

/// Builder for [`DiscoveryService`].
///
/// Factories are tried in the order they were added.
#[derive(Default)]
pub struct DiscoveryServiceBuilder {
    config: Option<PoolConfig>,
    factories: Vec<Arc<dyn StreamFactory>>,
    handle: Option<Handle>,
}

impl DiscoveryServiceBuilder {
    /// Use `config` instead of the defaults
    #[must_use]
    pub fn with_config(mut self, config: PoolConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Append a factory to the chain
    #[must_use]
    pub fn with_factory<F: StreamFactory + 'static>(mut self, factory: F) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    /// Append an already shared factory to the chain
    #[must_use]
    pub fn with_shared_factory(mut self, factory: Arc<dyn StreamFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// Append the composition, delay and overlap-buffer factories
    #[must_use]
    pub fn with_default_factories(mut self) -> Self {
        self.factories.extend(default_factories());
        self
    }

    /// Spawn tasks on `handle` instead of the current runtime
    #[must_use]
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Validate the configuration and build the service.
    ///
    /// Fails with [`Error::NoRuntime`] when no handle was given and the caller is
    /// not inside a Tokio runtime.
    pub fn build(self) -> Result<DiscoveryService> {
        let config = self.config.unwrap_or_default();
        ConfigValidator::validate(&config)?;

        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|e| Error::NoRuntime { message: e.to_string() })?,
        };

        let context = MulticastContext {
            handle,
            subscriber_buffer: config.multicast.subscriber_buffer,
            metrics: Arc::new(PoolMetrics::new()),
        };

        info!(factories = self.factories.len(), "Discovery service created");
        Ok(DiscoveryService {
            inner: Arc::new(Inner {
                registry: StreamRegistry::new(),
                factories: self.factories,
                config,
                context,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_build_outside_runtime() {
        let result = DiscoveryService::new();
        assert!(matches!(result, Err(Error::NoRuntime { .. })));
    }

    #[test]
    fn test_build_with_explicit_handle() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let service = DiscoveryService::builder()
            .with_default_factories()
            .with_handle(runtime.handle().clone())
            .build()
            .unwrap();
        assert_eq!(service.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = PoolConfig::default();
        config.multicast.subscriber_buffer = 0;

        let result = DiscoveryService::builder().with_config(config).build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_provide_then_discover() {
        let service = DiscoveryService::new().unwrap();
        let id = StreamId::<i32>::named("numbers");
        service.provide(&id, stream::iter(vec![1, 2, 3])).unwrap();

        let values: Vec<i32> = service.discover(&id).unwrap().subscribe().collect().await;
        assert_eq!(values, vec![1, 2, 3]);
        assert!(service.is_registered(id.as_any()));
    }

    #[tokio::test]
    async fn test_overflow_buffer_uses_configured_capacity() {
        let mut config = PoolConfig::default();
        config.backpressure.default_capacity = 1;
        let service = DiscoveryService::builder().with_config(config).build().unwrap();
        let id = StreamId::<i32>::named("buffered").into_any();

        let buffer = service.overflow_buffer(&id, None);
        assert!(!buffer.push(erase(1_i32)));
        assert!(buffer.push(erase(2_i32)));
        assert_eq!(service.metrics().dropped_elements, 1);

        let sized = service.overflow_buffer(&id, Some(4));
        assert!(!sized.push(erase(1_i32)));
        assert!(!sized.push(erase(2_i32)));
    }

    #[tokio::test]
    async fn test_unresolved_identity() {
        let service = DiscoveryService::builder().build().unwrap();
        let result = service.discover(&StreamId::<i32>::named("nowhere"));

        assert!(matches!(result, Err(Error::UnresolvedIdentity { .. })));
        assert_eq!(service.metrics().factory_misses, 1);
        assert_eq!(service.registered_count(), 0);
        assert_eq!(service.inner.registry.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_composite_leaves_no_slots() {
        let service = DiscoveryService::new().unwrap();
        let missing = StreamId::<i32>::named("missing");

        for delay in 1..=5 {
            let id = crate::streamid::delayed(&missing, std::time::Duration::from_millis(delay));
            assert!(service.discover(&id).is_err());
        }
        assert_eq!(service.inner.registry.slot_count(), 0);
    }
}
