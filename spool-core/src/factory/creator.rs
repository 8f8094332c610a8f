//! Factory built from a fixed list of identity/creator pairs.

use crate::{
    discovery::DiscoveryService,
    factory::StreamFactory,
    stream::StreamPair,
    streamid::{AnyStreamId, StreamId},
    types::{erase, Payload, Value},
    Result,
};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::{fmt, sync::Arc};
use tracing::debug;

type CreateFn = dyn Fn(&DiscoveryService) -> BoxStream<'static, Value> + Send + Sync;

/// A stream identity together with the function that creates its stream.
///
/// The creator runs when the identity is first discovered, never more than once
/// per registration. It may discover other identities through the given service,
/// but discovering its own identity blocks forever on the registry slot.
#[derive(Clone)]
pub struct IdentifiedStreamCreator {
    id: AnyStreamId,
    creator: Arc<CreateFn>,
}

impl IdentifiedStreamCreator {
    /// Pair `id` with `creator`
    pub fn new<T, F, St>(id: &StreamId<T>, creator: F) -> Self
    where
        T: Payload,
        F: Fn(&DiscoveryService) -> St + Send + Sync + 'static,
        St: Stream<Item = T> + Send + 'static,
    {
        let creator: Arc<CreateFn> =
            Arc::new(move |discovery: &DiscoveryService| creator(discovery).map(erase).boxed());
        Self { id: id.as_any().clone(), creator }
    }

    /// The identity this creator serves
    #[must_use]
    pub fn id(&self) -> &AnyStreamId {
        &self.id
    }
}

impl fmt::Debug for IdentifiedStreamCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifiedStreamCreator").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Serves the identities of a list of [`IdentifiedStreamCreator`]s.
///
/// When several creators name the same identity the first one wins.
#[derive(Debug, Clone, Default)]
pub struct CreatorStreamFactory {
    creators: Vec<IdentifiedStreamCreator>,
}

impl CreatorStreamFactory {
    /// Factory serving `creators`
    pub fn new(creators: impl IntoIterator<Item = IdentifiedStreamCreator>) -> Self {
        Self { creators: creators.into_iter().collect() }
    }

    /// Add one more creator
    #[must_use]
    pub fn with_creator(mut self, creator: IdentifiedStreamCreator) -> Self {
        self.creators.push(creator);
        self
    }
}

impl StreamFactory for CreatorStreamFactory {
    fn create(&self, id: &AnyStreamId, discovery: &DiscoveryService) -> Result<StreamPair> {
        let Some(entry) = self.creators.iter().find(|creator| &creator.id == id) else {
            return Ok(StreamPair::empty());
        };

        debug!(?id, "Creating stream from registered creator");
        let upstream = (entry.creator)(discovery);
        Ok(StreamPair::data(discovery.share(id, upstream)))
    }

    fn name(&self) -> &str {
        "creator"
    }
}
