//! Stream factories.
//!
//! A factory inspects an identity and either declines with an empty
//! [`StreamPair`] or builds the stream for it. The discovery service asks its
//! factories in order and keeps the first non-empty answer.

pub mod composed;
pub mod creator;
pub mod delayed;
pub mod overlap_buffer;

pub use composed::CompositionStreamFactory;
pub use creator::{CreatorStreamFactory, IdentifiedStreamCreator};
pub use delayed::DelayedStreamFactory;
pub use overlap_buffer::OverlapBufferStreamFactory;

use crate::{
    discovery::DiscoveryService,
    stream::{SharedStream, StreamPair},
    streamid::AnyStreamId,
    types::Value,
    Result,
};
use futures::{
    channel::mpsc::UnboundedReceiver,
    stream::{self, StreamExt},
};
use std::sync::Arc;

/// Strategy turning identities into streams.
pub trait StreamFactory: Send + Sync {
    /// Build the stream for `id`, or return [`StreamPair::empty`] to decline.
    ///
    /// Errors are reserved for identities the factory handles but cannot build,
    /// typically because a dependency failed to resolve.
    fn create(&self, id: &AnyStreamId, discovery: &DiscoveryService) -> Result<StreamPair>;

    /// Name used in log lines
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The built-in factories: composition, delay, overlap buffer
pub fn default_factories() -> Vec<Arc<dyn StreamFactory>> {
    vec![
        Arc::new(CompositionStreamFactory::new()),
        Arc::new(DelayedStreamFactory::new()),
        Arc::new(OverlapBufferStreamFactory::new()),
    ]
}

/// Error channel of a derived stream: its own failures merged with its sources'.
///
/// Source error channels are subscribed when the channel itself is first
/// subscribed.
pub(crate) fn error_channel(
    discovery: &DiscoveryService,
    id: &AnyStreamId,
    failures: UnboundedReceiver<Value>,
    sources: Vec<StreamPair>,
) -> SharedStream {
    discovery.share_deferred(id, move || {
        let mut channels = vec![failures.boxed()];
        channels.extend(
            sources
                .iter()
                .filter(|pair| pair.error_stream().is_some())
                .map(StreamPair::subscribe_error),
        );
        stream::select_all(channels).boxed()
    })
}
