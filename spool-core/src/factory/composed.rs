//! Map, flat-map, filter, merge and zip.

use crate::{
    discovery::DiscoveryService,
    error::StreamError,
    factory::{error_channel, StreamFactory},
    stream::{until_error, StreamPair},
    streamid::{AnyStreamId, Behavior, FlatMapFn, IdKind, MapFn, PredicateFn, ZipFn},
    types::Value,
    Result,
};
use futures::{
    channel::mpsc,
    future,
    stream::{self, BoxStream, Stream, StreamExt},
};
use tracing::debug;

/// Builds mapped, flat-mapped, filtered, merged and zipped streams
#[derive(Debug, Default, Clone, Copy)]
pub struct CompositionStreamFactory;

impl CompositionStreamFactory {
    /// Create the factory
    pub fn new() -> Self {
        Self
    }
}

impl StreamFactory for CompositionStreamFactory {
    fn create(&self, id: &AnyStreamId, discovery: &DiscoveryService) -> Result<StreamPair> {
        match id.kind() {
            IdKind::Mapped { source, conversion } => {
                let sources = vec![discovery.resolve(source)?];
                Ok(derive(discovery, id, sources, map_operator(conversion.clone())))
            },
            IdKind::FlatMapped { source, conversion } => {
                let sources = vec![discovery.resolve(source)?];
                Ok(derive(discovery, id, sources, flat_map_operator(conversion.clone())))
            },
            IdKind::Filtered { source, predicate } => {
                let sources = vec![discovery.resolve(source)?];
                Ok(derive(discovery, id, sources, filter_operator(predicate.clone())))
            },
            IdKind::Merged { sources } => {
                let sources = sources
                    .iter()
                    .map(|source| discovery.resolve(source))
                    .collect::<Result<Vec<_>>>()?;
                Ok(derive(discovery, id, sources, merge_operator))
            },
            IdKind::Zipped { left, right, zipper } => {
                let sources = vec![discovery.resolve(left)?, discovery.resolve(right)?];
                Ok(derive(discovery, id, sources, zip_operator(zipper.clone())))
            },
            _ => Ok(StreamPair::empty()),
        }
    }

    fn name(&self) -> &str {
        "composition"
    }
}

type Inputs = Vec<BoxStream<'static, Value>>;

/// Share the stream `operator` builds over the data channels of `sources`.
///
/// The operator runs on first subscription, with one subscription per source in
/// the order given.
fn derive<F, S>(
    discovery: &DiscoveryService,
    id: &AnyStreamId,
    sources: Vec<StreamPair>,
    operator: F,
) -> StreamPair
where
    F: FnOnce(Inputs) -> S + Send + 'static,
    S: Stream<Item = std::result::Result<Option<Value>, StreamError>> + Send + 'static,
{
    debug!(?id, sources = sources.len(), "Composing stream");
    let (failures_tx, failures_rx) = mpsc::unbounded();
    let inputs = sources.clone();
    let data = discovery.share_deferred(id, move || {
        let subscriptions = inputs.iter().map(StreamPair::subscribe_data).collect();
        until_error(operator(subscriptions), failures_tx).boxed()
    });
    let error = error_channel(discovery, id, failures_rx, sources);
    StreamPair::data_and_error(data, error)
}

fn single(inputs: Inputs) -> BoxStream<'static, Value> {
    inputs.into_iter().next().unwrap_or_else(|| stream::empty().boxed())
}

fn map_operator(
    conversion: Behavior<MapFn>,
) -> impl FnOnce(Inputs) -> BoxStream<'static, std::result::Result<Option<Value>, StreamError>> {
    move |inputs| single(inputs).map(move |value| (conversion.get())(&value)).boxed()
}

fn filter_operator(
    predicate: Behavior<PredicateFn>,
) -> impl FnOnce(Inputs) -> BoxStream<'static, std::result::Result<Option<Value>, StreamError>> {
    move |inputs| {
        single(inputs)
            .map(move |value| {
                let verdict = (predicate.get())(&value);
                verdict.map(|keep| keep.then_some(value))
            })
            .boxed()
    }
}

fn flat_map_operator(
    conversion: Behavior<FlatMapFn>,
) -> impl FnOnce(Inputs) -> BoxStream<'static, std::result::Result<Option<Value>, StreamError>> {
    move |inputs| {
        single(inputs)
            .flat_map_unordered(None::<usize>, move |value| match (conversion.get())(&value) {
                Ok(inner) => inner.map(|item| Ok(Some(item))).boxed(),
                Err(error) => stream::once(future::ready(Err(error))).boxed(),
            })
            .boxed()
    }
}

fn merge_operator(
    inputs: Inputs,
) -> BoxStream<'static, std::result::Result<Option<Value>, StreamError>> {
    stream::select_all(inputs).map(|value| Ok(Some(value))).boxed()
}

fn zip_operator(
    zipper: Behavior<ZipFn>,
) -> impl FnOnce(Inputs) -> BoxStream<'static, std::result::Result<Option<Value>, StreamError>> {
    move |inputs| {
        let mut inputs = inputs.into_iter();
        let left = inputs.next().unwrap_or_else(|| stream::empty().boxed());
        let right = inputs.next().unwrap_or_else(|| stream::empty().boxed());
        left.zip(right).map(move |(a, b)| (zipper.get())(&a, &b)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamid::{filtered, Predicate, StreamId};

    #[tokio::test]
    async fn test_declines_other_variants() {
        let discovery = DiscoveryService::builder().build().unwrap();
        let factory = CompositionStreamFactory::new();

        let pair = factory.create(StreamId::<i32>::named("leaf").as_any(), &discovery).unwrap();
        assert!(pair.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_source_fails() {
        let discovery = DiscoveryService::builder().build().unwrap();
        let factory = CompositionStreamFactory::new();
        let source = StreamId::<i32>::named("missing");
        let id = filtered(&source, &Predicate::new(|_: &i32| true));

        let result = factory.create(id.as_any(), &discovery);
        assert!(matches!(result, Err(crate::Error::UnresolvedIdentity { .. })));
    }
}
