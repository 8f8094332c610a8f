//! Runtime side of the pool: shared streams, typed flows and overflow buffering.

pub(crate) mod backpressure;
pub mod flow;
pub mod multicast;
pub mod pair;

pub use flow::{Flow, Subscription};
pub use multicast::{Connector, MulticastContext, RawSubscription, SharedStream};
pub use pair::{DataErrorPair, StreamPair};

pub(crate) use backpressure::OverflowBuffer;

use crate::{
    error::StreamError,
    types::{erase, Value},
};
use futures::{
    channel::mpsc::UnboundedSender,
    future,
    stream::{Stream, StreamExt},
};
use tracing::warn;

/// Forward successful elements until the first failure.
///
/// `Ok(None)` elements are dropped. The first `Err` is sent to `errors` and ends the
/// returned stream.
pub fn until_error<S>(results: S, errors: UnboundedSender<Value>) -> impl Stream<Item = Value>
where
    S: Stream<Item = Result<Option<Value>, StreamError>>,
{
    results
        .scan(errors, |errors, result| {
            let next = match result {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!(%error, "Stream terminated by element failure");
                    // The error channel may have no subscriber left.
                    let _ = errors.unbounded_send(erase(error));
                    None
                },
            };
            future::ready(next)
        })
        .filter_map(future::ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::downcast;
    use futures::{channel::mpsc, stream};

    #[tokio::test]
    async fn test_until_error_stops_at_first_failure() {
        let (errors, mut received) = mpsc::unbounded();
        let results = stream::iter(vec![
            Ok(Some(erase(1_i32))),
            Ok(None),
            Ok(Some(erase(2_i32))),
            Err(StreamError::Predicate("boom".to_string())),
            Ok(Some(erase(3_i32))),
        ]);

        let data: Vec<Value> = until_error(results, errors).collect().await;
        let data: Vec<i32> = data.iter().filter_map(|v| downcast::<i32>(v).copied()).collect();
        assert_eq!(data, vec![1, 2]);

        let error = received.next().await.unwrap();
        assert_eq!(
            downcast::<StreamError>(&error),
            Some(&StreamError::Predicate("boom".to_string()))
        );
    }
}
