//! Registry behaviour of the discovery service.

use futures::{stream, StreamExt};
use spool_core::prelude::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

fn counting_creator(
    id: &StreamId<i32>,
    values: Vec<i32>,
) -> (IdentifiedStreamCreator, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let creator = IdentifiedStreamCreator::new(id, move |_: &DiscoveryService| {
        counter.fetch_add(1, Ordering::SeqCst);
        stream::iter(values.clone())
    });
    (creator, calls)
}

#[tokio::test]
async fn discover_is_idempotent() {
    let id = StreamId::<i32>::named("counted");
    let (creator, calls) = counting_creator(&id, vec![1, 2]);
    let discovery = DiscoveryService::builder()
        .with_factory(CreatorStreamFactory::new([creator]))
        .build()
        .unwrap();

    let first = discovery.discover(&id).unwrap();
    let second = discovery.discover(&id).unwrap();

    assert!(first.same_stream(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(discovery.metrics().resolutions, 1);
    assert_eq!(discovery.metrics().cache_hits, 1);
}

#[tokio::test]
async fn provided_source_is_shared_not_redrained() {
    let discovery = DiscoveryService::new().unwrap();
    let id = StreamId::<i32>::named("finite");
    discovery.provide(&id, stream::iter(vec![1, 2, 3])).unwrap();

    let first = discovery.discover(&id).unwrap().subscribe();
    let second = discovery.discover(&id).unwrap().subscribe();

    let (first, second): (Vec<i32>, Vec<i32>) = futures::join!(first.collect(), second.collect());
    assert_eq!(first, vec![1, 2, 3]);
    assert_eq!(second, vec![1, 2, 3]);

    let late: Vec<i32> = discovery.discover(&id).unwrap().subscribe().collect().await;
    assert!(late.is_empty());
}

#[tokio::test]
async fn duplicate_provide_is_rejected() {
    let discovery = DiscoveryService::new().unwrap();
    let id = StreamId::<i32>::named("once");
    discovery.provide(&id, stream::iter(vec![1])).unwrap();

    let result = discovery.provide(&id, stream::iter(vec![2]));
    assert!(matches!(result, Err(Error::DuplicateRegistration { .. })));
    assert_eq!(discovery.metrics().provided, 1);
}

#[tokio::test]
async fn provide_after_resolution_is_rejected() {
    let discovery = DiscoveryService::new().unwrap();
    let source = StreamId::<i32>::named("source");
    discovery.provide(&source, stream::iter(vec![1])).unwrap();
    let incremented = mapped(&source, &Conversion::new(|v: &i32| Some(v + 1)));
    discovery.discover(&incremented).unwrap();

    let result = discovery.provide(&incremented, stream::iter(vec![5]));
    assert!(matches!(result, Err(Error::DuplicateRegistration { .. })));
}

#[tokio::test]
async fn unresolved_identity_is_not_memoized() {
    let discovery = DiscoveryService::new().unwrap();
    let id = StreamId::<i32>::named("later");

    let result = discovery.discover(&id);
    assert!(matches!(result, Err(Error::UnresolvedIdentity { .. })));
    assert!(!discovery.is_registered(id.as_any()));

    discovery.provide(&id, stream::iter(vec![7])).unwrap();
    let values: Vec<i32> = discovery.discover(&id).unwrap().subscribe().collect().await;
    assert_eq!(values, vec![7]);
}

#[tokio::test]
async fn composite_over_unresolved_source_fails() {
    let discovery = DiscoveryService::new().unwrap();
    let missing = StreamId::<i32>::named("missing");
    let even = filtered(&missing, &Predicate::new(|v: &i32| v % 2 == 0));

    assert!(matches!(discovery.discover(&even), Err(Error::UnresolvedIdentity { .. })));
}

#[tokio::test]
async fn unregister_all_clears_registry() {
    let discovery = DiscoveryService::new().unwrap();
    let id = StreamId::<i32>::named("numbers");
    discovery.provide(&id, stream::iter(vec![1, 2])).unwrap();
    let live = discovery.discover(&id).unwrap().subscribe();
    assert_eq!(discovery.registered_count(), 1);

    discovery.unregister_all();
    assert_eq!(discovery.registered_count(), 0);
    assert!(matches!(discovery.discover(&id), Err(Error::UnresolvedIdentity { .. })));

    let values: Vec<i32> = live.collect().await;
    assert_eq!(values, vec![1, 2]);

    discovery.provide(&id, stream::iter(vec![3])).unwrap();
    let values: Vec<i32> = discovery.discover(&id).unwrap().subscribe().collect().await;
    assert_eq!(values, vec![3]);
}

#[tokio::test]
async fn provide_unique_mints_distinct_ids() {
    let discovery = DiscoveryService::new().unwrap();
    let first = discovery.provide_unique(stream::iter(vec![1])).unwrap();
    let second = discovery.provide_unique(stream::iter(vec![2])).unwrap();
    assert_ne!(first, second);

    let values: Vec<i32> = discovery.discover(&second).unwrap().subscribe().collect().await;
    assert_eq!(values, vec![2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_discovery_builds_once() {
    let source = StreamId::<i32>::named("source");
    let (creator, calls) = counting_creator(&source, vec![1, 2, 3]);
    let discovery = DiscoveryService::builder()
        .with_factory(CreatorStreamFactory::new([creator]))
        .with_default_factories()
        .build()
        .unwrap();
    let even = filtered(&source, &Predicate::new(|v: &i32| v % 2 == 0));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let discovery = discovery.clone();
            let even = even.clone();
            tokio::spawn(async move { discovery.discover(&even).unwrap() })
        })
        .collect();

    let mut flows = Vec::new();
    for task in tasks {
        flows.push(task.await.unwrap());
    }

    assert!(flows.iter().all(|flow| flow.same_stream(&flows[0])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(discovery.metrics().resolutions, 2);
}

#[tokio::test]
async fn factories_are_tried_in_order() {
    let id = StreamId::<i32>::named("contested");
    let (first, first_calls) = counting_creator(&id, vec![1]);
    let (second, second_calls) = counting_creator(&id, vec![2]);
    let discovery = DiscoveryService::builder()
        .with_factory(CreatorStreamFactory::new([first]))
        .with_factory(CreatorStreamFactory::new([second]))
        .build()
        .unwrap();

    let values: Vec<i32> = discovery.discover(&id).unwrap().subscribe().collect().await;
    assert_eq!(values, vec![1]);
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}
