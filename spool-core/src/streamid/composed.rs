//! Constructors for composite identities.
//!
//! Every constructor validates its arguments immediately; nothing here touches a
//! discovery service. The resulting identity only describes the stream, which is
//! built by a factory on first discovery.

use crate::{
    streamid::{
        Assembler, BufferSpecification, Conversion, FlatConversion, IdKind, Predicate, StreamId,
        Zipper,
    },
    types::Payload,
    Error, Result,
};
use smallvec::SmallVec;
use std::time::Duration;

/// Elements of `source` converted by `conversion`; `None` results are dropped
pub fn mapped<S: Payload, T: Payload>(
    source: &StreamId<S>,
    conversion: &Conversion<S, T>,
) -> StreamId<T> {
    StreamId::from_kind(IdKind::Mapped {
        source: source.as_any().clone(),
        conversion: conversion.behavior().clone(),
    })
}

/// Sub-streams produced from each element of `source`, flattened concurrently
pub fn flat_mapped<S: Payload, T: Payload>(
    source: &StreamId<S>,
    conversion: &FlatConversion<S, T>,
) -> StreamId<T> {
    StreamId::from_kind(IdKind::FlatMapped {
        source: source.as_any().clone(),
        conversion: conversion.behavior().clone(),
    })
}

/// Elements of `source` for which `predicate` holds
pub fn filtered<T: Payload>(source: &StreamId<T>, predicate: &Predicate<T>) -> StreamId<T> {
    StreamId::from_kind(IdKind::Filtered {
        source: source.as_any().clone(),
        predicate: predicate.behavior().clone(),
    })
}

/// Elements of all `sources`, interleaved as they arrive.
///
/// Fails with [`Error::EmptySources`] when `sources` is empty.
pub fn merged<'a, T, I>(sources: I) -> Result<StreamId<T>>
where
    T: Payload,
    I: IntoIterator<Item = &'a StreamId<T>>,
{
    let sources: SmallVec<[_; 4]> = sources.into_iter().map(|id| id.as_any().clone()).collect();
    if sources.is_empty() {
        return Err(Error::EmptySources { operation: "merge" });
    }
    Ok(StreamId::from_kind(IdKind::Merged { sources }))
}

/// The n-th elements of `left` and `right` combined by `zipper`
pub fn zipped<A: Payload, B: Payload, T: Payload>(
    left: &StreamId<A>,
    right: &StreamId<B>,
    zipper: &Zipper<A, B, T>,
) -> StreamId<T> {
    StreamId::from_kind(IdKind::Zipped {
        left: left.as_any().clone(),
        right: right.as_any().clone(),
        zipper: zipper.behavior().clone(),
    })
}

/// Elements of `target` shifted by `delay`.
///
/// The overflow buffer gets the capacity configured on the discovering service.
pub fn delayed<T: Payload>(target: &StreamId<T>, delay: Duration) -> StreamId<T> {
    StreamId::from_kind(IdKind::Delayed { target: target.as_any().clone(), delay, capacity: None })
}

/// Elements of `target` shifted by `delay`, at most `capacity` of them waiting.
///
/// Fails with [`Error::Configuration`] when `capacity` is zero.
pub fn delayed_with_capacity<T: Payload>(
    target: &StreamId<T>,
    delay: Duration,
    capacity: usize,
) -> Result<StreamId<T>> {
    check_capacity(capacity)?;
    Ok(StreamId::from_kind(IdKind::Delayed {
        target: target.as_any().clone(),
        delay,
        capacity: Some(capacity),
    }))
}

/// Windows over `source`, buffered with the configured default capacity
pub fn overlap_buffered<S: Payload>(
    source: &StreamId<S>,
    specification: BufferSpecification,
) -> StreamId<Vec<S>> {
    StreamId::from_kind(IdKind::OverlapBuffer {
        source: source.as_any().clone(),
        specification,
        capacity: None,
        assembler: Assembler::of::<S>(),
    })
}

/// Windows over `source`, at most `capacity` finished windows waiting.
///
/// Fails with [`Error::Configuration`] when `capacity` is zero.
pub fn overlap_buffered_with_capacity<S: Payload>(
    source: &StreamId<S>,
    specification: BufferSpecification,
    capacity: usize,
) -> Result<StreamId<Vec<S>>> {
    check_capacity(capacity)?;
    Ok(StreamId::from_kind(IdKind::OverlapBuffer {
        source: source.as_any().clone(),
        specification,
        capacity: Some(capacity),
        assembler: Assembler::of::<S>(),
    }))
}

fn check_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(Error::Configuration("Backpressure buffer capacity must be positive".into()));
    }
    Ok(())
}
