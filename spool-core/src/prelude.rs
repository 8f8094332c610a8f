//! # Prelude
//!
//! The prelude module provides convenient access to commonly used types and traits
//! from the Spool Core library.

pub use crate::{
    config::PoolConfig,
    discovery::DiscoveryService,
    error::{Error, Result, StreamError},
    factory::{CreatorStreamFactory, IdentifiedStreamCreator, StreamFactory},
    stream::{DataErrorPair, Flow, StreamPair, Subscription},
    streamid::{
        delayed, delayed_with_capacity, filtered, flat_mapped, mapped, merged, overlap_buffered,
        overlap_buffered_with_capacity, zipped, AnyStreamId, BufferSpecification, Conversion,
        EndStreamMatcher, FlatConversion, IdKind, Matching, Predicate, StreamId, Timeout, Zipper,
    },
    types::{Payload, Value},
};
