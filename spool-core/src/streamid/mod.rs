//! Stream identities.
//!
//! A [`StreamId<T>`] names a stream of `T` values and is the key under which the
//! discovery service memoizes it. Identities are cheap to clone (one `Arc`) and
//! compare structurally: the same variant with equal fields. Function values inside
//! composite identities compare by instance, see [`Behavior`].
//!
//! The typed [`StreamId<T>`] is a thin view over the untyped [`AnyStreamId`], which is
//! what factories receive and match on through [`AnyStreamId::kind`].

pub mod behavior;
pub mod buffer;
pub mod composed;

pub use behavior::{
    Behavior, Conversion, FlatConversion, FlatMapFn, MapFn, MatchFn, Matching, Predicate,
    PredicateFn, ZipFn, Zipper,
};
pub use buffer::{
    Assembler, BufferSpecification, BufferSpecificationBuilder, EndMatcher, EndStreamMatcher,
    Timeout,
};
pub use composed::{
    delayed, delayed_with_capacity, filtered, flat_mapped, mapped, merged, overlap_buffered,
    overlap_buffered_with_capacity, zipped,
};

use crate::types::{short_type_name, Payload};
use smallvec::SmallVec;
use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Payload type recorded in leaf identities.
///
/// Compares by `TypeId`; the name is only used for rendering.
#[derive(Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    /// Payload type of `T`
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: short_type_name::<T>() }
    }

    /// Short name of the payload type
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl Hash for PayloadType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Key of a host-defined identity variant.
///
/// Implemented for every `Eq + Hash + Debug + Send + Sync + 'static` type, so any such
/// value can name a stream through [`StreamId::custom`]. Host factories recognise
/// their keys with [`AnyStreamId::custom_key`].
pub trait CustomStreamId: Any + Send + Sync + fmt::Debug {
    /// Upcast for downcasting to the concrete key
    fn as_any(&self) -> &dyn Any;

    /// Equality across erased keys; keys of different types are never equal
    fn dyn_eq(&self, other: &dyn CustomStreamId) -> bool;

    /// Hash including the concrete key type
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<K> CustomStreamId for K
where
    K: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn CustomStreamId) -> bool {
        other.as_any().downcast_ref::<K>().is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Shared, erased [`CustomStreamId`]
#[derive(Clone)]
pub struct CustomKey(Arc<dyn CustomStreamId>);

impl CustomKey {
    /// Borrow the key as `K`, if it has that type
    #[must_use]
    pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
        self.0.as_any().downcast_ref::<K>()
    }
}

impl PartialEq for CustomKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl Eq for CustomKey {}

impl Hash for CustomKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for CustomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Every identity variant the pool understands.
///
/// Factories decide whether they handle an identity with a `match` on this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum IdKind {
    /// A caller-chosen name
    Named {
        /// The name
        name: Arc<str>,
        /// Payload type; the same name with another type is another stream
        payload: PayloadType,
    },
    /// A process-unique identity minted for an anonymously provided stream
    Unique {
        /// Serial number, never reused within the process
        serial: u64,
        /// Payload type
        payload: PayloadType,
    },
    /// Elements of `source` passed through `conversion`
    Mapped {
        /// Source identity
        source: AnyStreamId,
        /// Conversion instance
        conversion: Behavior<MapFn>,
    },
    /// Sub-streams produced from each element of `source`, flattened
    FlatMapped {
        /// Source identity
        source: AnyStreamId,
        /// Conversion instance
        conversion: Behavior<FlatMapFn>,
    },
    /// Elements of `source` for which `predicate` holds
    Filtered {
        /// Source identity
        source: AnyStreamId,
        /// Predicate instance
        predicate: Behavior<PredicateFn>,
    },
    /// Elements of every source, interleaved as they arrive
    Merged {
        /// Source identities, never empty
        sources: SmallVec<[AnyStreamId; 4]>,
    },
    /// Pairwise combination of two sources
    Zipped {
        /// First source
        left: AnyStreamId,
        /// Second source
        right: AnyStreamId,
        /// Pairing instance
        zipper: Behavior<ZipFn>,
    },
    /// Elements of `target` shifted by `delay`
    Delayed {
        /// Delayed identity
        target: AnyStreamId,
        /// Time shift
        delay: Duration,
        /// Overflow buffer capacity; `None` uses the configured default
        capacity: Option<usize>,
    },
    /// Windows over `source` opened and closed as `specification` describes
    OverlapBuffer {
        /// Buffered identity
        source: AnyStreamId,
        /// Window boundaries
        specification: BufferSpecification,
        /// Overflow buffer capacity; `None` uses the configured default
        capacity: Option<usize>,
        /// Builds the typed buffer from the captured elements
        assembler: Assembler,
    },
    /// Host-defined identity, see [`CustomStreamId`]
    Custom {
        /// The key
        key: CustomKey,
        /// Payload type
        payload: PayloadType,
    },
}

/// Untyped stream identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AnyStreamId(Arc<IdKind>);

impl AnyStreamId {
    pub(crate) fn from_kind(kind: IdKind) -> Self {
        Self(Arc::new(kind))
    }

    /// The identity variant
    #[must_use]
    pub fn kind(&self) -> &IdKind {
        &self.0
    }

    /// The key of a [`IdKind::Custom`] identity, if it has type `K`
    #[must_use]
    pub fn custom_key<K: 'static>(&self) -> Option<&K> {
        match self.kind() {
            IdKind::Custom { key, .. } => key.downcast_ref::<K>(),
            _ => None,
        }
    }
}

impl fmt::Debug for AnyStreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Identity of a stream of `T` values.
pub struct StreamId<T> {
    any: AnyStreamId,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> StreamId<T> {
    /// Identity named by `name`
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::from_kind(IdKind::Named { name: name.into(), payload: PayloadType::of::<T>() })
    }

    /// Identity named by a host-defined key
    pub fn custom<K>(key: K) -> Self
    where
        K: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        Self::from_kind(IdKind::Custom {
            key: CustomKey(Arc::new(key)),
            payload: PayloadType::of::<T>(),
        })
    }

    /// A fresh identity, distinct from every other identity in the process
    pub fn unique() -> Self {
        let serial = NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed);
        Self::from_kind(IdKind::Unique { serial, payload: PayloadType::of::<T>() })
    }

    pub(crate) fn from_kind(kind: IdKind) -> Self {
        Self::from_any(AnyStreamId::from_kind(kind))
    }
}

impl<T> StreamId<T> {
    /// Reinterpret an untyped identity as naming a stream of `T`.
    ///
    /// Elements that turn out not to be `T` are skipped by typed subscriptions.
    pub fn from_any(any: AnyStreamId) -> Self {
        Self { any, _payload: PhantomData }
    }

    /// The untyped identity
    #[must_use]
    pub fn as_any(&self) -> &AnyStreamId {
        &self.any
    }

    /// Convert into the untyped identity
    #[must_use]
    pub fn into_any(self) -> AnyStreamId {
        self.any
    }

    /// The identity variant
    #[must_use]
    pub fn kind(&self) -> &IdKind {
        self.any.kind()
    }
}

impl<T> Clone for StreamId<T> {
    fn clone(&self) -> Self {
        Self { any: self.any.clone(), _payload: PhantomData }
    }
}

impl<T> PartialEq for StreamId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.any == other.any
    }
}

impl<T> Eq for StreamId<T> {}

impl<T> Hash for StreamId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.any.hash(state);
    }
}

impl<T> fmt::Debug for StreamId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.any, f)
    }
}

impl<T> From<StreamId<T>> for AnyStreamId {
    fn from(id: StreamId<T>) -> Self {
        id.any
    }
}
