//! Function values that take part in identity equality.
//!
//! A [`Behavior`] compares and hashes by the address of the shared function
//! instance. Cloning a behavior shares the instance, so clones stay equal;
//! two closures built separately are never equal, even when their code is
//! identical. The typed wrappers below ([`Conversion`], [`FlatConversion`],
//! [`Predicate`], [`Zipper`], [`Matching`]) each own one behavior and erase the
//! payload types so the identity enum stays non-generic.

use crate::{
    error::StreamError,
    types::{downcast, erase, short_type_name, Payload, Value},
};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::Arc,
};

/// Erased element conversion: `None` drops the element
pub type MapFn = dyn Fn(&Value) -> Result<Option<Value>, StreamError> + Send + Sync;

/// Erased conversion into a sub-stream
pub type FlatMapFn = dyn Fn(&Value) -> Result<BoxStream<'static, Value>, StreamError> + Send + Sync;

/// Erased element predicate
pub type PredicateFn = dyn Fn(&Value) -> Result<bool, StreamError> + Send + Sync;

/// Erased pairing function: `None` skips the pair
pub type ZipFn = dyn Fn(&Value, &Value) -> Result<Option<Value>, StreamError> + Send + Sync;

/// Erased window-closing test over `(opening, candidate)`
pub type MatchFn = dyn Fn(&Value, &Value) -> Result<bool, StreamError> + Send + Sync;

/// Identity token around a shared function instance.
pub struct Behavior<F: ?Sized>(Arc<F>);

impl<F: ?Sized> Behavior<F> {
    /// Wrap an already shared function instance
    pub fn from_arc(function: Arc<F>) -> Self {
        Self(function)
    }

    /// Borrow the wrapped function
    #[must_use]
    pub fn get(&self) -> &F {
        &self.0
    }

    /// True when both tokens wrap the same function instance
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        self.address() == other.address()
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl<F: ?Sized> Clone for Behavior<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> PartialEq for Behavior<F> {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other)
    }
}

impl<F: ?Sized> Eq for Behavior<F> {}

impl<F: ?Sized> Hash for Behavior<F> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl<F: ?Sized> fmt::Debug for Behavior<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Behavior@{:#x}", self.address())
    }
}

fn input<T: Payload>(value: &Value) -> Result<&T, StreamError> {
    downcast::<T>(value).ok_or(StreamError::TypeMismatch { expected: short_type_name::<T>() })
}

macro_rules! typed_behavior {
    ($name:ident < $($param:ident),+ >, $erased:ty) => {
        impl<$($param),+> Clone for $name<$($param),+> {
            fn clone(&self) -> Self {
                Self { behavior: self.behavior.clone(), _types: PhantomData }
            }
        }

        impl<$($param),+> PartialEq for $name<$($param),+> {
            fn eq(&self, other: &Self) -> bool {
                self.behavior == other.behavior
            }
        }

        impl<$($param),+> Eq for $name<$($param),+> {}

        impl<$($param),+> Hash for $name<$($param),+> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.behavior.hash(state);
            }
        }

        impl<$($param),+> fmt::Debug for $name<$($param),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.behavior).finish()
            }
        }

        impl<$($param),+> $name<$($param),+> {
            /// Identity token of the wrapped function
            #[must_use]
            pub fn behavior(&self) -> &Behavior<$erased> {
                &self.behavior
            }
        }
    };
}

/// Element conversion from `S` to `T` used by mapped streams.
///
/// Returning `None` drops the element.
pub struct Conversion<S, T> {
    behavior: Behavior<MapFn>,
    _types: PhantomData<fn(&S) -> T>,
}

impl<S: Payload, T: Payload> Conversion<S, T> {
    /// Wrap an infallible conversion
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&S) -> Option<T> + Send + Sync + 'static,
    {
        Self::try_new(move |value: &S| Ok::<_, std::convert::Infallible>(function(value)))
    }

    /// Wrap a conversion whose failures are reported on the error channel
    pub fn try_new<F, E>(function: F) -> Self
    where
        F: Fn(&S) -> Result<Option<T>, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let erased: Arc<MapFn> =
            Arc::new(move |value: &Value| -> Result<Option<Value>, StreamError> {
                function(input::<S>(value)?)
                    .map(|converted| converted.map(erase))
                    .map_err(|e| StreamError::Conversion(e.to_string()))
            });
        Self { behavior: Behavior::from_arc(erased), _types: PhantomData }
    }
}

typed_behavior!(Conversion<S, T>, MapFn);

/// Conversion from `S` into a stream of `T` used by flat-mapped streams.
pub struct FlatConversion<S, T> {
    behavior: Behavior<FlatMapFn>,
    _types: PhantomData<fn(&S) -> T>,
}

impl<S: Payload, T: Payload> FlatConversion<S, T> {
    /// Wrap a function producing one sub-stream per element
    pub fn new<F, St>(function: F) -> Self
    where
        F: Fn(&S) -> St + Send + Sync + 'static,
        St: Stream<Item = T> + Send + 'static,
    {
        let erased: Arc<FlatMapFn> =
            Arc::new(move |value: &Value| -> Result<BoxStream<'static, Value>, StreamError> {
                Ok(function(input::<S>(value)?).map(erase).boxed())
            });
        Self { behavior: Behavior::from_arc(erased), _types: PhantomData }
    }
}

typed_behavior!(FlatConversion<S, T>, FlatMapFn);

/// Element predicate used by filtered streams.
pub struct Predicate<T> {
    behavior: Behavior<PredicateFn>,
    _types: PhantomData<fn(&T)>,
}

impl<T: Payload> Predicate<T> {
    /// Wrap an infallible predicate
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::try_new(move |value: &T| Ok::<_, std::convert::Infallible>(function(value)))
    }

    /// Wrap a predicate whose failures are reported on the error channel
    pub fn try_new<F, E>(function: F) -> Self
    where
        F: Fn(&T) -> Result<bool, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let erased: Arc<PredicateFn> = Arc::new(move |value: &Value| -> Result<bool, StreamError> {
            function(input::<T>(value)?).map_err(|e| StreamError::Predicate(e.to_string()))
        });
        Self { behavior: Behavior::from_arc(erased), _types: PhantomData }
    }
}

typed_behavior!(Predicate<T>, PredicateFn);

/// Pairing function used by zipped streams.
///
/// Returning `None` skips the pair.
pub struct Zipper<A, B, T> {
    behavior: Behavior<ZipFn>,
    _types: PhantomData<fn(&A, &B) -> T>,
}

impl<A: Payload, B: Payload, T: Payload> Zipper<A, B, T> {
    /// Wrap a pairing function
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&A, &B) -> Option<T> + Send + Sync + 'static,
    {
        let erased: Arc<ZipFn> =
            Arc::new(move |left: &Value, right: &Value| -> Result<Option<Value>, StreamError> {
                Ok(function(input::<A>(left)?, input::<B>(right)?).map(erase))
            });
        Self { behavior: Behavior::from_arc(erased), _types: PhantomData }
    }
}

typed_behavior!(Zipper<A, B, T>, ZipFn);

/// Window-closing test: `(opening value, candidate closing value) -> closes?`
pub struct Matching<O, E> {
    behavior: Behavior<MatchFn>,
    _types: PhantomData<fn(&O, &E)>,
}

impl<O: Payload, E: Payload> Matching<O, E> {
    /// Wrap a binary predicate
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&O, &E) -> bool + Send + Sync + 'static,
    {
        let erased: Arc<MatchFn> =
            Arc::new(move |opening: &Value, candidate: &Value| -> Result<bool, StreamError> {
                Ok(function(input::<O>(opening)?, input::<E>(candidate)?))
            });
        Self { behavior: Behavior::from_arc(erased), _types: PhantomData }
    }

    /// Matcher that closes on any candidate value
    pub fn any() -> Self {
        Self::new(|_: &O, _: &E| true)
    }
}

typed_behavior!(Matching<O, E>, MatchFn);
