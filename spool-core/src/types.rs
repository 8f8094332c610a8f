//! Common types used throughout the Spool system.

use std::any::Any;
use std::sync::Arc;

/// Type-erased stream element.
///
/// Every element travelling through a shared stream is carried as a `Value`. Typed
/// views ([`Flow`](crate::stream::Flow), [`Subscription`](crate::stream::Subscription))
/// downcast back to the payload type their identity declares.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Bound shared by every payload type a stream can carry.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// Wraps a payload into a [`Value`].
#[inline]
pub fn erase<T: Payload>(value: T) -> Value {
    Arc::new(value)
}

/// Borrows the payload held by a [`Value`], if it has type `T`.
#[inline]
#[must_use]
pub fn downcast<T: Payload>(value: &Value) -> Option<&T> {
    value.downcast_ref::<T>()
}

/// Short type name used in identity renderings and log lines.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    match full.find('<') {
        Some(generic_start) => {
            let head = &full[..generic_start];
            match head.rfind("::") {
                Some(pos) => &full[pos + 2..],
                None => full,
            }
        },
        None => full.rsplit("::").next().unwrap_or(full),
    }
}
