//! Window boundaries for overlap-buffered streams.

use crate::{
    streamid::{behavior::MatchFn, AnyStreamId, Behavior, Matching, PayloadType, StreamId},
    types::{downcast, erase, Payload, Value},
    Error, Result,
};
use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    time::Duration,
};

/// How long a window may stay open when no end matcher closes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Each window closes this long after it opened
    After(Duration),
    /// Any value on this stream closes every open window
    Stream(AnyStreamId),
}

impl Timeout {
    /// Timeout driven by the values of a discovered stream
    pub fn stream<T>(id: &StreamId<T>) -> Self {
        Self::Stream(id.as_any().clone())
    }
}

/// Untyped end matcher stored in a [`BufferSpecification`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndMatcher {
    /// Stream whose values are candidate closing signals
    pub end: AnyStreamId,
    /// Test over `(opening value, candidate)`
    pub matching: Behavior<MatchFn>,
}

/// Closing condition for windows opened by values of type `O`.
pub struct EndStreamMatcher<O> {
    matcher: EndMatcher,
    _opening: PhantomData<fn(&O)>,
}

impl<O: Payload> EndStreamMatcher<O> {
    /// Close a window when `end` yields a value for which `matching` holds
    pub fn new<E: Payload>(end: &StreamId<E>, matching: &Matching<O, E>) -> Self {
        Self {
            matcher: EndMatcher {
                end: end.as_any().clone(),
                matching: matching.behavior().clone(),
            },
            _opening: PhantomData,
        }
    }

    /// Close a window on any value of `end`
    pub fn on_any<E: Payload>(end: &StreamId<E>) -> Self {
        Self::new(end, &Matching::any())
    }
}

impl<O> Clone for EndStreamMatcher<O> {
    fn clone(&self) -> Self {
        Self { matcher: self.matcher.clone(), _opening: PhantomData }
    }
}

impl<O> fmt::Debug for EndStreamMatcher<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.matcher, f)
    }
}

/// Set of end matchers, kept in first-declared order.
///
/// Equality and hashing ignore order; duplicates are never stored.
#[derive(Clone, Default)]
struct EndMatchers(Vec<EndMatcher>);

impl EndMatchers {
    fn insert(&mut self, matcher: EndMatcher) {
        if !self.0.contains(&matcher) {
            self.0.push(matcher);
        }
    }
}

impl PartialEq for EndMatchers {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|matcher| other.0.contains(matcher))
    }
}

impl Eq for EndMatchers {}

impl Hash for EndMatchers {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let combined = self.0.iter().fold(0u64, |acc, matcher| {
            let mut hasher = DefaultHasher::new();
            matcher.hash(&mut hasher);
            acc.wrapping_add(hasher.finish())
        });
        self.0.len().hash(state);
        combined.hash(state);
    }
}

impl fmt::Debug for EndMatchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(&self.0).finish()
    }
}

/// Immutable description of where windows open and close.
///
/// The end matchers form a set: listing them in another order, or listing one
/// twice, describes the same specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferSpecification {
    start: AnyStreamId,
    end_matchers: EndMatchers,
    timeout: Timeout,
}

impl BufferSpecification {
    /// Start building a specification whose windows are opened by values of `O`
    pub fn builder<O: Payload>() -> BufferSpecificationBuilder<O> {
        BufferSpecificationBuilder::default()
    }

    /// Stream whose values open windows
    #[must_use]
    pub fn start(&self) -> &AnyStreamId {
        &self.start
    }

    /// Closing conditions, in first-declared order
    #[must_use]
    pub fn end_matchers(&self) -> &[EndMatcher] {
        &self.end_matchers.0
    }

    /// Fallback closing condition
    #[must_use]
    pub fn timeout(&self) -> &Timeout {
        &self.timeout
    }
}

/// Builder for [`BufferSpecification`].
pub struct BufferSpecificationBuilder<O> {
    start: Option<AnyStreamId>,
    end_matchers: EndMatchers,
    timeout: Option<Timeout>,
    _opening: PhantomData<fn(&O)>,
}

impl<O> Default for BufferSpecificationBuilder<O> {
    fn default() -> Self {
        Self {
            start: None,
            end_matchers: EndMatchers::default(),
            timeout: None,
            _opening: PhantomData,
        }
    }
}

impl<O: Payload> BufferSpecificationBuilder<O> {
    /// Stream whose values open windows
    #[must_use]
    pub fn start(mut self, start: &StreamId<O>) -> Self {
        self.start = Some(start.as_any().clone());
        self
    }

    /// Add a closing condition; adding the same matcher again has no effect
    #[must_use]
    pub fn end_matcher(mut self, matcher: EndStreamMatcher<O>) -> Self {
        self.end_matchers.insert(matcher.matcher);
        self
    }

    /// Set the fallback closing condition
    #[must_use]
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Finish the specification.
    ///
    /// Fails with [`Error::NullArgument`] when the start stream or the timeout was
    /// never set.
    pub fn build(self) -> Result<BufferSpecification> {
        let start = self.start.ok_or(Error::NullArgument { argument: "start" })?;
        let timeout = self.timeout.ok_or(Error::NullArgument { argument: "timeout" })?;
        Ok(BufferSpecification { start, end_matchers: self.end_matchers, timeout })
    }
}

/// Turns the elements captured by one window into a typed `Vec<S>` value.
#[derive(Clone, Copy)]
pub struct Assembler {
    element: PayloadType,
    assemble: fn(Vec<Value>) -> Value,
}

impl Assembler {
    /// Assembler producing `Vec<S>`
    #[must_use]
    pub fn of<S: Payload>() -> Self {
        Self { element: PayloadType::of::<S>(), assemble: assemble_vec::<S> }
    }

    /// Build the buffer value
    #[must_use]
    pub fn assemble(&self, items: Vec<Value>) -> Value {
        (self.assemble)(items)
    }
}

fn assemble_vec<S: Payload>(items: Vec<Value>) -> Value {
    erase(items.iter().filter_map(|item| downcast::<S>(item).cloned()).collect::<Vec<S>>())
}

impl PartialEq for Assembler {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
    }
}

impl Eq for Assembler {}

impl Hash for Assembler {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.element.hash(state);
    }
}

impl fmt::Debug for Assembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec<{:?}>", self.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_start() {
        let result = BufferSpecification::builder::<i32>()
            .timeout(Timeout::After(Duration::from_secs(1)))
            .build();
        assert_eq!(result, Err(Error::NullArgument { argument: "start" }));
    }

    #[test]
    fn test_missing_timeout() {
        let start = StreamId::<i32>::named("start");
        let result = BufferSpecification::builder().start(&start).build();
        assert_eq!(result, Err(Error::NullArgument { argument: "timeout" }));
    }

    fn hash_of<H: Hash>(value: &H) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn specification(matchers: &[&EndStreamMatcher<i32>]) -> BufferSpecification {
        let start = StreamId::<i32>::named("start");
        matchers
            .iter()
            .fold(BufferSpecification::builder().start(&start), |builder, matcher| {
                builder.end_matcher((*matcher).clone())
            })
            .timeout(Timeout::After(Duration::from_millis(50)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_matchers_compare_as_set() {
        let first = EndStreamMatcher::<i32>::on_any(&StreamId::<i32>::named("a"));
        let second = EndStreamMatcher::<i32>::on_any(&StreamId::<i32>::named("b"));

        let forward = specification(&[&first, &second]);
        let reversed = specification(&[&second, &first]);
        assert_eq!(forward, reversed);
        assert_eq!(hash_of(&forward), hash_of(&reversed));

        let single = specification(&[&first]);
        let duplicated = specification(&[&first, &first]);
        assert_eq!(single, duplicated);
        assert_eq!(hash_of(&single), hash_of(&duplicated));
        assert_eq!(duplicated.end_matchers().len(), 1);

        assert_ne!(single, forward);
        assert_ne!(single, specification(&[&second]));
    }

    #[test]
    fn test_matchers_keep_declaration_order() {
        let a = StreamId::<i32>::named("a");
        let b = StreamId::<i32>::named("b");
        let first = EndStreamMatcher::<i32>::on_any(&a);
        let second = EndStreamMatcher::<i32>::on_any(&b);

        let spec = specification(&[&second, &first, &second]);
        let ends: Vec<&AnyStreamId> = spec.end_matchers().iter().map(|m| &m.end).collect();
        assert_eq!(ends, vec![b.as_any(), a.as_any()]);
    }

    #[test]
    fn test_assembler_builds_typed_vec() {
        let assembler = Assembler::of::<i32>();
        let value = assembler.assemble(vec![erase(1_i32), erase(2_i32)]);
        assert_eq!(downcast::<Vec<i32>>(&value), Some(&vec![1, 2]));
    }
}
