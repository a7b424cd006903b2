use std::iter::{Chain, FusedIterator};
use std::slice;

/// A non-owning view over a possibly wrapped region of a ring.
///
/// The region is stored as two contiguous spans: `first` runs from the start
/// index towards the physical end of the array, `second` continues from index
/// zero. `second` is only non-empty when `first` reaches the physical end.
///
/// The view borrows the ring's storage; it never outlives it and never drops
/// anything.
#[derive(Debug)]
pub struct RingRange<'a, T> {
    first: &'a [T],
    second: &'a [T],
}

impl<T> Clone for RingRange<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RingRange<'_, T> {}

impl<T> Default for RingRange<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, T> RingRange<'a, T> {
    /// Creates a view from its two spans.
    #[inline]
    pub fn new(first: &'a [T], second: &'a [T]) -> Self {
        Self { first, second }
    }

    /// An empty view.
    #[inline]
    pub fn empty() -> Self {
        Self {
            first: &[],
            second: &[],
        }
    }

    /// The span before the wrap point.
    #[inline]
    pub fn first(&self) -> &'a [T] {
        self.first
    }

    /// The span after the wrap point (empty if the view does not wrap).
    #[inline]
    pub fn second(&self) -> &'a [T] {
        self.second
    }

    /// Number of elements across both spans.
    #[inline]
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.second.is_empty()
    }

    /// Returns `true` if the view crosses the physical end of the array.
    #[inline]
    pub fn is_wrapped(&self) -> bool {
        !self.second.is_empty()
    }

    /// Visits every element in logical order.
    ///
    /// Stops at the first element for which `visit` returns `false` and
    /// reports whether the walk ran to completion.
    pub fn for_each<F>(&self, visit: F) -> bool
    where
        F: FnMut(&'a T) -> bool,
    {
        self.first.iter().chain(self.second).all(visit)
    }

    /// Returns the first `n` logical elements as a new view.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.len()`; asking for more than the view holds is a
    /// caller bug.
    pub fn take(&self, n: usize) -> Self {
        assert!(
            n <= self.len(),
            "RingRange::take({}) exceeds range length {}",
            n,
            self.len()
        );

        if n <= self.first.len() {
            Self::new(&self.first[..n], &[])
        } else {
            Self::new(self.first, &self.second[..n - self.first.len()])
        }
    }

    /// Iterates over the elements in logical order.
    #[inline]
    pub fn iter(&self) -> Iter<'a, T> {
        Iter {
            inner: self.first.iter().chain(self.second.iter()),
        }
    }
}

impl<'a, T> IntoIterator for RingRange<'a, T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`RingRange`].
#[derive(Debug, Clone)]
pub struct Iter<'a, T> {
    inner: Chain<slice::Iter<'a, T>, slice::Iter<'a, T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}
