/// A fixed-length buffer of request parts, filled in any order.
///
/// Every slot starts empty. [`RequestBuffer::set`] overwrites a slot (last
/// write wins) and [`RequestBuffer::is_full`] reports whether every slot has
/// a value. Handlers receive the buffer by value and use `is_full` to tell a
/// completed request from an expired one.
///
/// # Example
///
/// ```
/// use gatherer::RequestBuffer;
///
/// let mut buffer = RequestBuffer::new(2);
/// buffer.set(1, "world");
/// assert!(!buffer.is_full());
/// buffer.set(0, "hello");
/// assert!(buffer.is_full());
/// assert_eq!(buffer.get(0), Some(&"hello"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestBuffer<T> {
    parts: Vec<Option<T>>,
}

impl<T> RequestBuffer<T> {
    /// Creates a buffer with `len` empty slots.
    pub fn new(len: usize) -> Self {
        Self {
            parts: core::iter::repeat_with(|| None).take(len).collect(),
        }
    }

    /// Number of slots, set or not.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if the buffer has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns the part at `index`, or `None` if the slot is unset.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.parts[index].as_ref()
    }

    /// Stores `part` at `index`, returning the value it replaced.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn set(&mut self, index: usize, part: T) -> Option<T> {
        self.parts[index].replace(part)
    }

    /// Removes and returns the part at `index`, leaving the slot unset.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn take(&mut self, index: usize) -> Option<T> {
        self.parts[index].take()
    }

    /// Returns `true` if every slot is set.
    pub fn is_full(&self) -> bool {
        self.parts.iter().all(Option::is_some)
    }

    /// Number of slots still unset.
    pub fn missing(&self) -> usize {
        self.parts.iter().filter(|p| p.is_none()).count()
    }

    /// Iterates over every slot in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Option<&T>> {
        self.parts.iter().map(Option::as_ref)
    }

    /// Consumes the buffer, returning its slots in index order.
    pub fn into_vec(self) -> Vec<Option<T>> {
        self.parts
    }
}

impl<T> From<Vec<Option<T>>> for RequestBuffer<T> {
    fn from(parts: Vec<Option<T>>) -> Self {
        Self { parts }
    }
}

/// Combines two buffers into a new one, preferring `b`.
///
/// The result is as long as the longer input. Where both inputs cover an
/// index, the result takes `b`'s part if it is set and `a`'s otherwise. Past
/// the end of the shorter input the longer input's slot is copied as is.
///
/// ```
/// use gatherer::{RequestBuffer, merge_new_overwrite_with_b};
///
/// let a = RequestBuffer::from(vec![Some(1), None, Some(3)]);
/// let b = RequestBuffer::from(vec![None, Some(2)]);
/// let merged = merge_new_overwrite_with_b(&a, &b);
/// assert_eq!(merged.into_vec(), vec![Some(1), Some(2), Some(3)]);
/// ```
pub fn merge_new_overwrite_with_b<T: Clone>(
    a: &RequestBuffer<T>,
    b: &RequestBuffer<T>,
) -> RequestBuffer<T> {
    let len = a.len().max(b.len());
    let parts = (0..len)
        .map(|i| {
            let from_b = b.parts.get(i).and_then(Option::as_ref);
            let from_a = a.parts.get(i).and_then(Option::as_ref);
            from_b.or(from_a).cloned()
        })
        .collect();
    RequestBuffer { parts }
}
