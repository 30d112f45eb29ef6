use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;

use crate::hash_table::HashTable;
use crate::hash_table::NULL_HASH;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by [`HashSet`] when none is specified.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by [`HashSet`] when none is specified.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    } else {
        /// Placeholder: with neither the `std` nor the `foldhash` feature
        /// there is no default hasher, and sets must be built with
        /// [`HashSet::with_capacity_and_hasher`].
        #[derive(Clone, Debug)]
        pub enum DefaultHashBuilder {}
    }
}

/// Substitute for the one hash value the table reserves for empty buckets.
const NULL_HASH_SUBSTITUTE: u64 = 0x9E37_79B9_7F4A_7C15;

/// A fixed-capacity hash set implemented on the leapfrog [`HashTable`].
///
/// `HashSet<T, S>` stores unique values of type `T` where `T` implements
/// `Hash + Eq`, hashing them with a configurable hasher builder `S`. The
/// underlying storage resolves collisions with leapfrog probing: two
/// one-byte hop distances per bucket chain colliding values together, so
/// lookups follow a short bounded chain instead of an open-ended probe.
///
/// Unlike the standard library's set, capacity is **fixed** per instance:
/// the set never reallocates behind your back, and inserting a new value
/// into a full set panics. Growth is explicit via
/// [`rehash`](HashSet::rehash).
///
/// # Performance Characteristics
///
/// - **Memory**: 10 bytes per bucket overhead, plus the size of `T`.
///
/// # Examples
///
/// ```rust
/// # #[cfg(any(feature = "std", feature = "foldhash"))]
/// # {
/// use leapfrog_hash::HashSet;
///
/// let mut set: HashSet<&str> = HashSet::with_capacity(16);
/// assert!(set.insert("heron"));
/// assert!(!set.insert("heron"));
/// assert!(set.contains(&"heron"));
/// assert_eq!(set.len(), 1);
/// # }
/// ```
#[derive(Clone)]
pub struct HashSet<T, S = DefaultHashBuilder> {
    table: HashTable<T>,
    hash_builder: S,
}

impl<T, S> PartialEq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl<T, S> Eq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S> Debug for HashSet<T, S>
where
    T: Debug + Hash + Eq,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new set with exactly `capacity` buckets and the given
    /// hasher builder.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::hash_map::RandomState;
    ///
    /// use leapfrog_hash::HashSet;
    ///
    /// let set: HashSet<i32, _> = HashSet::with_capacity_and_hasher(100, RandomState::new());
    /// assert!(set.is_empty());
    /// assert_eq!(set.capacity(), 100);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Hashes a value, steering clear of the reserved empty-bucket sentinel.
    fn hash_value(&self, value: &T) -> u64 {
        match self.hash_builder.hash_one(value) {
            NULL_HASH => NULL_HASH_SUBSTITUTE,
            hash => hash,
        }
    }

    /// Returns the number of values in the set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(8);
    /// assert_eq!(set.len(), 0);
    /// set.insert(1);
    /// assert_eq!(set.len(), 1);
    /// # }
    /// ```
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the fixed number of buckets.
    ///
    /// The capacity is the hard limit on the number of values the set can
    /// hold; it only changes through [`rehash`](HashSet::rehash).
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the ratio between used and total buckets.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(4);
    /// set.insert(1);
    /// assert_eq!(set.load_factor(), 0.25);
    /// # }
    /// ```
    pub fn load_factor(&self) -> f32 {
        self.table.len() as f32 / self.table.capacity() as f32
    }

    /// Adds a value to the set.
    ///
    /// Returns whether the value was newly inserted. That is:
    ///
    /// - If the set did not previously contain this value, `true` is
    ///   returned.
    /// - If the set already contained this value, `false` is returned and
    ///   the new value is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the value is not already present and `len() == capacity()`.
    /// [`rehash`](HashSet::rehash) into a larger capacity before the set
    /// fills up.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(8);
    /// assert_eq!(set.insert(37), true);
    /// assert_eq!(set.insert(37), false);
    /// assert_eq!(set.len(), 1);
    /// # }
    /// ```
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_value(&value);
        self.table.insert(hash, value, |stored, new| stored == new)
    }

    /// Returns `true` if the set contains a value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(8);
    /// set.insert(1);
    /// assert!(set.contains(&1));
    /// assert!(!set.contains(&2));
    /// # }
    /// ```
    pub fn contains(&self, value: &T) -> bool {
        self.get(value).is_some()
    }

    /// Returns a reference to the stored value equal to the given one, if
    /// any.
    ///
    /// Prefer this over [`contains`](HashSet::contains) when copying `T` is
    /// expensive. The reference is tied to the borrow of the set: any
    /// structural mutation (insert, remove, rehash, clear) first requires
    /// the borrow to end.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<String> = HashSet::with_capacity(8);
    /// set.insert("kestrel".to_string());
    /// assert_eq!(set.get(&"kestrel".to_string()).map(String::as_str), Some("kestrel"));
    /// assert_eq!(set.get(&"osprey".to_string()), None);
    /// # }
    /// ```
    pub fn get(&self, value: &T) -> Option<&T> {
        let hash = self.hash_value(value);
        self.table.find(hash, |stored| stored == value)
    }

    /// Removes a value from the set. Returns whether the value was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(8);
    /// set.insert(1);
    /// assert_eq!(set.remove(&1), true);
    /// assert_eq!(set.remove(&1), false);
    /// # }
    /// ```
    pub fn remove(&mut self, value: &T) -> bool {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to the given one, if any.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(8);
    /// set.insert(1);
    /// assert_eq!(set.take(&1), Some(1));
    /// assert_eq!(set.take(&1), None);
    /// # }
    /// ```
    pub fn take(&mut self, value: &T) -> Option<T> {
        let hash = self.hash_value(value);
        self.table.remove(hash, |stored| stored == value)
    }

    /// Moves the contents into a fresh set with `new_capacity` buckets.
    ///
    /// Does nothing if the set is empty or `new_capacity` is smaller than
    /// the current number of values. Values keep their cached hashes and
    /// are not rehashed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(4);
    /// set.extend([1, 2, 3]);
    ///
    /// set.rehash(64);
    /// assert_eq!(set.capacity(), 64);
    /// assert!(set.contains(&2));
    ///
    /// set.rehash(2); // smaller than len: declined
    /// assert_eq!(set.capacity(), 64);
    /// # }
    /// ```
    pub fn rehash(&mut self, new_capacity: usize) {
        self.table.rehash(new_capacity);
    }

    /// Removes all values from the set, keeping the capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(8);
    /// set.insert(1);
    /// set.clear();
    /// assert!(set.is_empty());
    /// assert_eq!(set.capacity(), 8);
    /// # }
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the values of the set, in bucket-index
    /// order. Supports reverse traversal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut set: HashSet<i32> = HashSet::with_capacity(8);
    /// set.insert(1);
    /// set.insert(2);
    ///
    /// assert_eq!(set.iter().count(), 2);
    /// assert_eq!(set.iter().rev().count(), 2);
    /// # }
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Visits the values representing the union, i.e. all the values in
    /// `self` or `other`, without duplicates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut a: HashSet<i32> = HashSet::with_capacity(8);
    /// a.extend([1, 2, 3]);
    /// let mut b: HashSet<i32> = HashSet::with_capacity(8);
    /// b.extend([3, 4]);
    ///
    /// assert_eq!(a.union(&b).count(), 4);
    /// # }
    /// ```
    pub fn union<'a>(&'a self, other: &'a Self) -> Union<'a, T, S> {
        Union {
            iter: self.iter(),
            other_iter: other.iter(),
            this: self,
        }
    }

    /// Visits the values representing the intersection, i.e. the values
    /// that are both in `self` and `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut a: HashSet<i32> = HashSet::with_capacity(8);
    /// a.extend([1, 2, 3]);
    /// let mut b: HashSet<i32> = HashSet::with_capacity(8);
    /// b.extend([2, 3, 4]);
    ///
    /// let common: Vec<i32> = a.intersection(&b).copied().collect();
    /// assert_eq!(common.len(), 2);
    /// # }
    /// ```
    pub fn intersection<'a>(&'a self, other: &'a Self) -> Intersection<'a, T, S> {
        Intersection {
            iter: self.iter(),
            other,
        }
    }

    /// Visits the values representing the difference, i.e. the values that
    /// are in `self` but not in `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let mut a: HashSet<i32> = HashSet::with_capacity(8);
    /// a.extend([1, 2, 3]);
    /// let mut b: HashSet<i32> = HashSet::with_capacity(8);
    /// b.extend([3, 4]);
    ///
    /// let only_a: Vec<i32> = a.difference(&b).copied().collect();
    /// assert_eq!(only_a.len(), 2);
    /// # }
    /// ```
    pub fn difference<'a>(&'a self, other: &'a Self) -> Difference<'a, T, S> {
        Difference {
            iter: self.iter(),
            other,
        }
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a new set with exactly `capacity` buckets using the default
    /// hasher builder.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(any(feature = "std", feature = "foldhash"))]
    /// # {
    /// use leapfrog_hash::HashSet;
    ///
    /// let set: HashSet<i32> = HashSet::with_capacity(100);
    /// assert_eq!(set.capacity(), 100);
    /// # }
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

/// An iterator over the values of a [`HashSet`] in bucket-index order.
pub struct Iter<'a, T> {
    inner: crate::hash_table::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

/// A consuming iterator over the values of a [`HashSet`].
pub struct IntoIter<T> {
    inner: crate::hash_table::IntoIter<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
impl<T> FusedIterator for IntoIter<T> {}

impl<T, S> IntoIterator for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type IntoIter = IntoIter<T>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type IntoIter = Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, S> Extend<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts each value of the iterator. Panics like
    /// [`insert`](HashSet::insert) if a new value arrives while the set is
    /// full.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

/// An iterator over the union of two sets.
pub struct Union<'a, T, S> {
    iter: Iter<'a, T>,
    other_iter: Iter<'a, T>,
    this: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Union<'a, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(v) = self.iter.next() {
            return Some(v);
        }
        loop {
            let v = self.other_iter.next()?;
            if !self.this.contains(v) {
                return Some(v);
            }
        }
    }
}

/// An iterator over the intersection of two sets.
pub struct Intersection<'a, T, S> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Intersection<'a, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if self.other.contains(v) {
                return Some(v);
            }
        }
    }
}

/// An iterator over the difference of two sets.
pub struct Difference<'a, T, S> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Difference<'a, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if !self.other.contains(v) {
                return Some(v);
            }
        }
    }
}
