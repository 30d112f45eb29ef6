use alloc::alloc::handle_alloc_error;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// Reserved hash value marking an empty bucket.
///
/// A bucket whose cached hash equals `NULL_HASH` holds no key. Callers of
/// [`HashTable`] must never pass `NULL_HASH` as the hash of a live key; a
/// hasher that can produce it must remap that one value before handing it to
/// the table (the [`HashSet`](crate::HashSet) wrapper does this for you).
pub const NULL_HASH: u64 = 0;

/// Which delta field links a chain bucket to its successor.
#[derive(Clone, Copy)]
enum LinkKind {
    Delta1,
    Delta2,
}

/// Offsets of the three metadata arrays inside the single metadata
/// allocation: the `delta1` and `delta2` hop bytes, then the cached hashes.
#[derive(Debug, Clone, Copy)]
struct MetaLayout {
    layout: Layout,
    delta1_offset: usize,
    delta2_offset: usize,
    hashes_offset: usize,
}

impl MetaLayout {
    fn new(capacity: usize) -> Self {
        let deltas = Layout::array::<u8>(capacity).expect("allocation size overflow");
        let hashes = Layout::array::<u64>(capacity).expect("allocation size overflow");

        let (layout, delta1_offset) = Layout::new::<()>().extend(deltas).unwrap();
        let (layout, delta2_offset) = layout.extend(deltas).unwrap();
        let (layout, hashes_offset) = layout.extend(hashes).unwrap();

        MetaLayout {
            layout: layout.pad_to_align(),
            delta1_offset,
            delta2_offset,
            hashes_offset,
        }
    }
}

/// A fixed-capacity hash table using leapfrog probing.
///
/// `HashTable<V>` stores unique values of type `V` and provides insertion,
/// lookup, and removal. You supply the 64-bit hash for every operation along
/// with an equality predicate; the table never hashes values itself, it only
/// caches the hashes you give it.
///
/// Collisions are resolved by chaining buckets through two one-byte forward
/// hop distances per bucket (`delta1` off the ideal bucket, then repeated
/// `delta2` hops), so a lookup follows a short bounded chain of precomputed
/// hops. Removal refills the freed slot from the tail of its own chain, so
/// chains never develop holes and there are no tombstones.
///
/// Capacity is fixed at construction and never changes in place. Growing is
/// explicit via [`rehash`](HashTable::rehash). Inserting a new value when
/// every bucket is occupied panics.
///
/// ## Performance Characteristics
///
/// - **Memory**: exactly two allocations, 10 bytes of metadata per bucket
///   (two hop bytes and a cached `u64` hash) plus `capacity` slots of `V`.
/// - **Probing**: a lookup costs `O(2 + chain length)` hops, each `O(1)`.
///
/// ## Example
///
/// ```rust
/// use leapfrog_hash::HashTable;
///
/// let mut table: HashTable<u32> = HashTable::with_capacity(16);
///
/// // Hashes are caller-supplied; any nonzero u64 works.
/// assert!(table.insert(0xA1, 7, |a, b| a == b));
/// assert!(!table.insert(0xA1, 7, |a, b| a == b));
///
/// assert_eq!(table.find(0xA1, |&v| v == 7), Some(&7));
/// assert_eq!(table.remove(0xA1, |&v| v == 7), Some(7));
/// assert!(table.is_empty());
/// ```
pub struct HashTable<V> {
    layout: MetaLayout,
    meta: NonNull<u8>,
    keys: NonNull<MaybeUninit<V>>,

    populated: usize,
    capacity: usize,
}

// SAFETY: The table exclusively owns both allocations; the raw pointers are
// never shared outside of borrows handed out by its methods.
unsafe impl<V: Send> Send for HashTable<V> {}
// SAFETY: Shared access only reads through `&self`; no interior mutability.
unsafe impl<V: Sync> Sync for HashTable<V> {}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let buckets = (0..self.capacity)
            .filter_map(|index| {
                let (d1, d2) = (self.delta1()[index], self.delta2()[index]);
                let hash = self.hashes()[index];
                if hash == NULL_HASH && d1 == 0 && d2 == 0 {
                    return None;
                }
                Some(if hash == NULL_HASH {
                    format!("{index:03} d1={d1:<3} d2={d2:<3} .")
                } else {
                    format!("{index:03} d1={d1:<3} d2={d2:<3} #{hash:016x}")
                })
            })
            .collect::<Vec<String>>();

        f.debug_struct("HashTable")
            .field("len", &self.populated)
            .field("capacity", &self.capacity)
            .field("buckets", &buckets)
            .finish()
    }
}

impl<V: Clone> Clone for HashTable<V> {
    fn clone(&self) -> Self {
        let mut table = Self::with_capacity(self.capacity);

        for index in 0..self.capacity {
            if self.hashes()[index] != NULL_HASH {
                // SAFETY: a non-null cached hash means the key slot is
                // initialized.
                let key = unsafe { self.keys_slice()[index].assume_init_ref() }.clone();
                table.keys_mut()[index] = MaybeUninit::new(key);
            }
        }

        // Metadata and `populated` are installed only after every key has
        // been cloned; if a clone panics above, the fresh table still looks
        // empty and dropping it won't touch uninitialized slots.
        //
        // SAFETY: both metadata allocations share the same layout.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.meta.as_ptr(),
                table.meta.as_ptr(),
                self.layout.layout.size(),
            );
        }
        table.populated = self.populated;

        table
    }
}

impl<V> Drop for HashTable<V> {
    fn drop(&mut self) {
        // SAFETY: occupied buckets hold initialized keys; both allocations
        // were created with the layouts recomputed here.
        unsafe {
            if core::mem::needs_drop::<V>() && self.populated > 0 {
                for index in 0..self.capacity {
                    if self.hashes()[index] != NULL_HASH {
                        self.keys_mut()[index].assume_init_drop();
                    }
                }
            }

            alloc::alloc::dealloc(self.meta.as_ptr(), self.layout.layout);

            let keys_layout = Self::keys_layout(self.capacity);
            if keys_layout.size() != 0 {
                alloc::alloc::dealloc(self.keys.as_ptr().cast(), keys_layout);
            }
        }
    }
}

impl<V> HashTable<V> {
    /// Creates a new table with exactly `capacity` buckets.
    ///
    /// The table never grows on its own; `capacity` is the hard limit on the
    /// number of values it can hold. Use [`rehash`](HashTable::rehash) to
    /// move the contents into a larger table.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "zero is not a valid capacity");

        let layout = MetaLayout::new(capacity);
        // SAFETY: capacity > 0, so the metadata layout has a nonzero size.
        let meta = unsafe {
            let raw = alloc::alloc::alloc(layout.layout);
            if raw.is_null() {
                handle_alloc_error(layout.layout);
            }
            // All-zero metadata is the empty state: every delta unlinked,
            // every cached hash NULL_HASH.
            core::ptr::write_bytes(raw, 0, layout.layout.size());
            NonNull::new_unchecked(raw)
        };

        let keys_layout = Self::keys_layout(capacity);
        let keys = if keys_layout.size() == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: nonzero layout; uninitialized slots are a valid state
            // for MaybeUninit.
            unsafe {
                let raw = alloc::alloc::alloc(keys_layout) as *mut MaybeUninit<V>;
                if raw.is_null() {
                    handle_alloc_error(keys_layout);
                }
                NonNull::new_unchecked(raw)
            }
        };

        Self {
            layout,
            meta,
            keys,
            populated: 0,
            capacity,
        }
    }

    fn keys_layout(capacity: usize) -> Layout {
        Layout::array::<MaybeUninit<V>>(capacity).expect("allocation size overflow")
    }

    fn delta1(&self) -> &[u8] {
        // SAFETY: the metadata allocation is valid for `capacity` bytes at
        // this offset for the lifetime of `&self`.
        unsafe {
            NonNull::slice_from_raw_parts(self.meta.add(self.layout.delta1_offset), self.capacity)
                .as_ref()
        }
    }

    fn delta1_mut(&mut self) -> &mut [u8] {
        // SAFETY: as `delta1`, and `&mut self` guarantees exclusivity.
        unsafe {
            NonNull::slice_from_raw_parts(self.meta.add(self.layout.delta1_offset), self.capacity)
                .as_mut()
        }
    }

    fn delta2(&self) -> &[u8] {
        // SAFETY: as `delta1`.
        unsafe {
            NonNull::slice_from_raw_parts(self.meta.add(self.layout.delta2_offset), self.capacity)
                .as_ref()
        }
    }

    fn delta2_mut(&mut self) -> &mut [u8] {
        // SAFETY: as `delta1_mut`.
        unsafe {
            NonNull::slice_from_raw_parts(self.meta.add(self.layout.delta2_offset), self.capacity)
                .as_mut()
        }
    }

    fn hashes(&self) -> &[u64] {
        // SAFETY: the hashes array was zero-filled at construction, so every
        // element is an initialized u64.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.meta.add(self.layout.hashes_offset).cast::<u64>(),
                self.capacity,
            )
            .as_ref()
        }
    }

    fn hashes_mut(&mut self) -> &mut [u64] {
        // SAFETY: as `hashes`, and `&mut self` guarantees exclusivity.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.meta.add(self.layout.hashes_offset).cast::<u64>(),
                self.capacity,
            )
            .as_mut()
        }
    }

    fn keys_slice(&self) -> &[MaybeUninit<V>] {
        // SAFETY: the keys allocation holds `capacity` slots for the lifetime
        // of `&self`.
        unsafe { NonNull::slice_from_raw_parts(self.keys, self.capacity).as_ref() }
    }

    fn keys_mut(&mut self) -> &mut [MaybeUninit<V>] {
        // SAFETY: as `keys_slice`, and `&mut self` guarantees exclusivity.
        unsafe { NonNull::slice_from_raw_parts(self.keys, self.capacity).as_mut() }
    }

    /// Returns the number of values in the table.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table contains no values.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the fixed number of buckets.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let table: HashTable<u64> = HashTable::with_capacity(32);
    /// assert_eq!(table.capacity(), 32);
    /// ```
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    fn ideal_index(&self, hash: u64) -> usize {
        (hash % self.capacity as u64) as usize
    }

    /// Follows the `delta1` hop out of `index`, wrapping around the bucket
    /// array.
    #[inline(always)]
    fn add_delta1(&self, index: usize) -> usize {
        let mut next = index + usize::from(self.delta1()[index]);
        if next >= self.capacity {
            next -= self.capacity;
        }
        next
    }

    #[inline(always)]
    fn add_delta2(&self, index: usize) -> usize {
        let mut next = index + usize::from(self.delta2()[index]);
        if next >= self.capacity {
            next -= self.capacity;
        }
        next
    }

    /// Forward hop distance from `index` to `new_index`, modulo capacity.
    ///
    /// Panics if the distance does not fit the one-byte delta field.
    fn new_delta(&self, index: usize, new_index: usize) -> u8 {
        let delta = if new_index >= index {
            new_index - index
        } else {
            self.capacity - index + new_index
        };

        debug_assert_ne!(delta, 0, "a bucket never links to itself");
        assert!(
            delta < 256,
            "leapfrog hop distance {delta} overflows the one-byte delta field"
        );
        delta as u8
    }

    fn bucket_found_or_empty<F>(&self, index: usize, hash: u64, matches: &F) -> bool
    where
        F: Fn(&V) -> bool,
    {
        let stored = self.hashes()[index];
        // SAFETY: a non-null stored hash means the key slot is initialized.
        stored == NULL_HASH
            || (stored == hash && matches(unsafe { self.keys_slice()[index].assume_init_ref() }))
    }

    fn bucket_found<F>(&self, index: usize, hash: u64, matches: &F) -> bool
    where
        F: Fn(&V) -> bool,
    {
        let stored = self.hashes()[index];
        stored != NULL_HASH
            && stored == hash
            // SAFETY: checked non-null above, so the key slot is initialized.
            && matches(unsafe { self.keys_slice()[index].assume_init_ref() })
    }

    /// Circular scan from `start` for the first bucket that is empty or holds
    /// a matching key. `None` means every bucket is occupied by other keys.
    fn linear_search<F>(&self, start: usize, hash: u64, matches: &F) -> Option<usize>
    where
        F: Fn(&V) -> bool,
    {
        debug_assert!(start <= self.capacity);
        (start..self.capacity)
            .chain(0..start)
            .find(|&index| self.bucket_found_or_empty(index, hash, matches))
    }

    /// Picks the bucket for a new key chained off `chain_end`.
    ///
    /// Returns `None` if the scan stopped on an equal key instead of an
    /// empty bucket. Panics if the table has no empty bucket left.
    fn free_slot<F>(&self, chain_end: usize, hash: u64, matches: &F) -> Option<usize>
    where
        F: Fn(&V) -> bool,
    {
        let Some(index) = self.linear_search(chain_end + 1, hash, matches) else {
            panic!("leapfrog table is full: no free bucket for a new key");
        };
        (self.hashes()[index] == NULL_HASH).then_some(index)
    }

    fn occupy(&mut self, index: usize, hash: u64, value: V) {
        assert!(self.populated < self.capacity, "all buckets are occupied");
        assert!(
            self.hashes()[index] == NULL_HASH,
            "occupying a non-empty bucket"
        );

        self.populated += 1;
        self.hashes_mut()[index] = hash;
        self.keys_mut()[index] = MaybeUninit::new(value);
    }

    /// Inserts a value if no equal value is present.
    ///
    /// `eq` is called with a stored value and the new value; the table treats
    /// two values as equal when their hashes match and `eq` returns `true`.
    /// Returns `true` if the value was newly inserted, `false` if an equal
    /// value was already present (the new value is dropped in that case).
    ///
    /// # Panics
    ///
    /// Panics if `len() == capacity()` and the value is not already present,
    /// or if the chosen bucket lies 256 or more hops ahead of its chain
    /// predecessor. Both are overload symptoms: rehash to a larger capacity
    /// well before the table fills up.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let mut table: HashTable<&str> = HashTable::with_capacity(8);
    /// assert!(table.insert(0x3, "magpie", |a, b| a == b));
    /// assert!(!table.insert(0x3, "magpie", |a, b| a == b));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn insert(&mut self, hash: u64, value: V, eq: impl Fn(&V, &V) -> bool) -> bool {
        debug_assert_ne!(hash, NULL_HASH, "NULL_HASH is reserved for empty buckets");

        let ideal = self.ideal_index(hash);
        let (target, link) = {
            let matches = |stored: &V| eq(stored, &value);

            if self.bucket_found_or_empty(ideal, hash, &matches) {
                if self.hashes()[ideal] != NULL_HASH {
                    // Found at the ideal bucket.
                    return false;
                }
                (ideal, None)
            } else if self.delta1()[ideal] == 0 {
                // Start a chain off the ideal bucket.
                match self.free_slot(ideal, hash, &matches) {
                    Some(index) => (index, Some((ideal, LinkKind::Delta1))),
                    None => return false,
                }
            } else {
                let mut index = self.add_delta1(ideal);
                if self.bucket_found(index, hash, &matches) {
                    return false;
                }
                while self.delta2()[index] != 0 {
                    index = self.add_delta2(index);
                    // Found at ideal + delta1 + (n * delta2).
                    if self.bucket_found(index, hash, &matches) {
                        return false;
                    }
                }
                // Extend the chain past its current tail.
                match self.free_slot(index, hash, &matches) {
                    Some(new_index) => (new_index, Some((index, LinkKind::Delta2))),
                    None => return false,
                }
            }
        };

        if let Some((from, kind)) = link {
            let delta = self.new_delta(from, target);
            match kind {
                LinkKind::Delta1 => self.delta1_mut()[from] = delta,
                LinkKind::Delta2 => self.delta2_mut()[from] = delta,
            }
        }
        self.occupy(target, hash, value);
        true
    }

    /// Runs the lookup traversal: ideal bucket, one `delta1` hop, then
    /// `delta2` hops. Returns the matching bucket and its predecessor in the
    /// chain (the predecessor equals the bucket itself for a chain head).
    fn find_index<F>(&self, hash: u64, matches: &F) -> Option<(usize, usize)>
    where
        F: Fn(&V) -> bool,
    {
        if self.populated == 0 {
            return None;
        }

        let mut index = self.ideal_index(hash);
        let mut prev = index;

        if self.bucket_found_or_empty(index, hash, matches) {
            return (self.hashes()[index] != NULL_HASH).then_some((index, prev));
        }
        if self.delta1()[index] == 0 {
            return None;
        }

        prev = index;
        index = self.add_delta1(index);
        if self.bucket_found(index, hash, matches) {
            return Some((index, prev));
        }
        while self.delta2()[index] != 0 {
            prev = index;
            index = self.add_delta2(index);
            if self.bucket_found(index, hash, matches) {
                return Some((index, prev));
            }
        }

        None
    }

    /// Returns a reference to the stored value equal to the query, if any.
    ///
    /// The reference stays valid for as long as the table is borrowed; any
    /// structural mutation (insert, remove, rehash, clear) requires the
    /// borrow to end first.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let mut table: HashTable<u64> = HashTable::with_capacity(8);
    /// table.insert(0x42, 9000, |a, b| a == b);
    ///
    /// assert_eq!(table.find(0x42, |&v| v == 9000), Some(&9000));
    /// assert_eq!(table.find(0x42, |&v| v == 1), None);
    /// ```
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let (index, _) = self.find_index(hash, &eq)?;
        // SAFETY: find_index only returns occupied buckets.
        Some(unsafe { self.keys_slice()[index].assume_init_ref() })
    }

    /// Removes and returns the stored value equal to the query, if any.
    ///
    /// Removal compacts the affected chain: the freed bucket is refilled
    /// with the tail-most bucket of its own chain (draining the `delta2`
    /// tail before consuming the `delta1` link), repeating until the hole
    /// reaches the chain tail. Chains therefore never contain empty buckets
    /// and no tombstones exist.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let mut table: HashTable<u64> = HashTable::with_capacity(8);
    /// table.insert(0x42, 9000, |a, b| a == b);
    ///
    /// assert_eq!(table.remove(0x42, |&v| v == 9000), Some(9000));
    /// assert_eq!(table.remove(0x42, |&v| v == 9000), None);
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let (found, prev) = self.find_index(hash, &eq)?;

        // The found bucket ends a chain it did not start: terminate the
        // chain one link earlier.
        if found != self.ideal_index(self.hashes()[found]) && self.delta2()[found] == 0 {
            if self.add_delta1(prev) == found {
                self.delta1_mut()[prev] = 0;
            } else if self.add_delta2(prev) == found {
                self.delta2_mut()[prev] = 0;
            }
        }

        // SAFETY: find_index only returns occupied buckets; ownership of the
        // key moves out and the slot is refilled or marked empty below.
        let value = unsafe { self.keys_slice()[found].assume_init_read() };

        let mut index = found;
        while self.delta1()[index] != 0 || self.delta2()[index] != 0 {
            // Walk to the last bucket of the chain hanging off the hole,
            // draining the delta2 tail before consuming the delta1 link.
            let mut last = index;
            if self.delta1()[last] != 0 {
                last = self.add_delta1(last);
            }
            if self.delta2()[last] != 0 {
                let mut second_last = last;
                while self.delta2()[last] != 0 {
                    second_last = last;
                    last = self.add_delta2(last);
                }
                self.delta2_mut()[second_last] = 0;
            } else {
                self.delta1_mut()[index] = 0;
            }

            if index != last {
                // Refill the hole with the chain tail; the tail slot becomes
                // the new hole.
                //
                // SAFETY: `last` is occupied and distinct from `index`; its
                // key moves into the vacated slot.
                unsafe {
                    let key = self.keys_slice()[last].assume_init_read();
                    self.keys_mut()[index] = MaybeUninit::new(key);
                }
                let moved_hash = self.hashes()[last];
                self.hashes_mut()[index] = moved_hash;
            }

            index = last;
        }

        self.hashes_mut()[index] = NULL_HASH;
        self.populated -= 1;

        Some(value)
    }

    /// Moves every value into a fresh table with `new_capacity` buckets and
    /// replaces `self` with it.
    ///
    /// Does nothing if the table is empty or `new_capacity` is smaller than
    /// the current number of values. Cached hashes are reused; values are
    /// not rehashed.
    ///
    /// # Panics
    ///
    /// Reinsertion can hit the hop-distance overflow panic of
    /// [`insert`](HashTable::insert) if the new layout clusters badly.
    /// Values moved before the panic are dropped during the unwind and the
    /// table no longer owns them; treat the table as unusable afterwards.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let mut table: HashTable<u32> = HashTable::with_capacity(4);
    /// for hash in 1..=4u64 {
    ///     table.insert(hash, hash as u32, |a, b| a == b);
    /// }
    ///
    /// table.rehash(64);
    /// assert_eq!(table.capacity(), 64);
    /// assert_eq!(table.len(), 4);
    /// assert_eq!(table.find(3, |&v| v == 3), Some(&3));
    ///
    /// // Shrinking below the current population is declined.
    /// table.rehash(2);
    /// assert_eq!(table.capacity(), 64);
    /// ```
    pub fn rehash(&mut self, new_capacity: usize) {
        if self.populated == 0 || new_capacity < self.populated {
            return;
        }

        let mut rebuilt = Self::with_capacity(new_capacity);

        for index in 0..self.capacity {
            let hash = self.hashes()[index];
            if hash == NULL_HASH {
                continue;
            }

            // Mark the slot empty before the key moves out, so an unwind
            // out of the reinsertion never drops it a second time.
            self.hashes_mut()[index] = NULL_HASH;
            self.populated -= 1;
            // SAFETY: the bucket held an initialized key; marking it empty
            // above transfers ownership to the rebuilt table.
            let key = unsafe { self.keys_slice()[index].assume_init_read() };
            let inserted = rebuilt.insert(hash, key, |_, _| false);
            debug_assert!(inserted, "live keys are distinct");

            if self.populated == 0 {
                break;
            }
        }

        *self = rebuilt;
    }

    /// Removes all values, keeping the capacity.
    ///
    /// Runs in O(capacity): every delta byte and cached hash is reset.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let mut table: HashTable<u8> = HashTable::with_capacity(8);
    /// table.insert(0x7, 7, |a, b| a == b);
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 8);
    /// assert_eq!(table.find(0x7, |&v| v == 7), None);
    /// ```
    pub fn clear(&mut self) {
        if core::mem::needs_drop::<V>() && self.populated > 0 {
            for index in 0..self.capacity {
                if self.hashes()[index] != NULL_HASH {
                    // SAFETY: occupied bucket holds an initialized key.
                    unsafe { self.keys_mut()[index].assume_init_drop() };
                }
            }
        }

        // SAFETY: the metadata allocation is valid; all-zero is the empty
        // state.
        unsafe { core::ptr::write_bytes(self.meta.as_ptr(), 0, self.layout.layout.size()) };
        self.populated = 0;
    }

    /// First occupied bucket in `from..until`, if any.
    fn next_occupied(&self, from: usize, until: usize) -> Option<usize> {
        (from..until).find(|&index| self.hashes()[index] != NULL_HASH)
    }

    /// Last occupied bucket in `from..until`, if any.
    fn prev_occupied(&self, from: usize, until: usize) -> Option<usize> {
        (from..until)
            .rev()
            .find(|&index| self.hashes()[index] != NULL_HASH)
    }

    /// Returns an iterator over the values in bucket-index order.
    ///
    /// The iterator also walks backwards via
    /// [`next_back`](DoubleEndedIterator::next_back). Obtaining a fresh
    /// iterator restarts the traversal; mutating the table first requires
    /// this borrow to end.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use leapfrog_hash::HashTable;
    ///
    /// let mut table: HashTable<u32> = HashTable::with_capacity(8);
    /// for hash in [5u64, 2, 7] {
    ///     table.insert(hash, hash as u32, |a, b| a == b);
    /// }
    ///
    /// // Bucket order follows hash % capacity here.
    /// let forward: Vec<u32> = table.iter().copied().collect();
    /// assert_eq!(forward, [2, 5, 7]);
    ///
    /// let backward: Vec<u32> = table.iter().rev().copied().collect();
    /// assert_eq!(backward, [7, 5, 2]);
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            front: 0,
            back: self.capacity,
        }
    }

    #[cfg(test)]
    pub(crate) fn deltas(&self, index: usize) -> (u8, u8) {
        (self.delta1()[index], self.delta2()[index])
    }

    #[cfg(test)]
    pub(crate) fn bucket_hash(&self, index: usize) -> u64 {
        self.hashes()[index]
    }
}

/// An iterator over the values of a [`HashTable`] in bucket-index order.
///
/// Created by [`HashTable::iter`]. Yields `&V` and supports reverse
/// traversal.
pub struct Iter<'a, V> {
    table: &'a HashTable<V>,
    front: usize,
    back: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.table.next_occupied(self.front, self.back)?;
        self.front = index + 1;
        // SAFETY: next_occupied only yields occupied buckets.
        Some(unsafe { self.table.keys_slice()[index].assume_init_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let span = self.back.saturating_sub(self.front);
        (0, Some(span.min(self.table.populated)))
    }
}

impl<V> DoubleEndedIterator for Iter<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let index = self.table.prev_occupied(self.front, self.back)?;
        self.back = index;
        // SAFETY: prev_occupied only yields occupied buckets.
        Some(unsafe { self.table.keys_slice()[index].assume_init_ref() })
    }
}

impl<V> FusedIterator for Iter<'_, V> {}

impl<'a, V> IntoIterator for &'a HashTable<V> {
    type IntoIter = Iter<'a, V>;
    type Item = &'a V;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A consuming iterator over the values of a [`HashTable`], in bucket-index
/// order.
pub struct IntoIter<V> {
    table: HashTable<V>,
    front: usize,
}

impl<V> Iterator for IntoIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.table.next_occupied(self.front, self.table.capacity)?;
        self.front = index + 1;

        self.table.hashes_mut()[index] = NULL_HASH;
        self.table.populated -= 1;
        // SAFETY: the bucket was occupied; marking it empty above transfers
        // ownership of the key to the caller.
        Some(unsafe { self.table.keys_slice()[index].assume_init_read() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

impl<V> ExactSizeIterator for IntoIter<V> {}
impl<V> FusedIterator for IntoIter<V> {}

impl<V> IntoIterator for HashTable<V> {
    type IntoIter = IntoIter<V>;
    type Item = V;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            table: self,
            front: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn insert_and_find() {
        let mut table: HashTable<u64> = HashTable::with_capacity(64);
        for k in 1..=32u64 {
            assert!(table.insert(k * 0x9E37, k, |a, b| a == b), "{table:#?}");
        }
        assert_eq!(table.len(), 32);

        for k in 1..=32u64 {
            assert_eq!(table.find(k * 0x9E37, |&v| v == k), Some(&k), "{table:#?}");
        }
        assert!(table.find(0xDEAD, |&v| v == 999).is_none());
    }

    #[test]
    fn duplicate_insert_returns_false() {
        let mut table: HashTable<u64> = HashTable::with_capacity(8);
        assert!(table.insert(0x51, 51, |a, b| a == b));
        assert!(!table.insert(0x51, 51, |a, b| a == b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn same_hash_different_keys_coexist() {
        let mut table: HashTable<u64> = HashTable::with_capacity(8);
        // Same full hash, distinct keys: equality decides.
        assert!(table.insert(0x51, 1, |a, b| a == b));
        assert!(table.insert(0x51, 2, |a, b| a == b));
        assert_eq!(table.len(), 2);
        assert_eq!(table.find(0x51, |&v| v == 1), Some(&1));
        assert_eq!(table.find(0x51, |&v| v == 2), Some(&2));
    }

    /// The canonical collision walk-through: capacity 8, inserts whose
    /// hashes are 3, 3, 11, and 19 (all ideal bucket 3).
    #[test]
    fn collision_chain_layout() {
        let mut table: HashTable<u64> = HashTable::with_capacity(8);

        // First key occupies its ideal bucket directly.
        assert!(table.insert(3, 100, |a, b| a == b));
        assert_eq!(table.bucket_hash(3), 3);
        assert_eq!(table.deltas(3), (0, 0));

        // Equal key: rejected at the ideal bucket.
        assert!(!table.insert(3, 100, |a, b| a == b));

        // Distinct key, same ideal bucket: delta1 chains to the slot found
        // by the linear scan, bucket 4.
        assert!(table.insert(11, 200, |a, b| a == b));
        assert_eq!(table.deltas(3), (1, 0));
        assert_eq!(table.bucket_hash(4), 11);

        // Third distinct key: extends the chain via delta2 off bucket 4.
        assert!(table.insert(19, 300, |a, b| a == b));
        assert_eq!(table.deltas(4), (0, 1));
        assert_eq!(table.bucket_hash(5), 19);

        assert_eq!(table.len(), 3);
        for (hash, key) in [(3, 100), (11, 200), (19, 300)] {
            assert_eq!(table.find(hash, |&v| v == key), Some(&key), "{table:#?}");
        }
    }

    /// Removing the chain head relocates its successor into the ideal
    /// bucket and clears the delta1 link.
    #[test]
    fn remove_chain_head_relocates_successor() {
        let mut table: HashTable<u64> = HashTable::with_capacity(8);
        table.insert(3, 100, |a, b| a == b);
        table.insert(11, 200, |a, b| a == b);
        assert_eq!(table.deltas(3), (1, 0));

        assert_eq!(table.remove(3, |&v| v == 100), Some(100));

        assert_eq!(table.len(), 1);
        assert_eq!(table.deltas(3), (0, 0));
        assert_eq!(table.bucket_hash(3), 11);
        assert_eq!(table.bucket_hash(4), NULL_HASH);
        assert_eq!(table.find(11, |&v| v == 200), Some(&200), "{table:#?}");
    }

    /// Removing a middle-of-chain bucket refills it from the delta2 tail.
    #[test]
    fn remove_middle_of_chain_compacts() {
        let mut table: HashTable<u64> = HashTable::with_capacity(8);
        for (hash, key) in [(3, 100u64), (11, 200), (19, 300), (27, 400)] {
            table.insert(hash, key, |a, b| a == b);
        }
        assert_eq!(table.len(), 4);

        assert_eq!(table.remove(11, |&v| v == 200), Some(200));

        assert_eq!(table.len(), 3);
        for (hash, key) in [(3, 100u64), (19, 300), (27, 400)] {
            assert_eq!(table.find(hash, |&v| v == key), Some(&key), "{table:#?}");
        }
        assert_eq!(table.remove(11, |&v| v == 200), None);
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let mut table: HashTable<u64> = HashTable::with_capacity(8);
        table.insert(0x5, 5, |a, b| a == b);

        assert_eq!(table.remove(0x6, |&v| v == 6), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.find(0x5, |&v| v == 5), Some(&5));
    }

    #[test]
    fn removal_churn_preserves_remaining_keys() {
        let mut table: HashTable<u64> = HashTable::with_capacity(128);
        // Cluster everything on a handful of ideal buckets to force long
        // chains.
        for k in 0..96u64 {
            let hash = 1 + (k % 4) + k * 128;
            assert!(table.insert(hash, k, |a, b| a == b));
        }
        assert_eq!(table.len(), 96);

        for k in (0..96u64).step_by(3) {
            let hash = 1 + (k % 4) + k * 128;
            assert_eq!(table.remove(hash, |&v| v == k), Some(k), "{table:#?}");
        }
        assert_eq!(table.len(), 64);

        for k in 0..96u64 {
            let hash = 1 + (k % 4) + k * 128;
            let found = table.find(hash, |&v| v == k);
            if k % 3 == 0 {
                assert_eq!(found, None, "{k}");
            } else {
                assert_eq!(found, Some(&k), "{k}");
            }
        }
    }

    #[test]
    #[should_panic(expected = "zero is not a valid capacity")]
    fn zero_capacity_panics() {
        let _ = HashTable::<u64>::with_capacity(0);
    }

    #[test]
    #[should_panic(expected = "leapfrog table is full")]
    fn insert_into_full_table_panics() {
        let mut table: HashTable<u64> = HashTable::with_capacity(4);
        for k in 1..=4u64 {
            table.insert(k, k, |a, b| a == b);
        }
        table.insert(5, 5, |a, b| a == b);
    }

    #[test]
    fn duplicate_insert_into_full_table_is_fine() {
        let mut table: HashTable<u64> = HashTable::with_capacity(4);
        for k in 1..=4u64 {
            table.insert(k, k, |a, b| a == b);
        }
        assert!(!table.insert(2, 2, |a, b| a == b));
        assert_eq!(table.len(), 4);
    }

    #[test]
    #[should_panic(expected = "overflows the one-byte delta field")]
    fn oversized_hop_panics() {
        let mut table: HashTable<u64> = HashTable::with_capacity(512);
        // Occupy buckets 1..=300 directly, each at its own ideal index.
        for i in 1..=300u64 {
            table.insert(i, i, |a, b| a == b);
        }
        // Ideal bucket 0, then a collision whose nearest free bucket is 301
        // hops away.
        table.insert(512, 1000, |a, b| a == b);
        table.insert(1024, 1001, |a, b| a == b);
    }

    #[test]
    fn rehash_preserves_content() {
        let mut table: HashTable<u64> = HashTable::with_capacity(16);
        for k in 1..=12u64 {
            table.insert(k * 7, k, |a, b| a == b);
        }

        table.rehash(64);

        assert_eq!(table.capacity(), 64);
        assert_eq!(table.len(), 12);
        for k in 1..=12u64 {
            assert_eq!(table.find(k * 7, |&v| v == k), Some(&k), "{table:#?}");
        }
    }

    #[test]
    fn rehash_below_population_is_noop() {
        let mut table: HashTable<u64> = HashTable::with_capacity(16);
        for k in 1..=8u64 {
            table.insert(k, k, |a, b| a == b);
        }

        table.rehash(4);

        assert_eq!(table.capacity(), 16);
        assert_eq!(table.len(), 8);
        for k in 1..=8u64 {
            assert_eq!(table.find(k, |&v| v == k), Some(&k));
        }
    }

    #[test]
    fn rehash_empty_is_noop() {
        let mut table: HashTable<u64> = HashTable::with_capacity(16);
        table.rehash(64);
        assert_eq!(table.capacity(), 16);
    }

    /// A panic while reinserting must not leave moved-out keys marked live
    /// in the old table, or dropping it would free them a second time.
    #[test]
    #[cfg(feature = "std")]
    fn rehash_panic_drops_each_key_once() {
        let probe = Rc::new(());

        let mut table: HashTable<(u64, Rc<()>)> = HashTable::with_capacity(1024);
        // Reinsertion runs in bucket order. Keys 301..=598 land on new
        // buckets 1..=298, the hash-600 key takes new bucket 0, and the
        // hash-900 key then collides at bucket 0 with the only free bucket
        // 299 hops past the chain start, overflowing the delta field.
        for i in 1..=298u64 {
            table.insert(300 + i, (300 + i, Rc::clone(&probe)), |a, b| a.0 == b.0);
        }
        table.insert(600, (600, Rc::clone(&probe)), |a, b| a.0 == b.0);
        table.insert(900, (900, Rc::clone(&probe)), |a, b| a.0 == b.0);
        assert_eq!(Rc::strong_count(&probe), 301);

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            table.rehash(300);
        }));
        assert!(unwound.is_err());

        // Every moved key was dropped exactly once during the unwind and
        // the old table no longer claims any of them.
        assert_eq!(Rc::strong_count(&probe), 1);
        assert_eq!(table.len(), 0);
        drop(table);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut table: HashTable<String> = HashTable::with_capacity(8);
        table.insert(0x1, "one".to_string(), |a, b| a == b);
        table.insert(0x2, "two".to_string(), |a, b| a == b);

        table.clear();
        assert_eq!(table.len(), 0);
        assert!(table.find(0x1, |v| v == "one").is_none());

        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.capacity(), 8);

        // Still usable after clearing.
        assert!(table.insert(0x1, "one".to_string(), |a, b| a == b));
    }

    #[test]
    fn clear_and_drop_release_keys() {
        let probe = Rc::new(());

        let mut table: HashTable<(u64, Rc<()>)> = HashTable::with_capacity(8);
        for k in 1..=4u64 {
            table.insert(k, (k, Rc::clone(&probe)), |a, b| a.0 == b.0);
        }
        assert_eq!(Rc::strong_count(&probe), 5);

        assert!(table.remove(2, |v| v.0 == 2).is_some());
        assert_eq!(Rc::strong_count(&probe), 4);

        table.clear();
        assert_eq!(Rc::strong_count(&probe), 1);

        table.insert(9, (9, Rc::clone(&probe)), |a, b| a.0 == b.0);
        drop(table);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn iteration_is_bucket_ordered_and_reversible() {
        let mut table: HashTable<u64> = HashTable::with_capacity(16);
        for hash in [9u64, 3, 14, 6] {
            table.insert(hash, hash * 10, |a, b| a == b);
        }

        let forward: Vec<u64> = table.iter().copied().collect();
        assert_eq!(forward, [30, 60, 90, 140]);

        let backward: Vec<u64> = table.iter().rev().copied().collect();
        assert_eq!(backward, [140, 90, 60, 30]);

        // A fresh iterator restarts the traversal.
        assert_eq!(table.iter().count(), 4);

        let mut ends = table.iter();
        assert_eq!(ends.next(), Some(&30));
        assert_eq!(ends.next_back(), Some(&140));
        assert_eq!(ends.next(), Some(&60));
        assert_eq!(ends.next_back(), Some(&90));
        assert_eq!(ends.next(), None);
        assert_eq!(ends.next_back(), None);
    }

    #[test]
    fn empty_iteration_yields_nothing() {
        let table: HashTable<u64> = HashTable::with_capacity(8);
        assert_eq!(table.iter().next(), None);
        assert_eq!(table.iter().next_back(), None);
    }

    #[test]
    fn into_iter_drains_in_bucket_order() {
        let probe = Rc::new(());
        let mut table: HashTable<(u64, Rc<()>)> = HashTable::with_capacity(8);
        for hash in [6u64, 2, 4] {
            table.insert(hash, (hash, Rc::clone(&probe)), |a, b| a.0 == b.0);
        }
        assert_eq!(Rc::strong_count(&probe), 4);

        let keys: Vec<u64> = table.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, [2, 4, 6]);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn partial_into_iter_drops_the_rest() {
        let probe = Rc::new(());
        let mut table: HashTable<(u64, Rc<()>)> = HashTable::with_capacity(8);
        for hash in 1..=5u64 {
            table.insert(hash, (hash, Rc::clone(&probe)), |a, b| a.0 == b.0);
        }

        let mut iter = table.into_iter();
        let first = iter.next().unwrap();
        assert_eq!(first.0, 1);
        drop(iter);
        drop(first);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn clone_is_deep() {
        let mut table: HashTable<String> = HashTable::with_capacity(8);
        table.insert(0x1, "one".to_string(), |a, b| a == b);
        table.insert(0x9, "nine".to_string(), |a, b| a == b);

        let copy = table.clone();
        table.remove(0x1, |v| v == "one");

        assert_eq!(copy.len(), 2);
        assert_eq!(copy.capacity(), 8);
        assert_eq!(copy.find(0x1, |v| v == "one"), Some(&"one".to_string()));
        assert_eq!(copy.find(0x9, |v| v == "nine"), Some(&"nine".to_string()));
        assert_eq!(table.find(0x1, |v| v == "one"), None);
    }
}
