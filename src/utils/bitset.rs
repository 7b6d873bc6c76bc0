//! A fixed-universe bit vector used as the lattice for every data-flow analysis.
//!
//! Every analysis in this crate ranges over a dense integer universe (definition
//! sites, candidate expressions, symbols or blocks), and every GEN/KILL/IN/OUT
//! set is one of these bit vectors sized exactly to that universe. Binary
//! operations assert that both operands share a universe; mixing sets from
//! different enumerator runs is a programming error that this check surfaces
//! immediately.
//!
//! # Operations
//!
//! - Membership: [`BitSet::insert`], [`BitSet::remove`], [`BitSet::contains`]
//! - Lattice ops (in place, reporting change): [`BitSet::union_with`],
//!   [`BitSet::intersect_with`], [`BitSet::difference_with`]
//! - Whole-set ops: [`BitSet::complement`], [`BitSet::clear`], [`BitSet::set_all`]
//! - Queries: [`BitSet::is_subset_of`], [`BitSet::is_disjoint`], [`BitSet::count`]
//! - Iteration over members: [`BitSet::iter`]
//!
//! # Example
//!
//! ```rust,ignore
//! use treeflow::utils::BitSet;
//!
//! let mut gen = BitSet::new(128);
//! gen.insert(3);
//! gen.insert(77);
//!
//! let mut out = BitSet::new(128);
//! out.union_with(&gen);
//! assert!(out.contains(77));
//! ```

const WORD_BITS: usize = 64;

/// A mutable bit set over a fixed universe of dense integer indices.
///
/// The universe size is fixed at construction; all in-place binary operations
/// require the other operand to have the same universe size.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    /// Backing words, least significant bit first.
    bits: Vec<u64>,
    /// Number of valid indices (bits beyond this are always zero).
    universe: usize,
}

impl BitSet {
    /// Creates an empty set over a universe of `universe` indices.
    #[must_use]
    pub fn new(universe: usize) -> Self {
        Self {
            bits: vec![0; universe.div_ceil(WORD_BITS)],
            universe,
        }
    }

    /// Creates a set over `universe` indices with every member present.
    #[must_use]
    pub fn full(universe: usize) -> Self {
        let mut set = Self::new(universe);
        set.set_all();
        set
    }

    /// Returns the universe size of this set.
    #[must_use]
    pub const fn universe(&self) -> usize {
        self.universe
    }

    /// Returns `true` if no member is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Inserts `index` into the set.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the universe.
    pub fn insert(&mut self, index: usize) {
        assert!(index < self.universe, "bit index outside universe");
        self.bits[index / WORD_BITS] |= 1u64 << (index % WORD_BITS);
    }

    /// Removes `index` from the set.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the universe.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.universe, "bit index outside universe");
        self.bits[index / WORD_BITS] &= !(1u64 << (index % WORD_BITS));
    }

    /// Returns `true` if `index` is a member.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the universe.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        assert!(index < self.universe, "bit index outside universe");
        self.bits[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Returns the number of members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Inserts every index in the universe.
    pub fn set_all(&mut self) {
        self.bits.fill(u64::MAX);
        self.mask_tail();
    }

    /// Flips membership of every index in the universe.
    pub fn complement(&mut self) {
        for word in &mut self.bits {
            *word = !*word;
        }
        self.mask_tail();
    }

    /// Replaces the contents of `self` with those of `other`.
    ///
    /// # Panics
    ///
    /// Panics if the universes differ.
    pub fn copy_from(&mut self, other: &Self) {
        self.assert_same_universe(other);
        self.bits.copy_from_slice(&other.bits);
    }

    /// In-place union. Returns `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the universes differ.
    pub fn union_with(&mut self, other: &Self) -> bool {
        self.assert_same_universe(other);
        let mut changed = false;
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            let merged = *a | *b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// In-place intersection. Returns `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the universes differ.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        self.assert_same_universe(other);
        let mut changed = false;
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            let merged = *a & *b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// In-place difference (removes every member of `other`). Returns `true`
    /// if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the universes differ.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        self.assert_same_universe(other);
        let mut changed = false;
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            let merged = *a & !*b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// Returns `true` if every member of `self` is also in `other`.
    ///
    /// # Panics
    ///
    /// Panics if the universes differ.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.assert_same_universe(other);
        self.bits.iter().zip(&other.bits).all(|(a, b)| a & !b == 0)
    }

    /// Returns `true` if the two sets share no member.
    ///
    /// # Panics
    ///
    /// Panics if the universes differ.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.assert_same_universe(other);
        self.bits.iter().zip(&other.bits).all(|(a, b)| a & b == 0)
    }

    /// Returns an iterator over the member indices in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_idx: 0,
            current: self.bits.first().copied().unwrap_or(0),
        }
    }

    /// Clears the unused bits of the last backing word.
    fn mask_tail(&mut self) {
        let tail = self.universe % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }

    fn assert_same_universe(&self, other: &Self) {
        assert_eq!(
            self.universe, other.universe,
            "bit sets from different universes"
        );
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the members of a [`BitSet`].
///
/// Scans word-by-word using trailing-zero counts, so iteration cost is
/// proportional to the number of members plus the number of words.
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_idx: usize,
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current == 0 {
            self.word_idx += 1;
            if self.word_idx >= self.set.bits.len() {
                return None;
            }
            self.current = self.set.bits[self.word_idx];
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_idx * WORD_BITS + bit)
    }
}
