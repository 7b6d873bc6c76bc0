//! Shared utility types for the optimizer.
//!
//! Currently this holds the [`BitSet`] used as the carrier for every
//! data-flow lattice in the crate.

mod bitset;

pub use bitset::{BitSet, BitSetIter};
