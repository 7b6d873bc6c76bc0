//! Basic blocks and control-transfer kinds.

use crate::ir::ExprId;

/// A strongly-typed index of a block within a function.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Creates a `BlockId` from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the raw index, usable for indexing per-block tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// How control leaves a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Falls through to the single successor.
    Fall,
    /// Unconditional jump to the single successor.
    Jump,
    /// Conditional branch; the block's tree computes the condition.
    /// Successor 0 is the taken edge, successor 1 the fall-through edge.
    Cond,
    /// Multi-way switch; the block's tree computes the selector. One
    /// successor per case.
    Switch,
    /// A call that may unwind. Successor 0 is the normal return path,
    /// successor 1 the handler. Treated as a barrier by every analysis.
    UnwindCall,
    /// Function return; no successors.
    Return,
    /// Inline-assembly block. Treated as a barrier by every analysis.
    Asm,
}

impl Transfer {
    /// Returns `true` for block kinds whose effects on memory and symbols
    /// are unknown: they kill every tracked fact (or, for liveness,
    /// generate every escaping symbol).
    #[must_use]
    pub const fn is_barrier(self) -> bool {
        matches!(self, Self::UnwindCall | Self::Asm)
    }
}

/// A node of the control-flow graph.
///
/// A block holds its control-transfer kind, ordered predecessor and
/// successor lists, and at most one expression tree representing all of its
/// computation. Per-analysis bit sets are *not* stored here; each analysis
/// run owns its sets in tables indexed by block, so nothing stale survives a
/// CFG mutation.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// How control leaves this block.
    pub transfer: Transfer,
    /// Ordered predecessor blocks.
    pub preds: Vec<BlockId>,
    /// Ordered successor blocks. Order is meaningful for [`Transfer::Cond`]
    /// (taken, fall-through) and [`Transfer::UnwindCall`] (normal, handler).
    pub succs: Vec<BlockId>,
    /// Root of this block's expression tree, if it computes anything.
    pub root: Option<ExprId>,
    /// Relative execution-frequency weight, written by loop discovery and
    /// consumed downstream for register-allocation priority.
    pub weight: u32,
}

impl BasicBlock {
    /// Creates an empty block with the given transfer kind.
    #[must_use]
    pub fn new(transfer: Transfer) -> Self {
        Self {
            transfer,
            preds: Vec::new(),
            succs: Vec::new(),
            root: None,
            weight: 1,
        }
    }

    /// Returns `true` if the block has no successors.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.succs.is_empty()
    }
}
