//! The generic data-flow problem abstraction.
//!
//! Every global analysis in this crate is an instance of one fixed-point
//! schema: per-block GEN and KILL sets over a shared bit universe, a
//! direction, and a confluence operator. A [`FlowProblem`] supplies those
//! ingredients; the [solver](crate::dataflow::solver) computes IN and OUT
//! sets satisfying the standard equations:
//!
//! - Forward: `IN(b) = ⊕ over predecessors p of OUT(p)`,
//!   `OUT(b) = (IN(b) - KILL(b)) ∪ GEN(b)`
//! - Backward: the mirror image over successors with IN and OUT swapped
//!
//! where `⊕` is union for may-analyses (reaching definitions, live
//! variables) and intersection for must-analyses (available expressions,
//! copy facts, very busy expressions).
//!
//! Conditional branches may carry *two* GEN/KILL pairs - one per outgoing
//! edge - because a short-circuited right operand is known to have been
//! evaluated on one edge and not the other. Problems that track this
//! override [`FlowProblem::edge_sets`]; the solver then keeps an OUT set
//! per edge.

use crate::{ir::BlockId, utils::BitSet};

/// Direction a data-flow analysis propagates information in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the entry toward the exits (reaching definitions, available
    /// expressions, copy facts).
    Forward,
    /// From the exits toward the entry (live variables, very busy
    /// expressions).
    Backward,
}

/// The operator applied where control-flow paths meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confluence {
    /// A fact holds if it holds on *any* incoming path (may-analysis).
    Union,
    /// A fact holds only if it holds on *every* incoming path
    /// (must-analysis).
    Intersection,
}

/// One block's local contribution to an analysis.
#[derive(Debug, Clone)]
pub struct GenKill {
    /// Facts this block creates.
    pub gen: BitSet,
    /// Facts this block invalidates.
    pub kill: BitSet,
}

impl GenKill {
    /// Empty GEN and KILL over a universe of the given size.
    #[must_use]
    pub fn new(universe: usize) -> Self {
        Self {
            gen: BitSet::new(universe),
            kill: BitSet::new(universe),
        }
    }

    /// Applies the transfer function to `input`, producing
    /// `(input - KILL) ∪ GEN`.
    #[must_use]
    pub fn transfer(&self, input: &BitSet) -> BitSet {
        let mut out = input.clone();
        out.difference_with(&self.kill);
        out.union_with(&self.gen);
        out
    }
}

/// A data-flow analysis instance the solver can run.
///
/// The GEN/KILL sets are built once, from the current shape of the trees,
/// when the problem is constructed; the problem therefore becomes stale as
/// soon as any block's tree is mutated and must be rebuilt before reuse.
pub trait FlowProblem {
    /// Analysis name, used in convergence-failure diagnostics.
    const NAME: &'static str;
    /// Propagation direction.
    const DIRECTION: Direction;
    /// Confluence operator.
    const CONFLUENCE: Confluence;

    /// Size of the bit universe every set ranges over.
    fn universe(&self) -> usize;

    /// The boundary set: IN of the entry block for forward analyses, OUT of
    /// every block without successors for backward analyses.
    fn boundary(&self) -> BitSet;

    /// The block's GEN/KILL pair.
    fn sets(&self, block: BlockId) -> &GenKill;

    /// Edge-specific GEN/KILL for blocks that keep one pair per outgoing
    /// edge (conditional branches with short-circuit operands). `None`
    /// means every edge uses [`FlowProblem::sets`].
    fn edge_sets(&self, _block: BlockId, _edge: usize) -> Option<&GenKill> {
        None
    }
}

/// The converged IN/OUT sets of one analysis run.
///
/// For a forward analysis `input` is the set at block entry and `output`
/// the set at block exit; backward analyses mirror the meaning. Where a
/// problem supplied per-edge sets, `edge_output` exposes the per-edge OUT
/// (falling back to the block OUT everywhere else).
#[derive(Debug, Clone)]
pub struct FlowResults {
    pub(crate) ins: Vec<BitSet>,
    pub(crate) outs: Vec<BitSet>,
    pub(crate) edge_outs: Vec<Option<Vec<BitSet>>>,
}

impl FlowResults {
    /// The IN set of `block`.
    #[must_use]
    pub fn input(&self, block: BlockId) -> &BitSet {
        &self.ins[block.index()]
    }

    /// The OUT set of `block`.
    #[must_use]
    pub fn output(&self, block: BlockId) -> &BitSet {
        &self.outs[block.index()]
    }

    /// The OUT set on the `edge`-th outgoing edge of `block`.
    #[must_use]
    pub fn edge_output(&self, block: BlockId, edge: usize) -> &BitSet {
        match &self.edge_outs[block.index()] {
            Some(per_edge) => &per_edge[edge],
            None => &self.outs[block.index()],
        }
    }

    /// Number of blocks covered.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.ins.len()
    }
}
