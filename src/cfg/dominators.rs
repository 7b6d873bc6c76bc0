//! Per-block dominator sets.
//!
//! Block `a` dominates block `b` if every path from the entry to `b` passes
//! through `a`. This crate keeps the full dominator *set* of every block as
//! a bit vector over the block universe - natural-loop construction and the
//! hoisting safety checks both want whole-set queries, and the block counts
//! per function are small enough that the quadratic representation is the
//! simple and fast choice.
//!
//! # Algorithm
//!
//! Standard iterative refinement: the entry's set is just itself, every
//! other block starts as "all blocks", and each sweep in reverse postorder
//! replaces `dom(b)` with `{b} ∪ ⋂ dom(p)` over its predecessors, until a
//! full sweep changes nothing. On a reducible CFG this stabilizes in at most
//! two sweeps; needing more marks the graph irreducible, which is recorded
//! on the result (and by the caller as an event) but is not an error.
//! Failing to stabilize within the generous cap means the refinement lost
//! monotonicity, which is a framework bug and therefore fatal.

use crate::{
    cfg::DepthFirstOrder,
    ir::{BlockId, Function},
    utils::BitSet,
    Result,
};

/// Ceiling on refinement sweeps. Convergence needs at most `block count`
/// sweeps on any graph; this only trips on a framework bug.
const MAX_SWEEPS: usize = 64;

/// Dominator sets for every block of a function.
///
/// Recompute whenever the CFG's shape changes; a stale instance indexes
/// blocks that may no longer exist.
#[derive(Debug, Clone)]
pub struct DominatorSets {
    sets: Vec<BitSet>,
    irreducible: bool,
}

impl DominatorSets {
    /// Computes dominator sets by iterative refinement over the given
    /// depth-first order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Fixpoint`] if refinement fails to stabilize
    /// within the sweep cap.
    pub fn compute(func: &Function, dfo: &DepthFirstOrder) -> Result<Self> {
        let count = func.block_count();
        let entry = func.entry();

        let mut sets: Vec<BitSet> = (0..count).map(|_| BitSet::full(count)).collect();
        let mut entry_set = BitSet::new(count);
        entry_set.insert(entry.index());
        sets[entry.index()] = entry_set;

        let mut sweeps = 0;
        loop {
            if sweeps >= MAX_SWEEPS {
                return Err(crate::Error::Fixpoint {
                    analysis: "dominators",
                    passes: sweeps,
                });
            }
            sweeps += 1;

            let mut changed = false;
            for &block in dfo.reverse_postorder() {
                if block == entry {
                    continue;
                }
                let mut refined = BitSet::full(count);
                for &pred in &func.block(block).preds {
                    refined.intersect_with(&sets[pred.index()]);
                }
                refined.insert(block.index());
                if refined != sets[block.index()] {
                    sets[block.index()] = refined;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        Ok(Self {
            sets,
            // The stabilizing sweep itself reports no change, so a reducible
            // graph finishes with sweeps <= 2 changed sweeps + 1.
            irreducible: sweeps > 3,
        })
    }

    /// Returns `true` if `a` dominates `b` (every block dominates itself).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.sets[b.index()].contains(a.index())
    }

    /// The full dominator set of `block`.
    #[must_use]
    pub fn set(&self, block: BlockId) -> &BitSet {
        &self.sets[block.index()]
    }

    /// Returns `true` if refinement needed more sweeps than a reducible
    /// graph can, meaning the CFG contains an irreducible region.
    #[must_use]
    pub const fn is_irreducible(&self) -> bool {
        self.irreducible
    }

    /// Number of blocks covered.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.sets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    fn doms_of(func: &Function) -> DominatorSets {
        let dfo = DepthFirstOrder::compute(func).unwrap();
        DominatorSets::compute(func, &dfo).unwrap()
    }

    #[test]
    fn test_straight_line() {
        let mut fb = FunctionBuilder::new("line");
        fb.jump(0, 1);
        fb.jump(1, 2);
        fb.ret(2);
        let func = fb.finish().unwrap();

        let doms = doms_of(&func);
        assert!(doms.dominates(BlockId::new(0), BlockId::new(2)));
        assert!(doms.dominates(BlockId::new(1), BlockId::new(2)));
        assert!(!doms.dominates(BlockId::new(2), BlockId::new(1)));
        assert!(!doms.is_irreducible());
    }

    #[test]
    fn test_diamond_join_not_dominated_by_arms() {
        let mut fb = FunctionBuilder::new("diamond");
        fb.cond(0, 1, 2);
        fb.jump(1, 3);
        fb.jump(2, 3);
        fb.ret(3);
        let func = fb.finish().unwrap();

        let doms = doms_of(&func);
        assert!(doms.dominates(BlockId::new(0), BlockId::new(3)));
        assert!(!doms.dominates(BlockId::new(1), BlockId::new(3)));
        assert!(!doms.dominates(BlockId::new(2), BlockId::new(3)));
    }

    #[test]
    fn test_loop_header_dominates_body() {
        let mut fb = FunctionBuilder::new("loop");
        fb.jump(0, 1);
        fb.cond(1, 2, 3);
        fb.jump(2, 1);
        fb.ret(3);
        let func = fb.finish().unwrap();

        let doms = doms_of(&func);
        assert!(doms.dominates(BlockId::new(1), BlockId::new(2)));
        assert!(doms.dominates(BlockId::new(1), BlockId::new(3)));
        // Back edge 2 -> 1: 1 dominates 2.
        assert!(!doms.is_irreducible());
    }
}
