//! Very busy expression analysis.
//!
//! An expression is *very busy* at a point if every path leaving that point
//! evaluates it before any of its operands change. Hoisting such an
//! expression to the point itself therefore never computes a value the
//! original program would not have computed - subject to the separate
//! precondition, checked by the redundancy pass, that the early evaluation
//! does not land on a path that originally never reached any of the
//! evaluations.
//!
//! This is the backward mirror of available expressions: intersection
//! confluence over the very-busy candidate universe (available-expression
//! eligibility minus anything that reads through a pointer). Block-local
//! GEN takes only candidates evaluated before any kill on the block's
//! single forward path; KILL takes everything the block may invalidate.
//! The boundary at blocks without successors is empty - nothing is busy
//! after the function ends.

use crate::{
    dataflow::{
        available::{build_block_sets, GenMode},
        candidates::{CandidateKind, CandidateTable},
        framework::{Confluence, Direction, FlowProblem, GenKill},
        kills::KillSets,
    },
    ir::{BlockId, Function},
    utils::BitSet,
};

/// The very-busy-expressions problem instance for one function.
pub struct VeryBusyExpressions {
    table: CandidateTable,
    sets: Vec<GenKill>,
}

impl VeryBusyExpressions {
    /// Enumerates candidates and builds per-block GEN/KILL.
    #[must_use]
    pub fn new(func: &Function) -> Self {
        let table = CandidateTable::build(func, CandidateKind::VeryBusy);
        let kills = KillSets::classify(func, &table);
        let (sets, _) = build_block_sets(func, &table, &kills, GenMode::FirstComputation);
        Self { table, sets }
    }

    /// The candidate table this instance ranges over.
    #[must_use]
    pub const fn table(&self) -> &CandidateTable {
        &self.table
    }
}

impl FlowProblem for VeryBusyExpressions {
    const NAME: &'static str = "very-busy-expressions";
    const DIRECTION: Direction = Direction::Backward;
    const CONFLUENCE: Confluence = Confluence::Intersection;

    fn universe(&self) -> usize {
        self.table.len()
    }

    fn boundary(&self) -> BitSet {
        BitSet::new(self.table.len())
    }

    fn sets(&self, block: BlockId) -> &GenKill {
        &self.sets[block.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::DepthFirstOrder,
        dataflow::solver::solve,
        ir::{FunctionBuilder, SymbolFlags as SF, Ty},
    };

    /// Builds a diamond where both arms compute `a + b`.
    fn both_arms_compute() -> (Function, crate::ir::ExprId, crate::ir::ExprId) {
        let mut fb = FunctionBuilder::new("busy");
        let a = fb.symbol("a", Ty::I32, SF::empty());
        let b = fb.symbol("b", Ty::I32, SF::empty());
        let c = fb.symbol("c", Ty::I32, SF::empty());
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::empty());

        let rc = fb.read(c);
        fb.set_root(0, rc);
        fb.cond(0, 1, 2);

        let ra1 = fb.read(a);
        let rb1 = fb.read(b);
        let sum1 = fb.add(ra1, rb1);
        let set_x = fb.assign(x, sum1);
        fb.set_root(1, set_x);
        fb.jump(1, 3);

        let ra2 = fb.read(a);
        let rb2 = fb.read(b);
        let sum2 = fb.add(ra2, rb2);
        let set_y = fb.assign(y, sum2);
        fb.set_root(2, set_y);
        fb.jump(2, 3);

        fb.ret(3);
        (fb.finish().unwrap(), sum1, sum2)
    }

    #[test]
    fn test_busy_on_both_arms() {
        let (func, sum1, sum2) = both_arms_compute();
        let vbe = VeryBusyExpressions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&vbe, &func, &dfo).unwrap();

        // Both occurrences of a + b are the same candidate, and it is busy
        // at the branch point because every path forward evaluates it.
        let index = vbe.table().index_of(sum1).unwrap();
        assert_eq!(vbe.table().index_of(sum2), Some(index));
        assert!(results.output(BlockId::new(0)).contains(index));
    }

    #[test]
    fn test_operand_write_blocks_busyness() {
        // b1 writes `a` before computing a + b; the expression is not busy
        // at the branch.
        let mut fb = FunctionBuilder::new("blocked");
        let a = fb.symbol("a", Ty::I32, SF::empty());
        let b = fb.symbol("b", Ty::I32, SF::empty());
        let c = fb.symbol("c", Ty::I32, SF::empty());
        let x = fb.symbol("x", Ty::I32, SF::empty());

        let rc = fb.read(c);
        fb.set_root(0, rc);
        fb.cond(0, 1, 2);

        let zero = fb.int(0);
        let clobber = fb.assign(a, zero);
        let ra1 = fb.read(a);
        let rb1 = fb.read(b);
        let sum1 = fb.add(ra1, rb1);
        let set_x = fb.assign(x, sum1);
        let seq = fb.seq(clobber, set_x);
        fb.set_root(1, seq);
        fb.jump(1, 3);

        let ra2 = fb.read(a);
        let rb2 = fb.read(b);
        let sum2 = fb.add(ra2, rb2);
        let set_x2 = fb.assign(x, sum2);
        fb.set_root(2, set_x2);
        fb.jump(2, 3);

        fb.ret(3);
        let func = fb.finish().unwrap();

        let vbe = VeryBusyExpressions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&vbe, &func, &dfo).unwrap();

        // sum1 is evaluated only after its operand is clobbered, so it is
        // not in b1's IN, and the branch exit loses it to the intersection.
        let sum1_idx = vbe.table().index_of(sum1).unwrap();
        assert!(!results.input(BlockId::new(1)).contains(sum1_idx));
        assert!(!results.output(BlockId::new(0)).contains(sum1_idx));
    }
}
