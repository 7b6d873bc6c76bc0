//! Reaching definitions analysis.
//!
//! A definition site *reaches* a program point if there is a path from the
//! definition to the point along which the defined variable is not
//! unambiguously redefined. This is the forward may-analysis everything
//! symbol-related builds on: constant propagation queries the reaching
//! definitions of every use, loop-invariant detection asks whether any
//! reaching definition lies inside the loop, and induction-variable
//! analysis asks whether exactly one update site reaches around the back
//! edge.
//!
//! # GEN/KILL construction
//!
//! Walking a block's tree in evaluation order:
//!
//! - An assignment to an unambiguous symbol kills every other definition
//!   site of that symbol in the whole function and generates itself.
//! - Assignments to aliased symbols, stores through pointers, calls and
//!   inline asm generate themselves and kill nothing.
//! - A ternary or short-circuit operator computes each arm against a copy
//!   of the incoming state; the arms' GENs union (either may have executed)
//!   while their KILLs intersect (a definition is only dead if both arms
//!   killed it).
//!
//! The entry boundary is empty: parameters have an implicit pre-entry
//! definition that is deliberately *not* modeled as a def site, which the
//! hoisting safety conditions account for separately.

use crate::{
    dataflow::{
        candidates::DefSiteTable,
        framework::{Confluence, Direction, FlowProblem, GenKill},
    },
    ir::{BlockId, Expr, ExprId, Function},
    utils::BitSet,
};

/// The reaching-definitions problem instance for one function.
///
/// Owns the def-site table its universe ranges over. Stale the moment any
/// block tree is mutated; rebuild before reuse.
pub struct ReachingDefinitions {
    table: DefSiteTable,
    sets: Vec<GenKill>,
}

impl ReachingDefinitions {
    /// Enumerates def sites and builds per-block GEN/KILL.
    #[must_use]
    pub fn new(func: &Function) -> Self {
        let table = DefSiteTable::build(func);
        let universe = table.len();

        let mut sets = Vec::with_capacity(func.block_count());
        for (_, block) in func.blocks() {
            let mut state = GenKill::new(universe);
            if let Some(root) = block.root {
                accumulate(func, &table, root, &mut state);
            }
            sets.push(state);
        }

        Self { table, sets }
    }

    /// The def-site table this instance ranges over.
    #[must_use]
    pub const fn table(&self) -> &DefSiteTable {
        &self.table
    }

    /// Restricts a def-site set to those owned by blocks inside `body`.
    #[must_use]
    pub fn defs_inside(&self, defs: &BitSet, body: &BitSet) -> BitSet {
        let mut inside = BitSet::new(self.table.len());
        for index in defs.iter() {
            if body.contains(self.table.site(index).block.index()) {
                inside.insert(index);
            }
        }
        inside
    }
}

impl FlowProblem for ReachingDefinitions {
    const NAME: &'static str = "reaching-definitions";
    const DIRECTION: Direction = Direction::Forward;
    const CONFLUENCE: Confluence = Confluence::Union;

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

/// Accumulates GEN/KILL for the subtree at `node` into `state`, threading
/// the accumulator explicitly through the recursion.
fn accumulate(func: &Function, table: &DefSiteTable, node: ExprId, state: &mut GenKill) {
    match &func.arena.node(node).kind {
        Expr::Leaf(_) | Expr::Asm => {}
        Expr::Unary { opnd, .. } => accumulate(func, table, *opnd, state),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Seq {
            first: lhs,
            second: rhs,
        } => {
            accumulate(func, table, *lhs, state);
            accumulate(func, table, *rhs, state);
        }
        Expr::Short { lhs, rhs, .. } => {
            accumulate(func, table, *lhs, state);
            let mut taken = state.clone();
            accumulate(func, table, *rhs, &mut taken);
            merge_arms(state, &taken);
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            accumulate(func, table, *cond, state);
            let mut then_arm = state.clone();
            accumulate(func, table, *then_val, &mut then_arm);
            let mut else_arm = state.clone();
            accumulate(func, table, *else_val, &mut else_arm);
            *state = then_arm;
            merge_arms(state, &else_arm);
        }
        Expr::Assign { target, value, .. } => {
            accumulate(func, table, *value, state);
            accumulate(func, table, *target, state);
            record_def(func, table, node, state);
        }
        Expr::Call { callee, args } => {
            for arg in args {
                accumulate(func, table, *arg, state);
            }
            accumulate(func, table, *callee, state);
            record_def(func, table, node, state);
        }
    }

    // Asm appears both as a bare leaf node and as a whole-block kind; a
    // bare node is a def site too.
    if matches!(func.arena.node(node).kind, Expr::Asm) {
        record_def(func, table, node, state);
    }
}

fn record_def(func: &Function, table: &DefSiteTable, node: ExprId, state: &mut GenKill) {
    let Some(index) = table.index_of(node) else {
        return;
    };
    if let Some(sym) = table.site(index).target {
        if func.symbols.get(sym).is_unambiguous() {
            let all_defs = table.defs_of(sym);
            state.gen.difference_with(all_defs);
            state.kill.union_with(all_defs);
            state.kill.remove(index);
        }
    }
    state.gen.insert(index);
}

/// Joins two conditional arms: union of GENs, intersection of KILLs.
fn merge_arms(into: &mut GenKill, other: &GenKill) {
    into.gen.union_with(&other.gen);
    into.kill.intersect_with(&other.kill);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::DepthFirstOrder,
        dataflow::{framework::FlowProblem, solver::solve},
        ir::{FunctionBuilder, ShortOp, SymbolFlags as SF, Ty},
    };

    #[test]
    fn test_second_def_kills_first() {
        // b0: x = 1   b1: x = 2   b2: use
        let mut fb = FunctionBuilder::new("redefine");
        let x = fb.symbol("x", Ty::I32, SF::empty());

        let one = fb.int(1);
        let first = fb.assign(x, one);
        fb.set_root(0, first);
        fb.jump(0, 1);

        let two = fb.int(2);
        let second = fb.assign(x, two);
        fb.set_root(1, second);
        fb.jump(1, 2);

        fb.ret(2);
        let func = fb.finish().unwrap();

        let rd = ReachingDefinitions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&rd, &func, &dfo).unwrap();

        // Only the second definition reaches block 2.
        let reaching = results.input(BlockId::new(2));
        assert_eq!(reaching.count(), 1);
        let index = reaching.iter().next().unwrap();
        assert_eq!(rd.table().site(index).block, BlockId::new(1));
    }

    #[test]
    fn test_branch_defs_merge() {
        // b0: cond   b1: x = 1   b2: x = 2   b3: both reach
        let mut fb = FunctionBuilder::new("branches");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let c = fb.symbol("c", Ty::I32, SF::empty());

        let rc = fb.read(c);
        fb.set_root(0, rc);
        fb.cond(0, 1, 2);

        let one = fb.int(1);
        let set1 = fb.assign(x, one);
        fb.set_root(1, set1);
        fb.jump(1, 3);

        let two = fb.int(2);
        let set2 = fb.assign(x, two);
        fb.set_root(2, set2);
        fb.jump(2, 3);

        fb.ret(3);
        let func = fb.finish().unwrap();

        let rd = ReachingDefinitions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&rd, &func, &dfo).unwrap();

        assert_eq!(results.input(BlockId::new(3)).count(), 2);
    }

    #[test]
    fn test_short_circuit_def_not_guaranteed() {
        // Single block: c && (x = 1); the def of x is conditional, so the
        // block must GEN it but must NOT kill an incoming def of x.
        let mut fb = FunctionBuilder::new("short");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let c = fb.symbol("c", Ty::I32, SF::empty());

        let zero = fb.int(0);
        let outer = fb.assign(x, zero);
        fb.set_root(0, outer);
        fb.jump(0, 1);

        let rc = fb.read(c);
        let one = fb.int(1);
        let inner = fb.assign(x, one);
        let short = fb.short(ShortOp::AndAnd, rc, inner);
        fb.set_root(1, short);
        fb.jump(1, 2);

        fb.ret(2);
        let func = fb.finish().unwrap();

        let rd = ReachingDefinitions::new(&func);
        let sets = rd.sets(BlockId::new(1));
        let outer_idx = rd.table().index_of(outer).unwrap();
        let inner_idx = rd.table().index_of(inner).unwrap();

        assert!(sets.gen.contains(inner_idx));
        assert!(!sets.kill.contains(outer_idx));

        // Both definitions of x reach block 2.
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&rd, &func, &dfo).unwrap();
        assert!(results.input(BlockId::new(2)).contains(outer_idx));
        assert!(results.input(BlockId::new(2)).contains(inner_idx));
    }

    #[test]
    fn test_ambiguous_write_kills_nothing() {
        // b0: a = 5 (a aliased)  b1: *p = 0  b2: both defs reach
        let mut fb = FunctionBuilder::new("aliased");
        let a = fb.symbol("a", Ty::I32, SF::AMBIGUOUS);
        let p = fb.symbol("p", Ty::Ptr, SF::empty());

        let five = fb.int(5);
        let direct = fb.assign(a, five);
        fb.set_root(0, direct);
        fb.jump(0, 1);

        let rp = fb.read(p);
        let zero = fb.int(0);
        let store = fb.store_through(rp, zero, Ty::I32);
        fb.set_root(1, store);
        fb.jump(1, 2);

        fb.ret(2);
        let func = fb.finish().unwrap();

        let rd = ReachingDefinitions::new(&func);
        let dfo = DepthFirstOrder::compute(&func).unwrap();
        let results = solve(&rd, &func, &dfo).unwrap();

        // The direct def survives the pointer store (may-analysis), and
        // the store itself also reaches.
        assert_eq!(results.input(BlockId::new(2)).count(), 2);
    }
}
