//! Live variable analysis.
//!
//! A symbol is *live* at a point if some path forward reaches a read of it
//! before any unambiguous write. This backward union analysis ranges over
//! the symbol universe directly - no enumerator run is needed.
//!
//! # GEN/KILL construction
//!
//! - `GEN` (upward-exposed uses): symbols read in the block before any
//!   local definition.
//! - `KILL`: symbols unambiguously defined before any local read. A write
//!   under a conditional operator is not guaranteed to execute and never
//!   enters KILL; a read under one is still a possible read and enters
//!   GEN. The two sets are disjoint by construction.
//! - Calls may read any aliased symbol through saved pointers, so a call
//!   generates every aliased symbol; inline asm and call-with-unwind
//!   blocks generate everything.
//!
//! Blocks without successors seed from the caller-declared live-on-exit
//! set: the symbols marked [`SymbolFlags::LIVE_OUT`].
//!
//! Consumed by dead-assignment elimination, dead-variable marking and the
//! induction-variable reducer (to decide whether a variable may still be
//! read after the loop).

use crate::{
    dataflow::framework::{Confluence, Direction, FlowProblem, GenKill},
    ir::{BlockId, Expr, ExprId, Function, Leaf, SymbolFlags, UnaryOp},
    utils::BitSet,
};

/// The live-variables problem instance for one function.
pub struct LiveVariables {
    universe: usize,
    boundary: BitSet,
    sets: Vec<GenKill>,
}

impl LiveVariables {
    /// Builds per-block USE/DEF sets over the symbol universe.
    #[must_use]
    pub fn new(func: &Function) -> Self {
        let universe = func.symbols.len();

        let mut boundary = BitSet::new(universe);
        for (id, sym) in func.symbols.iter() {
            if sym.flags.contains(SymbolFlags::LIVE_OUT) {
                boundary.insert(id.index());
            }
        }

        let mut sets = Vec::with_capacity(func.block_count());
        for (_, block) in func.blocks() {
            let mut state = GenKill::new(universe);
            if let Some(root) = block.root {
                walk(func, root, &mut state, false);
            }
            if block.transfer.is_barrier() {
                // Unknown reads: everything not locally overwritten is
                // upward-exposed.
                let mut exposed = BitSet::full(universe);
                exposed.difference_with(&state.kill);
                state.gen.union_with(&exposed);
            }
            sets.push(state);
        }

        Self {
            universe,
            boundary,
            sets,
        }
    }
}

impl FlowProblem for LiveVariables {
    const NAME: &'static str = "live-variables";
    const DIRECTION: Direction = Direction::Backward;
    const CONFLUENCE: Confluence = Confluence::Union;

    fn universe(&self) -> usize {
        self.universe
    }

    fn boundary(&self) -> BitSet {
        self.boundary.clone()
    }

    fn sets(&self, block: BlockId) -> &GenKill {
        &self.sets[block.index()]
    }
}

/// Folds the subtree at `node` into the USE (gen) / DEF (kill) state.
/// `conditional` is true under operators whose execution is not guaranteed.
fn walk(func: &Function, node: ExprId, state: &mut GenKill, conditional: bool) {
    match &func.arena.node(node).kind {
        Expr::Leaf(Leaf::Sym(sym)) => use_symbol(*sym, state),
        Expr::Leaf(_) => {}
        Expr::Unary { opnd, .. } => walk(func, *opnd, state, conditional),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Seq {
            first: lhs,
            second: rhs,
        } => {
            walk(func, *lhs, state, conditional);
            walk(func, *rhs, state, conditional);
        }
        Expr::Short { lhs, rhs, .. } => {
            walk(func, *lhs, state, conditional);
            walk(func, *rhs, state, true);
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            walk(func, *cond, state, conditional);
            walk(func, *then_val, state, true);
            walk(func, *else_val, state, true);
        }
        Expr::Assign { op, target, value } => {
            walk(func, *value, state, conditional);
            match &func.arena.node(*target).kind {
                Expr::Leaf(Leaf::Sym(sym)) => {
                    if op.reads_target() {
                        use_symbol(*sym, state);
                    }
                    let unambiguous = func.symbols.get(*sym).is_unambiguous();
                    if !conditional && unambiguous && !state.gen.contains(sym.index()) {
                        state.kill.insert(sym.index());
                    }
                }
                Expr::Unary {
                    op: UnaryOp::Deref | UnaryOp::DispatchLoad,
                    opnd,
                } => {
                    // The address is computed (read); the store itself
                    // defines nothing unambiguously.
                    walk(func, *opnd, state, conditional);
                }
                _ => walk(func, *target, state, conditional),
            }
        }
        Expr::Call { callee, args } => {
            for arg in args {
                walk(func, *arg, state, conditional);
            }
            walk(func, *callee, state, conditional);
            // The callee may read any aliased symbol through stored
            // pointers.
            for (id, sym) in func.symbols.iter() {
                if sym.flags.contains(SymbolFlags::AMBIGUOUS) {
                    use_symbol(id, state);
                }
            }
        }
        Expr::Asm => {
            for (id, _) in func.symbols.iter() {
                use_symbol(id, state);
            }
        }
    }
}

fn use_symbol(sym: crate::ir::SymbolId, state: &mut GenKill) {
    if !state.kill.contains(sym.index()) {
        state.gen.insert(sym.index());
    }
}
