//! Copy propagation.
//!
//! Where a copy fact `x = y` holds - the copy executed on every path to the
//! point and neither symbol was written since - a read of `x` can be
//! replaced by a read of `y`. This exposes dead copies to dead-assignment
//! elimination and lengthens the live range of `y` instead of `x`, which
//! tends to free the copy's target entirely.
//!
//! The facts come from the dedicated copy analysis
//! ([`CopyFacts`]): a copy is invalidated by a write to
//! *either* side, so the analysis cannot be derived from reaching
//! definitions. Within a block the solved IN state is carried through the
//! tree the same way the analysis built its GEN/KILL: arms of conditional
//! operators merge conservatively, and only facts currently held justify a
//! substitution.
//!
//! The pass deliberately substitutes symbols, never literals: collapsing
//! `y = x` into `y = 1` is constant propagation's job and only happens
//! when that pass has proven `x` is always 1.

use crate::{
    cfg::DepthFirstOrder,
    dataflow::{candidates::copy_parts, solve, CandidateTable, CopyFacts, KillSets},
    ir::{Expr, ExprId, Function, Leaf, SymbolId},
    opt::{config::OptPasses, context::OptContext, pass::OptPass, EventKind},
    utils::BitSet,
    Result,
};

/// The copy propagation pass.
pub struct CopyProp;

impl OptPass for CopyProp {
    fn name(&self) -> &'static str {
        "copy-prop"
    }

    fn description(&self) -> &'static str {
        "Replaces reads of a copied variable with the copy's source"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::COPY_PROP
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let copies = CopyFacts::new(func);
        if copies.table().is_empty() {
            return Ok(false);
        }
        let kills = KillSets::classify(func, copies.table());
        let dfo = DepthFirstOrder::compute(func)?;
        let results = solve(&copies, func, &dfo)?;

        let mut replacements: Vec<(ExprId, SymbolId)> = Vec::new();
        for (id, block) in func.blocks() {
            let Some(root) = block.root else { continue };
            let walker = Walker {
                func,
                table: copies.table(),
                kills: &kills,
            };
            let mut state = results.input(id).clone();
            walker.walk(root, &mut state, &mut replacements);
        }

        for &(node, src) in &replacements {
            let ty = func.arena.node(node).ty;
            func.arena.node_mut(node).kind = Expr::Leaf(Leaf::Sym(src));
            func.arena.node_mut(node).ty = ty;
        }

        if !replacements.is_empty() {
            ctx.count_changes(self.name(), replacements.len());
            ctx.record(
                EventKind::PassChange,
                self.name(),
                &func.name,
                format!("propagated {} copies", replacements.len()),
            );
        }
        Ok(!replacements.is_empty())
    }
}

struct Walker<'f> {
    func: &'f Function,
    table: &'f CandidateTable,
    kills: &'f KillSets,
}

impl Walker<'_> {
    /// Walks in evaluation order, carrying the live copy facts.
    fn walk(&self, node: ExprId, state: &mut BitSet, replacements: &mut Vec<(ExprId, SymbolId)>) {
        match &self.func.arena.node(node).kind {
            Expr::Leaf(Leaf::Sym(sym)) => {
                if let Some(src) = self.active_copy_of(*sym, state) {
                    replacements.push((node, src));
                }
            }
            Expr::Leaf(_) => {}
            Expr::Unary { opnd, .. } => self.walk(*opnd, state, replacements),
            Expr::Binary { lhs, rhs, .. }
            | Expr::Seq {
                first: lhs,
                second: rhs,
            } => {
                self.walk(*lhs, state, replacements);
                self.walk(*rhs, state, replacements);
            }
            Expr::Short { lhs, rhs, .. } => {
                self.walk(*lhs, state, replacements);
                let mut arm = state.clone();
                self.walk(*rhs, &mut arm, replacements);
                // A fact survives the merge only if it survived both arms.
                state.intersect_with(&arm);
            }
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => {
                self.walk(*cond, state, replacements);
                let mut then_arm = state.clone();
                self.walk(*then_val, &mut then_arm, replacements);
                let mut else_arm = state.clone();
                self.walk(*else_val, &mut else_arm, replacements);
                *state = then_arm;
                state.intersect_with(&else_arm);
            }
            Expr::Assign { target, value, .. } => {
                self.walk(*value, state, replacements);
                match self.func.arena.as_sym_read(*target) {
                    Some(sym) => {
                        state.difference_with(self.table.killed_by_write(sym));
                    }
                    None => {
                        if let Expr::Unary { opnd, .. } = &self.func.arena.node(*target).kind {
                            self.walk(*opnd, state, replacements);
                        }
                        state.difference_with(&self.kills.defkill);
                    }
                }
                if let Some(index) = self.table.index_of(node) {
                    state.insert(index);
                }
            }
            Expr::Call { callee, args } => {
                for arg in args {
                    self.walk(*arg, state, replacements);
                }
                self.walk(*callee, state, replacements);
                state.difference_with(&self.kills.killed_by_call());
            }
            Expr::Asm => state.clear(),
        }
    }

    /// The active copy fact whose destination is `sym`, if one holds. Two
    /// facts with the same destination cannot hold at once (the later copy
    /// kills the earlier), so the first hit is the answer.
    fn active_copy_of(&self, sym: SymbolId, state: &BitSet) -> Option<SymbolId> {
        for index in state.iter() {
            let (dst, src) = copy_parts(self.func, self.table.candidate(index).node)
                .expect("copy candidate shape");
            if dst == sym {
                return Some(src);
            }
        }
        None
    }
}
