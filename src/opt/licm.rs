//! Loop-invariant code motion.
//!
//! The pass owns the whole loop-shaping sequence: rotating pretest loops
//! (strategy chosen by configuration), guaranteeing every loop a
//! preheader, and finally relocating invariant computation out of the
//! loop. Each run performs at most one structural change or one loop's
//! worth of hoisting and reports a change, so the engine re-runs it
//! against freshly computed analyses until nothing applies; every
//! structural mutation invalidates the depth-first order, dominators and
//! loop forest, which are rebuilt at the top of each run.
//!
//! # Invariance
//!
//! Reaching-definitions state is carried through the loop's blocks in
//! depth-first order and every node classified bottom-up:
//!
//! - Literals are always invariant.
//! - A symbol read is invariant iff none of its reaching definitions lie
//!   inside the loop.
//! - An assignment is invariant iff its value is invariant, its target is
//!   a plain unambiguous symbol, and no *other* definition of the target
//!   reaches from inside the loop.
//! - An operator node is invariant iff its operands are. Reads through
//!   pointers are never invariant (any store in the loop may change them).
//!
//! # Relocation
//!
//! A second, top-down pass decides what actually moves to the preheader:
//!
//! - Pure non-leaf expressions, provided anything that can fault (a
//!   division) only moves when its block dominates every loop exit.
//! - Invariant assignments, provided the target is not a parameter
//!   (parameters have an implicit pre-entry definition the def-site
//!   universe does not model), the target is referenced nowhere else in
//!   the loop, and either the assignment's block dominates every exit or
//!   the target is dead past every exit.
//!
//! Before introducing a temporary the pass reuses an identical
//! already-hoisted value, so each distinct invariant value is computed at
//! most once per loop.

use crate::{
    cfg::{ensure_preheader, rotate_loop, CfgInfo, Loop, RotationStrategy},
    dataflow::{solve, FlowResults, LiveVariables, ReachingDefinitions},
    ir::{AssignOp, BlockId, Expr, ExprId, Function, Leaf, SymbolFlags, SymbolId, UnaryOp},
    opt::{config::OptPasses, context::OptContext, pass::OptPass, EventKind},
    utils::BitSet,
    Result,
};

/// The loop-invariant code motion pass.
pub struct Licm {
    strategy: RotationStrategy,
}

impl Licm {
    /// Creates the pass with the given rotation strategy.
    #[must_use]
    pub const fn new(strategy: RotationStrategy) -> Self {
        Self { strategy }
    }
}

impl OptPass for Licm {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn description(&self) -> &'static str {
        "Shapes loops and moves invariant computation to preheaders"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::LOOP_INVARIANTS
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let cfg = CfgInfo::build(func)?;
        if cfg.loops.is_empty() {
            return Ok(false);
        }

        // One structural change per run: the loop forest is stale after.
        for lp in cfg.loops.by_depth_descending() {
            if rotate_loop(func, lp, self.strategy)? {
                ctx.record(
                    EventKind::PassChange,
                    self.name(),
                    &func.name,
                    format!("rotated loop at {}", lp.header),
                );
                return Ok(true);
            }
        }
        for lp in cfg.loops.by_depth_descending() {
            if lp.preheader.is_none() {
                let (preheader, synthesized) = ensure_preheader(func, lp)?;
                if synthesized {
                    ctx.record(
                        EventKind::PassChange,
                        self.name(),
                        &func.name,
                        format!("synthesized preheader {preheader} for loop at {}", lp.header),
                    );
                    return Ok(true);
                }
            }
        }

        // Hoist one loop per run, innermost first.
        for lp in cfg.loops.by_depth_descending() {
            let hoisted = hoist_loop(func, &cfg, lp)?;
            if hoisted > 0 {
                ctx.count_changes(self.name(), hoisted);
                ctx.record(
                    EventKind::PassChange,
                    self.name(),
                    &func.name,
                    format!("hoisted {hoisted} invariants out of loop at {}", lp.header),
                );
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Hoists every legally relocatable invariant of one loop. Returns the
/// number of relocations.
fn hoist_loop(func: &mut Function, cfg: &CfgInfo, lp: &Loop) -> Result<usize> {
    let Some(preheader) = lp.preheader else {
        return Err(internal_error!(
            "loop at {} has no preheader at hoisting time",
            lp.header
        ));
    };

    let rd = ReachingDefinitions::new(func);
    let rd_results = solve(&rd, func, &cfg.dfo)?;
    let live = LiveVariables::new(func);
    let live_results = solve(&live, func, &cfg.dfo)?;

    // Bottom-up invariance classification, threading reaching state
    // through each block in depth-first order.
    let mut invariant = BitSet::new(func.arena.len());
    let loop_blocks: Vec<BlockId> = cfg
        .dfo
        .reverse_postorder()
        .iter()
        .copied()
        .filter(|b| lp.contains(*b))
        .collect();
    for &block in &loop_blocks {
        let Some(root) = func.block(block).root else {
            continue;
        };
        let mut state = rd_results.input(block).clone();
        mark(func, &rd, lp, root, &mut state, &mut invariant);
    }

    // Top-down relocation.
    let mut hoister = Hoister {
        cfg,
        lp,
        live: &live_results,
        preheader,
        invariant,
        hoisted: Vec::new(),
        moved: 0,
    };
    for &block in &loop_blocks {
        let Some(root) = func.block(block).root else {
            continue;
        };
        hoister.relocate(func, block, root);
    }
    Ok(hoister.moved)
}

/// Classifies the subtree at `node` bottom-up, returning its invariance
/// and updating the reaching state for definitions passed on the way.
fn mark(
    func: &Function,
    rd: &ReachingDefinitions,
    lp: &Loop,
    node: ExprId,
    state: &mut BitSet,
    invariant: &mut BitSet,
) -> bool {
    let inv = match &func.arena.node(node).kind {
        Expr::Leaf(Leaf::IntConst(_) | Leaf::FloatConst(_)) => true,
        Expr::Leaf(Leaf::Sym(sym)) => {
            let ambiguous = !func.symbols.get(*sym).is_unambiguous();
            let mut reaching = rd.table().defs_reaching_symbol(*sym, ambiguous);
            reaching.intersect_with(state);
            rd.defs_inside(&reaching, &lp.body).is_empty()
        }
        Expr::Unary {
            op: UnaryOp::Deref | UnaryOp::DispatchLoad,
            opnd,
        } => {
            mark(func, rd, lp, *opnd, state, invariant);
            false
        }
        Expr::Unary { opnd, .. } => mark(func, rd, lp, *opnd, state, invariant),
        Expr::Binary { lhs, rhs, .. } => {
            let l = mark(func, rd, lp, *lhs, state, invariant);
            let r = mark(func, rd, lp, *rhs, state, invariant);
            l && r
        }
        Expr::Seq { first, second } => {
            let f = mark(func, rd, lp, *first, state, invariant);
            let s = mark(func, rd, lp, *second, state, invariant);
            f && s
        }
        Expr::Short { lhs, rhs, .. } => {
            let l = mark(func, rd, lp, *lhs, state, invariant);
            let mut arm = state.clone();
            let r = mark(func, rd, lp, *rhs, &mut arm, invariant);
            state.union_with(&arm);
            l && r
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            let c = mark(func, rd, lp, *cond, state, invariant);
            let mut then_arm = state.clone();
            let t = mark(func, rd, lp, *then_val, &mut then_arm, invariant);
            let mut else_arm = state.clone();
            let e = mark(func, rd, lp, *else_val, &mut else_arm, invariant);
            *state = then_arm;
            state.union_with(&else_arm);
            c && t && e
        }
        Expr::Assign { target, value, .. } => {
            let value_inv = mark(func, rd, lp, *value, state, invariant);
            let mut inv = false;
            match &func.arena.node(*target).kind {
                Expr::Leaf(Leaf::Sym(sym)) => {
                    if value_inv && func.symbols.get(*sym).is_unambiguous() {
                        // No *other* definition of the target may reach
                        // from inside the loop.
                        let mut others = rd.table().defs_of(*sym).clone();
                        others.intersect_with(state);
                        let mut inside = rd.defs_inside(&others, &lp.body);
                        if let Some(own) = rd.table().index_of(node) {
                            inside.remove(own);
                        }
                        inv = inside.is_empty();
                    }
                }
                Expr::Unary { opnd, .. } => {
                    mark(func, rd, lp, *opnd, state, invariant);
                }
                _ => {}
            }
            advance_def(func, rd, node, state);
            inv
        }
        Expr::Call { callee, args } => {
            for arg in args {
                mark(func, rd, lp, *arg, state, invariant);
            }
            mark(func, rd, lp, *callee, state, invariant);
            advance_def(func, rd, node, state);
            false
        }
        Expr::Asm => {
            advance_def(func, rd, node, state);
            false
        }
    };

    if inv {
        invariant.insert(node.index());
    }
    inv
}

fn advance_def(func: &Function, rd: &ReachingDefinitions, node: ExprId, state: &mut BitSet) {
    let Some(index) = rd.table().index_of(node) else {
        return;
    };
    if let Some(sym) = rd.table().site(index).target {
        if func.symbols.get(sym).is_unambiguous() {
            state.difference_with(rd.table().defs_of(sym));
        }
    }
    state.insert(index);
}

struct Hoister<'a> {
    cfg: &'a CfgInfo,
    lp: &'a Loop,
    live: &'a FlowResults,
    preheader: BlockId,
    invariant: BitSet,
    /// Values already placed in the preheader this run, for reuse:
    /// `(value tree in preheader, temp holding it)`.
    hoisted: Vec<(ExprId, SymbolId)>,
    moved: usize,
}

impl Hoister<'_> {
    /// Walks top-down; relocates the outermost relocatable invariant and
    /// does not descend into what it moved.
    fn relocate(&mut self, func: &mut Function, block: BlockId, node: ExprId) {
        if self.invariant.contains(node.index()) {
            match &func.arena.node(node).kind {
                Expr::Leaf(_) => return,
                Expr::Assign { .. } => {
                    if self.try_move_assignment(func, block, node) {
                        return;
                    }
                }
                _ => {
                    if self.try_move_expression(func, block, node) {
                        return;
                    }
                }
            }
        }

        match func.arena.node(node).kind.clone() {
            Expr::Leaf(_) | Expr::Asm => {}
            Expr::Unary { opnd, .. } => self.relocate(func, block, opnd),
            Expr::Binary { lhs, rhs, .. }
            | Expr::Short { lhs, rhs, .. }
            | Expr::Seq {
                first: lhs,
                second: rhs,
            } => {
                self.relocate(func, block, lhs);
                self.relocate(func, block, rhs);
            }
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => {
                self.relocate(func, block, cond);
                self.relocate(func, block, then_val);
                self.relocate(func, block, else_val);
            }
            Expr::Assign { target, value, .. } => {
                self.relocate(func, block, value);
                if let Expr::Unary { opnd, .. } = func.arena.node(target).kind {
                    self.relocate(func, block, opnd);
                }
            }
            Expr::Call { callee, args } => {
                for arg in args {
                    self.relocate(func, block, arg);
                }
                self.relocate(func, block, callee);
            }
        }
    }

    /// Relocates a pure invariant expression, reusing an identical value
    /// hoisted earlier for this loop.
    fn try_move_expression(&mut self, func: &mut Function, block: BlockId, node: ExprId) -> bool {
        let volatile =
            |s: SymbolId| func.symbols.get(s).flags.contains(SymbolFlags::VOLATILE);
        if !func.arena.is_pure(node, &volatile) {
            return false;
        }
        // A faulting operator may only run early where it was bound to run
        // anyway.
        if contains_trap(func, node) && !self.dominates_all_exits(block) {
            return false;
        }

        let temp = self.temp_for_value(func, node);
        let ty = func.arena.node(node).ty;
        func.arena.node_mut(node).kind = Expr::Leaf(Leaf::Sym(temp));
        func.arena.node_mut(node).ty = ty;
        self.moved += 1;
        true
    }

    /// Relocates an invariant assignment under the assignment-specific
    /// safety conditions.
    fn try_move_assignment(&mut self, func: &mut Function, block: BlockId, node: ExprId) -> bool {
        let Expr::Assign {
            op: AssignOp::Set,
            target,
            value,
        } = func.arena.node(node).kind
        else {
            return false;
        };
        let Some(sym) = func.arena.as_sym_read(target) else {
            return false;
        };
        let volatile =
            |s: SymbolId| func.symbols.get(s).flags.contains(SymbolFlags::VOLATILE);
        if !func.arena.is_pure(value, &volatile) {
            return false;
        }
        let flags = func.symbols.get(sym).flags;
        if flags.contains(SymbolFlags::PARAM) || flags.contains(SymbolFlags::VOLATILE) {
            return false;
        }
        if contains_trap(func, value) && !self.dominates_all_exits(block) {
            return false;
        }
        // The store must not become visible on an exit path that skipped
        // it, and no other reference to the target may exist in the loop.
        if !self.dominates_all_exits(block) && self.live_past_any_exit(sym) {
            return false;
        }
        if self.references_elsewhere_in_loop(func, sym, node) {
            return false;
        }

        // Move the whole assignment; the original site reads the target.
        let copy = func.arena.copy_subtree(node);
        func.thread_statement(self.preheader, copy);
        let ty = func.arena.node(node).ty;
        func.arena.node_mut(node).kind = Expr::Leaf(Leaf::Sym(sym));
        func.arena.node_mut(node).ty = ty;
        self.moved += 1;
        true
    }

    /// The temporary holding this invariant value, creating (and
    /// evaluating) it in the preheader if no identical value was hoisted
    /// yet.
    fn temp_for_value(&mut self, func: &mut Function, node: ExprId) -> SymbolId {
        if let Some(&(_, temp)) = self
            .hoisted
            .iter()
            .find(|&&(value, _)| func.arena.trees_equal(value, node))
        {
            return temp;
        }

        let ty = func.arena.node(node).ty;
        let temp = func.new_temp(ty);
        let value = func.arena.copy_subtree(node);
        let target = func.arena.sym(temp, ty);
        let assign = func.arena.alloc(
            Expr::Assign {
                op: AssignOp::Set,
                target,
                value,
            },
            ty,
        );
        func.thread_statement(self.preheader, assign);
        self.hoisted.push((value, temp));
        temp
    }

    fn dominates_all_exits(&self, block: BlockId) -> bool {
        self.lp
            .exits
            .iter()
            .all(|exit| self.cfg.doms.dominates(block, BlockId::new(exit)))
    }

    /// Whether `sym` may be read after leaving the loop through any exit.
    fn live_past_any_exit(&self, sym: SymbolId) -> bool {
        self.lp
            .exits
            .iter()
            .any(|exit| self.live.output(BlockId::new(exit)).contains(sym.index()))
    }

    /// Whether any loop tree references `sym` outside the given node.
    fn references_elsewhere_in_loop(
        &self,
        func: &Function,
        sym: SymbolId,
        node: ExprId,
    ) -> bool {
        for member in self.lp.body.iter() {
            let block = BlockId::new(member);
            let Some(root) = func.block(block).root else {
                continue;
            };
            let mut found = false;
            func.arena.visit_eval_order(root, &mut |n| {
                if n == node {
                    return;
                }
                if let Expr::Leaf(Leaf::Sym(s)) = func.arena.node(n).kind {
                    // References inside the moved subtree do not count.
                    if s == sym && !is_descendant(func, node, n) {
                        found = true;
                    }
                }
            });
            if found {
                return true;
            }
        }
        false
    }
}

/// Whether `maybe_child` lies in the subtree rooted at `root`.
fn is_descendant(func: &Function, root: ExprId, maybe_child: ExprId) -> bool {
    let mut found = false;
    func.arena.visit_eval_order(root, &mut |n| {
        if n == maybe_child {
            found = true;
        }
    });
    found
}

fn contains_trap(func: &Function, node: ExprId) -> bool {
    let mut found = false;
    func.arena.visit_eval_order(node, &mut |n| {
        if let Expr::Binary { op, .. } = func.arena.node(n).kind {
            if op.can_trap() {
                found = true;
            }
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, SymbolFlags as SF, Ty};
    use crate::opt::OptContext;

    /// for (i = 0; i < n; i++) { a = x * 2 + 1; i += 1 } with x unmodified.
    fn invariant_loop() -> (Function, ExprId) {
        let mut fb = FunctionBuilder::new("inv");
        let i = fb.symbol("i", Ty::I32, SF::empty());
        let n = fb.symbol("n", Ty::I32, SF::PARAM);
        let x = fb.symbol("x", Ty::I32, SF::PARAM);
        // Parameter target: the store stays put, only its value moves.
        let a = fb.symbol("a", Ty::I32, SF::PARAM | SF::LIVE_OUT);

        let zero = fb.int(0);
        let init = fb.assign(i, zero);
        fb.set_root(0, init);
        fb.jump(0, 1);

        let ri = fb.read(i);
        let rn = fb.read(n);
        let cmp = fb.lt(ri, rn);
        fb.set_root(1, cmp);
        fb.cond(1, 2, 3);

        let rx = fb.read(x);
        let two = fb.int(2);
        let prod = fb.mul(rx, two);
        let one = fb.int(1);
        let value = fb.add(prod, one);
        let store = fb.assign(a, value);
        let one2 = fb.int(1);
        let bump = fb.add_assign(i, one2);
        let body = fb.seq(store, bump);
        fb.set_root(2, body);
        fb.jump(2, 1);

        fb.ret(3);
        (fb.finish().unwrap(), value)
    }

    fn run_to_fixpoint(func: &mut Function) -> usize {
        let ctx = OptContext::new();
        let licm = Licm::new(RotationStrategy::Speed);
        let mut runs = 0;
        while licm.run(func, &ctx).unwrap() {
            runs += 1;
            assert!(runs < 32, "licm failed to converge");
        }
        runs
    }

    #[test]
    fn test_hoists_invariant_expression() {
        let (mut func, value) = invariant_loop();
        let runs = run_to_fixpoint(&mut func);
        assert!(runs > 0);
        assert!(func.validate().is_ok());

        // The loop body now stores from a temporary instead of computing
        // x * 2 + 1.
        let replaced = func.arena.as_sym_read(value).expect("value was replaced");
        assert!(func.symbols.get(replaced).name.starts_with("$t"));

        // Exactly one block assigns the temporary, and it is not the loop
        // body (block 2).
        let mut assigning_blocks = Vec::new();
        for (id, block) in func.blocks() {
            let Some(root) = block.root else { continue };
            func.arena.visit_eval_order(root, &mut |n| {
                if let Expr::Assign { target, .. } = func.arena.node(n).kind {
                    if func.arena.as_sym_read(target) == Some(replaced) {
                        assigning_blocks.push(id);
                    }
                }
            });
        }
        assert_eq!(assigning_blocks.len(), 1);
        assert_ne!(assigning_blocks[0], BlockId::new(2));
    }

    #[test]
    fn test_does_not_hoist_variant_expression() {
        // The loop body computes i * 2, which depends on the induction
        // variable and must stay.
        let mut fb = FunctionBuilder::new("variant");
        let i = fb.symbol("i", Ty::I32, SF::empty());
        let a = fb.symbol("a", Ty::I32, SF::LIVE_OUT);

        let zero = fb.int(0);
        let init = fb.assign(i, zero);
        fb.set_root(0, init);
        fb.jump(0, 1);

        let ri = fb.read(i);
        let ten = fb.int(10);
        let cmp = fb.lt(ri, ten);
        fb.set_root(1, cmp);
        fb.cond(1, 2, 3);

        let ri2 = fb.read(i);
        let two = fb.int(2);
        let prod = fb.mul(ri2, two);
        let store = fb.assign(a, prod);
        let one = fb.int(1);
        let bump = fb.add_assign(i, one);
        let body = fb.seq(store, bump);
        fb.set_root(2, body);
        fb.jump(2, 1);

        fb.ret(3);
        let mut func = fb.finish().unwrap();

        run_to_fixpoint(&mut func);
        // The multiply survives in place.
        assert!(matches!(
            func.arena.node(prod).kind,
            Expr::Binary { op: crate::ir::BinOp::Mul, .. }
        ));
    }
}
