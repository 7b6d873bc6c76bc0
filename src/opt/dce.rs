//! Dead-assignment elimination and dead-variable marking.
//!
//! A store to an unambiguous symbol whose value cannot be read afterwards
//! is deleted; whatever the right-hand side evaluates stays behind, so any
//! side-effecting sub-evaluation (a call, a nested store) is preserved.
//! Each block is processed against the solved live-out set, walking the
//! tree in *reverse* evaluation order so the liveness at every assignment
//! reflects the reads that follow it in the same block.
//!
//! Dead-variable marking is the bookkeeping tail: a symbol no tree
//! references at all (and that is not a parameter or an output) is flagged
//! [`SymbolFlags::DEAD`] so the code generator allocates no storage for it.

use crate::{
    cfg::DepthFirstOrder,
    dataflow::{solve, LiveVariables},
    ir::{Expr, ExprId, Function, Leaf, SymbolFlags, UnaryOp},
    opt::{config::OptPasses, context::OptContext, pass::OptPass, EventKind},
    utils::BitSet,
    Result,
};

/// The dead-assignment elimination pass.
pub struct DeadAssignments;

impl OptPass for DeadAssignments {
    fn name(&self) -> &'static str {
        "dead-assignments"
    }

    fn description(&self) -> &'static str {
        "Removes stores whose value is never read, keeping side effects"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::DEAD_ASSIGNMENTS
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let live = LiveVariables::new(func);
        let dfo = DepthFirstOrder::compute(func)?;
        let results = solve(&live, func, &dfo)?;

        // Collect the dead stores block by block, then rewrite. The
        // reverse-order walk needs only immutable access.
        let mut dead: Vec<ExprId> = Vec::new();
        for (id, block) in func.blocks() {
            let Some(root) = block.root else { continue };
            let mut live_now = results.output(id).clone();
            scan(func, root, &mut live_now, &mut dead);
        }

        for &node in &dead {
            // Replace the assignment with its right-hand side: the store
            // disappears, the evaluation (and any side effect inside it)
            // stays.
            let Expr::Assign { value, .. } = func.arena.node(node).kind.clone() else {
                continue;
            };
            let value_node = func.arena.node(value).clone();
            *func.arena.node_mut(node) = value_node;
        }

        if !dead.is_empty() {
            ctx.count_changes(self.name(), dead.len());
            ctx.record(
                EventKind::PassChange,
                self.name(),
                &func.name,
                format!("removed {} dead assignments", dead.len()),
            );
        }
        Ok(!dead.is_empty())
    }
}

/// Walks the subtree in reverse evaluation order, maintaining the set of
/// symbols live at the current point and collecting removable stores.
fn scan(func: &Function, node: ExprId, live: &mut BitSet, dead: &mut Vec<ExprId>) {
    match &func.arena.node(node).kind {
        Expr::Leaf(Leaf::Sym(sym)) => {
            live.insert(sym.index());
        }
        Expr::Leaf(_) => {}
        Expr::Unary { opnd, .. } => scan(func, *opnd, live, dead),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Seq {
            first: lhs,
            second: rhs,
        } => {
            scan(func, *rhs, live, dead);
            scan(func, *lhs, live, dead);
        }
        Expr::Short { lhs, rhs, .. } => {
            // The right arm may or may not execute; its reads are possible
            // reads, its writes guarantee nothing.
            scan(func, *rhs, live, dead);
            scan(func, *lhs, live, dead);
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            scan(func, *else_val, live, dead);
            scan(func, *then_val, live, dead);
            scan(func, *cond, live, dead);
        }
        Expr::Assign { op, target, value } => {
            match &func.arena.node(*target).kind {
                Expr::Leaf(Leaf::Sym(sym)) => {
                    let symbol = func.symbols.get(*sym);
                    if !live.contains(sym.index())
                        && symbol.is_unambiguous()
                        && !symbol.flags.contains(SymbolFlags::VOLATILE)
                    {
                        dead.push(node);
                    } else if op.reads_target() {
                        live.insert(sym.index());
                    } else {
                        live.remove(sym.index());
                    }
                }
                Expr::Unary {
                    op: UnaryOp::Deref | UnaryOp::DispatchLoad,
                    opnd,
                } => {
                    scan(func, *opnd, live, dead);
                }
                _ => {}
            }
            // The value is evaluated either way (a removed store keeps it).
            scan(func, *value, live, dead);
        }
        Expr::Call { callee, args } => {
            // The callee may read anything aliased.
            for (id, sym) in func.symbols.iter() {
                if sym.flags.contains(SymbolFlags::AMBIGUOUS) {
                    live.insert(id.index());
                }
            }
            scan(func, *callee, live, dead);
            for arg in args.iter().rev() {
                scan(func, *arg, live, dead);
            }
        }
        Expr::Asm => {
            for (id, _) in func.symbols.iter() {
                live.insert(id.index());
            }
        }
    }
}

/// The dead-variable marking pass.
pub struct DeadVariables;

impl OptPass for DeadVariables {
    fn name(&self) -> &'static str {
        "dead-variables"
    }

    fn description(&self) -> &'static str {
        "Flags symbols no tree references so codegen skips their storage"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::DEAD_VARIABLES
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let mut referenced = BitSet::new(func.symbols.len());
        for (_, block) in func.blocks() {
            let Some(root) = block.root else { continue };
            func.arena.collect_symbol_reads(root, &mut |sym| {
                referenced.insert(sym.index());
            });
        }

        let mut newly_dead = 0;
        for index in 0..func.symbols.len() {
            let id = crate::ir::SymbolId::new(index);
            let flags = func.symbols.get(id).flags;
            if referenced.contains(index)
                || flags.contains(SymbolFlags::DEAD)
                || flags.contains(SymbolFlags::PARAM)
                || flags.contains(SymbolFlags::LIVE_OUT)
            {
                continue;
            }
            func.symbols.get_mut(id).flags |= SymbolFlags::DEAD;
            newly_dead += 1;
        }

        if newly_dead > 0 {
            ctx.count_changes(self.name(), newly_dead);
            ctx.record(
                EventKind::PassChange,
                self.name(),
                &func.name,
                format!("marked {newly_dead} variables dead"),
            );
        }
        // Marking is bookkeeping, not a tree change; report no change so
        // the pipeline does not loop on it.
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, SymbolFlags as SF, Ty};

    #[test]
    fn test_removes_dead_store_keeps_side_effects() {
        // t = f(); t never read afterwards. The call must remain.
        let mut fb = FunctionBuilder::new("deadcall");
        let t = fb.symbol("t", Ty::I32, SF::empty());
        let f = fb.symbol("f", Ty::Ptr, SF::empty());

        let call = fb.call(f, vec![], Ty::I32);
        let store = fb.assign(t, call);
        fb.set_root(0, store);
        fb.ret(0);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        assert!(DeadAssignments.run(&mut func, &ctx).unwrap());

        // The store node now *is* the call.
        assert!(matches!(
            func.arena.node(store).kind,
            Expr::Call { .. }
        ));
    }

    #[test]
    fn test_keeps_store_that_feeds_later_read() {
        // x = 1; y = x; with y live out.
        let mut fb = FunctionBuilder::new("kept");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::LIVE_OUT);

        let one = fb.int(1);
        let set_x = fb.assign(x, one);
        let rx = fb.read(x);
        let set_y = fb.assign(y, rx);
        let seq = fb.seq(set_x, set_y);
        fb.set_root(0, seq);
        fb.ret(0);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        assert!(!DeadAssignments.run(&mut func, &ctx).unwrap());
        assert!(matches!(
            func.arena.node(set_x).kind,
            Expr::Assign { .. }
        ));
    }

    #[test]
    fn test_keeps_store_live_across_blocks() {
        // b0: x = 1   b1: y = x (y live out)
        let mut fb = FunctionBuilder::new("crossblock");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::LIVE_OUT);

        let one = fb.int(1);
        let set_x = fb.assign(x, one);
        fb.set_root(0, set_x);
        fb.jump(0, 1);

        let rx = fb.read(x);
        let set_y = fb.assign(y, rx);
        fb.set_root(1, set_y);
        fb.ret(1);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        assert!(!DeadAssignments.run(&mut func, &ctx).unwrap());
    }

    #[test]
    fn test_dead_variable_marking() {
        let mut fb = FunctionBuilder::new("marking");
        let unused = fb.symbol("unused", Ty::I32, SF::empty());
        let used = fb.symbol("used", Ty::I32, SF::LIVE_OUT);

        let one = fb.int(1);
        let set = fb.assign(used, one);
        fb.set_root(0, set);
        fb.ret(0);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        DeadVariables.run(&mut func, &ctx).unwrap();

        assert!(func.symbols.get(unused).flags.contains(SymbolFlags::DEAD));
        assert!(!func.symbols.get(used).flags.contains(SymbolFlags::DEAD));
    }
}
