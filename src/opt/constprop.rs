//! Constant propagation and folding.
//!
//! For every read of a symbol, the pass intersects the solved reaching
//! definitions with the definitions that may write the symbol. If every
//! reaching definition stores the same integer literal, the read is
//! replaced by the literal; the trees are then folded bottom-up so the
//! newly exposed constant operators collapse, which in turn feeds the
//! dead-code pass constant branch conditions.
//!
//! This is also where the optimizer's one user-facing diagnostic lives: a
//! read whose reaching-definition set is *empty* means no assignment can
//! reach it. The diagnostic is emitted once per variable (repeats are
//! suppressed through the context) and only for ordinary scalars -
//! volatile symbols, bit-field paths and parameters (which have an
//! implicit pre-entry definition) are exempt.

use crate::{
    cfg::DepthFirstOrder,
    dataflow::{solve, DefSiteTable, ReachingDefinitions},
    ir::{
        AssignOp, BinOp, Expr, ExprArena, ExprId, Function, Leaf, ShortOp, SymbolFlags, SymbolId,
        Ty, UnaryOp,
    },
    opt::{config::OptPasses, context::OptContext, pass::OptPass, EventKind},
    utils::BitSet,
    Result,
};

/// The constant propagation pass.
pub struct ConstProp;

impl OptPass for ConstProp {
    fn name(&self) -> &'static str {
        "const-prop"
    }

    fn description(&self) -> &'static str {
        "Replaces reads whose reaching definitions all store one literal"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::CONST_PROP
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let rd = ReachingDefinitions::new(func);
        let dfo = DepthFirstOrder::compute(func)?;
        let results = solve(&rd, func, &dfo)?;

        let mut replacements: Vec<(ExprId, i64, Ty)> = Vec::new();
        for (id, block) in func.blocks() {
            let Some(root) = block.root else { continue };
            let mut state = results.input(id).clone();
            walk(func, rd.table(), ctx, root, &mut state, &mut replacements);
        }

        let mut changed = false;
        for &(node, value, ty) in &replacements {
            func.arena.node_mut(node).kind = Expr::Leaf(Leaf::IntConst(value));
            func.arena.node_mut(node).ty = ty;
            changed = true;
        }

        // Fold what the substitutions exposed.
        let roots: Vec<ExprId> = func.blocks().filter_map(|(_, b)| b.root).collect();
        for root in roots {
            changed |= fold(&mut func.arena, root);
        }

        if !replacements.is_empty() {
            ctx.count_changes(self.name(), replacements.len());
            ctx.record(
                EventKind::PassChange,
                self.name(),
                &func.name,
                format!("propagated {} constant reads", replacements.len()),
            );
        }
        Ok(changed)
    }
}

/// Walks a tree in evaluation order, carrying the reaching-definitions
/// state through it, substituting constant reads and diagnosing reads with
/// no reaching definition.
fn walk(
    func: &Function,
    table: &DefSiteTable,
    ctx: &OptContext,
    node: ExprId,
    state: &mut BitSet,
    replacements: &mut Vec<(ExprId, i64, Ty)>,
) {
    match &func.arena.node(node).kind {
        Expr::Leaf(Leaf::Sym(sym)) => {
            handle_read(func, table, ctx, node, *sym, state, replacements);
        }
        Expr::Leaf(_) => {}
        Expr::Unary { opnd, .. } => walk(func, table, ctx, *opnd, state, replacements),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Seq {
            first: lhs,
            second: rhs,
        } => {
            walk(func, table, ctx, *lhs, state, replacements);
            walk(func, table, ctx, *rhs, state, replacements);
        }
        Expr::Short { lhs, rhs, .. } => {
            walk(func, table, ctx, *lhs, state, replacements);
            let mut arm = state.clone();
            walk(func, table, ctx, *rhs, &mut arm, replacements);
            state.union_with(&arm);
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            walk(func, table, ctx, *cond, state, replacements);
            let mut then_arm = state.clone();
            walk(func, table, ctx, *then_val, &mut then_arm, replacements);
            let mut else_arm = state.clone();
            walk(func, table, ctx, *else_val, &mut else_arm, replacements);
            *state = then_arm;
            state.union_with(&else_arm);
        }
        Expr::Assign { op, target, value } => {
            walk(func, table, ctx, *value, state, replacements);
            match &func.arena.node(*target).kind {
                Expr::Leaf(Leaf::Sym(sym)) => {
                    if op.reads_target() {
                        // The compound read participates in the
                        // uninitialized diagnostic but is never rewritten:
                        // the leaf is a store target.
                        diagnose_read(func, table, ctx, *sym, state);
                    }
                }
                Expr::Unary { opnd, .. } => {
                    walk(func, table, ctx, *opnd, state, replacements);
                }
                _ => walk(func, table, ctx, *target, state, replacements),
            }
            advance_def(func, table, node, state);
        }
        Expr::Call { callee, args } => {
            for arg in args {
                walk(func, table, ctx, *arg, state, replacements);
            }
            walk(func, table, ctx, *callee, state, replacements);
            advance_def(func, table, node, state);
        }
        Expr::Asm => advance_def(func, table, node, state),
    }
}

/// Updates the local reaching state for a definition site.
fn advance_def(func: &Function, table: &DefSiteTable, node: ExprId, state: &mut BitSet) {
    let Some(index) = table.index_of(node) else {
        return;
    };
    if let Some(sym) = table.site(index).target {
        if func.symbols.get(sym).is_unambiguous() {
            state.difference_with(table.defs_of(sym));
        }
    }
    state.insert(index);
}

fn handle_read(
    func: &Function,
    table: &DefSiteTable,
    ctx: &OptContext,
    node: ExprId,
    sym: SymbolId,
    state: &BitSet,
    replacements: &mut Vec<(ExprId, i64, Ty)>,
) {
    let Some(reaching) = diagnose_read(func, table, ctx, sym, state) else {
        return;
    };

    // Fold only when every reaching definition is a plain store of one and
    // the same literal.
    let mut literal: Option<i64> = None;
    for index in reaching.iter() {
        let site = table.site(index);
        if site.target != Some(sym) {
            return; // An ambiguous definition may write anything.
        }
        let Expr::Assign {
            op: AssignOp::Set,
            value,
            ..
        } = &func.arena.node(site.node).kind
        else {
            return;
        };
        let Some(value) = func.arena.int_const(*value) else {
            return;
        };
        match literal {
            None => literal = Some(value),
            Some(seen) if seen == value => {}
            Some(_) => return,
        }
    }

    if let Some(value) = literal {
        let ty = func.arena.node(node).ty;
        replacements.push((node, value, ty));
    }
}

/// Intersects the live reaching state with the definitions of `sym`,
/// emitting the uninitialized-read diagnostic when the result is empty.
/// Returns `None` when empty (there is nothing to propagate from).
fn diagnose_read(
    func: &Function,
    table: &DefSiteTable,
    ctx: &OptContext,
    sym: SymbolId,
    state: &BitSet,
) -> Option<BitSet> {
    let symbol = func.symbols.get(sym);
    let ambiguous = symbol.flags.contains(SymbolFlags::AMBIGUOUS);
    let mut reaching = table.defs_reaching_symbol(sym, ambiguous);
    reaching.intersect_with(state);

    if reaching.is_empty() {
        let exempt = symbol.flags.contains(SymbolFlags::VOLATILE)
            || symbol.flags.contains(SymbolFlags::BITFIELD)
            || symbol.flags.contains(SymbolFlags::PARAM);
        if !exempt {
            ctx.warn_uninitialized(&func.name, &symbol.name);
        }
        return None;
    }
    Some(reaching)
}

/// Folds constant subtrees bottom-up. Returns `true` if anything changed.
pub(crate) fn fold(arena: &mut ExprArena, node: ExprId) -> bool {
    let mut changed = false;
    match arena.node(node).kind.clone() {
        Expr::Leaf(_) | Expr::Asm => {}
        Expr::Unary { op, opnd } => {
            changed |= fold(arena, opnd);
            let ty = arena.node(node).ty;
            if let Some(value) = arena.int_const(opnd) {
                if let Some(folded) = eval_unary(op, value, ty) {
                    arena.node_mut(node).kind = Expr::Leaf(Leaf::IntConst(folded));
                    changed = true;
                }
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            changed |= fold(arena, lhs);
            changed |= fold(arena, rhs);
            let operand_ty = arena.node(lhs).ty;
            if let (Some(a), Some(b)) = (arena.int_const(lhs), arena.int_const(rhs)) {
                if let Some(folded) = eval_binary(op, a, b, operand_ty) {
                    arena.node_mut(node).kind = Expr::Leaf(Leaf::IntConst(folded));
                    changed = true;
                }
            }
        }
        Expr::Short { op, lhs, rhs } => {
            changed |= fold(arena, lhs);
            changed |= fold(arena, rhs);
            if let Some(l) = arena.int_const(lhs) {
                match (op, l != 0) {
                    (ShortOp::AndAnd, false) => {
                        arena.node_mut(node).kind = Expr::Leaf(Leaf::IntConst(0));
                        changed = true;
                    }
                    (ShortOp::OrOr, true) => {
                        arena.node_mut(node).kind = Expr::Leaf(Leaf::IntConst(1));
                        changed = true;
                    }
                    _ => {
                        // The left operand no longer matters; the result
                        // is the right operand normalized to 0/1.
                        if let Some(r) = arena.int_const(rhs) {
                            arena.node_mut(node).kind =
                                Expr::Leaf(Leaf::IntConst(i64::from(r != 0)));
                        } else {
                            let ty = arena.node(rhs).ty;
                            let zero = arena.int(0, ty);
                            arena.node_mut(node).kind = Expr::Binary {
                                op: BinOp::Ne,
                                lhs: rhs,
                                rhs: zero,
                            };
                        }
                        changed = true;
                    }
                }
            }
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            changed |= fold(arena, cond);
            changed |= fold(arena, then_val);
            changed |= fold(arena, else_val);
            if let Some(c) = arena.int_const(cond) {
                let chosen = if c != 0 { then_val } else { else_val };
                arena.node_mut(node).kind = arena.node(chosen).kind.clone();
                changed = true;
            }
        }
        Expr::Assign { value, target, .. } => {
            changed |= fold(arena, value);
            // Fold inside an indirect store's address computation.
            if let Expr::Unary { opnd, .. } = arena.node(target).kind {
                changed |= fold(arena, opnd);
            }
        }
        Expr::Call { callee, args } => {
            for arg in args {
                changed |= fold(arena, arg);
            }
            changed |= fold(arena, callee);
        }
        Expr::Seq { first, second } => {
            changed |= fold(arena, first);
            changed |= fold(arena, second);
        }
    }
    changed
}

fn eval_unary(op: UnaryOp, value: i64, ty: Ty) -> Option<i64> {
    if !ty.is_integer() {
        return None;
    }
    let result = match op {
        UnaryOp::Neg => value.wrapping_neg(),
        UnaryOp::BitNot => !value,
        UnaryOp::LogNot => i64::from(value == 0),
        UnaryOp::Conv => value,
        UnaryOp::Deref | UnaryOp::DispatchLoad => return None,
    };
    Some(truncate(result, ty))
}

fn eval_binary(op: BinOp, a: i64, b: i64, operand_ty: Ty) -> Option<i64> {
    if !operand_ty.is_integer() {
        return None;
    }
    let unsigned = operand_ty.is_unsigned();
    let bits = operand_ty.bits();

    if op.is_comparison() {
        let ordering = if unsigned {
            (truncate(a, operand_ty) as u64).cmp(&(truncate(b, operand_ty) as u64))
        } else {
            a.cmp(&b)
        };
        let result = match op {
            BinOp::Eq => ordering.is_eq(),
            BinOp::Ne => ordering.is_ne(),
            BinOp::Lt => ordering.is_lt(),
            BinOp::Le => ordering.is_le(),
            BinOp::Gt => ordering.is_gt(),
            BinOp::Ge => ordering.is_ge(),
            _ => unreachable!(),
        };
        return Some(i64::from(result));
    }

    let result = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Rem => {
            // Folding a trapping division would hide the runtime fault.
            if b == 0 || (a == i64::MIN && b == -1) {
                return None;
            }
            if op == BinOp::Div {
                if unsigned {
                    ((a as u64) / (b as u64)) as i64
                } else {
                    a / b
                }
            } else if unsigned {
                ((a as u64) % (b as u64)) as i64
            } else {
                a % b
            }
        }
        BinOp::Shl => a.wrapping_shl(b as u32 % bits),
        BinOp::Shr => {
            if unsigned {
                ((truncate(a, operand_ty) as u64) >> (b as u32 % bits)) as i64
            } else {
                a.wrapping_shr(b as u32 % bits)
            }
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        _ => unreachable!(),
    };
    Some(truncate(result, operand_ty))
}

/// Wraps `value` into the width and signedness of `ty`.
fn truncate(value: i64, ty: Ty) -> i64 {
    match ty {
        Ty::I8 => value as i8 as i64,
        Ty::U8 => value as u8 as i64,
        Ty::I16 => value as i16 as i64,
        Ty::U16 => value as u16 as i64,
        Ty::I32 => value as i32 as i64,
        Ty::U32 => value as u32 as i64,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, SymbolFlags as SF};

    #[test]
    fn test_propagates_single_literal() {
        // b0: x = 7   b1: y = x + 1  =>  y = 8
        let mut fb = FunctionBuilder::new("prop");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::empty());

        let seven = fb.int(7);
        let set_x = fb.assign(x, seven);
        fb.set_root(0, set_x);
        fb.jump(0, 1);

        let rx = fb.read(x);
        let one = fb.int(1);
        let sum = fb.add(rx, one);
        let set_y = fb.assign(y, sum);
        fb.set_root(1, set_y);
        fb.ret(1);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        assert!(ConstProp.run(&mut func, &ctx).unwrap());
        assert_eq!(func.arena.int_const(sum), Some(8));
    }

    #[test]
    fn test_conflicting_defs_do_not_fold() {
        // x is 1 or 2 depending on the branch; the read must stay.
        let mut fb = FunctionBuilder::new("conflict");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::empty());
        let c = fb.symbol("c", Ty::I32, SF::PARAM);

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

        let rx = fb.read(x);
        let set_y = fb.assign(y, rx);
        fb.set_root(3, set_y);
        fb.ret(3);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        ConstProp.run(&mut func, &ctx).unwrap();
        assert_eq!(func.arena.as_sym_read(rx), Some(x));
    }

    #[test]
    fn test_uninitialized_read_diagnosed_once() {
        // y = x + x with x never assigned.
        let mut fb = FunctionBuilder::new("uninit");
        let x = fb.symbol("x", Ty::I32, SF::empty());
        let y = fb.symbol("y", Ty::I32, SF::empty());

        let rx1 = fb.read(x);
        let rx2 = fb.read(x);
        let sum = fb.add(rx1, rx2);
        let set_y = fb.assign(y, sum);
        fb.set_root(0, set_y);
        fb.ret(0);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        ConstProp.run(&mut func, &ctx).unwrap();

        let events = ctx.take_events();
        let warnings: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::UninitializedRead)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains('x'));
    }

    #[test]
    fn test_param_reads_are_exempt() {
        let mut fb = FunctionBuilder::new("param");
        let p = fb.symbol("p", Ty::I32, SF::PARAM);
        let y = fb.symbol("y", Ty::I32, SF::empty());

        let rp = fb.read(p);
        let set_y = fb.assign(y, rp);
        fb.set_root(0, set_y);
        fb.ret(0);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        ConstProp.run(&mut func, &ctx).unwrap();
        assert_eq!(ctx.event_count(), 0);
    }

    #[test]
    fn test_fold_arithmetic_and_comparison() {
        let mut arena = ExprArena::new();
        let three = arena.int(3, Ty::I32);
        let four = arena.int(4, Ty::I32);
        let sum = arena.alloc(
            Expr::Binary {
                op: BinOp::Add,
                lhs: three,
                rhs: four,
            },
            Ty::I32,
        );
        let ten = arena.int(10, Ty::I32);
        let cmp = arena.alloc(
            Expr::Binary {
                op: BinOp::Lt,
                lhs: sum,
                rhs: ten,
            },
            Ty::I32,
        );

        assert!(fold(&mut arena, cmp));
        assert_eq!(arena.int_const(cmp), Some(1));
    }

    #[test]
    fn test_fold_respects_unsigned_compare() {
        let mut arena = ExprArena::new();
        let minus = arena.int(-1, Ty::U32);
        let one = arena.int(1, Ty::U32);
        let cmp = arena.alloc(
            Expr::Binary {
                op: BinOp::Lt,
                lhs: minus,
                rhs: one,
            },
            Ty::I32,
        );

        assert!(fold(&mut arena, cmp));
        // 0xFFFF_FFFF < 1 is false unsigned.
        assert_eq!(arena.int_const(cmp), Some(0));
    }

    #[test]
    fn test_fold_does_not_hide_division_fault() {
        let mut arena = ExprArena::new();
        let one = arena.int(1, Ty::I32);
        let zero = arena.int(0, Ty::I32);
        let div = arena.alloc(
            Expr::Binary {
                op: BinOp::Div,
                lhs: one,
                rhs: zero,
            },
            Ty::I32,
        );

        assert!(!fold(&mut arena, div));
        assert!(arena.int_const(div).is_none());
    }
}
