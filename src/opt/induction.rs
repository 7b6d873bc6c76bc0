//! Induction-variable strength reduction and elimination.
//!
//! A **basic induction variable** is an unambiguous integer symbol with
//! exactly one update site in the loop of the shape `x += k` or `x -= k`,
//! where `k` is a constant or loop-invariant, the update executes on every
//! iteration (its block dominates the loop tail and it sits in
//! unconditional position in its tree), and no other definition of the
//! symbol exists in the loop.
//!
//! For each basic variable the loop trees are scanned for **family
//! members**: maximal subtrees of the affine shape `iv * c1 + c2`, built
//! from multiplies and shifts by constants, constant additions and
//! subtractions and unary negation, accumulated by constant folding. A
//! family member earns a fresh temporary initialized in the preheader as
//! `iv * c1 + c2` and kept in sync by folding `temp += c1 * k` into the
//! basic variable's update site - unless an earlier member with the same
//! multiplier already has a temporary, in which case the member is
//! rewritten as a constant offset from it, or the member is not worth a
//! variable at all (multiplier 1, or a free addressing-mode multiplier)
//! while the basic variable must stay.
//!
//! Finally, if the basic variable's only remaining use is a single
//! comparison against a constant, the comparison is rewritten in terms of
//! the syntactically simplest family temporary and the update site is
//! deleted - subject to the overflow and signedness guards on the rewritten
//! constant. A basic variable with no remaining uses at all, and dead past
//! every exit, loses its update site outright.

use crate::{
    cfg::{ensure_preheader, CfgInfo, Loop},
    dataflow::{solve, FlowResults, LiveVariables, ReachingDefinitions},
    ir::{AssignOp, BinOp, BlockId, Expr, ExprId, Function, Leaf, SymbolId, Ty},
    opt::{config::OptPasses, context::OptContext, pass::OptPass, EventKind},
    Result,
};

/// Multipliers addressing modes scale for free; members differing from the
/// basic variable only by one of these are not worth a separate variable.
const FREE_SCALES: [i64; 4] = [1, 2, 4, 8];

/// The induction-variable reduction pass.
pub struct InductionVars;

impl OptPass for InductionVars {
    fn name(&self) -> &'static str {
        "induction-vars"
    }

    fn description(&self) -> &'static str {
        "Strength-reduces induction-variable families, eliminates the base"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::INDUCTION_VARS
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let cfg = CfgInfo::build(func)?;
        if cfg.loops.is_empty() {
            return Ok(false);
        }

        // One loop per run; every reduction rewrites trees and therefore
        // invalidates the analyses.
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
            let changes = reduce_loop(func, &cfg, lp)?;
            if changes > 0 {
                ctx.count_changes(self.name(), changes);
                ctx.record(
                    EventKind::PassChange,
                    self.name(),
                    &func.name,
                    format!("{changes} induction rewrites in loop at {}", lp.header),
                );
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// One basic induction variable.
struct BasicIv {
    sym: SymbolId,
    ty: Ty,
    /// The `x += k` / `x -= k` assignment node.
    update_node: ExprId,
    update_block: BlockId,
    /// The `k` operand.
    step_value: ExprId,
    /// `k` folded to a signed per-iteration delta, when constant
    /// (negative for `-=`).
    step_const: Option<i64>,
    /// The update subtracts.
    negated: bool,
}

/// One affine family member `iv * c1 + c2`.
struct FamilyEntry {
    node: ExprId,
    iv: usize,
    c1: i64,
    c2: i64,
}

/// A temporary introduced for a family member.
struct Introduced {
    iv: usize,
    c1: i64,
    c2: i64,
    temp: SymbolId,
    ty: Ty,
}

fn reduce_loop(func: &mut Function, cfg: &CfgInfo, lp: &Loop) -> Result<usize> {
    let Some(preheader) = lp.preheader else {
        return Err(internal_error!(
            "loop at {} has no preheader at induction time",
            lp.header
        ));
    };

    let rd = ReachingDefinitions::new(func);
    let live = LiveVariables::new(func);
    let live_results = solve(&live, func, &cfg.dfo)?;

    let ivs = find_basic_ivs(func, cfg, &rd, lp);
    if ivs.is_empty() {
        return Ok(0);
    }
    let families = find_family_members(func, lp, &ivs);

    let mut changes = 0;

    // Which basic variables can go away entirely: their only loop use
    // beyond the update and the family subtrees is one comparison against
    // a literal, and their value is dead outside the loop.
    let removable: Vec<Option<Comparison>> = ivs
        .iter()
        .enumerate()
        .map(|(index, iv)| {
            if live_outside_loop(func, &live_results, lp, iv.sym) {
                return None;
            }
            sole_comparison_use(func, lp, &ivs, &families, index)
        })
        .collect();

    // Introduce temporaries for the surviving family members. Folding a
    // temp update into an update site wraps the original assignment in a
    // sequence; `deletable` tracks where the bare `x += k` node ends up so
    // elimination removes exactly it.
    let mut introduced: Vec<Introduced> = Vec::new();
    let mut deletable: Vec<ExprId> = ivs.iter().map(|iv| iv.update_node).collect();
    for entry in &families {
        let iv = &ivs[entry.iv];
        let not_worth_it = removable[entry.iv].is_none()
            && (entry.c1 == 1 || (entry.c2 == 0 && FREE_SCALES.contains(&entry.c1)));
        if not_worth_it {
            continue;
        }

        let ty = func.arena.node(entry.node).ty;
        let existing = introduced
            .iter()
            .position(|i| i.iv == entry.iv && i.c1 == entry.c1 && i.ty == ty);
        match existing {
            Some(prev_idx) => {
                // Same multiplier: express as a constant offset from the
                // earlier temporary instead of a new variable.
                let delta = entry.c2 - introduced[prev_idx].c2;
                let temp = introduced[prev_idx].temp;
                if delta == 0 {
                    func.arena.node_mut(entry.node).kind = Expr::Leaf(Leaf::Sym(temp));
                } else {
                    let read = func.arena.sym(temp, ty);
                    let offset = func.arena.int(delta, ty);
                    func.arena.node_mut(entry.node).kind = Expr::Binary {
                        op: BinOp::Add,
                        lhs: read,
                        rhs: offset,
                    };
                }
            }
            None => {
                let temp = func.new_temp(ty);
                emit_preheader_init(func, preheader, iv, entry, temp, ty);
                let moved = fold_into_update(func, iv, entry.c1, temp, ty);
                if deletable[entry.iv] == iv.update_node {
                    deletable[entry.iv] = moved;
                }
                func.arena.node_mut(entry.node).kind = Expr::Leaf(Leaf::Sym(temp));
                introduced.push(Introduced {
                    iv: entry.iv,
                    c1: entry.c1,
                    c2: entry.c2,
                    temp,
                    ty,
                });
            }
        }
        changes += 1;
    }

    // Eliminate basic variables whose last use was the comparison.
    for (index, iv) in ivs.iter().enumerate() {
        let Some(comparison) = &removable[index] else {
            continue;
        };
        match comparison {
            Comparison::None => {
                // No uses at all: the update simply goes.
                delete_statement(func, iv.update_block, deletable[index]);
                changes += 1;
            }
            Comparison::Against { node, iv_leaf, bound } => {
                let Some(chosen) = choose_rewrite_member(&introduced, index) else {
                    continue;
                };
                if rewrite_comparison(func, iv, *node, *iv_leaf, *bound, chosen) {
                    delete_statement(func, iv.update_block, deletable[index]);
                    changes += 2;
                }
            }
        }
    }

    Ok(changes)
}

/// How a removable basic variable is still used.
enum Comparison {
    /// No remaining uses at all.
    None,
    /// Exactly one comparison `iv <op> literal`.
    Against {
        /// The comparison node.
        node: ExprId,
        /// The operand leaf reading the variable.
        iv_leaf: ExprId,
        /// The literal on the other side.
        bound: i64,
    },
}

/// Finds the basic induction variables of the loop.
fn find_basic_ivs(
    func: &Function,
    cfg: &CfgInfo,
    rd: &ReachingDefinitions,
    lp: &Loop,
) -> Vec<BasicIv> {
    let mut ivs = Vec::new();

    for (sym, symbol) in func.symbols.iter() {
        if !symbol.is_unambiguous() || !symbol.ty.is_integer() {
            continue;
        }
        // Exactly one definition site inside the loop.
        let inside = rd.defs_inside(rd.table().defs_of(sym), &lp.body);
        if inside.count() != 1 {
            continue;
        }
        let site = rd.table().site(inside.iter().next().expect("one def"));
        let Expr::Assign { op, target, value } = &func.arena.node(site.node).kind else {
            continue;
        };
        let negated = match op {
            AssignOp::AddSet => false,
            AssignOp::SubSet => true,
            _ => continue,
        };
        if func.arena.as_sym_read(*target) != Some(sym) {
            continue;
        }
        // The step must be a literal or loop-invariant symbol read.
        let step_const = func.arena.int_const(*value);
        if step_const.is_none() {
            let Some(step_sym) = func.arena.as_sym_read(*value) else {
                continue;
            };
            let ambiguous = !func.symbols.get(step_sym).is_unambiguous();
            let step_defs = rd.table().defs_reaching_symbol(step_sym, ambiguous);
            if !rd.defs_inside(&step_defs, &lp.body).is_empty() {
                continue;
            }
        }
        // The update must run on every iteration: its block dominates
        // every back edge and the node sits in unconditional position.
        if !lp
            .latches
            .iter()
            .all(|&latch| cfg.doms.dominates(site.block, latch))
        {
            continue;
        }
        let Some(root) = func.block(site.block).root else {
            continue;
        };
        if !in_unconditional_position(func, root, site.node) {
            continue;
        }

        ivs.push(BasicIv {
            sym,
            ty: symbol.ty,
            update_node: site.node,
            update_block: site.block,
            step_value: *value,
            step_const: step_const.map(|k| if negated { -k } else { k }),
            negated,
        });
    }

    ivs
}

/// Whether `target` is evaluated unconditionally when the tree at `root`
/// is evaluated.
fn in_unconditional_position(func: &Function, root: ExprId, target: ExprId) -> bool {
    if root == target {
        return true;
    }
    match &func.arena.node(root).kind {
        Expr::Leaf(_) | Expr::Asm => false,
        Expr::Unary { opnd, .. } => in_unconditional_position(func, *opnd, target),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Seq {
            first: lhs,
            second: rhs,
        } => {
            in_unconditional_position(func, *lhs, target)
                || in_unconditional_position(func, *rhs, target)
        }
        // Only the always-evaluated operand counts.
        Expr::Short { lhs, .. } => in_unconditional_position(func, *lhs, target),
        Expr::Ternary { cond, .. } => in_unconditional_position(func, *cond, target),
        Expr::Assign { target: t, value, .. } => {
            in_unconditional_position(func, *value, target)
                || in_unconditional_position(func, *t, target)
        }
        Expr::Call { callee, args } => {
            args.iter()
                .any(|&a| in_unconditional_position(func, a, target))
                || in_unconditional_position(func, *callee, target)
        }
    }
}

/// Scans the loop trees for maximal affine family members.
fn find_family_members(func: &Function, lp: &Loop, ivs: &[BasicIv]) -> Vec<FamilyEntry> {
    let mut families = Vec::new();
    for member in lp.body.iter() {
        let block = BlockId::new(member);
        let Some(root) = func.block(block).root else {
            continue;
        };
        scan_for_members(func, ivs, root, &mut families);
    }
    families
}

fn scan_for_members(
    func: &Function,
    ivs: &[BasicIv],
    node: ExprId,
    families: &mut Vec<FamilyEntry>,
) {
    // A maximal non-trivial affine match claims the whole subtree.
    if !matches!(func.arena.node(node).kind, Expr::Leaf(_)) {
        if let Some((iv, c1, c2)) = match_affine(func, ivs, node) {
            if c1 != 1 || c2 != 0 {
                families.push(FamilyEntry { node, iv, c1, c2 });
                return;
            }
        }
    }

    match &func.arena.node(node).kind {
        Expr::Leaf(_) | Expr::Asm => {}
        Expr::Unary { opnd, .. } => scan_for_members(func, ivs, *opnd, families),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Short { lhs, rhs, .. }
        | Expr::Seq {
            first: lhs,
            second: rhs,
        } => {
            scan_for_members(func, ivs, *lhs, families);
            scan_for_members(func, ivs, *rhs, families);
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            scan_for_members(func, ivs, *cond, families);
            scan_for_members(func, ivs, *then_val, families);
            scan_for_members(func, ivs, *else_val, families);
        }
        Expr::Assign { target, value, .. } => {
            scan_for_members(func, ivs, *value, families);
            if let Expr::Unary { opnd, .. } = func.arena.node(*target).kind {
                scan_for_members(func, ivs, opnd, families);
            }
        }
        Expr::Call { callee, args } => {
            for arg in args {
                scan_for_members(func, ivs, *arg, families);
            }
            scan_for_members(func, ivs, *callee, families);
        }
    }
}

/// Matches `node` against the affine shape `iv * c1 + c2`, folding the
/// constants. Returns the basic-variable index and the folded pair.
fn match_affine(func: &Function, ivs: &[BasicIv], node: ExprId) -> Option<(usize, i64, i64)> {
    match &func.arena.node(node).kind {
        Expr::Leaf(Leaf::Sym(sym)) => {
            let iv = ivs.iter().position(|iv| iv.sym == *sym)?;
            Some((iv, 1, 0))
        }
        Expr::Unary {
            op: crate::ir::UnaryOp::Neg,
            opnd,
        } => {
            let (iv, c1, c2) = match_affine(func, ivs, *opnd)?;
            Some((iv, c1.checked_neg()?, c2.checked_neg()?))
        }
        Expr::Binary { op, lhs, rhs } => {
            let (affine_side, const_side) = if func.arena.int_const(*rhs).is_some() {
                (*lhs, *rhs)
            } else if func.arena.int_const(*lhs).is_some() && op.is_commutative() {
                (*rhs, *lhs)
            } else if *op == BinOp::Sub && func.arena.int_const(*lhs).is_some() {
                // k - affine
                let (iv, c1, c2) = match_affine(func, ivs, *rhs)?;
                let k = func.arena.int_const(*lhs)?;
                return Some((iv, c1.checked_neg()?, k.checked_sub(c2)?));
            } else {
                return None;
            };
            let (iv, c1, c2) = match_affine(func, ivs, affine_side)?;
            let k = func.arena.int_const(const_side)?;
            match op {
                BinOp::Mul => Some((iv, c1.checked_mul(k)?, c2.checked_mul(k)?)),
                BinOp::Shl => {
                    if !(0..63).contains(&k) {
                        return None;
                    }
                    let factor = 1i64 << k;
                    Some((iv, c1.checked_mul(factor)?, c2.checked_mul(factor)?))
                }
                BinOp::Add => Some((iv, c1, c2.checked_add(k)?)),
                BinOp::Sub => Some((iv, c1, c2.checked_sub(k)?)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Emits `temp = iv * c1 + c2` at the end of the preheader.
fn emit_preheader_init(
    func: &mut Function,
    preheader: BlockId,
    iv: &BasicIv,
    entry: &FamilyEntry,
    temp: SymbolId,
    ty: Ty,
) {
    let mut value = func.arena.sym(iv.sym, iv.ty);
    if entry.c1 != 1 {
        let factor = func.arena.int(entry.c1, ty);
        value = func.arena.alloc(
            Expr::Binary {
                op: BinOp::Mul,
                lhs: value,
                rhs: factor,
            },
            ty,
        );
    }
    if entry.c2 != 0 {
        let offset = func.arena.int(entry.c2, ty);
        value = func.arena.alloc(
            Expr::Binary {
                op: BinOp::Add,
                lhs: value,
                rhs: offset,
            },
            ty,
        );
    }
    let target = func.arena.sym(temp, ty);
    let assign = func.arena.alloc(
        Expr::Assign {
            op: AssignOp::Set,
            target,
            value,
        },
        ty,
    );
    func.thread_statement(preheader, assign);
}

/// Threads `temp += c1 * k` in front of the basic variable's own update so
/// the temporary stays in sync. Returns the node now holding the original
/// update.
fn fold_into_update(func: &mut Function, iv: &BasicIv, c1: i64, temp: SymbolId, ty: Ty) -> ExprId {
    let (op, value) = match iv.step_const {
        Some(step) => {
            // Step already carries the update's sign.
            let delta = func.arena.int(c1.wrapping_mul(step), ty);
            (AssignOp::AddSet, delta)
        }
        None => {
            let factor = func.arena.int(c1, ty);
            let step = func.arena.copy_subtree(iv.step_value);
            let product = func.arena.alloc(
                Expr::Binary {
                    op: BinOp::Mul,
                    lhs: factor,
                    rhs: step,
                },
                ty,
            );
            let op = if iv.negated {
                AssignOp::SubSet
            } else {
                AssignOp::AddSet
            };
            (op, product)
        }
    };
    let target = func.arena.sym(temp, ty);
    let temp_update = func.arena.alloc(Expr::Assign { op, target, value }, ty);

    // The original update keeps its node id (use collection refers to
    // it); its contents move to a fresh node and the id becomes a
    // sequence evaluating the temp update first.
    let original = func.arena.node(iv.update_node).clone();
    let moved = func.arena.alloc(original.kind, original.ty);
    func.arena.node_mut(iv.update_node).kind = Expr::Seq {
        first: temp_update,
        second: moved,
    };
    moved
}

/// Collects the loop uses of a basic variable outside its update site and
/// the family subtrees, accepting only the single-comparison shape.
fn sole_comparison_use(
    func: &Function,
    lp: &Loop,
    ivs: &[BasicIv],
    families: &[FamilyEntry],
    index: usize,
) -> Option<Comparison> {
    let iv = &ivs[index];
    let mut leaves = Vec::new();
    for member in lp.body.iter() {
        let block = BlockId::new(member);
        let Some(root) = func.block(block).root else {
            continue;
        };
        collect_external_reads(func, iv, families, root, false, &mut leaves);
    }

    match leaves.len() {
        0 => Some(Comparison::None),
        1 => {
            let leaf = leaves[0];
            // The read must be one operand of a comparison against a
            // literal.
            for member in lp.body.iter() {
                let block = BlockId::new(member);
                let Some(root) = func.block(block).root else {
                    continue;
                };
                let mut found = None;
                func.arena.visit_eval_order(root, &mut |n| {
                    if let Expr::Binary { op, lhs, rhs } = &func.arena.node(n).kind {
                        if !op.is_comparison() {
                            return;
                        }
                        if *lhs == leaf {
                            if let Some(bound) = func.arena.int_const(*rhs) {
                                found = Some(Comparison::Against {
                                    node: n,
                                    iv_leaf: leaf,
                                    bound,
                                });
                            }
                        } else if *rhs == leaf {
                            if let Some(bound) = func.arena.int_const(*lhs) {
                                found = Some(Comparison::Against {
                                    node: n,
                                    iv_leaf: leaf,
                                    bound,
                                });
                            }
                        }
                    }
                });
                if found.is_some() {
                    return found;
                }
            }
            None
        }
        _ => None,
    }
}

/// Collects reads of the basic variable that are neither its own update
/// site nor inside a family subtree.
fn collect_external_reads(
    func: &Function,
    iv: &BasicIv,
    families: &[FamilyEntry],
    node: ExprId,
    inside_family: bool,
    out: &mut Vec<ExprId>,
) {
    let inside_family = inside_family || families.iter().any(|f| f.node == node);
    if node == iv.update_node {
        // The update's own target read and step do not count as uses.
        return;
    }
    match &func.arena.node(node).kind {
        Expr::Leaf(Leaf::Sym(sym)) => {
            if *sym == iv.sym && !inside_family {
                out.push(node);
            }
        }
        Expr::Leaf(_) | Expr::Asm => {}
        Expr::Unary { opnd, .. } => {
            collect_external_reads(func, iv, families, *opnd, inside_family, out);
        }
        Expr::Binary { lhs, rhs, .. }
        | Expr::Short { lhs, rhs, .. }
        | Expr::Seq {
            first: lhs,
            second: rhs,
        } => {
            collect_external_reads(func, iv, families, *lhs, inside_family, out);
            collect_external_reads(func, iv, families, *rhs, inside_family, out);
        }
        Expr::Ternary {
            cond,
            then_val,
            else_val,
        } => {
            collect_external_reads(func, iv, families, *cond, inside_family, out);
            collect_external_reads(func, iv, families, *then_val, inside_family, out);
            collect_external_reads(func, iv, families, *else_val, inside_family, out);
        }
        Expr::Assign { target, value, .. } => {
            collect_external_reads(func, iv, families, *value, inside_family, out);
            collect_external_reads(func, iv, families, *target, inside_family, out);
        }
        Expr::Call { callee, args } => {
            for arg in args {
                collect_external_reads(func, iv, families, *arg, inside_family, out);
            }
            collect_external_reads(func, iv, families, *callee, inside_family, out);
        }
    }
}

/// Whether the variable may be read on any path leaving the loop.
fn live_outside_loop(
    func: &Function,
    live: &FlowResults,
    lp: &Loop,
    sym: SymbolId,
) -> bool {
    for member in lp.exits.iter() {
        let block = BlockId::new(member);
        for &succ in &func.block(block).succs {
            if !lp.contains(succ) && live.input(succ).contains(sym.index()) {
                return true;
            }
        }
    }
    false
}

/// Prefers multiplier 1 with offset 0, then multiplier 1, then the
/// smallest positive multiplier.
fn choose_rewrite_member(introduced: &[Introduced], iv: usize) -> Option<&Introduced> {
    introduced
        .iter()
        .filter(|i| i.iv == iv && i.c1 > 0)
        .min_by_key(|i| (i.c1 != 1, i.c2 != 0, i.c1))
}

/// Rewrites `iv <op> bound` into `temp <op> bound * c1 + c2`, guarding
/// against overflow and signedness changes. Returns `false` (leaving the
/// comparison alone) when any guard fails.
fn rewrite_comparison(
    func: &mut Function,
    iv: &BasicIv,
    node: ExprId,
    iv_leaf: ExprId,
    bound: i64,
    chosen: &Introduced,
) -> bool {
    // The temporary must carry the exact comparison type: widening or a
    // signedness flip would change which values terminate the loop.
    if chosen.ty != iv.ty {
        return false;
    }
    let rewritten = i128::from(bound)
        .checked_mul(i128::from(chosen.c1))
        .and_then(|v| v.checked_add(i128::from(chosen.c2)));
    let Some(rewritten) = rewritten else {
        return false;
    };
    if !iv.ty.can_represent(rewritten) {
        return false;
    }
    // An unsigned comparison against a bound that was reachable through a
    // signed wrap cannot be proven terminating; keep the original.
    if iv.ty.is_unsigned() && (bound < 0 || rewritten < 0) {
        return false;
    }

    let Expr::Binary { lhs, rhs, .. } = func.arena.node(node).kind else {
        return false;
    };
    let bound_leaf = if lhs == iv_leaf { rhs } else { lhs };
    func.arena.node_mut(iv_leaf).kind = Expr::Leaf(Leaf::Sym(chosen.temp));
    func.arena.node_mut(bound_leaf).kind = Expr::Leaf(Leaf::IntConst(rewritten as i64));
    true
}

/// Removes a statement-position node from its block's tree: the root is
/// cleared, a sequence collapses to its other half, and anything else is
/// neutralized to a literal zero.
fn delete_statement(func: &mut Function, block: BlockId, node: ExprId) {
    let Some(root) = func.block(block).root else {
        return;
    };
    if root == node {
        func.block_mut(block).root = None;
        return;
    }
    if let Some(parent) = find_parent(func, root, node) {
        if let Expr::Seq { first, second } = func.arena.node(parent).kind {
            let keep = if first == node { second } else { first };
            let keep_node = func.arena.node(keep).clone();
            *func.arena.node_mut(parent) = keep_node;
            return;
        }
    }
    let ty = func.arena.node(node).ty;
    func.arena.node_mut(node).kind = Expr::Leaf(Leaf::IntConst(0));
    func.arena.node_mut(node).ty = ty;
}

/// Finds the direct parent of `target` in the subtree at `root`.
fn find_parent(func: &Function, root: ExprId, target: ExprId) -> Option<ExprId> {
    let mut parent = None;
    func.arena.visit_eval_order(root, &mut |n| {
        if parent.is_some() {
            return;
        }
        let children: Vec<ExprId> = match &func.arena.node(n).kind {
            Expr::Leaf(_) | Expr::Asm => Vec::new(),
            Expr::Unary { opnd, .. } => vec![*opnd],
            Expr::Binary { lhs, rhs, .. }
            | Expr::Short { lhs, rhs, .. }
            | Expr::Seq {
                first: lhs,
                second: rhs,
            } => vec![*lhs, *rhs],
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            } => vec![*cond, *then_val, *else_val],
            Expr::Assign { target: t, value, .. } => vec![*t, *value],
            Expr::Call { callee, args } => {
                let mut c = args.clone();
                c.push(*callee);
                c
            }
        };
        if children.contains(&target) {
            parent = Some(n);
        }
    });
    parent
}
