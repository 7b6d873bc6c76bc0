//! Very-busy-expression redundancy hoisting.
//!
//! An expression that is very busy at a branch point is evaluated on every
//! path leaving it, so evaluating it once *at* the branch and handing the
//! value down cannot compute anything the original program would not have
//! computed. The pass therefore looks at each conditional branch whose
//! exit set contains a busy candidate, evaluates the candidate into a
//! fresh temporary at the branch, and replaces the upward-exposed
//! occurrences in the successors with the temporary.
//!
//! Safety conditions beyond busyness itself:
//!
//! - The branch block's own tree must be free of definitions; the hoisted
//!   evaluation is threaded in *before* the condition, which must not
//!   reorder it across a write.
//! - A successor's occurrences are rewritten only when the successor has
//!   the branch as its only predecessor and the candidate is in its GEN
//!   set (the exposed evaluation); otherwise another path could deliver a
//!   different value.
//!
//! Together with busyness this implements the precondition that hoisting
//! must not introduce computation on a path that never performed it.

use crate::{
    cfg::DepthFirstOrder,
    dataflow::{solve, FlowProblem, VeryBusyExpressions},
    ir::{AssignOp, Expr, Function, Leaf, SymbolFlags, Transfer},
    opt::{config::OptPasses, context::OptContext, pass::OptPass, EventKind},
    Result,
};

/// The redundancy hoisting pass.
pub struct Redundancy;

impl OptPass for Redundancy {
    fn name(&self) -> &'static str {
        "redundancy"
    }

    fn description(&self) -> &'static str {
        "Hoists very busy expressions to the branch that dominates them"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::REDUNDANCY
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let vbe = VeryBusyExpressions::new(func);
        if vbe.table().is_empty() {
            return Ok(false);
        }
        let dfo = DepthFirstOrder::compute(func)?;
        let results = solve(&vbe, func, &dfo)?;

        // Find one applicable branch per run; the engine re-runs the pass
        // until nothing applies, and every hoist invalidates the tables.
        let mut found = None;
        'search: for (id, block) in func.blocks() {
            if block.transfer != Transfer::Cond || block.succs.len() != 2 {
                continue;
            }
            let Some(branch_root) = block.root else {
                continue;
            };
            // No definitions may separate the hoisted evaluation from the
            // original sites.
            let volatile =
                |s: crate::ir::SymbolId| func.symbols.get(s).flags.contains(SymbolFlags::VOLATILE);
            if !func.arena.is_pure(branch_root, &volatile) {
                continue;
            }

            for index in results.output(id).iter() {
                // Both successors must expose the evaluation and be
                // reachable only through this branch.
                let all_exposed = block.succs.iter().all(|&succ| {
                    func.block(succ).preds.len() == 1 && vbe.sets(succ).gen.contains(index)
                });
                if all_exposed {
                    found = Some((id, index));
                    break 'search;
                }
            }
        }

        match found {
            Some((branch, index)) => self.hoist(func, ctx, &vbe, branch, index),
            None => Ok(false),
        }
    }
}

impl Redundancy {
    /// Performs one hoist: `temp = expr` threaded in front of the branch
    /// condition, exposed occurrences in both successors replaced.
    fn hoist(
        &self,
        func: &mut Function,
        ctx: &OptContext,
        vbe: &VeryBusyExpressions,
        branch: crate::ir::BlockId,
        index: usize,
    ) -> Result<bool> {
        let candidate = vbe.table().candidate(index);
        let ty = func.arena.node(candidate.node).ty;
        let temp = func.new_temp(ty);

        // temp = <expr>; threaded before the branch condition.
        let value = func.arena.copy_subtree(candidate.node);
        let target = func.arena.sym(temp, ty);
        let assign = func.arena.alloc(
            Expr::Assign {
                op: AssignOp::Set,
                target,
                value,
            },
            ty,
        );
        let old_root = func
            .block(branch)
            .root
            .ok_or_else(|| internal_error!("branch block {} lost its tree during hoisting", branch))?;
        let new_root = func.arena.alloc(
            Expr::Seq {
                first: assign,
                second: old_root,
            },
            func.arena.node(old_root).ty,
        );
        func.block_mut(branch).root = Some(new_root);

        // Rewrite the exposed occurrences in the two successors.
        let succs = func.block(branch).succs.clone();
        let mut rewritten = 0;
        for succ in succs {
            for &(occ_block, occ_node) in &candidate.occurrences {
                if occ_block == succ {
                    func.arena.node_mut(occ_node).kind = Expr::Leaf(Leaf::Sym(temp));
                    rewritten += 1;
                    break; // Only the first exposed occurrence per block.
                }
            }
        }

        ctx.count_changes(self.name(), 1);
        ctx.record(
            EventKind::PassChange,
            self.name(),
            &func.name,
            format!(
                "hoisted busy expression into {branch}, rewrote {rewritten} uses"
            ),
        );
        Ok(true)
    }
}
