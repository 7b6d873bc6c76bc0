//! Dead-code elimination: constant branches and unreachable blocks.
//!
//! Constant propagation can reduce a conditional branch's tree to a
//! literal; this pass then commits the branch to the surviving edge and
//! detaches whatever became unreachable. Detached blocks keep their ids
//! (ids are stable) but lose their edges and trees, drop out of the
//! emission order, and are skipped by every later analysis.

use crate::{
    ir::{BlockId, Function, Transfer},
    opt::{config::OptPasses, context::OptContext, pass::OptPass, EventKind},
    Result,
};

/// The dead-code elimination pass.
pub struct DeadCode;

impl OptPass for DeadCode {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn description(&self) -> &'static str {
        "Folds constant branches and detaches unreachable blocks"
    }

    fn enabled_by(&self) -> OptPasses {
        OptPasses::DEAD_CODE
    }

    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool> {
        let mut folded = 0;
        let mut detached = 0;

        // Commit conditional branches whose condition folded to a literal.
        for index in 0..func.block_count() {
            let id = BlockId::new(index);
            let block = func.block(id);
            if block.transfer != Transfer::Cond || block.succs.len() != 2 {
                continue;
            }
            let Some(root) = block.root else { continue };
            let Some(value) = func.arena.int_const(root) else {
                continue;
            };

            let (kept, dropped) = if value != 0 {
                (block.succs[0], block.succs[1])
            } else {
                (block.succs[1], block.succs[0])
            };
            func.remove_edge(id, dropped)?;
            let block = func.block_mut(id);
            block.transfer = Transfer::Jump;
            block.root = None;
            // Degenerate branch where both edges lead to the same block:
            // after removing one, the other still stands.
            debug_assert_eq!(func.block(id).succs, vec![kept]);
            folded += 1;
        }

        // Detach everything no longer reachable from the entry.
        let mut reachable = vec![false; func.block_count()];
        let mut stack = vec![func.entry()];
        reachable[func.entry().index()] = true;
        while let Some(block) = stack.pop() {
            for &succ in &func.block(block).succs {
                if !reachable[succ.index()] {
                    reachable[succ.index()] = true;
                    stack.push(succ);
                }
            }
        }

        for index in 0..func.block_count() {
            let id = BlockId::new(index);
            if reachable[index] || func.is_detached(id) {
                continue;
            }
            let succs = func.block(id).succs.clone();
            for succ in succs {
                func.remove_edge(id, succ)?;
            }
            // Predecessor edges from other unreachable blocks disappear as
            // those are detached in turn; edges from reachable blocks
            // cannot exist (the block would be reachable).
            let block = func.block_mut(id);
            block.root = None;
            block.transfer = Transfer::Return;
            detached += 1;
        }

        let changed = folded + detached;
        if changed > 0 {
            ctx.count_changes(self.name(), changed);
            ctx.record(
                EventKind::PassChange,
                self.name(),
                &func.name,
                format!("folded {folded} branches, detached {detached} blocks"),
            );
        }
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_folds_constant_branch_and_detaches_arm() {
        // if (1) -> b1 else b2; b2 becomes unreachable.
        let mut fb = FunctionBuilder::new("constbr");
        let one = fb.int(1);
        fb.set_root(0, one);
        fb.cond(0, 1, 2);
        fb.jump(1, 3);
        fb.jump(2, 3);
        fb.ret(3);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        assert!(DeadCode.run(&mut func, &ctx).unwrap());

        assert_eq!(func.block(BlockId::new(0)).transfer, Transfer::Jump);
        assert_eq!(func.block(BlockId::new(0)).succs, vec![BlockId::new(1)]);
        assert!(func.is_detached(BlockId::new(2)));
        assert!(func.validate().is_ok());

        // Second run: nothing left to do.
        assert!(!DeadCode.run(&mut func, &ctx).unwrap());
    }

    #[test]
    fn test_detaches_unreachable_chain() {
        // if (0) -> b1 (which jumps to b2) else b3; b1 and b2 both die.
        let mut fb = FunctionBuilder::new("chain");
        let zero = fb.int(0);
        fb.set_root(0, zero);
        fb.cond(0, 1, 3);
        fb.jump(1, 2);
        fb.jump(2, 3);
        fb.ret(3);
        let mut func = fb.finish().unwrap();

        let ctx = OptContext::new();
        assert!(DeadCode.run(&mut func, &ctx).unwrap());
        assert!(func.is_detached(BlockId::new(1)));
        assert!(func.is_detached(BlockId::new(2)));
        assert!(func.validate().is_ok());
    }
}
