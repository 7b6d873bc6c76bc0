//! Depth-first visitation order over the control-flow graph.
//!
//! Every fixed-point iteration in this crate sweeps the blocks in a fixed
//! depth-first order: reverse postorder for forward analyses (predecessors
//! tend to be visited before their successors, so facts propagate in few
//! sweeps) and postorder for backward analyses. The order is recomputed
//! whenever the CFG's shape changes; holding on to a stale order across a
//! structural mutation is a bug.

use crate::{
    ir::{BlockId, Function},
    Result,
};

/// The depth-first orders of a function's blocks.
#[derive(Debug, Clone)]
pub struct DepthFirstOrder {
    postorder: Vec<BlockId>,
    reverse_postorder: Vec<BlockId>,
    /// Position of each block in `reverse_postorder`.
    rpo_position: Vec<usize>,
}

impl DepthFirstOrder {
    /// Computes the depth-first orders from the function's entry block.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedCfg`] if a block is unreachable from
    /// the entry; the front end never produces such graphs and the
    /// optimizer's own mutations must not either.
    pub fn compute(func: &Function) -> Result<Self> {
        let count = func.block_count();
        let mut postorder = Vec::with_capacity(count);
        let mut state = vec![VisitState::Unseen; count];

        // Iterative DFS carrying an explicit successor cursor per frame.
        let mut stack: Vec<(BlockId, usize)> = vec![(func.entry(), 0)];
        state[func.entry().index()] = VisitState::Open;

        while let Some(&(block, cursor)) = stack.last() {
            let succs = &func.block(block).succs;
            if cursor < succs.len() {
                stack.last_mut().expect("frame exists").1 += 1;
                let next = succs[cursor];
                if state[next.index()] == VisitState::Unseen {
                    state[next.index()] = VisitState::Open;
                    stack.push((next, 0));
                }
            } else {
                state[block.index()] = VisitState::Done;
                postorder.push(block);
                stack.pop();
            }
        }

        if postorder.len() != count {
            // Detached blocks (dead-code remnants) are legitimately outside
            // the order; anything else unreachable is a malformed graph.
            if let Some(missing) = state
                .iter()
                .enumerate()
                .position(|(i, &s)| s == VisitState::Unseen && !func.is_detached(BlockId::new(i)))
            {
                return Err(crate::Error::MalformedCfg(format!(
                    "block b{missing} is unreachable from the entry"
                )));
            }
        }

        let reverse_postorder: Vec<BlockId> = postorder.iter().rev().copied().collect();
        let mut rpo_position = vec![0; count];
        for (pos, &block) in reverse_postorder.iter().enumerate() {
            rpo_position[block.index()] = pos;
        }

        Ok(Self {
            postorder,
            reverse_postorder,
            rpo_position,
        })
    }

    /// Blocks in postorder (used by backward analyses).
    #[must_use]
    pub fn postorder(&self) -> &[BlockId] {
        &self.postorder
    }

    /// Blocks in reverse postorder (used by forward analyses).
    #[must_use]
    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.reverse_postorder
    }

    /// Position of `block` in reverse postorder.
    #[must_use]
    pub fn rpo_position(&self, block: BlockId) -> usize {
        self.rpo_position[block.index()]
    }

    /// Number of blocks covered by the order.
    #[must_use]
    pub fn len(&self) -> usize {
        self.postorder.len()
    }

    /// Returns `true` if the order covers no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.postorder.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unseen,
    Open,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_diamond_order() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let mut fb = FunctionBuilder::new("diamond");
        fb.cond(0, 1, 2);
        fb.jump(1, 3);
        fb.jump(2, 3);
        fb.ret(3);
        let func = fb.finish().unwrap();

        let dfo = DepthFirstOrder::compute(&func).unwrap();
        assert_eq!(dfo.len(), 4);

        let rpo = dfo.reverse_postorder();
        assert_eq!(rpo[0], BlockId::new(0));
        assert_eq!(rpo[3], BlockId::new(3));
        // Entry first, join last.
        assert_eq!(dfo.rpo_position(BlockId::new(0)), 0);
        assert_eq!(dfo.rpo_position(BlockId::new(3)), 3);
    }

    #[test]
    fn test_loop_order_visits_header_before_body() {
        let mut fb = FunctionBuilder::new("loop");
        fb.jump(0, 1);
        fb.cond(1, 2, 3);
        fb.jump(2, 1);
        fb.ret(3);
        let func = fb.finish().unwrap();

        let dfo = DepthFirstOrder::compute(&func).unwrap();
        assert!(dfo.rpo_position(BlockId::new(1)) < dfo.rpo_position(BlockId::new(2)));
    }
}
