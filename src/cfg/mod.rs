//! Control-flow-graph analyses: visitation order, dominators and loops.
//!
//! These are the structural analyses everything else builds on. They are
//! cheap to compute and *must* be recomputed after any mutation that changes
//! block count or edges (preheader synthesis, loop rotation); [`CfgInfo`]
//! bundles them so call sites can refresh all three in one step.

pub mod dfo;
pub mod dominators;
pub mod loops;

pub use dfo::DepthFirstOrder;
pub use dominators::DominatorSets;
pub use loops::{
    assign_weights, ensure_preheader, find_loops, find_preheader, rotate_loop, Loop, LoopForest,
    RotationStrategy,
};

use crate::{ir::Function, Result};

/// The bundled structural analyses of one function.
#[derive(Debug, Clone)]
pub struct CfgInfo {
    /// Depth-first visitation orders.
    pub dfo: DepthFirstOrder,
    /// Dominator sets.
    pub doms: DominatorSets,
    /// Natural loops.
    pub loops: LoopForest,
}

impl CfgInfo {
    /// Computes order, dominators and loops for the current CFG shape.
    ///
    /// # Errors
    ///
    /// Propagates failures from the underlying analyses (unreachable blocks,
    /// non-stabilizing dominator refinement).
    pub fn build(func: &Function) -> Result<Self> {
        let dfo = DepthFirstOrder::compute(func)?;
        let doms = DominatorSets::compute(func, &dfo)?;
        let loops = find_loops(func, &dfo, &doms);
        Ok(Self { dfo, doms, loops })
    }
}
