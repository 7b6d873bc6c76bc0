//! The fixed-point solver shared by every analysis.
//!
//! # Algorithm
//!
//! The solver sweeps the blocks in a fixed depth-first order - reverse
//! postorder for forward problems, postorder for backward ones - and
//! repeats full sweeps until a sweep changes nothing:
//!
//! 1. Initialize every interior set to the confluence identity (empty for
//!    union, full for intersection) and plant the boundary set at the
//!    entry (forward) or at every successor-less block (backward).
//! 2. For each block in order, recompute its meet-side set from its
//!    neighbours and push it through the block's transfer function.
//! 3. Stop when stable.
//!
//! Termination is guaranteed by monotonicity: under union every set only
//! grows, under intersection it only shrinks, and the lattice is finite. A
//! generous sweep cap converts a monotonicity bug into a fatal
//! [`Error::Fixpoint`](crate::Error::Fixpoint) instead of a hang.

use crate::{
    cfg::DepthFirstOrder,
    dataflow::framework::{Confluence, Direction, FlowProblem, FlowResults},
    ir::Function,
    utils::BitSet,
    Result,
};

/// Ceiling on full sweeps before the solver declares a monotonicity bug.
const MAX_SWEEPS: usize = 128;

/// Runs `problem` to a fixed point over the function's current CFG.
///
/// # Errors
///
/// Returns [`crate::Error::Fixpoint`] if the iteration fails to stabilize
/// within the sweep cap, which indicates non-monotone GEN/KILL sets.
pub fn solve<P: FlowProblem>(
    problem: &P,
    func: &Function,
    dfo: &DepthFirstOrder,
) -> Result<FlowResults> {
    let count = func.block_count();
    let universe = problem.universe();

    let identity = match P::CONFLUENCE {
        Confluence::Union => BitSet::new(universe),
        Confluence::Intersection => BitSet::full(universe),
    };

    let mut results = FlowResults {
        ins: vec![identity.clone(); count],
        outs: vec![identity; count],
        edge_outs: vec![None; count],
    };

    let mut sweeps = 0;
    loop {
        if sweeps >= MAX_SWEEPS {
            return Err(crate::Error::Fixpoint {
                analysis: P::NAME,
                passes: sweeps,
            });
        }
        sweeps += 1;

        let changed = match P::DIRECTION {
            Direction::Forward => sweep_forward(problem, func, dfo, &mut results),
            Direction::Backward => sweep_backward(problem, func, dfo, &mut results),
        };
        if !changed {
            break;
        }
    }

    Ok(results)
}

fn sweep_forward<P: FlowProblem>(
    problem: &P,
    func: &Function,
    dfo: &DepthFirstOrder,
    results: &mut FlowResults,
) -> bool {
    let mut changed = false;

    for &block in dfo.reverse_postorder() {
        // Meet the predecessors' (per-edge) OUT sets into IN.
        let mut input = if block == func.entry() {
            // The entry's boundary. Under union a back edge into the entry
            // may still contribute facts; under intersection the boundary
            // is pinned, which gives available-expression analyses their
            // "entry OUT equals its own GEN" behaviour.
            let mut input = problem.boundary();
            if P::CONFLUENCE == Confluence::Union {
                for &pred in &func.block(block).preds {
                    input.union_with(out_on_edge(func, results, pred, block));
                }
            }
            input
        } else {
            let mut input: Option<BitSet> = None;
            for &pred in &func.block(block).preds {
                let pred_out = out_on_edge(func, results, pred, block);
                match &mut input {
                    None => input = Some(pred_out.clone()),
                    Some(acc) => {
                        match P::CONFLUENCE {
                            Confluence::Union => acc.union_with(pred_out),
                            Confluence::Intersection => acc.intersect_with(pred_out),
                        };
                    }
                }
            }
            input.unwrap_or_else(|| results.ins[block.index()].clone())
        };

        if input != results.ins[block.index()] {
            std::mem::swap(&mut results.ins[block.index()], &mut input);
            changed = true;
        }
        let input = &results.ins[block.index()];

        let output = problem.sets(block).transfer(input);
        if output != results.outs[block.index()] {
            results.outs[block.index()] = output;
            changed = true;
        }

        // Per-edge OUT sets where the problem distinguishes edges.
        let succ_count = func.block(block).succs.len();
        if succ_count > 0 && problem.edge_sets(block, 0).is_some() {
            let per_edge: Vec<BitSet> = (0..succ_count)
                .map(|edge| {
                    problem
                        .edge_sets(block, edge)
                        .unwrap_or_else(|| problem.sets(block))
                        .transfer(input)
                })
                .collect();
            if results.edge_outs[block.index()].as_ref() != Some(&per_edge) {
                results.edge_outs[block.index()] = Some(per_edge);
                changed = true;
            }
        }
    }

    changed
}

fn sweep_backward<P: FlowProblem>(
    problem: &P,
    func: &Function,
    dfo: &DepthFirstOrder,
    results: &mut FlowResults,
) -> bool {
    let mut changed = false;

    for &block in dfo.postorder() {
        let succs = &func.block(block).succs;
        let output = if succs.is_empty() {
            problem.boundary()
        } else {
            let mut output: Option<BitSet> = None;
            for &succ in succs {
                let succ_in = &results.ins[succ.index()];
                match &mut output {
                    None => output = Some(succ_in.clone()),
                    Some(acc) => {
                        match P::CONFLUENCE {
                            Confluence::Union => acc.union_with(succ_in),
                            Confluence::Intersection => acc.intersect_with(succ_in),
                        };
                    }
                }
            }
            output.expect("non-empty successor list")
        };

        if output != results.outs[block.index()] {
            results.outs[block.index()] = output;
            changed = true;
        }

        let input = problem.sets(block).transfer(&results.outs[block.index()]);
        if input != results.ins[block.index()] {
            results.ins[block.index()] = input;
            changed = true;
        }
    }

    changed
}

/// The OUT set that flows along the edge `pred -> block`, using the
/// per-edge set when the predecessor keeps one.
fn out_on_edge<'r>(
    func: &Function,
    results: &'r FlowResults,
    pred: crate::ir::BlockId,
    block: crate::ir::BlockId,
) -> &'r BitSet {
    if let Some(per_edge) = &results.edge_outs[pred.index()] {
        if let Some(edge) = func.block(pred).succs.iter().position(|&s| s == block) {
            return &per_edge[edge];
        }
    }
    &results.outs[pred.index()]
}
