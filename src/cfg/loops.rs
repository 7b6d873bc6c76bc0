//! Natural-loop discovery and the loop-shaping transformations.
//!
//! A **back edge** is an edge `b -> h` where `h` dominates `b`. The natural
//! loop of that edge is `h` plus every block that can reach `b` without
//! passing through `h`. Two back edges that share a header describe one
//! loop and are merged. On top of discovery this module provides the three
//! shaping operations the loop optimizers need:
//!
//! - **Execution weights**: every block's relative frequency weight is
//!   raised by a constant factor per enclosing loop, for downstream
//!   register-allocation priority.
//! - **Preheader synthesis**: hoisting needs a block that is the loop's
//!   sole entry from outside. An existing block qualifies when it is the
//!   header's only outside predecessor and has no other successor;
//!   otherwise a fresh block is spliced in front of the header and all
//!   outside predecessors are redirected to it.
//! - **Loop rotation**: a pretest loop is reshaped so the test runs at the
//!   bottom - either by relocating the header block after the tail in the
//!   emission order (optimizing for size) or by duplicating the header's
//!   test after the loop body (optimizing for speed, the original test
//!   becoming the entry guard).
//!
//! All three mutate the [`Function`]; after any of them the caller must
//! recompute depth-first order, dominators and the loop forest before
//! running an analysis that depends on them.

use crate::{
    cfg::{DepthFirstOrder, DominatorSets},
    ir::{BlockId, Function, Transfer},
    utils::BitSet,
    Result,
};

/// Weight multiplier applied per loop-nesting level.
const LOOP_WEIGHT: u32 = 8;

/// One natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    /// The header block; dominates every member.
    pub header: BlockId,
    /// The tail: the back-edge source, or for merged multi-latch loops the
    /// latch latest in reverse postorder.
    pub tail: BlockId,
    /// Every back-edge source targeting the header.
    pub latches: Vec<BlockId>,
    /// Member blocks (header included), over the block universe.
    pub body: BitSet,
    /// Members with at least one successor outside the loop, or with no
    /// successors at all.
    pub exits: BitSet,
    /// The loop's preheader, if one exists.
    pub preheader: Option<BlockId>,
    /// Nesting depth; 0 for an outermost loop.
    pub depth: usize,
}

impl Loop {
    /// Returns `true` if `block` is a member of this loop.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(block.index())
    }

    /// Number of member blocks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.count()
    }
}

/// All natural loops of a function.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<Loop>,
}

impl LoopForest {
    /// The discovered loops, ordered by header index.
    #[must_use]
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if the function has no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Loops ordered innermost first (descending depth), the order the loop
    /// optimizers process them in.
    #[must_use]
    pub fn by_depth_descending(&self) -> Vec<&Loop> {
        let mut sorted: Vec<_> = self.loops.iter().collect();
        sorted.sort_by_key(|l| std::cmp::Reverse(l.depth));
        sorted
    }

    /// The loop headed by `header`, if any.
    #[must_use]
    pub fn loop_for_header(&self, header: BlockId) -> Option<&Loop> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// Number of loops containing `block`.
    #[must_use]
    pub fn nesting_of(&self, block: BlockId) -> usize {
        self.loops.iter().filter(|l| l.contains(block)).count()
    }
}

/// Discovers every natural loop via dominance-based back-edge detection,
/// merging loops that share a header.
#[must_use]
pub fn find_loops(func: &Function, dfo: &DepthFirstOrder, doms: &DominatorSets) -> LoopForest {
    let count = func.block_count();
    let mut by_header: Vec<Option<Loop>> = vec![None; count];

    for &block in dfo.reverse_postorder() {
        for &succ in &func.block(block).succs {
            if !doms.dominates(succ, block) {
                continue;
            }
            // Back edge block -> succ.
            let header = succ;
            let entry = by_header[header.index()].get_or_insert_with(|| {
                let mut body = BitSet::new(count);
                body.insert(header.index());
                Loop {
                    header,
                    tail: block,
                    latches: Vec::new(),
                    body,
                    exits: BitSet::new(count),
                    preheader: None,
                    depth: 0,
                }
            });
            entry.latches.push(block);
            expand_body(func, &mut entry.body, header, block);
        }
    }

    let mut loops: Vec<Loop> = by_header.into_iter().flatten().collect();

    for lp in &mut loops {
        // The tail is the latch latest in reverse postorder.
        if let Some(&tail) = lp
            .latches
            .iter()
            .max_by_key(|&&latch| dfo.rpo_position(latch))
        {
            lp.tail = tail;
        }
        compute_exits(func, lp);
        lp.preheader = find_preheader(func, lp);
    }

    // Nesting depth: the number of strictly enclosing loops.
    let depths: Vec<usize> = loops
        .iter()
        .map(|lp| {
            loops
                .iter()
                .filter(|other| other.header != lp.header && other.body.contains(lp.header.index()))
                .count()
        })
        .collect();
    for (lp, depth) in loops.iter_mut().zip(depths) {
        lp.depth = depth;
    }

    LoopForest { loops }
}

/// Writes the per-block execution-frequency weights: each block's weight is
/// `LOOP_WEIGHT` raised to the number of loops containing it (saturating).
pub fn assign_weights(func: &mut Function, forest: &LoopForest) {
    for index in 0..func.block_count() {
        let block = BlockId::new(index);
        let nesting = forest.nesting_of(block);
        func.block_mut(block).weight = LOOP_WEIGHT.saturating_pow(nesting as u32);
    }
}

/// Adds every block that reaches `latch` without passing through `header`
/// to the loop body.
fn expand_body(func: &Function, body: &mut BitSet, header: BlockId, latch: BlockId) {
    if body.contains(latch.index()) {
        return;
    }
    let mut worklist = vec![latch];
    body.insert(latch.index());

    while let Some(block) = worklist.pop() {
        for &pred in &func.block(block).preds {
            if pred != header && !body.contains(pred.index()) {
                body.insert(pred.index());
                worklist.push(pred);
            }
        }
    }
}

/// Recomputes a loop's exit set: members with a successor outside the loop,
/// or with no successors.
fn compute_exits(func: &Function, lp: &mut Loop) {
    lp.exits.clear();
    for member in lp.body.iter() {
        let block = BlockId::new(member);
        let succs = &func.block(block).succs;
        if succs.is_empty() || succs.iter().any(|s| !lp.body.contains(s.index())) {
            lp.exits.insert(member);
        }
    }
}

/// Identifies an existing preheader: the header's unique outside
/// predecessor, provided it has no successor other than the header.
#[must_use]
pub fn find_preheader(func: &Function, lp: &Loop) -> Option<BlockId> {
    let mut outside = func
        .block(lp.header)
        .preds
        .iter()
        .filter(|p| !lp.body.contains(p.index()));
    let candidate = *outside.next()?;
    if outside.next().is_some() {
        return None;
    }
    if func.block(candidate).succs.len() != 1 {
        return None;
    }
    Some(candidate)
}

/// Ensures the loop has a preheader, synthesizing one if necessary.
///
/// Synthesis splices a fresh jump block in front of the header and
/// redirects every outside predecessor to it. The function's depth-first
/// order, dominators and loop forest are stale afterwards; the returned
/// flag tells the caller whether recomputation is needed.
///
/// # Errors
///
/// Propagates edge-redirection failures, which indicate a malformed CFG.
///
/// # Returns
///
/// `(preheader, synthesized)`.
pub fn ensure_preheader(func: &mut Function, lp: &Loop) -> Result<(BlockId, bool)> {
    if let Some(existing) = find_preheader(func, lp) {
        return Ok((existing, false));
    }

    let preheader = func.add_block(Transfer::Jump);
    let outside: Vec<BlockId> = func
        .block(lp.header)
        .preds
        .iter()
        .copied()
        .filter(|p| !lp.body.contains(p.index()))
        .collect();
    for pred in outside {
        func.redirect_edge(pred, lp.header, preheader)?;
    }
    func.add_edge(preheader, lp.header);
    if lp.header == func.entry() {
        // A loop headed by the entry block has no outside predecessor; the
        // synthesized preheader becomes the new entry.
        func.set_entry(preheader);
        func.move_before_in_layout(preheader, lp.header);
    } else {
        func.move_after_in_layout(preheader, prior_in_layout(func, lp.header));
    }
    Ok((preheader, true))
}

/// The block laid out directly before `block`, or `block` itself when it
/// opens the layout (the new preheader then lands right after it, which is
/// still ahead of every loop member in emission order).
fn prior_in_layout(func: &Function, block: BlockId) -> BlockId {
    let pos = func.layout_position(block);
    if pos == 0 {
        block
    } else {
        func.layout()[pos - 1]
    }
}

/// Which rotation strategy [`rotate_loop`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStrategy {
    /// Relocate the header block after the tail in the emission order.
    Size,
    /// Duplicate the header's test after the loop body; the original test
    /// becomes the entry guard.
    Speed,
}

/// Rotates a pretest loop so its test executes at the bottom.
///
/// The rotation is skipped (returning `false`) if the loop is a single
/// block, if the header is not itself an exit block, if the tail already
/// is one, if the loop has more than one latch, or if this rotation was
/// already performed (detected structurally: the header already sits after
/// the tail in the emission order, or the tail already tests the loop
/// condition).
///
/// # Errors
///
/// Propagates edge-redirection failures, which indicate a malformed CFG.
pub fn rotate_loop(func: &mut Function, lp: &Loop, strategy: RotationStrategy) -> Result<bool> {
    if lp.size() == 1 {
        return Ok(false);
    }
    if !lp.exits.contains(lp.header.index()) {
        return Ok(false);
    }
    if lp.exits.contains(lp.tail.index()) {
        return Ok(false);
    }
    if lp.latches.len() != 1 {
        return Ok(false);
    }
    if func.block(lp.header).transfer != Transfer::Cond {
        return Ok(false);
    }

    match strategy {
        RotationStrategy::Size => {
            if func.layout_position(lp.header) > func.layout_position(lp.tail) {
                return Ok(false);
            }
            // External fall-through into the header would break once the
            // header moves; promote those edges to explicit jumps.
            let outside: Vec<BlockId> = func
                .block(lp.header)
                .preds
                .iter()
                .copied()
                .filter(|p| !lp.body.contains(p.index()))
                .collect();
            for pred in outside {
                if func.block(pred).transfer == Transfer::Fall {
                    func.block_mut(pred).transfer = Transfer::Jump;
                }
            }
            func.move_after_in_layout(lp.header, lp.tail);
            Ok(true)
        }
        RotationStrategy::Speed => {
            let Some(test) = func.block(lp.header).root else {
                return Ok(false);
            };
            // Bottom-test block: a copy of the header's test with the same
            // taken/fall-through polarity.
            let header_succs = func.block(lp.header).succs.clone();
            let copied = func.arena.copy_subtree(test);
            let bottom = func.add_block(Transfer::Cond);
            func.block_mut(bottom).root = Some(copied);
            for succ in header_succs {
                func.add_edge(bottom, succ);
            }
            func.redirect_edge(lp.tail, lp.header, bottom)?;
            func.move_after_in_layout(bottom, lp.tail);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, SymbolFlags, Ty};

    fn count_loop() -> Function {
        // 0: i = 0            -> 1
        // 1: i < 10           -> 2 (taken), 3 (fall)
        // 2: i += 1           -> 1
        // 3: return
        let mut fb = FunctionBuilder::new("count");
        let i = fb.symbol("i", Ty::I32, SymbolFlags::empty());

        let zero = fb.int(0);
        let init = fb.assign(i, zero);
        fb.set_root(0, init);
        fb.jump(0, 1);

        let ri = fb.read(i);
        let ten = fb.int(10);
        let cmp = fb.lt(ri, ten);
        fb.set_root(1, cmp);
        fb.cond(1, 2, 3);

        let one = fb.int(1);
        let bump = fb.add_assign(i, one);
        fb.set_root(2, bump);
        fb.jump(2, 1);

        fb.ret(3);
        fb.finish().unwrap()
    }

    fn analyze(func: &Function) -> (DepthFirstOrder, DominatorSets, LoopForest) {
        let dfo = DepthFirstOrder::compute(func).unwrap();
        let doms = DominatorSets::compute(func, &dfo).unwrap();
        let forest = find_loops(func, &dfo, &doms);
        (dfo, doms, forest)
    }

    #[test]
    fn test_find_single_loop() {
        let func = count_loop();
        let (_, _, forest) = analyze(&func);

        assert_eq!(forest.len(), 1);
        let lp = &forest.loops()[0];
        assert_eq!(lp.header, BlockId::new(1));
        assert_eq!(lp.tail, BlockId::new(2));
        assert_eq!(lp.size(), 2);
        assert!(lp.exits.contains(1));
        assert!(!lp.exits.contains(2));
        assert_eq!(lp.preheader, Some(BlockId::new(0)));
        assert_eq!(lp.depth, 0);
    }

    #[test]
    fn test_weights() {
        let mut func = count_loop();
        let (_, _, forest) = analyze(&func);
        assign_weights(&mut func, &forest);

        assert_eq!(func.block(BlockId::new(0)).weight, 1);
        assert_eq!(func.block(BlockId::new(1)).weight, 8);
        assert_eq!(func.block(BlockId::new(2)).weight, 8);
        assert_eq!(func.block(BlockId::new(3)).weight, 1);
    }

    #[test]
    fn test_nested_loop_depth_and_weight() {
        // 0 -> 1 (outer header) -> 2 (inner header) -> 3 (inner latch) -> 2,
        // 2 -> 4 exits inner, 4 -> 1 outer latch, 1 -> 5 exit.
        let mut fb = FunctionBuilder::new("nest");
        fb.jump(0, 1);
        fb.cond(1, 2, 5);
        fb.cond(2, 3, 4);
        fb.jump(3, 2);
        fb.jump(4, 1);
        fb.ret(5);
        let mut func = fb.finish().unwrap();

        let (_, _, forest) = analyze(&func);
        assert_eq!(forest.len(), 2);

        let outer = forest.loop_for_header(BlockId::new(1)).unwrap();
        let inner = forest.loop_for_header(BlockId::new(2)).unwrap();
        assert_eq!(outer.depth, 0);
        assert_eq!(inner.depth, 1);
        assert!(outer.contains(BlockId::new(3)));

        assign_weights(&mut func, &forest);
        assert_eq!(func.block(BlockId::new(1)).weight, 8);
        assert_eq!(func.block(BlockId::new(3)).weight, 64);
    }

    #[test]
    fn test_merge_shared_header() {
        // Two back edges into block 1: 2 -> 1 and 3 -> 1.
        let mut fb = FunctionBuilder::new("merge");
        fb.jump(0, 1);
        fb.cond(1, 2, 4);
        fb.cond(2, 3, 1);
        fb.jump(3, 1);
        fb.ret(4);
        let func = fb.finish().unwrap();

        let (_, _, forest) = analyze(&func);
        assert_eq!(forest.len(), 1);
        let lp = &forest.loops()[0];
        assert_eq!(lp.latches.len(), 2);
        assert!(lp.contains(BlockId::new(2)));
        assert!(lp.contains(BlockId::new(3)));
    }

    #[test]
    fn test_preheader_synthesis() {
        // Header 2 entered from both 0 and 1: no preheader exists.
        let mut fb = FunctionBuilder::new("multi_entry");
        fb.cond(0, 1, 2);
        fb.jump(1, 2);
        fb.cond(2, 3, 4);
        fb.jump(3, 2);
        fb.ret(4);
        let mut func = fb.finish().unwrap();

        let (_, _, forest) = analyze(&func);
        let lp = forest.loops()[0].clone();
        assert!(lp.preheader.is_none());

        let (preheader, synthesized) = ensure_preheader(&mut func, &lp).unwrap();
        assert!(synthesized);
        assert!(func.validate().is_ok());

        // The new block is now the header's only outside predecessor.
        let (_, _, forest) = analyze(&func);
        let lp = forest.loop_for_header(BlockId::new(2)).unwrap();
        assert_eq!(lp.preheader, Some(preheader));
        assert_eq!(func.block(preheader).succs, vec![BlockId::new(2)]);
        assert_eq!(func.block(preheader).preds.len(), 2);
    }

    #[test]
    fn test_rotate_for_speed() {
        let mut func = count_loop();
        let (_, _, forest) = analyze(&func);
        let lp = forest.loops()[0].clone();

        assert!(rotate_loop(&mut func, &lp, RotationStrategy::Speed).unwrap());
        assert!(func.validate().is_ok());

        // The tail now branches to a bottom-test block carrying a copy of
        // the loop condition, and the rediscovered loop is post-tested.
        let (_, _, forest) = analyze(&func);
        assert_eq!(forest.len(), 1);
        let rotated = &forest.loops()[0];
        assert!(rotated.exits.contains(rotated.tail.index()));

        // A second rotation attempt is structurally skipped.
        let again = forest.loops()[0].clone();
        assert!(!rotate_loop(&mut func, &again, RotationStrategy::Speed).unwrap());
    }

    #[test]
    fn test_rotate_for_size_moves_layout_only() {
        let mut func = count_loop();
        let (_, _, forest) = analyze(&func);
        let lp = forest.loops()[0].clone();
        let blocks_before = func.block_count();

        assert!(rotate_loop(&mut func, &lp, RotationStrategy::Size).unwrap());
        assert_eq!(func.block_count(), blocks_before);
        assert!(func.layout_position(lp.header) > func.layout_position(lp.tail));

        // Second attempt detects the layout is already rotated.
        assert!(!rotate_loop(&mut func, &lp, RotationStrategy::Size).unwrap());
    }
}
