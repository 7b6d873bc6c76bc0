//! The per-function optimization unit: blocks, expression arena and symbols.

use crate::{
    ir::{BasicBlock, BlockId, ExprArena, SymbolId, SymbolTable, Transfer},
    Result,
};

/// One function's control-flow graph, expression trees and symbol table.
///
/// Created by the front end, transformed in place by the optimizer, and
/// handed to the code generator. Structural mutation (preheader insertion,
/// loop rotation) happens through the edge helpers here so that predecessor
/// and successor lists always stay mutually consistent; any component that
/// changes block count or edges must recompute depth-first order, dominators
/// and loop descriptors before reusing them.
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name, for events and diagnostics.
    pub name: String,
    blocks: Vec<BasicBlock>,
    /// The expression arena all block trees live in.
    pub arena: ExprArena,
    /// The symbol table.
    pub symbols: SymbolTable,
    entry: BlockId,
    /// Emission order of the blocks. Block ids are stable; code-size loop
    /// rotation reorders this list instead of renumbering blocks.
    layout: Vec<BlockId>,
}

impl Function {
    /// Creates a function with a single empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: vec![BasicBlock::new(Transfer::Return)],
            arena: ExprArena::new(),
            symbols: SymbolTable::new(),
            entry: BlockId::new(0),
            layout: vec![BlockId::new(0)],
        }
    }

    /// The entry block.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// Replaces the entry block. Used when a structural transformation
    /// splices a new block in front of the old entry.
    pub(crate) fn set_entry(&mut self, entry: BlockId) {
        self.entry = entry;
    }

    /// Number of blocks (the block bit universe).
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Returns a mutable reference to the block for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Iterates over `(id, block)` pairs in index order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId::new(i), b))
    }

    /// Appends a new block and returns its id.
    pub fn add_block(&mut self, transfer: Transfer) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(transfer));
        self.layout.push(id);
        id
    }

    /// The current emission order.
    #[must_use]
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    /// Position of `block` in the emission order.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not in the layout (cannot happen for ids created
    /// through [`Function::add_block`]).
    #[must_use]
    pub fn layout_position(&self, block: BlockId) -> usize {
        self.layout
            .iter()
            .position(|&b| b == block)
            .expect("block missing from layout")
    }

    /// Moves `block` to the position directly after `after` in the emission
    /// order. Block ids are unaffected.
    pub fn move_after_in_layout(&mut self, block: BlockId, after: BlockId) {
        let from = self.layout_position(block);
        self.layout.remove(from);
        let to = self.layout_position(after);
        self.layout.insert(to + 1, block);
    }

    /// Moves `block` to the position directly before `before` in the
    /// emission order. Block ids are unaffected.
    pub fn move_before_in_layout(&mut self, block: BlockId, before: BlockId) {
        let from = self.layout_position(block);
        self.layout.remove(from);
        let to = self.layout_position(before);
        self.layout.insert(to, block);
    }

    /// Adds the edge `from -> to`, appending to both adjacency lists.
    ///
    /// # Panics
    ///
    /// Panics if either id is out of range.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.push(to);
        self.blocks[to.index()].preds.push(from);
    }

    /// Removes the edge `from -> to` from both adjacency lists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedCfg`] if the edge does not exist.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        let succs = &mut self.blocks[from.index()].succs;
        let Some(pos) = succs.iter().position(|&s| s == to) else {
            return Err(crate::Error::MalformedCfg(format!(
                "no edge {from} -> {to} to remove"
            )));
        };
        succs.remove(pos);

        let preds = &mut self.blocks[to.index()].preds;
        if let Some(pos) = preds.iter().position(|&p| p == from) {
            preds.remove(pos);
        }
        Ok(())
    }

    /// Returns `true` if `block` has been detached from the graph: no
    /// edges, no tree, and not the entry. Detached blocks are what remains
    /// of unreachable code (block ids are stable, so blocks are never
    /// physically deleted); every analysis skips them.
    #[must_use]
    pub fn is_detached(&self, block: BlockId) -> bool {
        let b = &self.blocks[block.index()];
        block != self.entry && b.preds.is_empty() && b.succs.is_empty() && b.root.is_none()
    }

    /// Redirects the existing edge `from -> old_to` to `from -> new_to`,
    /// preserving successor order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedCfg`] if the edge does not exist.
    pub fn redirect_edge(&mut self, from: BlockId, old_to: BlockId, new_to: BlockId) -> Result<()> {
        let succs = &mut self.blocks[from.index()].succs;
        let Some(pos) = succs.iter().position(|&s| s == old_to) else {
            return Err(crate::Error::MalformedCfg(format!(
                "no edge {from} -> {old_to} to redirect"
            )));
        };
        succs[pos] = new_to;

        let preds = &mut self.blocks[old_to.index()].preds;
        if let Some(pos) = preds.iter().position(|&p| p == from) {
            preds.remove(pos);
        }
        self.blocks[new_to.index()].preds.push(from);
        Ok(())
    }

    /// Introduces a fresh unambiguous temporary of type `ty`.
    pub fn new_temp(&mut self, ty: crate::ir::Ty) -> SymbolId {
        self.symbols.add_temp(ty)
    }

    /// Threads `stmt` onto the end of `block`'s expression tree, creating
    /// the tree when the block had none.
    pub fn thread_statement(&mut self, block: BlockId, stmt: crate::ir::ExprId) {
        let ty = self.arena.node(stmt).ty;
        match self.blocks[block.index()].root {
            None => self.blocks[block.index()].root = Some(stmt),
            Some(old) => {
                let seq = self.arena.alloc(
                    crate::ir::Expr::Seq {
                        first: old,
                        second: stmt,
                    },
                    ty,
                );
                self.blocks[block.index()].root = Some(seq);
            }
        }
    }

    /// Validates structural well-formedness: every edge is in range, every
    /// successor edge has the matching predecessor entry and vice versa, and
    /// every block is reachable from the entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for a function without blocks and
    /// [`crate::Error::MalformedCfg`] for any inconsistency.
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(crate::Error::Empty);
        }

        let count = self.blocks.len();
        for (id, block) in self.blocks() {
            for &succ in &block.succs {
                if succ.index() >= count {
                    return Err(crate::Error::MalformedCfg(format!(
                        "{id} has out-of-range successor {succ}"
                    )));
                }
                if !self.blocks[succ.index()].preds.contains(&id) {
                    return Err(crate::Error::MalformedCfg(format!(
                        "edge {id} -> {succ} missing from predecessor list"
                    )));
                }
            }
            for &pred in &block.preds {
                if pred.index() >= count {
                    return Err(crate::Error::MalformedCfg(format!(
                        "{id} has out-of-range predecessor {pred}"
                    )));
                }
                if !self.blocks[pred.index()].succs.contains(&id) {
                    return Err(crate::Error::MalformedCfg(format!(
                        "edge {pred} -> {id} missing from successor list"
                    )));
                }
            }
        }

        // Reachability from the entry block.
        let mut seen = vec![false; count];
        let mut stack = vec![self.entry];
        seen[self.entry.index()] = true;
        while let Some(block) = stack.pop() {
            for &succ in &self.blocks[block.index()].succs {
                if !seen[succ.index()] {
                    seen[succ.index()] = true;
                    stack.push(succ);
                }
            }
        }
        if let Some(unreachable) = seen
            .iter()
            .enumerate()
            .position(|(i, &s)| !s && !self.is_detached(BlockId::new(i)))
        {
            return Err(crate::Error::MalformedCfg(format!(
                "block b{unreachable} is unreachable from the entry"
            )));
        }

        Ok(())
    }
}
