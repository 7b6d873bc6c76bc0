//! Fluent construction of functions for tests and the front-end boundary.
//!
//! The builder exposes block indices as plain `usize` so test code reads
//! naturally; blocks are declared up front with [`FunctionBuilder::blocks`]
//! and wired with the terminator helpers. Expression helpers default to
//! [`Ty::I32`] where a type is not interesting to the test.
//!
//! # Example
//!
//! ```rust,ignore
//! use treeflow::ir::{FunctionBuilder, SymbolFlags, Ty};
//!
//! let mut fb = FunctionBuilder::new("count");
//! let i = fb.symbol("i", Ty::I32, SymbolFlags::empty());
//! fb.blocks(4);
//!
//! let zero = fb.int(0);
//! let init = fb.assign(i, zero);
//! fb.set_root(0, init);
//! fb.jump(0, 1);
//!
//! let ri = fb.read(i);
//! let ten = fb.int(10);
//! let cmp = fb.lt(ri, ten);
//! fb.set_root(1, cmp);
//! fb.cond(1, 2, 3);
//!
//! let step = fb.int(2);
//! let bump = fb.add_assign(i, step);
//! fb.set_root(2, bump);
//! fb.jump(2, 1);
//!
//! fb.ret(3);
//! let func = fb.finish().unwrap();
//! ```

use crate::{
    ir::{
        AssignOp, BinOp, Expr, ExprId, Function, ShortOp, SymbolFlags, SymbolId, Transfer, Ty,
        UnaryOp,
    },
    BlockId, Result,
};

/// Builds a [`Function`] block by block.
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
}

impl FunctionBuilder {
    /// Starts a new function with the given name. Block 0 is the entry.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            func: Function::new(name),
        }
    }

    /// Ensures blocks `0..count` exist. Newly created blocks default to
    /// [`Transfer::Return`] until a terminator helper rewrites them.
    pub fn blocks(&mut self, count: usize) {
        while self.func.block_count() < count {
            self.func.add_block(Transfer::Return);
        }
    }

    /// Declares a symbol.
    pub fn symbol(&mut self, name: &str, ty: Ty, flags: SymbolFlags) -> SymbolId {
        self.func.symbols.add(name, ty, flags)
    }

    /// Integer literal of type [`Ty::I32`].
    pub fn int(&mut self, value: i64) -> ExprId {
        self.func.arena.int(value, Ty::I32)
    }

    /// Integer literal with an explicit type.
    pub fn int_ty(&mut self, value: i64, ty: Ty) -> ExprId {
        self.func.arena.int(value, ty)
    }

    /// Read of a symbol, typed as the symbol's declared type.
    pub fn read(&mut self, sym: SymbolId) -> ExprId {
        let ty = self.func.symbols.get(sym).ty;
        self.func.arena.sym(sym, ty)
    }

    /// Binary operator node, typed as the left operand.
    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let ty = if op.is_comparison() {
            Ty::I32
        } else {
            self.func.arena.node(lhs).ty
        };
        self.func.arena.alloc(Expr::Binary { op, lhs, rhs }, ty)
    }

    /// `lhs + rhs`.
    pub fn add(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::Add, lhs, rhs)
    }

    /// `lhs - rhs`.
    pub fn sub(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    /// `lhs * rhs`.
    pub fn mul(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    /// `lhs << rhs`.
    pub fn shl(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::Shl, lhs, rhs)
    }

    /// `lhs < rhs`.
    pub fn lt(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::Lt, lhs, rhs)
    }

    /// Unary negation.
    pub fn neg(&mut self, opnd: ExprId) -> ExprId {
        let ty = self.func.arena.node(opnd).ty;
        self.func.arena.alloc(
            Expr::Unary {
                op: UnaryOp::Neg,
                opnd,
            },
            ty,
        )
    }

    /// Read through a pointer expression.
    pub fn deref(&mut self, addr: ExprId, ty: Ty) -> ExprId {
        self.func.arena.alloc(
            Expr::Unary {
                op: UnaryOp::Deref,
                opnd: addr,
            },
            ty,
        )
    }

    /// Short-circuit operator node.
    pub fn short(&mut self, op: ShortOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.func.arena.alloc(Expr::Short { op, lhs, rhs }, Ty::I32)
    }

    /// Ternary conditional node.
    pub fn ternary(&mut self, cond: ExprId, then_val: ExprId, else_val: ExprId) -> ExprId {
        let ty = self.func.arena.node(then_val).ty;
        self.func.arena.alloc(
            Expr::Ternary {
                cond,
                then_val,
                else_val,
            },
            ty,
        )
    }

    /// Plain store `sym = value`.
    pub fn assign(&mut self, sym: SymbolId, value: ExprId) -> ExprId {
        self.assign_op(AssignOp::Set, sym, value)
    }

    /// Compound store `sym += value`.
    pub fn add_assign(&mut self, sym: SymbolId, value: ExprId) -> ExprId {
        self.assign_op(AssignOp::AddSet, sym, value)
    }

    /// Compound store `sym -= value`.
    pub fn sub_assign(&mut self, sym: SymbolId, value: ExprId) -> ExprId {
        self.assign_op(AssignOp::SubSet, sym, value)
    }

    /// Assignment with an explicit operator.
    pub fn assign_op(&mut self, op: AssignOp, sym: SymbolId, value: ExprId) -> ExprId {
        let ty = self.func.symbols.get(sym).ty;
        let target = self.func.arena.sym(sym, ty);
        self.func.arena.alloc(Expr::Assign { op, target, value }, ty)
    }

    /// Store through a pointer expression.
    pub fn store_through(&mut self, addr: ExprId, value: ExprId, ty: Ty) -> ExprId {
        let target = self.deref(addr, ty);
        self.func.arena.alloc(
            Expr::Assign {
                op: AssignOp::Set,
                target,
                value,
            },
            ty,
        )
    }

    /// Call of the function named by `callee`.
    pub fn call(&mut self, callee: SymbolId, args: Vec<ExprId>, ty: Ty) -> ExprId {
        let callee = self.func.arena.sym(callee, Ty::Ptr);
        self.func.arena.alloc(Expr::Call { callee, args }, ty)
    }

    /// Effect-threading sequence `first, second`.
    pub fn seq(&mut self, first: ExprId, second: ExprId) -> ExprId {
        let ty = self.func.arena.node(second).ty;
        self.func.arena.alloc(Expr::Seq { first, second }, ty)
    }

    /// Sets the expression tree of block `block`.
    pub fn set_root(&mut self, block: usize, root: ExprId) {
        self.func.block_mut(BlockId::new(block)).root = Some(root);
    }

    /// Makes `block` an unconditional jump to `to`.
    pub fn jump(&mut self, block: usize, to: usize) {
        self.terminate(block, Transfer::Jump, &[to]);
    }

    /// Makes `block` fall through to `to`.
    pub fn fall(&mut self, block: usize, to: usize) {
        self.terminate(block, Transfer::Fall, &[to]);
    }

    /// Makes `block` a conditional branch: `taken` when its tree is true,
    /// `fall` otherwise.
    pub fn cond(&mut self, block: usize, taken: usize, fall: usize) {
        self.terminate(block, Transfer::Cond, &[taken, fall]);
    }

    /// Makes `block` a switch over the given case targets.
    pub fn switch(&mut self, block: usize, targets: &[usize]) {
        self.terminate(block, Transfer::Switch, targets);
    }

    /// Makes `block` a call-with-unwind edge pair.
    pub fn unwind_call(&mut self, block: usize, normal: usize, handler: usize) {
        self.terminate(block, Transfer::UnwindCall, &[normal, handler]);
    }

    /// Makes `block` a return block.
    pub fn ret(&mut self, block: usize) {
        self.terminate(block, Transfer::Return, &[]);
    }

    /// Makes `block` an inline-assembly barrier falling through to `to`.
    pub fn asm_block(&mut self, block: usize, to: usize) {
        self.terminate(block, Transfer::Asm, &[to]);
    }

    fn terminate(&mut self, block: usize, transfer: Transfer, targets: &[usize]) {
        let max = targets.iter().copied().max().unwrap_or(0);
        self.blocks(block.max(max) + 1);
        let id = BlockId::new(block);
        self.func.block_mut(id).transfer = transfer;
        for &target in targets {
            self.func.add_edge(id, BlockId::new(target));
        }
    }

    /// Finishes construction, validating the CFG.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the constructed CFG is inconsistent.
    pub fn finish(self) -> Result<Function> {
        self.func.validate()?;
        Ok(self.func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_loop_shape() {
        let mut fb = FunctionBuilder::new("loop");
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

        let func = fb.finish().unwrap();
        assert_eq!(func.block_count(), 4);
        assert_eq!(func.block(BlockId::new(1)).preds.len(), 2);
        assert_eq!(func.block(BlockId::new(1)).succs.len(), 2);
    }
}
