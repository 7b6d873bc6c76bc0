//! The in-memory program representation the optimizer works on.
//!
//! A function is a control-flow graph of [`BasicBlock`]s, each carrying at
//! most one expression tree in the function-wide [`ExprArena`], plus a
//! [`SymbolTable`] recording for every variable whether its address may be
//! aliased and whether it is live across the function boundary. The front
//! end builds this structure; the optimizer transforms it in place; the code
//! generator consumes it.
//!
//! # Sub-modules
//!
//! - [`mod@ty`] - scalar semantic types
//! - [`symbol`] - symbols and the symbol table
//! - [`expr`] - expression trees and the arena
//! - [`block`] - basic blocks and control-transfer kinds
//! - [`function`] - the per-function container and structural mutation
//! - [`builder`] - fluent construction for tests and the front end

pub mod block;
pub mod builder;
pub mod expr;
pub mod function;
pub mod symbol;
pub mod ty;

pub use block::{BasicBlock, BlockId, Transfer};
pub use builder::FunctionBuilder;
pub use expr::{AssignOp, BinOp, Expr, ExprArena, ExprId, ExprNode, Leaf, ShortOp, UnaryOp};
pub use function::Function;
pub use symbol::{Symbol, SymbolFlags, SymbolId, SymbolTable};
pub use ty::Ty;
