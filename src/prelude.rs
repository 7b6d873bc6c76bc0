//! Convenient re-exports of the most commonly used types.
//!
//! ```rust,ignore
//! use treeflow::prelude::*;
//! ```

pub use crate::{
    cfg::{CfgInfo, DepthFirstOrder, DominatorSets, Loop, LoopForest, RotationStrategy},
    dataflow::{
        AvailableExpressions, CopyFacts, DefSiteTable, FlowProblem, FlowResults, LiveVariables,
        ReachingDefinitions, VeryBusyExpressions,
    },
    ir::{
        BasicBlock, BlockId, Expr, ExprArena, ExprId, Function, FunctionBuilder, Symbol,
        SymbolFlags, SymbolId, SymbolTable, Transfer, Ty,
    },
    opt::{OptConfig, OptContext, OptPass, OptPasses, OptSummary, Optimizer},
    utils::BitSet,
    Error, Result,
};
