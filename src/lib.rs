// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # treeflow
//!
//! A global data-flow and loop optimization engine for expression-tree
//! control-flow graphs. `treeflow` sits between a compiler front end and a
//! machine-specific back end: it takes one function's CFG of expression
//! trees, transforms it in place into an equivalent but faster or smaller
//! CFG, and hands the same structure on, annotated with per-block execution
//! weights.
//!
//! ## Features
//!
//! - **One solver, five analyses** - reaching definitions, available
//!   expressions, copy facts, live variables and very busy expressions are
//!   all instances of a single GEN/KILL bit-vector fixed point
//! - **Precise tree-level effects** - short-circuit and conditional
//!   operators contribute branch-accurate GEN/KILL, including per-edge
//!   sets on conditional branches
//! - **Loop optimization** - dominator-based natural loops, preheader
//!   synthesis, two rotation strategies, invariant hoisting and
//!   induction-variable strength reduction with base-variable elimination
//! - **Scalar cleanups** - constant and copy propagation, dead assignments,
//!   dead variables, redundancy hoisting, constant-branch folding
//! - **Parallel by construction** - functions share no mutable state, and
//!   a module's functions are optimized concurrently
//!
//! ## Quick Start
//!
//! Add `treeflow` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! treeflow = "0.2"
//! ```
//!
//! ### Using the Prelude
//!
//! ```rust,ignore
//! use treeflow::prelude::*;
//!
//! let mut func = build_function_somehow();
//! let ctx = OptContext::new();
//! let optimizer = Optimizer::new(OptConfig::default());
//! let summary = optimizer.optimize(&mut func, &ctx)?;
//! println!("changed: {}", summary.changed);
//! # Ok::<(), treeflow::Error>(())
//! ```
//!
//! ### Building a Function
//!
//! The front end constructs functions through [`ir::FunctionBuilder`]:
//!
//! ```rust
//! use treeflow::ir::{FunctionBuilder, SymbolFlags, Ty};
//!
//! let mut fb = FunctionBuilder::new("count");
//! let i = fb.symbol("i", Ty::I32, SymbolFlags::empty());
//!
//! let zero = fb.int(0);
//! let init = fb.assign(i, zero);
//! fb.set_root(0, init);
//! fb.jump(0, 1);
//!
//! let ri = fb.read(i);
//! let ten = fb.int(10);
//! let test = fb.lt(ri, ten);
//! fb.set_root(1, test);
//! fb.cond(1, 2, 3);
//!
//! let one = fb.int(1);
//! let bump = fb.add_assign(i, one);
//! fb.set_root(2, bump);
//! fb.jump(2, 1);
//!
//! fb.ret(3);
//! let func = fb.finish()?;
//! assert_eq!(func.block_count(), 4);
//! # Ok::<(), treeflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `treeflow` is organized into focused modules:
//!
//! - [`prelude`] - re-exports of the commonly used types
//! - [`ir`] - the data model: blocks, expression trees, symbols
//! - [`cfg`] - depth-first order, dominators, natural loops
//! - [`dataflow`] - the generic solver and the five analyses
//! - [`opt`] - the passes and the orchestrating engine
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Error Philosophy
//!
//! This is compiler-internal infrastructure: nearly every error is a fatal
//! internal one signaling a bug in this crate or its caller, not a
//! property of the compiled program. The single user-facing diagnostic - a
//! variable read no assignment can reach - flows through
//! [`opt::OptContext`] as an event and never aborts anything.

#[macro_use]
pub(crate) mod error;

pub mod cfg;
pub mod dataflow;
pub mod ir;
pub mod opt;
pub mod prelude;
pub mod utils;

pub use error::Error;

/// Convenient alias for `Result` with this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// A strongly-typed basic-block index.
///
/// Re-exported at the crate root because nearly every API takes or returns
/// one.
pub use ir::BlockId;

/// The per-function optimization unit.
///
/// See [`ir::Function`] for the full API.
pub use ir::Function;

/// The optimization engine and its configuration.
pub use opt::{OptConfig, OptContext, OptPasses, Optimizer};
