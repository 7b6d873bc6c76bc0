//! The optimization passes and their orchestration.
//!
//! Every optimization is an [`OptPass`] gated by one bit of the
//! [`OptPasses`] mask; the [`Optimizer`] repeats the pipeline until no
//! pass reports a change (or the configured ceiling hits) and finally
//! stamps per-block execution weights for the code generator.
//!
//! # Passes
//!
//! - [`ConstProp`] - constant propagation and folding (reaching definitions)
//! - [`CopyProp`] - copy propagation (copy facts)
//! - [`Redundancy`] - busy-expression hoisting (very busy expressions)
//! - [`Licm`] - loop shaping and invariant motion (loops + reaching
//!   definitions + liveness)
//! - [`InductionVars`] - induction-variable reduction (loops + reaching
//!   definitions + liveness)
//! - [`DeadAssignments`] / [`DeadVariables`] - store and storage cleanup
//!   (liveness)
//! - [`DeadCode`] - constant branches and unreachable blocks

pub mod config;
pub mod constprop;
pub mod context;
pub mod copyprop;
pub mod dce;
pub mod deadcode;
pub mod engine;
pub mod induction;
pub mod licm;
pub mod pass;
pub mod redundancy;

pub use config::{OptConfig, OptPasses};
pub use constprop::ConstProp;
pub use context::{Event, EventKind, OptContext};
pub use copyprop::CopyProp;
pub use dce::{DeadAssignments, DeadVariables};
pub use deadcode::DeadCode;
pub use engine::{OptSummary, Optimizer};
pub use induction::InductionVars;
pub use licm::Licm;
pub use pass::OptPass;
pub use redundancy::Redundancy;
