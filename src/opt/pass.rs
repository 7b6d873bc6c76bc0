//! The pass trait the optimization engine schedules.

use crate::{
    ir::Function,
    opt::{config::OptPasses, context::OptContext},
    Result,
};

/// One optimization pass over a single function.
///
/// Passes are stateless between invocations: every run rebuilds whatever
/// structural and data-flow analyses it needs from the function's current
/// shape (holding analysis results across a mutation is exactly the stale-
/// table bug this design rules out). Passes must be `Send + Sync`; the
/// engine may optimize different functions on different threads.
pub trait OptPass: Send + Sync {
    /// Unique name for events and statistics.
    fn name(&self) -> &'static str;

    /// One-line description of what the pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// The mask bit that enables this pass.
    fn enabled_by(&self) -> OptPasses;

    /// Runs the pass on one function.
    ///
    /// Returns `true` if the function was changed. A pass that reports a
    /// change will be scheduled again on the next pipeline iteration, so
    /// passes must converge: repeated runs on unchanging input must
    /// eventually report `false`.
    ///
    /// # Errors
    ///
    /// Returns an error on broken internal invariants; the engine aborts
    /// the function's optimization.
    fn run(&self, func: &mut Function, ctx: &OptContext) -> Result<bool>;
}
