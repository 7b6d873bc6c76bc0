use thiserror::Error;

macro_rules! internal_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Internal {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Internal {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure conditions that can occur while analyzing and transforming a
/// function's control-flow graph. Almost everything here is a *fatal internal error*: the
/// optimizer operates on input it trusts (a well-formed CFG from the front end), so a failure
/// indicates a bug in this crate or its caller rather than a user-facing condition. The one
/// user-facing diagnostic (a variable read with no reaching definition) is not an error at all;
/// it is recorded through the optimization context and compilation continues.
///
/// # Error Categories
///
/// ## Internal Invariant Violations
/// - [`Error::Internal`] - A broken invariant (mismatched bit-set universes, a definition site
///   missing from its table, a loop without a preheader when hoisting begins)
/// - [`Error::Fixpoint`] - A data-flow analysis failed to converge within its iteration cap
///
/// ## Input Validation
/// - [`Error::MalformedCfg`] - The caller handed over a structurally inconsistent CFG
/// - [`Error::Empty`] - A function with no blocks was provided
///
/// # Examples
///
/// ```rust,ignore
/// use treeflow::{Error, Optimizer};
///
/// match optimizer.optimize(&mut func, &ctx) {
///     Ok(stats) => println!("optimized: {} changes", stats.changes),
///     Err(Error::Fixpoint { analysis, passes }) => {
///         panic!("{analysis} did not converge after {passes} passes");
///     }
///     Err(e) => eprintln!("optimizer error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An internal invariant of the optimizer was violated.
    ///
    /// This indicates a bug in this crate or in the front end feeding it, never a property of
    /// the program being compiled. Compilation of the translation unit should be aborted with
    /// the carried diagnostic. The error includes the source location where the violation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the invariant that was broken
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Internal - {file}:{line}: {message}")]
    Internal {
        /// The message to be printed for the internal error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A fixed-point iteration exceeded its safety cap without converging.
    ///
    /// Convergence is guaranteed by the monotonicity of the lattice operations, so hitting the
    /// cap means a GEN/KILL construction violated monotonicity. This is a framework bug, not a
    /// user error.
    #[error("Data-flow analysis '{analysis}' did not converge after {passes} passes")]
    Fixpoint {
        /// Name of the analysis that failed to converge
        analysis: &'static str,
        /// Number of full sweeps performed before giving up
        passes: usize,
    },

    /// The control-flow graph handed to the optimizer is structurally inconsistent.
    ///
    /// Examples: a successor edge without the matching predecessor edge, an edge referring to
    /// a block index out of range, or a block unreachable from the entry block where
    /// reachability is required.
    #[error("Malformed CFG - {0}")]
    MalformedCfg(String),

    /// A function with no basic blocks was provided.
    ///
    /// The optimizer requires at least an entry block to operate on.
    #[error("Function has no basic blocks")]
    Empty,

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories or for wrapping external failures
    /// with additional context.
    #[error("{0}")]
    Error(String),
}
