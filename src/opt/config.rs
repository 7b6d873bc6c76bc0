//! Configuration for the optimization engine.
//!
//! Each optimization is gated by one bit of [`OptPasses`]; the driver
//! builds a mask from its command line and the engine consults it before
//! every pass. The remaining knobs control pipeline iteration and the
//! speed-versus-size trade in loop rotation.

use bitflags::bitflags;

bitflags! {
    /// The per-optimization enable mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OptPasses: u32 {
        /// Unreachable-code removal and constant-branch folding.
        const DEAD_CODE = 1 << 0;
        /// Dead-assignment elimination.
        const DEAD_ASSIGNMENTS = 1 << 1;
        /// Dead-variable marking.
        const DEAD_VARIABLES = 1 << 2;
        /// Very-busy-expression redundancy hoisting.
        const REDUNDANCY = 1 << 3;
        /// Loop-invariant code motion (includes loop shaping).
        const LOOP_INVARIANTS = 1 << 4;
        /// Induction-variable strength reduction and elimination.
        const INDUCTION_VARS = 1 << 5;
        /// Copy propagation.
        const COPY_PROP = 1 << 6;
        /// Constant propagation and folding.
        const CONST_PROP = 1 << 7;
    }
}

impl OptPasses {
    /// Every optimization enabled.
    #[must_use]
    pub const fn full() -> Self {
        Self::all()
    }
}

/// Configuration for the optimization engine.
#[derive(Debug, Clone)]
pub struct OptConfig {
    /// Which optimizations run.
    pub passes: OptPasses,

    /// Repeat the pass pipeline until no pass reports a change (bounded by
    /// `max_iterations`), or run each pass exactly once.
    pub run_to_convergence: bool,

    /// Ceiling on pipeline iterations when running to convergence
    /// (default: 20).
    pub max_iterations: usize,

    /// Rotate loops by duplicating the header test (speed) instead of
    /// relocating the header block (size).
    pub optimize_for_speed: bool,
}

impl Default for OptConfig {
    fn default() -> Self {
        Self {
            passes: OptPasses::full(),
            run_to_convergence: true,
            max_iterations: 20,
            optimize_for_speed: true,
        }
    }
}

impl OptConfig {
    /// A configuration with every optimization disabled; useful as a base
    /// for enabling passes selectively in tests.
    #[must_use]
    pub fn none() -> Self {
        Self {
            passes: OptPasses::empty(),
            ..Self::default()
        }
    }

    /// Enables the given passes on top of the current mask.
    #[must_use]
    pub fn with(mut self, passes: OptPasses) -> Self {
        self.passes |= passes;
        self
    }
}
