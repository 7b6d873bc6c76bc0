//! The pass orchestrator.
//!
//! The engine owns the fixed pass pipeline and repeats it until no pass
//! reports a change or the iteration ceiling hits, consulting the enable
//! mask before every pass. When optimization settles it computes the final
//! loop structure once more to stamp the per-block execution weights the
//! register allocator prioritizes by.
//!
//! Functions share no mutable state, so a module's functions are optimized
//! in parallel; the context is thread-safe and collects events from all of
//! them.

use rayon::prelude::*;

use crate::{
    cfg::{assign_weights, CfgInfo, RotationStrategy},
    ir::Function,
    opt::{
        config::OptConfig,
        constprop::ConstProp,
        context::{EventKind, OptContext},
        copyprop::CopyProp,
        dce::{DeadAssignments, DeadVariables},
        deadcode::DeadCode,
        induction::InductionVars,
        licm::Licm,
        pass::OptPass,
        redundancy::Redundancy,
    },
    Result,
};

/// What one function's optimization amounted to.
#[derive(Debug, Clone, Copy)]
pub struct OptSummary {
    /// Pipeline iterations performed.
    pub iterations: usize,
    /// Whether anything changed at all.
    pub changed: bool,
}

/// The optimization engine: a configured pass pipeline.
pub struct Optimizer {
    config: OptConfig,
    passes: Vec<Box<dyn OptPass>>,
}

impl Optimizer {
    /// Builds the pipeline for `config`.
    #[must_use]
    pub fn new(config: OptConfig) -> Self {
        let strategy = if config.optimize_for_speed {
            RotationStrategy::Speed
        } else {
            RotationStrategy::Size
        };
        let passes: Vec<Box<dyn OptPass>> = vec![
            Box::new(ConstProp),
            Box::new(CopyProp),
            Box::new(Redundancy),
            Box::new(Licm::new(strategy)),
            Box::new(InductionVars),
            Box::new(DeadAssignments),
            Box::new(DeadCode),
            Box::new(DeadVariables),
        ];
        Self { config, passes }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &OptConfig {
        &self.config
    }

    /// Optimizes one function in place.
    ///
    /// # Errors
    ///
    /// Returns an error when the input CFG is malformed or a pass trips an
    /// internal invariant; the function must then be considered unusable.
    pub fn optimize(&self, func: &mut Function, ctx: &OptContext) -> Result<OptSummary> {
        func.validate()?;

        let mut iterations = 0;
        let mut changed_ever = false;
        loop {
            iterations += 1;
            let mut changed = false;
            for pass in &self.passes {
                if !self.config.passes.contains(pass.enabled_by()) {
                    continue;
                }
                changed |= pass.run(func, ctx)?;
            }
            changed_ever |= changed;
            if !changed
                || !self.config.run_to_convergence
                || iterations >= self.config.max_iterations
            {
                break;
            }
        }

        // Final loop discovery stamps the execution-frequency weights the
        // code generator consumes.
        let cfg = CfgInfo::build(func)?;
        if cfg.doms.is_irreducible() {
            ctx.record(
                EventKind::IrreducibleCfg,
                "dominators",
                &func.name,
                "control flow is not reducible".to_string(),
            );
        }
        assign_weights(func, &cfg.loops);

        func.validate()?;
        Ok(OptSummary {
            iterations,
            changed: changed_ever,
        })
    }

    /// Optimizes every function of a module, in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error any function's optimization produced.
    pub fn optimize_module(&self, funcs: &mut [Function], ctx: &OptContext) -> Result<()> {
        funcs
            .par_iter_mut()
            .try_for_each(|func| self.optimize(func, ctx).map(|_| ()))
    }
}
