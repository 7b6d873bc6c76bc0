//! Global data-flow analyses over one function's CFG.
//!
//! # Architecture
//!
//! One generic fixed-point machine, instantiated four ways:
//!
//! - **Enumeration** ([`candidates`]): each analysis run first walks every
//!   block tree in evaluation order and numbers the entities its bit sets
//!   range over - definition sites or candidate expressions.
//! - **Classification** ([`kills`]): the candidates an imprecise write can
//!   invalidate are summarized once into `defkill` / `starkill` /
//!   `vptrkill`.
//! - **The problem** ([`framework`]): per-block GEN/KILL over the
//!   enumerated universe, a direction and a confluence operator.
//! - **The solver** ([`solver`]): repeated sweeps in depth-first order to a
//!   fixed point, with a fatal cap against non-monotone GEN/KILL.
//!
//! # Analyses
//!
//! | Analysis | Direction | Confluence | Universe |
//! |---|---|---|---|
//! | [`ReachingDefinitions`] | forward | union | def sites |
//! | [`AvailableExpressions`] | forward | intersection | value candidates |
//! | [`CopyFacts`] | forward | intersection | copy candidates |
//! | [`LiveVariables`] | backward | union | symbols |
//! | [`VeryBusyExpressions`] | backward | intersection | value candidates sans loads |
//!
//! Every problem instance owns the tables it enumerated and becomes stale
//! the moment any block's tree is mutated; rebuild before reuse. Bit sets
//! from different runs must never meet - the universe checks in
//! [`BitSet`](crate::utils::BitSet) turn that mistake into an immediate
//! panic instead of a silent mis-analysis.

pub mod available;
pub mod candidates;
pub mod framework;
pub mod kills;
pub mod liveness;
pub mod reaching;
pub mod solver;
pub mod verybusy;

pub use available::{AvailableExpressions, CopyFacts};
pub use candidates::{Candidate, CandidateKind, CandidateTable, DefSite, DefSiteTable};
pub use framework::{Confluence, Direction, FlowProblem, FlowResults, GenKill};
pub use kills::KillSets;
pub use liveness::LiveVariables;
pub use reaching::ReachingDefinitions;
pub use solver::solve;
pub use verybusy::VeryBusyExpressions;
