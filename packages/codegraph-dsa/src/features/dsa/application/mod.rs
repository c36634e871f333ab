//! Interprocedural passes
//!
//! - `propagation`: single-call-site steps and the propagation decision
//! - `bottom_up` / `top_down`: one-shot SCC-ordered passes
//! - `context_sensitive`: per-call-site fixpoint over both steps
//! - `consistency`: unique-scalar and allocation-site closures
//! - `global_analysis`: the five selectable analyses

pub mod bottom_up;
pub mod consistency;
pub mod context_sensitive;
pub mod global_analysis;
pub mod propagation;
pub mod top_down;

pub use bottom_up::{BottomUpAnalysis, BottomUpStats};
pub use consistency::{alloc_site_closure, unique_scalar_closure, ClosureStats};
pub use context_sensitive::{ContextSensitiveGlobalAnalysis, ContextSensitiveStats, FixpointStats};
pub use global_analysis::{AnalysisStats, GlobalAnalysis, ModuleGraphs};
pub use propagation::{
    bottom_up_step, mark_external, resolve_in_place, top_down_step, Propagation,
    PropagationContext,
};
pub use top_down::{TopDownAnalysis, TopDownStats};
