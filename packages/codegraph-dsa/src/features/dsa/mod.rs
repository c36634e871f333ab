//! # Heap-shape analysis
//!
//! Unification-based, field-sensitive points-to analysis with per-call-site
//! context sensitivity. Each function gets a graph of abstract memory
//! objects (`Node`) addressed by `Cell`s; objects merge through union-find
//! and lose field sensitivity by collapsing.
//!
//! ## Pipeline
//! ```text
//! Module ─► LocalGraphBuilder ─► BottomUp ─► (TopDown | fixpoint) ─► Graph per function
//! ```
//!
//! ## Usage
//! ```text
//! use codegraph_dsa::features::dsa::GlobalAnalysis;
//! use codegraph_dsa::config::{DsaConfig, Preset};
//!
//! let mut analysis = GlobalAnalysis::new(DsaConfig::preset(Preset::Thorough));
//! let stats = analysis.run_on_module(&module)?;
//! let graph = analysis.graph(main).unwrap();
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

// Re-exports for public API
pub use application::{
    AnalysisStats, BottomUpAnalysis, ContextSensitiveGlobalAnalysis, GlobalAnalysis, Propagation,
    TopDownAnalysis,
};
pub use domain::{
    AllocKind, AllocSite, CallSite, CallSiteId, Cell, Function, FunctionId, Module, ModuleBuilder,
    Node, NodeFlags, NodeId, ValueId,
};
pub use infrastructure::{CallGraphWrapper, Cloner, Graph, GraphSnapshot, SimulationMapper};
pub use ports::{LocalGraphBuilder, ShapeQuery};
