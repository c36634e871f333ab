//! Heap-shape analysis infrastructure
//!
//! - `graph` / `unification`: node arena, root maps, merge algebra
//! - `cloner`: subgraph copying between graphs
//! - `simulation`: callee→caller mapping at call boundaries
//! - `call_graph`: SCCs and use/def index of call sites
//! - `worklist`: dependency-driven fixpoint driver
//! - `graph_store`: per-function graph ownership
//! - `local_builder`: `Operation` lowering

pub mod call_graph;
pub mod cloner;
pub mod graph;
pub mod graph_store;
pub mod local_builder;
pub mod simulation;
pub mod unification;
pub mod worklist;

pub use call_graph::{CallGraphWrapper, CallSiteResolution};
pub use cloner::{CloneOptions, Cloner};
pub use graph::{CallSiteCells, Graph, GraphSnapshot, MemoryRegion, NodeSnapshot, Root};
pub use graph_store::GraphStore;
pub use local_builder::OperationLowering;
pub use simulation::{compute_callee_caller_mapping, NodeImage, SimulationMapper};
pub use worklist::DependencyWorklist;
