//! Domain models for heap-shape analysis
//!
//! - Program model: `Module`, `Function`, `CallSite`, `Operation`
//! - Abstract memory: `Node`, `Cell`, `Field`, `NodeFlags`, `TypeSet`

pub mod cell;
pub mod flags;
pub mod module_builder;
pub mod node;
pub mod program;
pub mod type_set;

pub use cell::{Cell, Field, NodeId};
pub use flags::NodeFlags;
pub use module_builder::ModuleBuilder;
pub use node::{AllocSite, CallPath, CallStep, Direction, Node, UniqueScalar};
pub use program::{
    AllocKind, AllocSiteId, CallSite, CallSiteId, CallTarget, Formal, Function, FunctionId,
    Global, GlobalId, Module, Operation, ValueId,
};
pub use type_set::{TypeSet, TypeTag};
