//! Common test utilities for codegraph-dsa
//!
//! Scenario modules built with `ModuleBuilder` and assertions over the
//! resulting graphs.

#![allow(dead_code)]

mod assertions;
mod builders;

pub use assertions::*;
pub use builders::*;
