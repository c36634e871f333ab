/*
 * Codegraph DSA - Context-Sensitive Heap-Shape Analysis
 *
 * Feature-First Hexagonal Architecture:
 * - config/      : Presets, YAML loading, validation
 * - errors       : Crate-wide error type
 * - features/dsa : domain → infrastructure → application, with ports
 *
 * Determinism:
 * - Call sites, SCC members and value maps are visited in stable order
 */

// Crate-level lint configuration
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::should_implement_trait)] // from_str naming intentional
#![allow(clippy::unnecessary_map_or)] // map_or style for compatibility
#![allow(clippy::derivable_impls)] // Manual impl for documentation
#![allow(clippy::module_inception)] // Module naming intentional

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration presets and overrides
pub mod config;

/// Error types
pub mod errors;

/// Feature slices
pub mod features;

pub use config::{AnalysisKind, DsaConfig, Preset};
pub use errors::{DsaError, Result};
pub use features::dsa::{GlobalAnalysis, Module, ModuleBuilder};
