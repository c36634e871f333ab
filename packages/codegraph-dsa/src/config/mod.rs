//! Configuration system
//!
//! Two levels, as for the rest of the codegraph tooling:
//! - Level 1: Preset - one-liner (`DsaConfig::preset(Preset::Thorough)`)
//! - Level 2: YAML/builder overrides for individual knobs
//!
//! ```rust,ignore
//! use codegraph_dsa::config::{DsaConfig, Preset};
//!
//! let config = DsaConfig::preset(Preset::Balanced)
//!     .cloning(|c| c.no_escape = true);
//! let config = DsaConfig::from_yaml_file("dsa.yaml")?;
//! ```

pub mod dsa_config;
pub mod error;
pub mod preset;
pub mod validation;

pub use dsa_config::{AnalysisKind, CloningPolicy, DsaConfig, FixpointConfig, GraphConfig};
pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
pub use validation::Validatable;
