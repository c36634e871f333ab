//! Analysis configuration
//!
//! One `DsaConfig` drives every layer: graph construction (`GraphConfig`),
//! interprocedural cloning (`CloningPolicy`) and the context-sensitive
//! fixpoint (`FixpointConfig`). All sections are `#[serde(default)]`, so a
//! YAML file only needs the fields it overrides.

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use super::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Global analysis variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Every pointer targets one collapsed memory object
    Flat,

    /// One graph for the whole module, calls resolved by unification
    ContextInsensitive,

    /// Callee summaries cloned into callers, callees first
    BottomUp,

    /// Bottom-up pass followed by one caller-to-callee pass
    BottomUpTopDown,

    /// Bottom-up pass followed by the per-call-site propagation fixpoint
    ContextSensitive,
}

impl Default for AnalysisKind {
    fn default() -> Self {
        AnalysisKind::ContextSensitive
    }
}

impl AnalysisKind {
    /// Parse kind from string
    pub fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "flat" => Ok(Self::Flat),
            "context_insensitive" | "ci" => Ok(Self::ContextInsensitive),
            "bottom_up" | "bu" => Ok(Self::BottomUp),
            "bottom_up_top_down" | "butd" => Ok(Self::BottomUpTopDown),
            "context_sensitive" | "cs" => Ok(Self::ContextSensitive),
            _ => Err(ConfigError::UnknownKind(s.to_string())),
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::ContextInsensitive => "context_insensitive",
            Self::BottomUp => "bottom_up",
            Self::BottomUpTopDown => "bottom_up_top_down",
            Self::ContextSensitive => "context_sensitive",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Graph construction settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Key links by (offset, type) instead of offset alone
    pub type_aware_fields: bool,

    /// Width in bytes of a pointer-sized field
    pub pointer_size: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            type_aware_fields: false,
            pointer_size: 8,
        }
    }
}

impl Validatable for GraphConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.pointer_size == 0 || self.pointer_size > 16 {
            return Err(ConfigError::range_with_hint(
                "pointer_size",
                self.pointer_size,
                1,
                16,
                "Pointer width is measured in bytes",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "GraphConfig"
    }
}

/// Policy knobs for copying graphs across call boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloningPolicy {
    /// Drop callee stack allocation sites when cloning bottom-up
    pub strip_allocas: bool,

    /// Record the (direction, function) path of every cloned allocation site
    pub track_call_paths: bool,

    /// Drop caller stack allocation sites when cloning top-down
    pub no_escape: bool,

    /// Top-down: only bind globals the callee graph already names
    pub skip_unused_globals: bool,

    /// Top-down: delete caller-only structure left in the callee
    pub prune_foreign: bool,
}

impl Default for CloningPolicy {
    fn default() -> Self {
        Self {
            strip_allocas: true,
            track_call_paths: false,
            no_escape: false,
            skip_unused_globals: true,
            prune_foreign: true,
        }
    }
}

/// Context-sensitive fixpoint settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixpointConfig {
    /// Restrict the injectivity test to modified callee nodes
    pub only_modified_injectivity: bool,

    /// Worklist pops allowed per fixpoint (0 = unlimited)
    pub max_iterations: usize,

    /// Converge unique-scalar bookkeeping between callers and callees
    pub unique_scalar_closure: bool,

    /// Converge allocation-site sets between callers and callees
    pub alloc_site_closure: bool,

    /// Re-check every call site once the worklist drains
    pub check_postcondition: bool,
}

impl Default for FixpointConfig {
    fn default() -> Self {
        Self {
            only_modified_injectivity: true,
            max_iterations: 100_000,
            unique_scalar_closure: true,
            alloc_site_closure: true,
            check_postcondition: true,
        }
    }
}

impl Validatable for FixpointConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_iterations > 100_000_000 {
            return Err(ConfigError::range_with_hint(
                "max_iterations",
                self.max_iterations,
                0,
                100_000_000,
                "Use 0 for an unbounded fixpoint",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "FixpointConfig"
    }
}

/// Complete analysis configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DsaConfig {
    pub kind: AnalysisKind,
    pub graph: GraphConfig,
    pub cloning: CloningPolicy,
    pub fixpoint: FixpointConfig,
}

impl DsaConfig {
    /// Build the configuration for a preset
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self {
            kind: preset.analysis_kind(),
            ..Self::default()
        };
        if preset == Preset::Thorough {
            config.cloning.track_call_paths = true;
        }
        config
    }

    /// Builder: Set analysis kind
    pub fn kind(mut self, kind: AnalysisKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder: Adjust graph settings
    pub fn graph(mut self, f: impl FnOnce(&mut GraphConfig)) -> Self {
        f(&mut self.graph);
        self
    }

    /// Builder: Adjust cloning policy
    pub fn cloning(mut self, f: impl FnOnce(&mut CloningPolicy)) -> Self {
        f(&mut self.cloning);
        self
    }

    /// Builder: Adjust fixpoint settings
    pub fn fixpoint(mut self, f: impl FnOnce(&mut FixpointConfig)) -> Self {
        f(&mut self.fixpoint);
        self
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: DsaConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl Validatable for DsaConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.graph.validate()?;
        self.fixpoint.validate()?;
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "DsaConfig"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(DsaConfig::default().validate().is_ok());
        assert_eq!(DsaConfig::default().kind, AnalysisKind::ContextSensitive);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "kind: bottom_up\ncloning:\n  no_escape: true\n";
        let config = DsaConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.kind, AnalysisKind::BottomUp);
        assert!(config.cloning.no_escape);
        assert!(config.cloning.strip_allocas);
        assert_eq!(config.graph, GraphConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = DsaConfig::preset(Preset::Thorough).graph(|g| g.type_aware_fields = true);
        let yaml = config.to_yaml().unwrap();
        assert_eq!(DsaConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_pointer_size_rejected() {
        let err = DsaConfig::from_yaml_str("graph:\n  pointer_size: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Range { .. }));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "kind: flat").unwrap();
        writeln!(file, "fixpoint:").unwrap();
        writeln!(file, "  max_iterations: 0").unwrap();

        let config = DsaConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.kind, AnalysisKind::Flat);
        assert_eq!(config.fixpoint.max_iterations, 0);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(AnalysisKind::from_str("cs").unwrap(), AnalysisKind::ContextSensitive);
        assert_eq!(
            AnalysisKind::from_str("bottom-up-top-down").unwrap(),
            AnalysisKind::BottomUpTopDown
        );
        assert!(AnalysisKind::from_str("andersen").is_err());
    }
}
