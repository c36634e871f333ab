//! Preset configurations
//!
//! Presets provide complete default configurations for common use cases.

use super::dsa_config::AnalysisKind;
use serde::{Deserialize, Serialize};

/// Configuration preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// One graph for the whole module, calls resolved by unification
    ///
    /// - Kind: context-insensitive
    /// - No cloning, no fixpoint
    Fast,

    /// One bottom-up pass followed by one top-down pass
    ///
    /// - Kind: bottom-up + top-down
    /// - Stack allocation sites stripped across calls
    Balanced,

    /// Full context-sensitive fixpoint
    ///
    /// - Kind: context-sensitive
    /// - Unique-scalar and allocation-site closures enabled
    /// - Allocation call paths tracked
    Thorough,

    /// Custom: defaults, meant to be overridden via YAML
    Custom,
}

impl Preset {
    /// Analysis kind selected by this preset
    pub fn analysis_kind(&self) -> AnalysisKind {
        match self {
            Self::Fast => AnalysisKind::ContextInsensitive,
            Self::Balanced => AnalysisKind::BottomUpTopDown,
            Self::Thorough => AnalysisKind::ContextSensitive,
            Self::Custom => AnalysisKind::default(),
        }
    }

    /// Parse preset from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "thorough" => Ok(Self::Thorough),
            "custom" => Ok(Self::Custom),
            _ => Err(format!(
                "Unknown preset '{}'. Valid presets: fast, balanced, thorough, custom",
                s
            )),
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Thorough => "thorough",
            Self::Custom => "custom",
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self::Thorough
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
