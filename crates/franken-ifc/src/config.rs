//! TOML policy configuration for an IFC context.
//!
//! ```toml
//! trace_id = "page-load-17"
//! enforce_nsu = true
//! policy_origins = ["https://policy.example/manifest.js"]
//! origins = ["bank.example", "ads.example"]
//!
//! [[declassification]]
//! name = "session_cookie"
//! bits = 1
//! assigned_at_label = 4
//! declassified_to_label = 0
//! ```
//!
//! `origins` are registered in order, so they receive the first label bits.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::label::EnforcementMode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read IFC config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid IFC config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("IFC config lists {count} origins but only {capacity} slots are free")]
    TooManyOrigins { count: usize, capacity: usize },
    #[error("declassification seed #{index} has an empty name")]
    EmptyCapabilityName { index: usize },
}

/// Seed record for the declassification bit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclassificationSeed {
    pub name: String,
    #[serde(default)]
    pub bits: u64,
    #[serde(default)]
    pub assigned_at_label: u64,
    #[serde(default)]
    pub declassified_to_label: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IfcConfig {
    pub trace_id: String,
    /// Branch-mode flag: check upgrades against the pc label.
    pub enforce_nsu: bool,
    pub policy_origins: Vec<String>,
    pub origins: Vec<String>,
    pub declassification: Vec<DeclassificationSeed>,
}

impl Default for IfcConfig {
    fn default() -> Self {
        Self {
            trace_id: "ifc".to_string(),
            enforce_nsu: true,
            policy_origins: Vec::new(),
            origins: Vec::new(),
            declassification: Vec::new(),
        }
    }
}

impl IfcConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from disk. A missing file yields the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn enforcement_mode(&self) -> EnforcementMode {
        EnforcementMode::from_flag(self.enforce_nsu)
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_policy_origin(mut self, origin: impl Into<String>) -> Self {
        self.policy_origins.push(origin.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }

    pub fn with_enforcement(mut self, mode: EnforcementMode) -> Self {
        self.enforce_nsu = mode.is_enforcing();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = crate::origin_registry::REGISTRY_CAPACITY
            - crate::origin_registry::FIRST_ORIGIN_SLOT;
        if self.origins.len() > capacity {
            return Err(ConfigError::TooManyOrigins {
                count: self.origins.len(),
                capacity,
            });
        }
        if let Some(index) = self
            .declassification
            .iter()
            .position(|seed| seed.name.is_empty())
        {
            return Err(ConfigError::EmptyCapabilityName { index });
        }
        Ok(())
    }
}
