//! Persisted-profile logical shape.
//!
//! This is the interchange model only: ordered tool entries, each with an
//! ordered scope-override list and opaque settings. The textual container
//! format around it is the host's business.

use crate::error::Result;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub tools: Vec<ToolData>,
}

/// Per-tool override fragment. Opaque `settings` pass through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolData {
    pub id: String,
    pub enabled: bool,
    pub level: Severity,
    #[serde(default)]
    pub settings: Value,
    /// Ordered; list position is resolution priority.
    #[serde(default)]
    pub scopes: Vec<ScopeData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeData {
    pub scope_name: String,
    pub enabled: bool,
    pub level: Severity,
    #[serde(default)]
    pub settings: Value,
}

impl ProfileData {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a file. An I/O or parse failure is a hard error for this
    /// operation only; it carries no in-memory state.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn tool(&self, id: &str) -> Option<&ToolData> {
        self.tools.iter().find(|t| t.id == id)
    }
}
