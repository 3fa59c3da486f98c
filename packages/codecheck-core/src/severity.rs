//! Severity levels and the per-tool highlight key registry.

use crate::error::{CoreError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Severity level of a tool state or a produced problem.
///
/// Ordered from least to most severe so `max()` picks the stronger level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Information,
    WeakWarning,
    #[default]
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Information => "INFORMATION",
            Severity::WeakWarning => "WEAK_WARNING",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "INFORMATION" => Ok(Severity::Information),
            "WEAK_WARNING" => Ok(Severity::WeakWarning),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            _ => Err(CoreError::InvalidSeverity(s.to_string())),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable highlight key assigned to a tool short name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighlightKey(pub u32);

/// Process-wide registrar mapping tool short names to highlight keys.
///
/// Registration is idempotent: the first caller for a short name allocates
/// the key, every later caller observes the same key.
pub struct SeverityRegistrar {
    keys: DashMap<String, HighlightKey>,
    next: AtomicU32,
}

impl SeverityRegistrar {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            next: AtomicU32::new(0),
        }
    }

    /// Register (or look up) the highlight key for a tool short name.
    pub fn register(&self, short_name: &str) -> HighlightKey {
        if let Some(key) = self.keys.get(short_name) {
            return *key;
        }
        *self
            .keys
            .entry(short_name.to_string())
            .or_insert_with(|| HighlightKey(self.next.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn key_for(&self, short_name: &str) -> Option<HighlightKey> {
        self.keys.get(short_name).map(|k| *k)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for SeverityRegistrar {
    fn default() -> Self {
        Self::new()
    }
}
