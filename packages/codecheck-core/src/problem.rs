//! Problem descriptors, quick fixes, and the keys they are aggregated under.
//!
//! Descriptor identity is structural (file + range + message), never pointer
//! equality: two runs over the same unmodified file must produce descriptors
//! that compare equal for diffing to work.

use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Half-open byte range `[start, end)` within a file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains_range(&self, other: &TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersects(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Source location: file plus byte range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub range: TextRange,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, range: TextRange) -> Self {
        Self {
            file: file.into(),
            range,
        }
    }
}

/// A concrete text replacement proposed by a fix.
///
/// `original` pins the text the edit was computed against; if the file no
/// longer carries that text at `range`, the edit is invalidated and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub file: PathBuf,
    pub range: TextRange,
    pub original: String,
    pub replacement: String,
}

/// A suggested fix attached to a problem descriptor.
///
/// `family_id` groups fixes of the same kind across descriptors, which is
/// what "apply to all occurrences" batches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickFix {
    pub family_id: String,
    pub name: String,
    pub edit: TextEdit,
}

impl QuickFix {
    pub fn new(family_id: impl Into<String>, name: impl Into<String>, edit: TextEdit) -> Self {
        Self {
            family_id: family_id.into(),
            name: name.into(),
            edit,
        }
    }
}

/// One analysis finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDescriptor {
    pub location: Location,
    pub message: String,
    pub severity: Severity,
    pub fixes: Vec<QuickFix>,
}

impl ProblemDescriptor {
    pub fn new(location: Location, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            location,
            message: message.into(),
            severity,
            fixes: Vec::new(),
        }
    }

    pub fn with_fix(mut self, fix: QuickFix) -> Self {
        self.fixes.push(fix);
        self
    }

    /// Structural identity used for diffing and reverse indexing.
    pub fn key(&self) -> ProblemKey {
        ProblemKey {
            file: self.location.file.clone(),
            range: self.location.range,
            message: self.message.clone(),
        }
    }

    /// Total order over descriptors: file path, range start, range end, message.
    pub fn order_key(&self) -> (&Path, usize, usize, &str) {
        (
            self.location.file.as_path(),
            self.location.range.start,
            self.location.range.end,
            self.message.as_str(),
        )
    }
}

/// Structural descriptor identity: containing file + range + message template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProblemKey {
    pub file: PathBuf,
    pub range: TextRange,
    pub message: String,
}

/// Aggregation key in result presentations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    File(PathBuf),
    Declaration(String),
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKey::File(path) => write!(f, "{}", path.display()),
            EntityKey::Declaration(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(file: &str, start: usize, end: usize, message: &str) -> ProblemDescriptor {
        ProblemDescriptor::new(
            Location::new(file, TextRange::new(start, end)),
            message,
            Severity::Warning,
        )
    }

    #[test]
    fn test_range_intersects() {
        let a = TextRange::new(0, 10);
        let b = TextRange::new(5, 15);
        let c = TextRange::new(10, 20);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains_range(&TextRange::new(2, 8)));
    }

    #[test]
    fn test_descriptor_identity_is_structural() {
        let a = descriptor("src/a.rs", 3, 9, "unused variable");
        let b = descriptor("src/a.rs", 3, 9, "unused variable");
        let c = descriptor("src/a.rs", 3, 9, "shadowed variable");

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_order_key_total_order() {
        let mut problems = vec![
            descriptor("src/b.rs", 0, 4, "m"),
            descriptor("src/a.rs", 9, 12, "m"),
            descriptor("src/a.rs", 2, 5, "m"),
        ];
        problems.sort_by(|x, y| x.order_key().cmp(&y.order_key()));

        assert_eq!(problems[0].location.file, PathBuf::from("src/a.rs"));
        assert_eq!(problems[0].location.range.start, 2);
        assert_eq!(problems[1].location.range.start, 9);
        assert_eq!(problems[2].location.file, PathBuf::from("src/b.rs"));
    }
}
