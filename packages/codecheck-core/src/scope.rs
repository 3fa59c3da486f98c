//! Named scopes: file predicates that tool-state overrides attach to.
//!
//! A scope either matches glob-style path patterns or wraps an arbitrary
//! predicate. The implicit "everything" scope is not a `NamedScope`; it is
//! represented by `None` on the default tool state, ordered last.

use crate::error::{CoreError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

enum Matcher {
    /// A file matches if any pattern matches its normalized path.
    Patterns(Vec<Regex>),
    Predicate(Box<dyn Fn(&Path) -> bool + Send + Sync>),
}

pub struct NamedScope {
    name: String,
    matcher: Matcher,
}

impl NamedScope {
    /// Build a scope from glob-style patterns (`*` within a segment, `**`
    /// across segments, `?` for one character).
    pub fn with_patterns(name: impl Into<String>, patterns: &[&str]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            compiled.push(compile_glob(pattern)?);
        }
        Ok(Self {
            name: name.into(),
            matcher: Matcher::Patterns(compiled),
        })
    }

    pub fn with_predicate(
        name: impl Into<String>,
        predicate: impl Fn(&Path) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            matcher: Matcher::Predicate(Box::new(predicate)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Membership test for a file.
    pub fn contains(&self, file: &Path) -> bool {
        match &self.matcher {
            Matcher::Patterns(patterns) => {
                let normalized = file.to_string_lossy().replace('\\', "/");
                patterns.iter().any(|p| p.is_match(&normalized))
            }
            Matcher::Predicate(predicate) => predicate(file),
        }
    }
}

impl std::fmt::Debug for NamedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedScope").field("name", &self.name).finish()
    }
}

/// Translate a glob pattern into an anchored regex.
fn compile_glob(pattern: &str) -> Result<Regex> {
    let mut regex = String::with_capacity(pattern.len() * 2);
    regex.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    // `**` spans path separators; swallow a trailing `/` so
                    // `**/foo` also matches a bare `foo`.
                    if i + 2 < chars.len() && chars[i + 2] == '/' {
                        regex.push_str("(?:.*/)?");
                        i += 3;
                    } else {
                        regex.push_str(".*");
                        i += 2;
                    }
                    continue;
                }
                regex.push_str("[^/]*");
            }
            '?' => regex.push_str("[^/]"),
            c if "\\.+()[]{}^$|".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
        i += 1;
    }
    regex.push('$');

    Regex::new(&regex).map_err(|e| CoreError::InvalidScopePattern(format!("{pattern}: {e}")))
}

/// Lookup table for scopes referenced by name from persisted profile data.
#[derive(Debug, Default)]
pub struct ScopeSet {
    scopes: HashMap<String, Arc<NamedScope>>,
}

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scope: NamedScope) -> Arc<NamedScope> {
        let scope = Arc::new(scope);
        self.scopes.insert(scope.name().to_string(), scope.clone());
        scope
    }

    pub fn get(&self, name: &str) -> Option<Arc<NamedScope>> {
        self.scopes.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<NamedScope>> {
        self.get(name)
            .ok_or_else(|| CoreError::UnknownScope(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_pattern_scope_matches() {
        let scope = NamedScope::with_patterns("Tests", &["**/tests/**", "**/*_test.rs"]).unwrap();

        assert!(scope.contains(&PathBuf::from("crate/tests/it.rs")));
        assert!(scope.contains(&PathBuf::from("src/queue_test.rs")));
        assert!(!scope.contains(&PathBuf::from("src/queue.rs")));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let scope = NamedScope::with_patterns("Sources", &["src/*.rs"]).unwrap();

        assert!(scope.contains(&PathBuf::from("src/lib.rs")));
        assert!(!scope.contains(&PathBuf::from("src/nested/lib.rs")));
    }

    #[test]
    fn test_predicate_scope() {
        let scope = NamedScope::with_predicate("Generated", |p| {
            p.to_string_lossy().contains(".generated.")
        });

        assert!(scope.contains(&PathBuf::from("out/api.generated.rs")));
        assert!(!scope.contains(&PathBuf::from("out/api.rs")));
    }

    #[test]
    fn test_scope_set_resolve() {
        let mut set = ScopeSet::new();
        set.add(NamedScope::with_patterns("Tests", &["tests/**"]).unwrap());

        assert!(set.resolve("Tests").is_ok());
        assert!(matches!(
            set.resolve("Missing"),
            Err(CoreError::UnknownScope(_))
        ));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let scope = NamedScope::with_patterns("Numbered", &["src/mod?.rs"]).unwrap();

        assert!(scope.contains(&PathBuf::from("src/mod1.rs")));
        assert!(!scope.contains(&PathBuf::from("src/mod10.rs")));
        assert!(!scope.contains(&PathBuf::from("src/mod/a.rs")));
    }
}
