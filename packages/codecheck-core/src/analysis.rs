//! Collaborator traits the engine consumes: the analysis scope (which files
//! to run over) and the file oracle (per-file facts the host knows).
//!
//! Filesystem-backed implementations are provided so the engine is usable
//! without a host IDE; anything richer is supplied by the embedder.

use crate::problem::{Location, TextRange};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// An enumerable set of candidate files for one run. Not owned by the core.
pub trait AnalysisScope: Send + Sync {
    /// Membership test.
    fn contains(&self, file: &Path) -> bool;

    /// Lazy enumeration; callers stop iterating to cancel.
    fn enumerate(&self) -> Box<dyn Iterator<Item = PathBuf> + Send + '_>;

    fn to_filter(&self) -> Box<dyn Fn(&Path) -> bool + Send + Sync + '_> {
        Box::new(move |file| self.contains(file))
    }

    /// True when the scope covers the whole project; global tools with
    /// possible external usages skip their second pass in that case.
    fn is_whole_project(&self) -> bool {
        false
    }

    /// A single contiguous in-file selection, when the scope is one.
    /// Cleanup clips its results to this range.
    fn single_selection(&self) -> Option<(PathBuf, TextRange)> {
        None
    }

    fn display_name(&self) -> String {
        "analysis scope".to_string()
    }
}

/// Scope over an explicit file list. Used for sub-scopes and tests.
pub struct FileListScope {
    files: Vec<PathBuf>,
    selection: Option<(PathBuf, TextRange)>,
}

impl FileListScope {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            selection: None,
        }
    }

    /// Restrict the scope to one in-file selection.
    pub fn with_selection(file: PathBuf, range: TextRange) -> Self {
        Self {
            files: vec![file.clone()],
            selection: Some((file, range)),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AnalysisScope for FileListScope {
    fn contains(&self, file: &Path) -> bool {
        self.files.iter().any(|f| f == file)
    }

    fn enumerate(&self) -> Box<dyn Iterator<Item = PathBuf> + Send + '_> {
        Box::new(self.files.iter().cloned())
    }

    fn single_selection(&self) -> Option<(PathBuf, TextRange)> {
        self.selection.clone()
    }

    fn display_name(&self) -> String {
        format!("{} file(s)", self.files.len())
    }
}

/// Scope over a directory tree, with an optional extension filter.
pub struct FsAnalysisScope {
    root: PathBuf,
    extensions: Option<Vec<String>>,
    whole_project: bool,
}

impl FsAnalysisScope {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: None,
            whole_project: true,
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = Some(extensions.iter().map(|e| e.to_string()).collect());
        self
    }

    /// Mark this scope as covering only part of the project.
    pub fn partial(mut self) -> Self {
        self.whole_project = false;
        self
    }

    fn extension_matches(&self, file: &Path) -> bool {
        match &self.extensions {
            None => true,
            Some(allowed) => file
                .extension()
                .map(|ext| allowed.iter().any(|a| ext == a.as_str()))
                .unwrap_or(false),
        }
    }

    fn visit_dirs(&self, dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
        if dir.is_dir() {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();

                if path.is_dir() {
                    // Skip hidden directories
                    if let Some(name) = path.file_name() {
                        if name.to_string_lossy().starts_with('.') {
                            continue;
                        }
                    }
                    self.visit_dirs(&path, files)?;
                } else if self.extension_matches(&path) {
                    files.push(path);
                }
            }
        }
        Ok(())
    }
}

impl AnalysisScope for FsAnalysisScope {
    fn contains(&self, file: &Path) -> bool {
        file.starts_with(&self.root) && self.extension_matches(file)
    }

    fn enumerate(&self) -> Box<dyn Iterator<Item = PathBuf> + Send + '_> {
        let mut files = Vec::new();
        if let Err(e) = self.visit_dirs(&self.root, &mut files) {
            tracing::warn!("scope enumeration failed under {}: {}", self.root.display(), e);
        }
        files.sort();
        Box::new(files.into_iter())
    }

    fn is_whole_project(&self) -> bool {
        self.whole_project
    }

    fn display_name(&self) -> String {
        self.root.display().to_string()
    }
}

/// Per-file facts supplied by the host: what to skip, what is suppressed,
/// what may be written.
pub trait FileOracle: Send + Sync {
    fn is_binary(&self, file: &Path) -> bool;

    fn is_too_large(&self, file: &Path) -> bool;

    /// Whether a problem at `location` is suppressed for `tool_id`.
    fn is_suppressed_at(&self, location: &Location, tool_id: &str) -> bool;

    /// Project-index membership; files outside the index are not analyzed.
    fn is_in_index(&self, _file: &Path) -> bool {
        true
    }

    fn is_writable(&self, file: &Path) -> bool;

    /// Try to make the file writable; returns whether it now is.
    fn make_writable(&self, file: &Path) -> bool {
        self.is_writable(file)
    }
}

/// Default per-file analysis size cap.
pub const DEFAULT_MAX_FILE_LEN: u64 = 4 * 1024 * 1024;

const BINARY_SNIFF_LEN: usize = 512;

/// Filesystem-backed oracle: size cap plus NUL-byte binary sniffing.
/// Knows nothing about suppressions.
pub struct FsFileOracle {
    pub max_file_len: u64,
}

impl FsFileOracle {
    pub fn new() -> Self {
        Self {
            max_file_len: DEFAULT_MAX_FILE_LEN,
        }
    }

    pub fn with_max_file_len(max_file_len: u64) -> Self {
        Self { max_file_len }
    }
}

impl Default for FsFileOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl FileOracle for FsFileOracle {
    fn is_binary(&self, file: &Path) -> bool {
        let Ok(mut f) = fs::File::open(file) else {
            return false;
        };
        let mut buf = [0u8; BINARY_SNIFF_LEN];
        match f.read(&mut buf) {
            Ok(n) => buf[..n].contains(&0),
            Err(_) => false,
        }
    }

    fn is_too_large(&self, file: &Path) -> bool {
        fs::metadata(file)
            .map(|m| m.len() > self.max_file_len)
            .unwrap_or(false)
    }

    fn is_suppressed_at(&self, _location: &Location, _tool_id: &str) -> bool {
        false
    }

    fn is_writable(&self, file: &Path) -> bool {
        fs::metadata(file)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
    }

    fn make_writable(&self, file: &Path) -> bool {
        let Ok(metadata) = fs::metadata(file) else {
            return false;
        };
        let mut permissions = metadata.permissions();
        if !permissions.readonly() {
            return true;
        }
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(file, permissions).is_ok()
    }
}
