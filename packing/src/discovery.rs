//! File walker — .gitignore-respecting discovery using the `ignore` crate.
//!
//! Produces the `FileRecord` list the grouping engine consumes. Build output,
//! VCS metadata and dependency caches are pruned by directory name; files with
//! an unrecognised extension are counted but not returned.

use crate::error::{PackError, PackResult};
use crate::model::{FileCategory, FileRecord};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory names never descended into.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "out",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".venv",
    "venv",
    "env",
    ".idea",
    ".vscode",
    ".vs",
    ".gradle",
    "bin",
    "obj",
    ".next",
    ".nuxt",
    "coverage",
    ".nyc_output",
    "target",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "py", "pyx", "java", "kt", "go", "rs", "cpp", "c", "h", "hpp",
    "rb", "php", "swift", "dart",
];
const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml", "properties", "env", "config",
];
const STYLE_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less", "styl"];
const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "xhtml", "md", "markdown", "txt"];

/// Well-known project documents, matched case-insensitively on the file name.
const DOCUMENT_NAMES: &[&str] = &["readme.md", "readme.txt", "license", "changelog"];

/// Map a file name to its category, or `None` when the extension is not
/// packable. Files without an extension are kept as `Other`.
pub fn categorize(path: &Path) -> Option<FileCategory> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if DOCUMENT_NAMES.contains(&name.as_str()) {
        return Some(FileCategory::Document);
    }

    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Some(FileCategory::Other);
    };
    let ext = ext.to_ascii_lowercase();
    let ext = ext.as_str();
    if SOURCE_EXTENSIONS.contains(&ext) {
        Some(FileCategory::Source)
    } else if CONFIG_EXTENSIONS.contains(&ext) {
        Some(FileCategory::Config)
    } else if STYLE_EXTENSIONS.contains(&ext) {
        Some(FileCategory::Style)
    } else if MARKUP_EXTENSIONS.contains(&ext) {
        Some(FileCategory::Markup)
    } else {
        None
    }
}

/// Result of one discovery walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Packable files, sorted by relative path.
    pub files: Vec<FileRecord>,
    /// Every regular file seen, packable or not.
    pub total_scanned: usize,
    /// Files skipped because they were empty.
    pub empty_skipped: usize,
    /// Unsupported extension (with leading dot) → occurrences.
    pub unsupported: BTreeMap<String, usize>,
}

impl DiscoveryReport {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    /// Unsupported extensions, most frequent first.
    pub fn unsupported_by_frequency(&self) -> Vec<(&str, usize)> {
        let mut list: Vec<(&str, usize)> = self
            .unsupported
            .iter()
            .map(|(ext, n)| (ext.as_str(), *n))
            .collect();
        list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        list
    }
}

/// Walks a source tree for packable files, respecting .gitignore rules.
pub struct FileWalker {
    root: PathBuf,
    excluded_dirs: HashSet<String>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add directory names to prune on top of the defaults.
    pub fn with_exclusions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_dirs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn discover(&self) -> PackResult<DiscoveryReport> {
        if !self.root.is_dir() {
            return Err(PackError::SourceNotFound {
                path: self.root.clone(),
            });
        }

        let excluded = self.excluded_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                let name = entry.file_name().to_string_lossy();
                !(is_dir && entry.depth() > 0 && excluded.contains(name.as_ref()))
            })
            .build();

        let mut report = DiscoveryReport::default();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            report.total_scanned += 1;

            let path = entry.path();
            let Some(category) = categorize(path) else {
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    *report
                        .unsupported
                        .entry(format!(".{}", ext.to_ascii_lowercase()))
                        .or_insert(0) += 1;
                }
                continue;
            };

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat file");
                    continue;
                }
            };
            if size == 0 {
                report.empty_skipped += 1;
                continue;
            }

            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            report
                .files
                .push(FileRecord::new(path, relative, size, category));
        }

        report
            .files
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        debug!(
            root = %self.root.display(),
            files = report.files.len(),
            scanned = report.total_scanned,
            unsupported = report.unsupported.len(),
            "Discovery finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_categorize() {
        assert_eq!(categorize(Path::new("src/main.rs")), Some(FileCategory::Source));
        assert_eq!(categorize(Path::new("Cargo.TOML")), Some(FileCategory::Config));
        assert_eq!(categorize(Path::new("a.scss")), Some(FileCategory::Style));
        assert_eq!(categorize(Path::new("docs/guide.md")), Some(FileCategory::Markup));
        assert_eq!(categorize(Path::new("README.md")), Some(FileCategory::Document));
        assert_eq!(categorize(Path::new("Makefile")), Some(FileCategory::Other));
        assert_eq!(categorize(Path::new("logo.png")), None);
    }

    #[test]
    fn test_discover_finds_packable_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src").join("api");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# hi").unwrap();
        fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("empty.rs"), "").unwrap();

        let report = FileWalker::new(dir.path()).discover().unwrap();
        let rels: Vec<&str> = report.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["README.md", "src/api/main.rs"]);
        assert_eq!(report.total_scanned, 4);
        assert_eq!(report.empty_skipped, 1);
        assert_eq!(report.unsupported.get(".png"), Some(&1));
    }

    #[test]
    fn test_discover_prunes_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["node_modules/pkg", "target/debug", "vendor"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join("x.js"), "x").unwrap();
        }

        let report = FileWalker::new(dir.path())
            .with_exclusions(["vendor"])
            .discover()
            .unwrap();
        assert!(report.files.is_empty());
        assert_eq!(report.total_scanned, 0);
    }

    #[test]
    fn test_discover_respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated/\n").unwrap();
        fs::create_dir_all(dir.path().join("generated")).unwrap();
        fs::write(dir.path().join("generated").join("g.rs"), "x").unwrap();
        fs::write(dir.path().join("lib.rs"), "x").unwrap();

        let report = FileWalker::new(dir.path()).discover().unwrap();
        let rels: Vec<&str> = report.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert!(rels.contains(&"lib.rs"));
        assert!(!rels.iter().any(|r| r.starts_with("generated")));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileWalker::new(dir.path().join("nope")).discover().unwrap_err();
        assert!(matches!(err, PackError::SourceNotFound { .. }));
    }

    #[test]
    fn test_unsupported_by_frequency() {
        let mut report = DiscoveryReport::default();
        report.unsupported.insert(".png".into(), 2);
        report.unsupported.insert(".bin".into(), 5);
        report.unsupported.insert(".jpg".into(), 2);
        assert_eq!(
            report.unsupported_by_frequency(),
            vec![(".bin", 5), (".jpg", 2), (".png", 2)]
        );
    }
}
