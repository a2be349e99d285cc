//! Core data model — file records, directory nodes, groups, write outcomes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Coarse file category assigned by discovery. Opaque to grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Source,
    Config,
    Style,
    Markup,
    Document,
    Other,
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Config => write!(f, "config"),
            Self::Style => write!(f, "style"),
            Self::Markup => write!(f, "markup"),
            Self::Document => write!(f, "document"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A discovered file. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the tree root, forward-slash separated.
    pub relative_path: String,
    /// Size on disk in bytes.
    pub size_bytes: u64,
    pub category: FileCategory,
}

impl FileRecord {
    pub fn new(
        path: impl Into<PathBuf>,
        relative_path: impl AsRef<str>,
        size_bytes: u64,
        category: FileCategory,
    ) -> Self {
        Self {
            path: path.into(),
            relative_path: normalize_relative(relative_path.as_ref()),
            size_bytes,
            category,
        }
    }

    /// Directory part of `relative_path` (`""` for files at the root).
    pub fn parent_dir(&self) -> &str {
        match self.relative_path.rfind('/') {
            Some(idx) => &self.relative_path[..idx],
            None => "",
        }
    }
}

/// Normalize a relative path: forward slashes, no `.` segments, no empty
/// segments, no leading or trailing separator.
pub fn normalize_relative(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Number of segments in a normalized directory path (root = 0).
pub fn path_depth(dir: &str) -> usize {
    if dir.is_empty() {
        0
    } else {
        dir.split('/').count()
    }
}

/// First segment of a normalized directory path (`""` for root).
pub fn top_level_segment(dir: &str) -> &str {
    dir.split('/').next().unwrap_or("")
}

/// Immediate parent of a normalized directory path, `None` for root and
/// top-level directories.
pub fn parent_path(dir: &str) -> Option<&str> {
    dir.rfind('/').map(|idx| &dir[..idx])
}

/// A directory that directly contains at least one eligible file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// Normalized relative path; empty for the root.
    pub path: String,
    pub depth: usize,
    /// Member files sorted by relative path.
    pub files: Vec<FileRecord>,
    /// Set once by the scorer.
    pub priority_score: u64,
}

impl DirectoryNode {
    pub fn new(path: impl Into<String>, files: Vec<FileRecord>) -> Self {
        let path = path.into();
        Self {
            depth: path_depth(&path),
            path,
            files,
            priority_score: 0,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    pub fn top_level(&self) -> &str {
        top_level_segment(&self.path)
    }
}

/// How a group came to exist. Drives naming and final ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// One directory, possibly with rolled-up descendants.
    Directory,
    /// A whole key-folder subtree collapsed into one group.
    KeyFolder,
    /// Files that sit directly in the tree root.
    Root,
    /// Terminal bucket absorbing low-priority content.
    Misc,
}

/// A set of files destined for one output container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Sanitized, unique within a run. Assigned at finalize.
    pub name: String,
    pub kind: GroupKind,
    /// Member files sorted by relative path.
    pub member_files: Vec<FileRecord>,
    /// Directory paths whose files ended up here.
    pub source_paths: Vec<String>,
    /// Max of the constituent directory scores.
    pub priority_score: u64,
}

impl Group {
    pub(crate) fn from_directory(node: DirectoryNode) -> Self {
        Self {
            name: String::new(),
            kind: GroupKind::Directory,
            source_paths: vec![node.path],
            priority_score: node.priority_score,
            member_files: node.files,
        }
    }

    pub(crate) fn empty(kind: GroupKind, label: impl Into<String>, priority_score: u64) -> Self {
        Self {
            name: String::new(),
            kind,
            member_files: Vec::new(),
            source_paths: vec![label.into()],
            priority_score,
        }
    }

    /// Path this group is anchored at, used for naming and tie-breaks.
    pub fn anchor_path(&self) -> &str {
        self.source_paths.first().map(String::as_str).unwrap_or("")
    }

    /// Move all of `other`'s files and provenance into `self`.
    ///
    /// Groups being merged cover disjoint directories, so provenance is
    /// appended as is; only a repeat of this group's own anchor is dropped.
    pub(crate) fn absorb(&mut self, other: Group) {
        let Group {
            mut member_files,
            source_paths,
            priority_score,
            ..
        } = other;
        if member_files.len() > self.member_files.len() {
            std::mem::swap(&mut self.member_files, &mut member_files);
        }
        self.member_files.append(&mut member_files);

        let anchor = self.anchor_path().to_string();
        let has_anchor = !self.source_paths.is_empty();
        self.source_paths.extend(
            source_paths
                .into_iter()
                .filter(|p| !(has_anchor && *p == anchor)),
        );
        self.priority_score = self.priority_score.max(priority_score);
    }

    pub(crate) fn sort_members(&mut self) {
        self.member_files
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    }

    pub fn total_bytes(&self) -> u64 {
        self.member_files.iter().map(|f| f.size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.member_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_files.is_empty()
    }
}

/// Per-group tallies produced by the budgeted writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub files_included: usize,
    pub files_skipped_over_budget: usize,
    /// Files the renderer could not estimate or write.
    pub files_failed: usize,
    /// Files never attempted because cancellation was requested.
    pub files_cancelled: usize,
    pub bytes_written: u64,
    pub length_written: u64,
}

impl WriteOutcome {
    /// Every member that did not make it into the container.
    pub fn files_not_included(&self) -> usize {
        self.files_skipped_over_budget + self.files_failed + self.files_cancelled
    }
}
