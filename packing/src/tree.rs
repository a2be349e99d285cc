//! Directory tree builder — flat file list to a directory → files map plus
//! the root-file bucket.
//!
//! The tree is an arena keyed by normalized directory path. Merges during
//! roll-up only go child → parent by path lookup, so no back-pointers are kept.

use crate::model::{DirectoryNode, FileRecord};
use std::collections::BTreeMap;

/// Immutable-after-build view of the input files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTree {
    /// Only directories that directly hold at least one file.
    nodes: BTreeMap<String, DirectoryNode>,
    /// Files whose immediate parent is the tree root.
    root_files: Vec<FileRecord>,
}

impl DirectoryTree {
    /// Build the tree. Output does not depend on input order.
    pub fn build(files: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut buckets: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();
        let mut root_files = Vec::new();

        for file in files {
            let dir = file.parent_dir().to_string();
            if dir.is_empty() {
                root_files.push(file);
            } else {
                buckets.entry(dir).or_default().push(file);
            }
        }

        sort_files(&mut root_files);
        let nodes = buckets
            .into_iter()
            .map(|(dir, mut files)| {
                sort_files(&mut files);
                let node = DirectoryNode::new(dir.clone(), files);
                (dir, node)
            })
            .collect();

        Self { nodes, root_files }
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut DirectoryNode> {
        self.nodes.values_mut()
    }

    pub fn get(&self, path: &str) -> Option<&DirectoryNode> {
        self.nodes.get(path)
    }

    pub fn root_files(&self) -> &[FileRecord] {
        &self.root_files
    }

    pub fn directory_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn file_count(&self) -> usize {
        self.root_files.len() + self.nodes.values().map(|n| n.files.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.root_files.is_empty()
    }

    /// Consume the tree into (directories sorted by path, root files).
    pub fn into_parts(self) -> (Vec<DirectoryNode>, Vec<FileRecord>) {
        (self.nodes.into_values().collect(), self.root_files)
    }
}

/// Stable ordering: relative path, then absolute path for exact duplicates.
fn sort_files(files: &mut [FileRecord]) {
    files.sort_by(|a, b| {
        a.relative_path
            .cmp(&b.relative_path)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.size_bytes.cmp(&b.size_bytes))
    });
}
