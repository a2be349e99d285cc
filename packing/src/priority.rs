//! Directory priority scoring.
//!
//! `score = key_bonus·[top-level is key folder] + depth·w_d + files·w_f
//!          + floor(log2(max(bytes, 1)))·w_s`
//!
//! Deeper, denser, key-folder directories survive roll-up longer. Equal
//! scores are broken by path, smaller path first.

use crate::config::{PackConfig, PriorityWeights};
use crate::model::DirectoryNode;
use std::cmp::Ordering;

pub struct PriorityScorer<'a> {
    weights: &'a PriorityWeights,
    key_folders: &'a [String],
}

impl<'a> PriorityScorer<'a> {
    pub fn new(config: &'a PackConfig) -> Self {
        Self {
            weights: &config.weights,
            key_folders: &config.key_folder_names,
        }
    }

    pub fn score(&self, node: &DirectoryNode) -> u64 {
        let top = node.top_level();
        let key_bonus = if !top.is_empty() && self.key_folders.iter().any(|k| k == top) {
            self.weights.key_folder_bonus
        } else {
            0
        };

        let w = self.weights;
        // Weights come from user config; clamp instead of wrapping.
        key_bonus
            .saturating_add((node.depth as u64).saturating_mul(w.depth))
            .saturating_add((node.file_count() as u64).saturating_mul(w.file_count))
            .saturating_add(floor_log2(node.total_bytes()).saturating_mul(w.size_log2))
    }

    /// Score every node in place.
    pub fn annotate<'n>(&self, nodes: impl IntoIterator<Item = &'n mut DirectoryNode>) {
        for node in nodes {
            node.priority_score = self.score(node);
        }
    }
}

/// floor(log2(max(n, 1)))
pub fn floor_log2(n: u64) -> u64 {
    u64::from(n.max(1).ilog2())
}

/// Higher score first, then lexicographically smaller path first.
pub fn by_priority_desc(a: (u64, &str), b: (u64, &str)) -> Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1))
}
