//! Budgeted writer — serializes one group's files against per-group byte and
//! length budgets.
//!
//! Files are considered in alphabetical order. A file that would push the
//! running totals over either budget is skipped and the group continues. The
//! first file that makes it into a container is always included, so no
//! container is ever empty.

use crate::config::PackConfig;
use crate::model::{FileRecord, Group, WriteOutcome};
use crate::render::{ContainerInfo, Contribution, Renderer};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Running byte/length tallies for one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBudget {
    pub bytes_used: u64,
    pub length_used: u64,
    pub max_bytes: u64,
    pub max_length: u64,
}

impl GroupBudget {
    pub const fn new(max_bytes: u64, max_length: u64) -> Self {
        Self {
            bytes_used: 0,
            length_used: 0,
            max_bytes,
            max_length,
        }
    }

    pub fn from_config(config: &PackConfig) -> Self {
        Self::new(config.max_bytes_per_group, config.max_length_per_group)
    }

    /// Check if adding content would exceed either budget.
    pub fn would_exceed(&self, add: Contribution) -> bool {
        self.bytes_used.saturating_add(add.bytes) > self.max_bytes
            || self.length_used.saturating_add(add.length) > self.max_length
    }

    pub fn add(&mut self, add: Contribution) {
        self.bytes_used = self.bytes_used.saturating_add(add.bytes);
        self.length_used = self.length_used.saturating_add(add.length);
    }

    pub fn is_exceeded(&self) -> bool {
        self.bytes_used > self.max_bytes || self.length_used > self.max_length
    }
}

/// A member file the renderer could not estimate or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Everything the writer learned about one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupWrite {
    pub outcome: WriteOutcome,
    pub skipped_files: Vec<String>,
    pub failures: Vec<FileFailure>,
    pub container: Option<ContainerInfo>,
    /// Container-level failure: open, finish, or no file written at all.
    pub error: Option<String>,
    pub cancelled: bool,
}

pub struct BudgetedWriter<'a> {
    renderer: &'a dyn Renderer,
    /// Fresh (unused) budget each group starts from.
    budget: GroupBudget,
    cancel: CancellationToken,
}

impl<'a> BudgetedWriter<'a> {
    pub fn new(renderer: &'a dyn Renderer, config: &PackConfig, cancel: CancellationToken) -> Self {
        Self {
            renderer,
            budget: GroupBudget::from_config(config),
            cancel,
        }
    }

    /// Write one group. Never fails: problems land in the returned record.
    pub async fn write_group(&self, group: &Group) -> GroupWrite {
        let mut result = GroupWrite::default();

        let mut container = match self.renderer.open(&group.name).await {
            Ok(c) => c,
            Err(e) => {
                warn!(group = %group.name, error = %e, "Failed to open container");
                result.error = Some(e.to_string());
                result.outcome.files_failed = group.len();
                result.failures = group
                    .member_files
                    .iter()
                    .map(|f| FileFailure {
                        path: f.relative_path.clone(),
                        error: "container could not be opened".to_string(),
                    })
                    .collect();
                return result;
            }
        };

        let mut budget = self.budget;
        let mut ordered: Vec<&FileRecord> = group.member_files.iter().collect();
        ordered.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        for (idx, file) in ordered.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let remaining = ordered.len() - idx;
                info!(group = %group.name, remaining, "Cancelled mid-group");
                result.outcome.files_cancelled = remaining;
                result.cancelled = true;
                break;
            }

            let contribution = match container.estimate_contribution(file).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(group = %group.name, file = %file.relative_path, error = %e, "Estimate failed");
                    result.outcome.files_failed += 1;
                    result.failures.push(FileFailure {
                        path: file.relative_path.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if result.outcome.files_included > 0 && budget.would_exceed(contribution) {
                debug!(
                    group = %group.name,
                    file = %file.relative_path,
                    bytes = contribution.bytes,
                    length = contribution.length,
                    "Skipping file over budget"
                );
                result.outcome.files_skipped_over_budget += 1;
                result.skipped_files.push(file.relative_path.clone());
                continue;
            }

            match container.write_file(file).await {
                Ok(()) => {
                    budget.add(contribution);
                    result.outcome.files_included += 1;
                }
                Err(e) => {
                    warn!(group = %group.name, file = %file.relative_path, error = %e, "Write failed");
                    result.outcome.files_failed += 1;
                    result.failures.push(FileFailure {
                        path: file.relative_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        result.outcome.bytes_written = budget.bytes_used;
        result.outcome.length_written = budget.length_used;

        if result.outcome.files_included == 0 {
            // Nothing made it in; an empty container must not be left behind.
            if let Err(e) = container.discard().await {
                warn!(group = %group.name, error = %e, "Failed to discard empty container");
            }
            if !result.cancelled {
                warn!(group = %group.name, "No member file could be written");
                result.error = Some("no member file could be written".to_string());
            }
        } else {
            match container.finish().await {
                Ok(info) => result.container = Some(info),
                Err(e) => {
                    warn!(group = %group.name, error = %e, "Failed to finalize container");
                    result.error = Some(e.to_string());
                }
            }
        }

        info!(
            group = %group.name,
            included = result.outcome.files_included,
            skipped = result.outcome.files_skipped_over_budget,
            failed = result.outcome.files_failed,
            bytes = result.outcome.bytes_written,
            length = result.outcome.length_written,
            "Group written"
        );
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{FileCategory, GroupKind};
    use crate::render::{Container, RenderError};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// In-memory renderer: each file costs its size in bytes and one length
    /// unit per 100 bytes (at least 1).
    #[derive(Default, Clone)]
    pub(crate) struct MemoryRenderer {
        pub written: Arc<Mutex<Vec<(String, String)>>>,
        pub fail_files: HashSet<String>,
        pub fail_open: HashSet<String>,
    }

    struct MemoryContainer {
        group: String,
        written: Arc<Mutex<Vec<(String, String)>>>,
        fail_files: HashSet<String>,
    }

    #[async_trait]
    impl Renderer for MemoryRenderer {
        async fn open(&self, group_name: &str) -> Result<Box<dyn Container>, RenderError> {
            if self.fail_open.contains(group_name) {
                return Err(RenderError::Rejected {
                    path: group_name.to_string(),
                    reason: "open refused".into(),
                });
            }
            Ok(Box::new(MemoryContainer {
                group: group_name.to_string(),
                written: self.written.clone(),
                fail_files: self.fail_files.clone(),
            }))
        }
    }

    #[async_trait]
    impl Container for MemoryContainer {
        async fn estimate_contribution(
            &mut self,
            file: &FileRecord,
        ) -> Result<Contribution, RenderError> {
            Ok(Contribution {
                bytes: file.size_bytes,
                length: (file.size_bytes / 100).max(1),
            })
        }

        async fn write_file(&mut self, file: &FileRecord) -> Result<(), RenderError> {
            if self.fail_files.contains(&file.relative_path) {
                return Err(RenderError::Rejected {
                    path: file.relative_path.clone(),
                    reason: "unreadable".into(),
                });
            }
            self.written
                .lock()
                .unwrap()
                .push((self.group.clone(), file.relative_path.clone()));
            Ok(())
        }

        async fn finish(self: Box<Self>) -> Result<ContainerInfo, RenderError> {
            Ok(ContainerInfo {
                path: format!("{}.mem", self.group).into(),
                bytes_on_disk: 0,
            })
        }

        async fn discard(self: Box<Self>) -> Result<(), RenderError> {
            Ok(())
        }
    }

    fn group(files: &[(&str, u64)]) -> Group {
        let mut g = Group::empty(GroupKind::Directory, "d", 0);
        g.name = "d".into();
        g.member_files = files
            .iter()
            .map(|(rel, size)| FileRecord::new(format!("/r/{rel}"), rel, *size, FileCategory::Source))
            .collect();
        g
    }

    fn config(max_bytes: u64, max_length: u64) -> PackConfig {
        PackConfig {
            max_bytes_per_group: max_bytes,
            max_length_per_group: max_length,
            ..Default::default()
        }
    }

    #[test]
    fn test_budget_tracking() {
        let mut budget = GroupBudget::new(1000, 50);
        assert!(!budget.would_exceed(Contribution { bytes: 500, length: 25 }));

        budget.add(Contribution { bytes: 500, length: 25 });
        assert!(budget.would_exceed(Contribution { bytes: 600, length: 10 }));
        assert!(budget.would_exceed(Contribution { bytes: 400, length: 30 }));
        assert!(!budget.is_exceeded());

        budget.add(Contribution { bytes: 600, length: 30 });
        assert!(budget.is_exceeded());
    }

    #[tokio::test]
    async fn test_first_file_always_included() {
        let renderer = MemoryRenderer::default();
        let writer = BudgetedWriter::new(&renderer, &config(100, 1_000), CancellationToken::new());

        let result = writer.write_group(&group(&[("d/big.rs", 5_000)])).await;
        assert_eq!(result.outcome.files_included, 1);
        assert_eq!(result.outcome.bytes_written, 5_000);
    }

    #[tokio::test]
    async fn test_skips_over_budget_and_continues() {
        let renderer = MemoryRenderer::default();
        let writer = BudgetedWriter::new(&renderer, &config(1_000, 1_000), CancellationToken::new());

        let result = writer
            .write_group(&group(&[
                ("d/c.rs", 300),
                ("d/a.rs", 600),
                ("d/b.rs", 600),
            ]))
            .await;

        // a (600) in, b (1200) skipped, c (900) in
        assert_eq!(result.outcome.files_included, 2);
        assert_eq!(result.outcome.files_skipped_over_budget, 1);
        assert_eq!(result.skipped_files, vec!["d/b.rs".to_string()]);
        assert_eq!(result.outcome.bytes_written, 900);
        let written = renderer.written.lock().unwrap();
        let order: Vec<&str> = written.iter().map(|(_, f)| f.as_str()).collect();
        assert_eq!(order, vec!["d/a.rs", "d/c.rs"]);
    }

    #[tokio::test]
    async fn test_length_budget_enforced() {
        let renderer = MemoryRenderer::default();
        let writer = BudgetedWriter::new(&renderer, &config(u64::MAX, 5), CancellationToken::new());

        let result = writer
            .write_group(&group(&[("d/a.rs", 400), ("d/b.rs", 200)]))
            .await;
        assert_eq!(result.outcome.files_included, 1);
        assert_eq!(result.outcome.length_written, 4);
        assert_eq!(result.outcome.files_skipped_over_budget, 1);
    }

    #[tokio::test]
    async fn test_failed_file_recorded_and_group_continues() {
        let mut renderer = MemoryRenderer::default();
        renderer.fail_files.insert("d/a.rs".into());
        let writer = BudgetedWriter::new(&renderer, &config(1_000, 1_000), CancellationToken::new());

        let result = writer
            .write_group(&group(&[("d/a.rs", 100), ("d/b.rs", 2_000)]))
            .await;

        // a failed, so b is the first included file and is exempt from the budget
        assert_eq!(result.outcome.files_failed, 1);
        assert_eq!(result.outcome.files_included, 1);
        assert_eq!(result.failures[0].path, "d/a.rs");
        assert!(result.container.is_some());
    }

    #[tokio::test]
    async fn test_all_files_failing_leaves_no_container() {
        let mut renderer = MemoryRenderer::default();
        renderer.fail_files.insert("d/a.rs".into());
        let writer = BudgetedWriter::new(&renderer, &config(1_000, 1_000), CancellationToken::new());

        let result = writer.write_group(&group(&[("d/a.rs", 10)])).await;
        assert_eq!(result.outcome.files_included, 0);
        assert_eq!(result.outcome.files_failed, 1);
        assert!(result.container.is_none());
        assert!(result.error.is_some());
    }

    #[test]
    fn test_budget_taken_from_config() {
        let cfg = config(123, 45);
        let renderer = MemoryRenderer::default();
        let writer = BudgetedWriter::new(&renderer, &cfg, CancellationToken::new());
        assert_eq!(writer.budget, GroupBudget::from_config(&cfg));
        assert_eq!(writer.budget.bytes_used, 0);
        assert_eq!(writer.budget.max_length, 45);
    }

    #[tokio::test]
    async fn test_open_failure_marks_all_files_failed() {
        let mut renderer = MemoryRenderer::default();
        renderer.fail_open.insert("d".into());
        let writer = BudgetedWriter::new(&renderer, &config(1_000, 1_000), CancellationToken::new());

        let result = writer
            .write_group(&group(&[("d/a.rs", 1), ("d/b.rs", 1)]))
            .await;
        assert_eq!(result.outcome.files_failed, 2);
        assert!(result.error.is_some());
        assert!(result.container.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let renderer = MemoryRenderer::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let writer = BudgetedWriter::new(&renderer, &config(1_000, 1_000), cancel);

        let result = writer.write_group(&group(&[("d/a.rs", 1), ("d/b.rs", 1)])).await;
        assert!(result.cancelled);
        assert_eq!(result.outcome.files_cancelled, 2);
        assert_eq!(result.outcome.files_included, 0);
        assert!(result.container.is_none());
        assert!(result.error.is_none());
    }
}
