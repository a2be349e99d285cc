//! Packing orchestrator — one grouping pass, then a bounded fan-out of
//! budgeted writers.
//!
//! ```text
//! files ──► GroupingEngine::plan ──► [Group; ≤ max_groups]
//!                                        │
//!              JoinSet::spawn(BudgetedWriter) × N  (Semaphore = worker_count)
//!                                        │
//!                  PackReport (groups in priority order)
//! ```
//!
//! ## Partial failure policy
//!
//! A group whose container cannot be opened or finalized is reported as
//! `failed`; sibling groups are unaffected. A panicking writer task leaves its
//! slot marked `failed`. Only configuration errors and invariant violations
//! surface as `Err`.
//!
//! ## Aggregate length cap
//!
//! Groups are admitted strictly in plan order. Before a group starts, the
//! summed `length_written` of groups that already completed is compared with
//! `max_total_length`; once the cap is reached every group not yet started is
//! reported as `skipped_total_budget`. A skipped group is therefore never
//! followed by a written one. With several workers, groups already in flight
//! when the cap is crossed still finish.

use crate::config::PackConfig;
use crate::error::PackResult;
use crate::grouping::{GroupingEngine, GroupingPlan};
use crate::model::{FileRecord, Group, GroupKind, WriteOutcome};
use crate::render::{ContainerInfo, Renderer};
use crate::writer::{BudgetedWriter, FileFailure, GroupWrite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Final state of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Written,
    Failed,
    SkippedTotalBudget,
    Cancelled,
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Written => write!(f, "written"),
            Self::Failed => write!(f, "failed"),
            Self::SkippedTotalBudget => write!(f, "skipped_total_budget"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    pub name: String,
    pub kind: GroupKind,
    pub source_paths: Vec<String>,
    pub priority_score: u64,
    pub member_count: usize,
    pub status: GroupStatus,
    /// True when the group was never attempted.
    pub skipped: bool,
    pub outcome: WriteOutcome,
    pub failures: Vec<FileFailure>,
    /// Paths left out because they did not fit the per-group budget.
    pub skipped_files: Vec<String>,
    pub container: Option<ContainerInfo>,
    pub error: Option<String>,
}

impl GroupReport {
    fn not_attempted(group: &Group, status: GroupStatus) -> Self {
        Self {
            name: group.name.clone(),
            kind: group.kind,
            source_paths: group.source_paths.clone(),
            priority_score: group.priority_score,
            member_count: group.len(),
            status,
            skipped: true,
            outcome: WriteOutcome::default(),
            failures: Vec::new(),
            skipped_files: Vec::new(),
            container: None,
            error: None,
        }
    }

    fn lost(group: &Group) -> Self {
        Self {
            skipped: false,
            error: Some("writer task did not complete".to_string()),
            ..Self::not_attempted(group, GroupStatus::Failed)
        }
    }

    fn from_write(group: &Group, write: GroupWrite) -> Self {
        let status = if write.error.is_some() {
            GroupStatus::Failed
        } else if write.cancelled {
            GroupStatus::Cancelled
        } else {
            GroupStatus::Written
        };
        Self {
            name: group.name.clone(),
            kind: group.kind,
            source_paths: group.source_paths.clone(),
            priority_score: group.priority_score,
            member_count: group.len(),
            status,
            skipped: false,
            outcome: write.outcome,
            failures: write.failures,
            skipped_files: write.skipped_files,
            container: write.container,
            error: write.error,
        }
    }

    /// Members that did not end up in the container, whatever the reason.
    pub fn files_not_included(&self) -> usize {
        self.member_count - self.outcome.files_included.min(self.member_count)
    }
}

/// Aggregate result of one packing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub files_input: usize,
    pub total_files_included: usize,
    /// Every input file not included: over budget, failed, cancelled or in a
    /// skipped group.
    pub total_files_skipped: usize,
    pub total_files_failed: usize,
    pub total_bytes_written: u64,
    pub total_length_written: u64,
    pub groups_skipped_for_total_budget: usize,
    pub cancelled: bool,
    pub used_fallback: bool,
    pub groups: Vec<GroupReport>,
}

impl PackReport {
    fn aggregate(
        files_input: usize,
        used_fallback: bool,
        groups: Vec<GroupReport>,
        cancelled: bool,
    ) -> Self {
        let total_files_included = groups.iter().map(|g| g.outcome.files_included).sum();
        let total_files_skipped = groups.iter().map(GroupReport::files_not_included).sum();
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            files_input,
            total_files_included,
            total_files_skipped,
            total_files_failed: groups.iter().map(|g| g.outcome.files_failed).sum(),
            total_bytes_written: groups.iter().map(|g| g.outcome.bytes_written).sum(),
            total_length_written: groups.iter().map(|g| g.outcome.length_written).sum(),
            groups_skipped_for_total_budget: groups
                .iter()
                .filter(|g| g.status == GroupStatus::SkippedTotalBudget)
                .count(),
            cancelled,
            used_fallback,
            groups,
        }
    }

    /// Report for a run with nothing to pack.
    pub fn empty() -> Self {
        Self::aggregate(0, false, Vec::new(), false)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every input file is either included or counted as skipped.
    pub fn is_balanced(&self) -> bool {
        self.total_files_included + self.total_files_skipped == self.files_input
    }

    pub fn group(&self, name: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// State shared by every writer task of one run.
struct Dispatch<R> {
    renderer: Arc<R>,
    config: PackConfig,
    cancel: CancellationToken,
    completed_length: AtomicU64,
}

impl<R: Renderer> Dispatch<R> {
    /// Decide whether a group may start. Called in plan order so that once
    /// one group is turned away every later group is too.
    fn admit(&self, group: &Group) -> Option<GroupReport> {
        if self.cancel.is_cancelled() {
            debug!(group = %group.name, "Cancelled before start");
            return Some(GroupReport::not_attempted(group, GroupStatus::Cancelled));
        }

        let completed = self.completed_length.load(Ordering::SeqCst);
        if completed >= self.config.max_total_length {
            info!(
                group = %group.name,
                completed,
                cap = self.config.max_total_length,
                "Total length cap reached, skipping group"
            );
            return Some(GroupReport::not_attempted(group, GroupStatus::SkippedTotalBudget));
        }
        None
    }

    async fn write(&self, group: &Group) -> GroupReport {
        let writer = BudgetedWriter::new(&*self.renderer, &self.config, self.cancel.clone());
        let write = writer.write_group(group).await;
        self.completed_length
            .fetch_add(write.outcome.length_written, Ordering::SeqCst);
        GroupReport::from_write(group, write)
    }
}

pub struct PackingOrchestrator<R> {
    engine: GroupingEngine,
    renderer: Arc<R>,
    cancel: CancellationToken,
}

impl<R: Renderer + 'static> PackingOrchestrator<R> {
    /// Validates the configuration up front.
    pub fn new(config: PackConfig, renderer: R) -> PackResult<Self> {
        Ok(Self {
            engine: GroupingEngine::new(config)?,
            renderer: Arc::new(renderer),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run between files and between groups.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PackConfig {
        self.engine.config()
    }

    /// Grouping only, no I/O.
    pub fn plan(&self, files: Vec<FileRecord>) -> PackResult<GroupingPlan> {
        self.engine.plan(files)
    }

    pub async fn run(&self, files: Vec<FileRecord>) -> PackResult<PackReport> {
        let plan = self.plan(files)?;
        Ok(self.execute(plan).await)
    }

    /// Write every group of an existing plan.
    pub async fn execute(&self, plan: GroupingPlan) -> PackReport {
        if plan.is_empty() {
            info!("No files to pack");
            return PackReport::empty();
        }

        let start = Instant::now();
        let files_input = plan.file_count;
        let used_fallback = plan.used_fallback();
        let workers = self.config().worker_count.max(1);
        info!(
            groups = plan.groups.len(),
            files = files_input,
            workers,
            "Packing started"
        );

        let dispatch = Arc::new(Dispatch {
            renderer: self.renderer.clone(),
            config: self.config().clone(),
            cancel: self.cancel.clone(),
            completed_length: AtomicU64::new(0),
        });

        let reports = if workers == 1 || plan.groups.len() == 1 {
            let mut reports = Vec::with_capacity(plan.groups.len());
            for group in &plan.groups {
                let report = match dispatch.admit(group) {
                    Some(turned_away) => turned_away,
                    None => dispatch.write(group).await,
                };
                reports.push(report);
            }
            reports
        } else {
            self.fan_out(dispatch, plan.groups, workers).await
        };

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            info!("Packing cancelled");
        }
        let report = PackReport::aggregate(files_input, used_fallback, reports, cancelled);
        info!(
            included = report.total_files_included,
            skipped = report.total_files_skipped,
            failed = report.total_files_failed,
            groups_skipped = report.groups_skipped_for_total_budget,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Packing finished"
        );
        report
    }

    async fn fan_out(
        &self,
        dispatch: Arc<Dispatch<R>>,
        groups: Vec<Group>,
        workers: usize,
    ) -> Vec<GroupReport> {
        let sem = Arc::new(Semaphore::new(workers));
        let mut slots: Vec<GroupReport> = groups.iter().map(GroupReport::lost).collect();
        let mut join_set: JoinSet<(usize, GroupReport)> = JoinSet::new();

        // Permits are taken here, not inside the tasks, so groups start in
        // plan order and the length cap is spent on higher priorities first.
        for (idx, group) in groups.into_iter().enumerate() {
            let Ok(permit) = sem.clone().acquire_owned().await else {
                slots[idx] = GroupReport::not_attempted(&group, GroupStatus::Cancelled);
                continue;
            };
            if let Some(turned_away) = dispatch.admit(&group) {
                slots[idx] = turned_away;
                continue;
            }
            let dispatch = dispatch.clone();
            join_set.spawn(async move {
                let _permit = permit;
                (idx, dispatch.write(&group).await)
            });
        }

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, report)) => slots[idx] = report,
                Err(e) => {
                    // Slot keeps its `failed` placeholder.
                    warn!(error = %e, "writer task panicked");
                }
            }
        }
        slots
    }
}
