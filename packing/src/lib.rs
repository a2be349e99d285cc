//! Directory-locality grouping and budgeted container packing.
//!
//! Takes a flat list of discovered files and packs them into at most
//! `max_groups` output containers, keeping files from the same directory
//! together and spending per-container and aggregate budgets on the most
//! important directories first.
//!
//! # Pipeline
//!
//! ```text
//! FileWalker ─► [FileRecord] ─► DirectoryTree ─► PriorityScorer
//!                                                     │
//!                                              GroupingEngine ─► GroupingPlan
//!                                                     │
//!                    PackingOrchestrator ─► BudgetedWriter × N ─► Renderer
//!                                                     │
//!                                                 PackReport
//! ```
//!
//! Grouping is pure and deterministic: the same files and configuration
//! always produce the same groups, names and order. Writing is fail-soft:
//! per-file and per-group problems are recorded in the report.
//!
//! # Usage
//!
//! ```no_run
//! use packing::{FileWalker, PackConfig, PackingOrchestrator, TextRenderer};
//!
//! # async fn demo() -> Result<(), packing::PackError> {
//! let discovery = FileWalker::new("./my-project").discover()?;
//! let orchestrator = PackingOrchestrator::new(PackConfig::from_env(), TextRenderer::new("./out"))?;
//! let report = orchestrator.run(discovery.files).await?;
//! println!("{} files packed into {} containers", report.total_files_included, report.groups.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod grouping;
pub mod model;
pub mod orchestrator;
pub mod priority;
pub mod render;
pub mod tree;
pub mod writer;

pub use config::{PackConfig, PriorityWeights};
pub use discovery::{DiscoveryReport, FileWalker};
pub use error::{Invariant, PackError, PackResult};
pub use grouping::{GroupingEngine, GroupingPhase, GroupingPlan, PhaseRecord};
pub use model::{DirectoryNode, FileCategory, FileRecord, Group, GroupKind, WriteOutcome};
pub use orchestrator::{GroupReport, GroupStatus, PackReport, PackingOrchestrator};
pub use priority::PriorityScorer;
pub use render::{Container, ContainerInfo, Contribution, RenderError, Renderer, TextRenderer};
pub use tree::DirectoryTree;
pub use writer::{BudgetedWriter, FileFailure, GroupBudget, GroupWrite};
