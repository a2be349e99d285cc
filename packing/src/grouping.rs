//! Grouping engine — maps directories and root files into at most
//! `max_groups` named groups.
//!
//! Phases run strictly in order with no cycles:
//!
//! ```text
//! BUILD_TREE → SCORE → INITIAL_MAP | ROLLUP → FALLBACK → FINALIZE
//! ```
//!
//! Every phase holds or reduces the group count. Roll-up is iterative over a
//! depth-ordered worklist so arbitrarily deep trees never recurse.

use crate::config::PackConfig;
use crate::error::{Invariant, PackError, PackResult};
use crate::model::{parent_path, DirectoryNode, FileRecord, Group, GroupKind};
use crate::priority::{by_priority_desc, PriorityScorer};
use crate::tree::DirectoryTree;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};
use tracing::{debug, warn};

pub const ROOT_GROUP_NAME: &str = "root";
pub const MISC_GROUP_NAME: &str = "misc";

/// Engine phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingPhase {
    BuildTree,
    Score,
    InitialMap,
    Rollup,
    Fallback,
    Finalize,
}

/// Group count observed when a phase completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: GroupingPhase,
    pub group_count: usize,
}

/// Ordered groups plus the trace of how they were reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingPlan {
    /// Descending priority; `root` then `misc` last.
    pub groups: Vec<Group>,
    pub file_count: usize,
    pub directory_count: usize,
    pub root_file_count: usize,
    pub phases: Vec<PhaseRecord>,
}

impl GroupingPlan {
    /// True when there was no eligible content at all.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn used_fallback(&self) -> bool {
        self.phases
            .iter()
            .any(|p| p.phase == GroupingPhase::Fallback)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Pure, single-threaded grouping. Each call is a function of its input files
/// and the configuration only.
#[derive(Debug, Clone)]
pub struct GroupingEngine {
    config: PackConfig,
}

impl GroupingEngine {
    pub fn new(config: PackConfig) -> PackResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    pub fn plan(&self, files: Vec<FileRecord>) -> PackResult<GroupingPlan> {
        let max = self.config.max_groups;
        let mut phases = Vec::new();

        let mut fingerprint: Vec<String> =
            files.iter().map(|f| f.relative_path.clone()).collect();
        fingerprint.sort();

        let mut tree = DirectoryTree::build(files);
        let file_count = tree.file_count();
        let directory_count = tree.directory_count();
        let root_file_count = tree.root_files().len();
        let bucket_count = directory_count + usize::from(root_file_count > 0);
        phases.push(PhaseRecord {
            phase: GroupingPhase::BuildTree,
            group_count: bucket_count,
        });

        if tree.is_empty() {
            debug!("No eligible files; emitting empty plan");
            return Ok(GroupingPlan {
                groups: Vec::new(),
                file_count: 0,
                directory_count: 0,
                root_file_count: 0,
                phases,
            });
        }

        let scorer = PriorityScorer::new(&self.config);
        scorer.annotate(tree.nodes_mut());
        let root_score = scorer.score(&DirectoryNode::new("", tree.root_files().to_vec()));
        phases.push(PhaseRecord {
            phase: GroupingPhase::Score,
            group_count: bucket_count,
        });

        let (dirs, root_files) = tree.into_parts();
        let (mut groups, phase) = if dirs.len() <= max {
            let groups: Vec<Group> = dirs.into_iter().map(Group::from_directory).collect();
            (groups, GroupingPhase::InitialMap)
        } else {
            debug!(
                directories = dirs.len(),
                max_groups = max,
                "Directory count exceeds cap; rolling up"
            );
            let groups = self.rollup(dirs, !root_files.is_empty());
            (groups, GroupingPhase::Rollup)
        };
        self.place_root_files(&mut groups, root_files, root_score);
        debug_assert_eq!(member_total(&groups), file_count);
        phases.push(PhaseRecord {
            phase,
            group_count: groups.len(),
        });

        if groups.len() > max {
            warn!(
                groups = groups.len(),
                max_groups = max,
                "Roll-up could not meet the cap; merging lowest-priority groups into misc"
            );
            groups = self.fallback(groups);
            debug_assert_eq!(member_total(&groups), file_count);
            phases.push(PhaseRecord {
                phase: GroupingPhase::Fallback,
                group_count: groups.len(),
            });
        }

        let groups = self.finalize(groups, &fingerprint)?;
        phases.push(PhaseRecord {
            phase: GroupingPhase::Finalize,
            group_count: groups.len(),
        });

        debug!(
            groups = groups.len(),
            files = file_count,
            directories = directory_count,
            "Grouping complete"
        );

        Ok(GroupingPlan {
            groups,
            file_count,
            directory_count,
            root_file_count,
            phases,
        })
    }

    /// ROLLUP: key folders first (split or collapsed), then deepest-first
    /// merging of the remaining directories into their parents.
    fn rollup(&self, dirs: Vec<DirectoryNode>, root_needs_slot: bool) -> Vec<Group> {
        let max = self.config.max_groups;

        let mut key_subtrees: BTreeMap<String, Vec<DirectoryNode>> = BTreeMap::new();
        let mut others = Vec::new();
        for node in dirs {
            if self.config.is_key_folder(node.top_level()) {
                key_subtrees
                    .entry(node.top_level().to_string())
                    .or_default()
                    .push(node);
            } else {
                others.push(node);
            }
        }

        // Fewest groups the other directories can be rolled up into.
        let other_floor = others
            .iter()
            .map(|n| n.top_level())
            .collect::<BTreeSet<_>>()
            .len();
        let reserve = other_floor + usize::from(root_needs_slot);

        let present: Vec<&String> = self
            .config
            .key_folder_names
            .iter()
            .filter(|k| key_subtrees.contains_key(k.as_str()))
            .collect();

        let mut groups = Vec::new();
        for (i, name) in present.iter().enumerate() {
            let Some(subdirs) = key_subtrees.remove(name.as_str()) else {
                continue;
            };
            let later = present.len() - i - 1;
            let budget = max.saturating_sub(groups.len() + later + reserve);

            if subdirs.len() <= budget {
                debug!(key_folder = %name, subdirs = subdirs.len(), budget, "Keeping key folder split");
                groups.extend(subdirs.into_iter().map(Group::from_directory));
            } else {
                debug!(key_folder = %name, subdirs = subdirs.len(), budget, "Collapsing key folder");
                let mut collapsed = Group::empty(GroupKind::KeyFolder, name.as_str(), 0);
                for node in subdirs {
                    collapsed.absorb(Group::from_directory(node));
                }
                groups.push(collapsed);
            }
        }

        let target = max.saturating_sub(groups.len());
        groups.extend(roll_up_deepest_first(others, target));
        groups
    }

    /// Root files get their own group when a slot is free; otherwise they join
    /// the lowest-priority group, which becomes the misc bucket.
    fn place_root_files(&self, groups: &mut Vec<Group>, root_files: Vec<FileRecord>, score: u64) {
        if root_files.is_empty() {
            return;
        }

        if groups.len() < self.config.max_groups {
            let mut root = Group::empty(GroupKind::Root, "", score);
            root.member_files = root_files;
            groups.push(root);
            return;
        }

        let lowest = groups
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                by_priority_desc(
                    (a.priority_score, a.anchor_path()),
                    (b.priority_score, b.anchor_path()),
                )
            })
            .map(|(idx, _)| idx);

        match lowest {
            Some(idx) => {
                let target = &mut groups[idx];
                debug!(
                    group = %target.anchor_path(),
                    root_files = root_files.len(),
                    "No free slot for root files; merging into lowest-priority group"
                );
                target.member_files.extend(root_files);
                if !target.source_paths.iter().any(String::is_empty) {
                    target.source_paths.push(String::new());
                }
                target.kind = GroupKind::Misc;
            }
            None => {
                let mut root = Group::empty(GroupKind::Root, "", score);
                root.member_files = root_files;
                groups.push(root);
            }
        }
    }

    /// FALLBACK: keep the top `max_groups - 1` by priority, fold the rest
    /// (and any existing misc bucket) into one terminal `misc` group.
    fn fallback(&self, groups: Vec<Group>) -> Vec<Group> {
        let keep = self.config.max_groups - 1;

        let (existing_misc, mut ranked): (Vec<Group>, Vec<Group>) =
            groups.into_iter().partition(|g| g.kind == GroupKind::Misc);
        ranked.sort_by(|a, b| {
            by_priority_desc(
                (a.priority_score, a.anchor_path()),
                (b.priority_score, b.anchor_path()),
            )
        });
        let rest = ranked.split_off(keep.min(ranked.len()));

        let mut misc = Group {
            name: String::new(),
            kind: GroupKind::Misc,
            member_files: Vec::new(),
            source_paths: Vec::new(),
            priority_score: 0,
        };
        for group in existing_misc.into_iter().chain(rest) {
            misc.absorb(group);
        }
        if !misc.is_empty() {
            ranked.push(misc);
        }
        ranked
    }

    /// FINALIZE: order, name, and check every invariant.
    fn finalize(&self, mut groups: Vec<Group>, fingerprint: &[String]) -> PackResult<Vec<Group>> {
        for group in &mut groups {
            group.sort_members();
        }

        groups.sort_by(|a, b| {
            kind_rank(a.kind).cmp(&kind_rank(b.kind)).then_with(|| {
                by_priority_desc(
                    (a.priority_score, a.anchor_path()),
                    (b.priority_score, b.anchor_path()),
                )
            })
        });

        let mut used: HashSet<String> = [ROOT_GROUP_NAME, MISC_GROUP_NAME]
            .into_iter()
            .map(String::from)
            .collect();
        for group in &mut groups {
            group.name = match group.kind {
                GroupKind::Root => ROOT_GROUP_NAME.to_string(),
                GroupKind::Misc => MISC_GROUP_NAME.to_string(),
                GroupKind::Directory | GroupKind::KeyFolder => {
                    unique_name(sanitize_group_name(group.anchor_path()), &mut used)
                }
            };
        }

        verify_invariants(&groups, self.config.max_groups, fingerprint)?;
        Ok(groups)
    }
}

fn kind_rank(kind: GroupKind) -> u8 {
    match kind {
        GroupKind::Directory | GroupKind::KeyFolder => 0,
        GroupKind::Root => 1,
        GroupKind::Misc => 2,
    }
}

fn member_total(groups: &[Group]) -> usize {
    groups.iter().map(Group::len).sum()
}

/// Worklist entry; the heap pops deepest first, then lowest score, then
/// smallest path.
#[derive(Debug, PartialEq, Eq)]
struct RollupCandidate {
    depth: usize,
    score: u64,
    path: String,
}

impl RollupCandidate {
    fn key(&self) -> (usize, Reverse<u64>, Reverse<&str>) {
        (self.depth, Reverse(self.score), Reverse(self.path.as_str()))
    }
}

impl Ord for RollupCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for RollupCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merge the deepest directory into its immediate parent until at most
/// `target` groups remain or only top-level groups are left.
fn roll_up_deepest_first(nodes: Vec<DirectoryNode>, target: usize) -> Vec<Group> {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    let mut worklist = BinaryHeap::new();

    for node in nodes {
        worklist.push(RollupCandidate {
            depth: node.depth,
            score: node.priority_score,
            path: node.path.clone(),
        });
        groups.insert(node.path.clone(), Group::from_directory(node));
    }

    while groups.len() > target {
        let Some(candidate) = worklist.pop() else {
            break;
        };
        if candidate.depth < 2 {
            // Top-level directories have no parent group to merge into.
            break;
        }
        match groups.get(&candidate.path) {
            Some(group) if group.priority_score == candidate.score => {}
            _ => continue, // stale entry
        }
        let Some(child) = groups.remove(&candidate.path) else {
            continue;
        };
        let Some(parent) = parent_path(&candidate.path).map(str::to_string) else {
            continue;
        };

        let merged_into_existing = groups.contains_key(&parent);
        let parent_group = groups
            .entry(parent.clone())
            .or_insert_with(|| Group::empty(GroupKind::Directory, parent.clone(), 0));
        parent_group.absorb(child);
        debug!(
            child = %candidate.path,
            parent = %parent,
            merged_into_existing,
            "Rolled up directory"
        );

        worklist.push(RollupCandidate {
            depth: candidate.depth - 1,
            score: parent_group.priority_score,
            path: parent,
        });
    }

    groups.into_values().collect()
}

/// Turn a directory path into a container-safe name.
pub fn sanitize_group_name(path: &str) -> String {
    let replaced: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "group".to_string()
    } else {
        trimmed.to_string()
    }
}

fn unique_name(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Check the group cap, non-empty groups, unique names and file conservation.
pub fn verify_invariants(
    groups: &[Group],
    max_groups: usize,
    fingerprint: &[String],
) -> PackResult<()> {
    if groups.len() > max_groups {
        return Err(PackError::violation(
            Invariant::GroupCap,
            format!("{} groups emitted, cap is {max_groups}", groups.len()),
        ));
    }

    if let Some(empty) = groups.iter().find(|g| g.is_empty()) {
        return Err(PackError::violation(
            Invariant::NonEmpty,
            format!("group `{}` has no member files", empty.name),
        ));
    }

    let mut names = HashSet::new();
    for group in groups {
        if !names.insert(group.name.as_str()) {
            return Err(PackError::violation(
                Invariant::UniqueNames,
                format!("group name `{}` emitted twice", group.name),
            ));
        }
    }

    let mut emitted: Vec<&str> = groups
        .iter()
        .flat_map(|g| g.member_files.iter().map(|f| f.relative_path.as_str()))
        .collect();
    emitted.sort_unstable();
    let expected: Vec<&str> = fingerprint.iter().map(String::as_str).collect();
    if emitted != expected {
        return Err(PackError::violation(
            Invariant::Conservation,
            format!(
                "{} files emitted for {} input files",
                emitted.len(),
                expected.len()
            ),
        ));
    }

    Ok(())
}
