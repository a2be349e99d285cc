//! Run configuration — group cap, per-group and aggregate budgets, key folders,
//! priority weights and worker count.
//!
//! Layering: `Default` → optional TOML file → `DIRPACK_*` environment
//! variables. Callers finish with [`PackConfig::validate`].

use crate::error::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Top-level directory names that get priority treatment during roll-up.
pub const DEFAULT_KEY_FOLDERS: &[&str] = &[
    "src",
    "components",
    "api",
    "services",
    "utils",
    "lib",
    "public",
    "tests",
    "test",
    "specs",
    "config",
    "scripts",
];

pub const DEFAULT_MAX_GROUPS: usize = 10;

/// 10 MiB per container
pub const DEFAULT_MAX_BYTES_PER_GROUP: u64 = 10 * 1024 * 1024;

/// ~100 pages at 60 lines per page
pub const DEFAULT_MAX_LENGTH_PER_GROUP: u64 = 6_000;

pub const DEFAULT_MAX_TOTAL_LENGTH: u64 = 60_000;

/// Additive weights for directory priority scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    /// Flat bonus when the top-level segment is a key folder.
    pub key_folder_bonus: u64,
    /// Per level of depth.
    pub depth: u64,
    /// Per directly contained file.
    pub file_count: u64,
    /// Multiplier on floor(log2(total bytes)).
    pub size_log2: u64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            key_folder_bonus: 100,
            depth: 5,
            file_count: 2,
            size_log2: 1,
        }
    }
}

/// Packing run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Hard cap on emitted groups (containers).
    pub max_groups: usize,
    /// Per-container byte budget. The first file of a group is exempt.
    pub max_bytes_per_group: u64,
    /// Per-container length budget (rendered lines). The first file is exempt.
    pub max_length_per_group: u64,
    /// Aggregate length cap across all containers.
    pub max_total_length: u64,
    /// Ordered key-folder names; earlier entries are processed first.
    pub key_folder_names: Vec<String>,
    pub weights: PriorityWeights,
    /// Concurrent group writers.
    pub worker_count: usize,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_groups: DEFAULT_MAX_GROUPS,
            max_bytes_per_group: DEFAULT_MAX_BYTES_PER_GROUP,
            max_length_per_group: DEFAULT_MAX_LENGTH_PER_GROUP,
            max_total_length: DEFAULT_MAX_TOTAL_LENGTH,
            key_folder_names: DEFAULT_KEY_FOLDERS.iter().map(|s| s.to_string()).collect(),
            weights: PriorityWeights::default(),
            worker_count: default_worker_count(),
        }
    }
}

/// Available parallelism minus one, never below one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

impl PackConfig {
    /// Defaults with `DIRPACK_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Load from a TOML file; missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PackResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|message| PackError::ConfigParse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Apply environment overrides on top of `self`. Unparseable values are ignored.
    pub fn apply_env(mut self) -> Self {
        fn parsed<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
        }

        if let Some(n) = parsed("DIRPACK_MAX_GROUPS") {
            self.max_groups = n;
        }
        if let Some(n) = parsed("DIRPACK_MAX_BYTES_PER_GROUP") {
            self.max_bytes_per_group = n;
        }
        if let Some(n) = parsed("DIRPACK_MAX_LENGTH_PER_GROUP") {
            self.max_length_per_group = n;
        }
        if let Some(n) = parsed("DIRPACK_MAX_TOTAL_LENGTH") {
            self.max_total_length = n;
        }
        if let Some(n) = parsed("DIRPACK_WORKERS") {
            self.worker_count = n;
        }
        if let Ok(list) = std::env::var("DIRPACK_KEY_FOLDERS") {
            self.key_folder_names = parse_name_list(&list);
        }
        self
    }

    /// Reject configurations the engine cannot honour.
    pub fn validate(&self) -> PackResult<()> {
        if self.max_groups < 1 {
            return Err(PackError::invalid("max_groups", "must be at least 1"));
        }
        if self.max_bytes_per_group == 0 {
            return Err(PackError::invalid("max_bytes_per_group", "must be positive"));
        }
        if self.max_length_per_group == 0 {
            return Err(PackError::invalid("max_length_per_group", "must be positive"));
        }
        if self.max_total_length == 0 {
            return Err(PackError::invalid("max_total_length", "must be positive"));
        }
        if self.worker_count == 0 {
            return Err(PackError::invalid("worker_count", "must be at least 1"));
        }

        let mut seen = HashSet::new();
        for name in &self.key_folder_names {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(PackError::invalid(
                    "key_folder_names",
                    format!("`{name}` is not a single directory name"),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(PackError::invalid(
                    "key_folder_names",
                    format!("`{name}` listed more than once"),
                ));
            }
        }
        Ok(())
    }

    pub fn is_key_folder(&self, top_level: &str) -> bool {
        !top_level.is_empty() && self.key_folder_names.iter().any(|k| k == top_level)
    }
}

/// Split a comma-separated list, trimming blanks.
pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PackConfig::default();
        assert_eq!(config.max_groups, 10);
        assert_eq!(config.key_folder_names.len(), DEFAULT_KEY_FOLDERS.len());
        assert!(config.worker_count >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_groups() {
        let config = PackConfig {
            max_groups: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            PackError::InvalidConfig {
                field: "max_groups",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_zero_budgets_and_workers() {
        for config in [
            PackConfig {
                max_bytes_per_group: 0,
                ..Default::default()
            },
            PackConfig {
                max_length_per_group: 0,
                ..Default::default()
            },
            PackConfig {
                max_total_length: 0,
                ..Default::default()
            },
            PackConfig {
                worker_count: 0,
                ..Default::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_rejects_bad_key_folders() {
        let dup = PackConfig {
            key_folder_names: vec!["src".into(), "src".into()],
            ..Default::default()
        };
        assert!(dup.validate().is_err());

        let nested = PackConfig {
            key_folder_names: vec!["src/api".into()],
            ..Default::default()
        };
        assert!(nested.validate().is_err());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = PackConfig::from_toml_str(
            r#"
max_groups = 4
key_folder_names = ["app", "src"]

[weights]
depth = 7
"#,
        )
        .unwrap();

        assert_eq!(config.max_groups, 4);
        assert_eq!(config.key_folder_names, vec!["app", "src"]);
        assert_eq!(config.weights.depth, 7);
        assert_eq!(config.weights.key_folder_bonus, 100);
        assert_eq!(config.max_bytes_per_group, DEFAULT_MAX_BYTES_PER_GROUP);
    }

    #[test]
    fn test_toml_file_parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirpack.toml");
        std::fs::write(&path, "max_groups = \"ten\"").unwrap();

        let err = PackConfig::from_toml_file(&path).unwrap_err();
        match err {
            PackError::ConfigParse { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(parse_name_list(" src, api ,,lib "), vec!["src", "api", "lib"]);
        assert!(parse_name_list("").is_empty());
    }

    #[test]
    fn test_is_key_folder() {
        let config = PackConfig::default();
        assert!(config.is_key_folder("src"));
        assert!(!config.is_key_folder("docs"));
        assert!(!config.is_key_folder(""));
    }
}
