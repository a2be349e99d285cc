//! Command-line arguments and configuration layering.
//!
//! Precedence, lowest first: built-in defaults, `--config` TOML file,
//! `DIRPACK_*` environment, command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use packing::PackConfig;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Source directory to pack
    pub source: PathBuf,

    /// Directory that receives the containers and pack-report.json
    #[arg(short, long, default_value = "packed")]
    pub output: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of containers (overrides DIRPACK_MAX_GROUPS)
    #[arg(long)]
    pub max_groups: Option<usize>,

    /// Byte budget per container (overrides DIRPACK_MAX_BYTES_PER_GROUP)
    #[arg(long)]
    pub max_bytes_per_group: Option<u64>,

    /// Line budget per container (overrides DIRPACK_MAX_LENGTH_PER_GROUP)
    #[arg(long)]
    pub max_length_per_group: Option<u64>,

    /// Line budget across all containers (overrides DIRPACK_MAX_TOTAL_LENGTH)
    #[arg(long)]
    pub max_total_length: Option<u64>,

    /// Key folder name; repeat to replace the default list
    #[arg(long = "key-folder", value_name = "NAME")]
    pub key_folders: Vec<String>,

    /// Concurrent container writers (overrides DIRPACK_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Additional directory names to skip during discovery
    #[arg(long = "exclude", value_name = "DIR")]
    pub exclude: Vec<String>,

    /// Print the grouping plan and exit without writing anything
    #[arg(long, default_value_t = false)]
    pub plan: bool,

    /// Debug-level logging when RUST_LOG is unset
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Defaults, then file, then environment, then flags; validated.
    pub fn resolve_config(&self) -> Result<PackConfig> {
        let base = match &self.config {
            Some(path) => PackConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => PackConfig::default(),
        };
        let config = self.apply_flags(base.apply_env());
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn apply_flags(&self, mut config: PackConfig) -> PackConfig {
        if let Some(n) = self.max_groups {
            config.max_groups = n;
        }
        if let Some(n) = self.max_bytes_per_group {
            config.max_bytes_per_group = n;
        }
        if let Some(n) = self.max_length_per_group {
            config.max_length_per_group = n;
        }
        if let Some(n) = self.max_total_length {
            config.max_total_length = n;
        }
        if let Some(n) = self.workers {
            config.worker_count = n;
        }
        if !self.key_folders.is_empty() {
            config.key_folder_names = self.key_folders.clone();
        }
        config
    }

    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("dirpack").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_base() {
        let args = parse(&[
            "./repo",
            "--max-groups",
            "4",
            "--max-total-length",
            "900",
            "--key-folder",
            "app",
            "--key-folder",
            "core",
            "--workers",
            "2",
        ]);
        let config = args.apply_flags(PackConfig::default());
        assert_eq!(config.max_groups, 4);
        assert_eq!(config.max_total_length, 900);
        assert_eq!(config.key_folder_names, vec!["app", "core"]);
        assert_eq!(config.worker_count, 2);
        assert_eq!(
            config.max_bytes_per_group,
            PackConfig::default().max_bytes_per_group
        );
    }

    #[test]
    fn test_no_flags_keeps_base() {
        let args = parse(&["./repo"]);
        let base = PackConfig {
            max_groups: 7,
            ..Default::default()
        };
        assert_eq!(args.apply_flags(base.clone()), base);
        assert_eq!(args.output, PathBuf::from("packed"));
        assert!(!args.plan);
    }

    #[test]
    fn test_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirpack.toml");
        std::fs::write(&path, "max_groups = 3\nmax_length_per_group = 500\n").unwrap();

        let args = parse(&["./repo", "--config", path.to_str().unwrap(), "--max-groups", "5"]);
        let from_file = PackConfig::from_toml_file(&path).unwrap();
        let config = args.apply_flags(from_file);
        assert_eq!(config.max_groups, 5);
        assert_eq!(config.max_length_per_group, 500);
    }

    #[test]
    fn test_zero_groups_flag_rejected() {
        let args = parse(&["./repo", "--max-groups", "0"]);
        let config = args.apply_flags(PackConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_verbose_filter() {
        assert_eq!(parse(&["./repo", "-v"]).log_filter(), "debug");
        assert_eq!(parse(&["./repo"]).log_filter(), "info");
    }
}
