//! Human-readable console output: plan preview, run summary, empty-source
//! explanation.

use packing::{DiscoveryReport, GroupStatus, GroupingPlan, PackReport};
use std::fmt::Write;

/// Sample files shown per group in the plan preview.
const PLAN_SAMPLES: usize = 3;

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn render_plan(plan: &GroupingPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Grouping plan: {} files from {} directories into {} containers",
        plan.file_count,
        plan.directory_count,
        plan.groups.len()
    );
    if plan.used_fallback() {
        let _ = writeln!(out, "(lowest-priority content merged into `misc`)");
    }
    for (idx, group) in plan.groups.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n{:>2}. {} ({} files, {}, priority {})",
            idx + 1,
            group.name,
            group.len(),
            format_size(group.total_bytes()),
            group.priority_score
        );
        for file in group.member_files.iter().take(PLAN_SAMPLES) {
            let _ = writeln!(out, "      {}", file.relative_path);
        }
        if group.len() > PLAN_SAMPLES {
            let _ = writeln!(out, "      ... and {} more", group.len() - PLAN_SAMPLES);
        }
    }
    out
}

pub fn render_report(report: &PackReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Packed {} of {} files into {} containers ({}, {} lines)",
        report.total_files_included,
        report.files_input,
        report
            .groups
            .iter()
            .filter(|g| g.container.is_some())
            .count(),
        format_size(report.total_bytes_written),
        report.total_length_written
    );
    for group in &report.groups {
        let mut line = format!(
            "  {:<24} {:>4}/{:<4} files  {:>10}  {}",
            group.name,
            group.outcome.files_included,
            group.member_count,
            format_size(group.outcome.bytes_written),
            group.status
        );
        if group.outcome.files_skipped_over_budget > 0 {
            let _ = write!(line, "  ({} over budget)", group.outcome.files_skipped_over_budget);
        }
        if let Some(error) = &group.error {
            let _ = write!(line, "  error: {error}");
        }
        let _ = writeln!(out, "{line}");
    }
    if report.total_files_failed > 0 {
        let _ = writeln!(out, "{} files could not be read", report.total_files_failed);
    }
    if report.groups_skipped_for_total_budget > 0 {
        let _ = writeln!(
            out,
            "{} containers skipped: total length cap reached",
            report.groups_skipped_for_total_budget
        );
    }
    if report.cancelled {
        let _ = writeln!(out, "Run cancelled before completion");
    }
    out
}

pub fn render_nothing_found(discovery: &DiscoveryReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "No packable files found ({} files scanned, {} empty).",
        discovery.total_scanned, discovery.empty_skipped
    );
    let unsupported = discovery.unsupported_by_frequency();
    if !unsupported.is_empty() {
        let _ = writeln!(out, "Unsupported file types:");
        for (ext, count) in unsupported {
            let _ = writeln!(out, "  {ext}: {count}");
        }
    }
    out
}

/// Groups whose container could not be produced. Non-zero fails the run.
pub fn failed_groups(report: &PackReport) -> usize {
    report
        .groups
        .iter()
        .filter(|g| g.status == GroupStatus::Failed)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use packing::{
        FileCategory, FileRecord, GroupingEngine, PackConfig, PackingOrchestrator, TextRenderer,
    };

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_plan_lists_samples() {
        let files: Vec<FileRecord> = (0..5)
            .map(|i| {
                let rel = format!("src/f{i}.rs");
                FileRecord::new(format!("/r/{rel}"), rel, 10, FileCategory::Source)
            })
            .collect();
        let plan = GroupingEngine::new(PackConfig::default())
            .unwrap()
            .plan(files)
            .unwrap();
        let text = render_plan(&plan);
        assert!(text.contains(" 1. src (5 files"));
        assert!(text.contains("src/f2.rs"));
        assert!(!text.contains("src/f3.rs"));
        assert!(text.contains("... and 2 more"));
    }

    #[test]
    fn test_nothing_found_lists_extensions() {
        let mut discovery = DiscoveryReport {
            total_scanned: 3,
            ..Default::default()
        };
        discovery.unsupported.insert(".png".into(), 3);
        let text = render_nothing_found(&discovery);
        assert!(text.contains("3 files scanned"));
        assert!(text.contains(".png: 3"));
    }

    #[tokio::test]
    async fn test_unwritable_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("a.rs"), "fn a() {}\n").unwrap();
        // A plain file where the output directory should go.
        let blocked = dir.path().join("out");
        std::fs::write(&blocked, "").unwrap();

        let files = vec![FileRecord::new(
            source.join("a.rs"),
            "src/a.rs",
            10,
            FileCategory::Source,
        )];
        let report = PackingOrchestrator::new(PackConfig::default(), TextRenderer::new(&blocked))
            .unwrap()
            .run(files)
            .await
            .unwrap();

        assert_eq!(failed_groups(&report), 1);
        assert!(render_report(&report).contains("src"));
    }

    #[test]
    fn test_empty_report_has_no_failures() {
        assert_eq!(failed_groups(&PackReport::empty()), 0);
    }
}
