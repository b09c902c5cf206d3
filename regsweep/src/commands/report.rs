//! Terminal and JSON rendering of sweep results.

use anyhow::{Context, Result};
use colored::Colorize;
use regsweep_registry::sweep::{RepositoryReport, RepositoryStatus};
use regsweep_registry::{RecommendationKind, SweepMode, SweepReport, UpdateInfo};
use std::fmt::Write as _;
use std::path::Path;

fn kind_label(kind: RecommendationKind) -> &'static str {
    match kind {
        RecommendationKind::Retention => "retention",
        RecommendationKind::Orphan => "orphan",
    }
}

fn repository_line(out: &mut String, entry: &RepositoryReport) {
    match &entry.status {
        RepositoryStatus::Processed => {
            let _ = write!(
                out,
                "  {} {} images, {} protected, {} retention, {} orphan",
                entry.repository.bold(),
                entry.images,
                entry.protected,
                entry.retention_candidates,
                entry.orphan_candidates
            );
            if entry.skipped_for_uncertainty > 0 {
                let _ = write!(
                    out,
                    " {}",
                    format!(
                        "({} untagged left alone: manifest graph unresolved)",
                        entry.skipped_for_uncertainty
                    )
                    .yellow()
                );
            }
            out.push('\n');
        }
        RepositoryStatus::Skipped { reason } => {
            let _ = writeln!(
                out,
                "  {} {} {}",
                entry.repository.bold(),
                "skipped:".yellow(),
                reason
            );
        }
    }
}

pub fn recommended_total(report: &SweepReport) -> usize {
    report
        .recommendations
        .iter()
        .map(|r| r.tags_to_delete.len())
        .sum()
}

/// Per-repository summary followed by every recommended deletion.
pub fn render_plan(report: &SweepReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "📊 Registry {} (keep {} newest per repository)",
        report.registry.bright_cyan(),
        report.keep_count
    );
    for entry in &report.repositories {
        repository_line(&mut out, entry);
    }

    let total = recommended_total(report);
    if total == 0 {
        let _ = writeln!(out, "\n✅ Nothing to delete");
        return out;
    }

    let _ = writeln!(out, "\n🗑️  Recommended for deletion ({}):", total);
    for recommendation in &report.recommendations {
        for image in &recommendation.tags_to_delete {
            let _ = writeln!(
                out,
                "  • {} [{}]",
                image.reference().bright_red(),
                kind_label(recommendation.kind)
            );
        }
    }
    out
}

/// Deleted and failed images of a `Delete` run.
pub fn render_deletions(report: &SweepReport) -> String {
    let mut out = String::new();
    if report.mode != SweepMode::Delete {
        return out;
    }
    let _ = writeln!(
        out,
        "✅ Deleted {} image(s), {} failure(s)",
        report.deleted.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        let _ = writeln!(
            out,
            "  • {} {}",
            failure.image.reference().bright_yellow(),
            failure.error
        );
    }
    out
}

pub fn render_updates(updates: &[UpdateInfo]) -> String {
    let mut out = String::new();
    if updates.is_empty() {
        let _ = writeln!(out, "✅ All deployed images are up to date");
        return out;
    }
    let _ = writeln!(out, "⬆️  Updates available:");
    for update in updates {
        let marker = if update.is_major_update {
            " (major)".red().bold().to_string()
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "  • {}/{}: {} → {}{}",
            update.current.registry,
            update.current.repository,
            update.current.tag,
            update.latest.tag.bright_green(),
            marker
        );
    }
    out
}

/// Write `report` as pretty JSON.
pub fn write_report(path: &Path, report: &SweepReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}
