//! `regsweep sweep`: plan, confirm, then delete.

use super::{connect, deployed::collect_deployed, report, sweep_options};
use crate::cli::DeployedArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use is_terminal::IsTerminal;
use regsweep_config::SweepConfig;
use regsweep_registry::deletion::DeletionExecutor;
use regsweep_registry::{SweepMode, Sweeper};
use std::path::Path;
use tracing::info;

pub fn handle_sweep(
    config: &SweepConfig,
    deployed: &DeployedArgs,
    force: bool,
    yes: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let deployed = collect_deployed(deployed)?;
    let backend = connect(config)?;

    let mut sweeper = Sweeper::new(backend, sweep_options(config));
    let mut report = sweeper.run(&deployed, SweepMode::Plan);
    print!("{}", report::render_plan(&report));

    let pending = report::recommended_total(&report);
    if !deletion_enabled(config, force) {
        if pending > 0 {
            println!(
                "\n{} cleanup_enabled is false, nothing was deleted (use --force to delete anyway)",
                "ℹ️ ".bright_blue()
            );
        }
    } else if pending > 0 {
        if confirm_deletion(pending, force || yes)? {
            println!("\n🗑️  Deleting {} image(s)...", pending);
            let outcome =
                DeletionExecutor::new(sweeper.catalog_mut()).execute(&report.recommendations);
            report.mode = SweepMode::Delete;
            report.deleted = outcome.deleted;
            report.failed = outcome.failed;
            print!("{}", report::render_deletions(&report));
        } else {
            println!("❌ Cancelled");
        }
    }

    if let Some(path) = report_path {
        report::write_report(path, &report)?;
        info!(path = %path.display(), "Sweep report written");
    }
    Ok(())
}

fn deletion_enabled(config: &SweepConfig, force: bool) -> bool {
    force || config.cleanup_enabled
}

/// Ask before deleting, unless told not to or nobody is there to answer.
fn confirm_deletion(pending: usize, skip_prompt: bool) -> Result<bool> {
    if skip_prompt || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Delete {} image(s) from the registry?", pending))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deletion_requires_cleanup_or_force() {
        let mut config = SweepConfig::default();
        assert!(!deletion_enabled(&config, false));
        assert!(deletion_enabled(&config, true));
        config.cleanup_enabled = true;
        assert!(deletion_enabled(&config, false));
    }

    #[test]
    fn test_skip_prompt_confirms_without_asking() {
        assert!(confirm_deletion(3, true).expect("should not prompt"));
    }
}
