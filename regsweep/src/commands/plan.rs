//! `regsweep plan`: recommendations only, never deletes.

use super::{connect, deployed::collect_deployed, report, sweep_options};
use crate::cli::DeployedArgs;
use anyhow::Result;
use regsweep_config::SweepConfig;
use regsweep_registry::{SweepMode, Sweeper};
use std::path::Path;
use tracing::info;

pub fn handle_plan(
    config: &SweepConfig,
    deployed: &DeployedArgs,
    report_path: Option<&Path>,
) -> Result<()> {
    let deployed = collect_deployed(deployed)?;
    let backend = connect(config)?;

    let mut sweeper = Sweeper::new(backend, sweep_options(config));
    let report = sweeper.run(&deployed, SweepMode::Plan);
    print!("{}", report::render_plan(&report));

    if let Some(path) = report_path {
        report::write_report(path, &report)?;
        info!(path = %path.display(), "Plan written");
    }
    Ok(())
}
