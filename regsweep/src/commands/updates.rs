//! `regsweep updates`: newer versions of deployed images.

use super::{connect, deployed::collect_deployed, report};
use crate::cli::DeployedArgs;
use anyhow::Result;
use regsweep_config::SweepConfig;
use regsweep_registry::updates::check_image_updates;
use regsweep_registry::RepositoryCatalog;

pub fn handle_updates(config: &SweepConfig, deployed: &DeployedArgs) -> Result<()> {
    let deployed = collect_deployed(deployed)?;
    let mut catalog = RepositoryCatalog::new(connect(config)?);

    let updates = check_image_updates(&mut catalog, &deployed);
    print!("{}", report::render_updates(&updates));
    Ok(())
}
