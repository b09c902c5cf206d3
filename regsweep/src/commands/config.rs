use anyhow::{Context, Result};
use colored::Colorize;
use regsweep_config::SweepConfig;

/// Print the effective configuration after file and environment overrides.
pub fn handle_config(config: &SweepConfig) -> Result<()> {
    let yaml = config.to_yaml().context("Failed to render configuration")?;
    println!("{}", "⚙️  Effective configuration".bold());
    print!("{}", yaml);

    match config.resolved_docker_config_path() {
        Ok(path) => println!("# credentials: {}", path.display()),
        Err(e) => println!("# credentials: {}", e.to_string().yellow()),
    }
    if let Err(e) = config.validate() {
        println!("{} {}", "⚠️ ".yellow(), e);
    }
    Ok(())
}
