// Command handlers

use crate::cli::{Args, Command};
use anyhow::{Context, Result};
use regsweep_config::SweepConfig;
use regsweep_registry::credentials::DockerCredentials;
use regsweep_registry::distribution::DistributionSettings;
use regsweep_registry::sweep::SweepOptions;
use regsweep_registry::DistributionBackend;
use std::path::Path;
use tracing::debug;

pub mod config;
pub mod deployed;
pub mod plan;
pub mod report;
pub mod sweep;
pub mod updates;

/// Main command dispatcher
#[must_use = "command execution results should be handled"]
pub fn execute_command(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Plan { deployed, report } => {
            debug!("Handling plan command");
            plan::handle_plan(&config, &deployed, report.as_deref())
        }
        Command::Sweep {
            deployed,
            force,
            yes,
            report,
        } => {
            debug!(force, yes, "Handling sweep command");
            sweep::handle_sweep(&config, &deployed, force, yes, report.as_deref())
        }
        Command::Updates { deployed } => {
            debug!("Handling updates command");
            updates::handle_updates(&config, &deployed)
        }
        Command::Config => config::handle_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<SweepConfig> {
    let config = SweepConfig::load(path).context("Failed to load configuration")?;
    debug!(registry = %config.registry, "Configuration loaded");
    Ok(config)
}

/// Validate `config` and build the registry backend it describes.
pub(crate) fn connect(config: &SweepConfig) -> Result<DistributionBackend> {
    config.validate()?;

    let credentials_path = config.resolved_docker_config_path()?;
    let credentials = DockerCredentials::load(&credentials_path)
        .with_context(|| format!("Failed to read credentials from {}", credentials_path.display()))?;
    if credentials.basic_for(&config.registry).is_none() {
        debug!(
            registry = %config.registry,
            path = %credentials_path.display(),
            "No stored credential for registry"
        );
    }

    let settings = DistributionSettings {
        registry: config.registry.clone(),
        plain_http: config.plain_http,
        namespaces: config.namespaces.clone(),
        timeout: config.request_timeout(),
        page_size: config.max_tags_per_page,
    };
    Ok(DistributionBackend::new(settings, credentials)?)
}

pub(crate) fn sweep_options(config: &SweepConfig) -> SweepOptions {
    SweepOptions {
        keep_count: config.keep_count,
        orphan_cleanup: config.orphan_cleanup_enabled,
        extra_repositories: config.extra_repositories.clone(),
    }
}
