pub mod check;
pub mod run;

use crate::config::Config;
use anyhow::Result;
use std::path::Path;

/// Load and validate the configuration, or fall back to the defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}
