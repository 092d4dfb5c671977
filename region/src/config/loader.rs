//! Reading the region config from disk.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;

use crate::config::RegionConfig;

/// Reads and parses the region config from a TOML file.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<RegionConfig> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(path_ref).await.wrap_err(format!(
        "Failed to read config file at: {}",
        path_ref.display()
    ))?;
    let config: RegionConfig = toml::from_str(&content).wrap_err(format!(
        "Failed to parse config as TOML at: {}",
        path_ref.display()
    ))?;
    Ok(config)
}
