use std::path::Path;
use std::sync::OnceLock;

use output_gov::Config;
use output_gov::error::ConfigError;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Loads the config file if one was given. Later calls keep the first value.
pub fn init(path: Option<&Path>) -> Result<(), ConfigError> {
    let config = match path {
        Some(path) => {
            log::info!("Config: loading {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    let _ = CONFIG.set(config);
    Ok(())
}

pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
