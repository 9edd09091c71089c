use std::path::{Path, PathBuf};

use log::info;

use crate::config::{
    load_config, loader::bundled_config_path, validate_config, Config, MissingSymbolPolicy,
};
use crate::error::Result;

/// Command-line settings that take precedence over the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub min_interval_ms: Option<u64>,
    pub cache_dir: Option<PathBuf>,
    pub skip_missing: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(batch_size) = self.batch_size {
            config.api.batch_size = batch_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.api.concurrency = concurrency;
        }
        if let Some(interval) = self.min_interval_ms {
            config.api.min_interval_ms = interval;
        }
        if let Some(dir) = &self.cache_dir {
            config.api.cache_dir = Some(dir.clone());
        }
        if self.skip_missing {
            config.on_missing = MissingSymbolPolicy::Skip;
        }
    }
}

/// Pick the explicit config file, else the bundled one under `root`, else the builtin defaults.
pub fn resolve_config(
    explicit: Option<&Path>,
    root: &Path,
    overrides: &Overrides,
) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_config(path)?
        }
        None => {
            let bundled = bundled_config_path(root, "sp500");
            if bundled.exists() {
                info!("Loading configuration from {}", bundled.display());
                load_config(&bundled)?
            } else {
                info!("Using builtin configuration");
                Config::builtin()
            }
        }
    };

    overrides.apply(&mut config);
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_builtin_without_bundled_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve_config(None, dir.path(), &Overrides::default()).unwrap();
        assert_eq!(config.api.batch_size, Config::builtin().api.batch_size);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let overrides = Overrides {
            batch_size: Some(10),
            concurrency: Some(3),
            skip_missing: true,
            ..Overrides::default()
        };

        let config = resolve_config(None, root, &overrides).unwrap();

        assert_eq!(config.api.batch_size, 10);
        assert_eq!(config.api.concurrency, 3);
        assert_eq!(config.on_missing, MissingSymbolPolicy::Skip);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            batch_size: Some(0),
            ..Overrides::default()
        };

        let err = resolve_config(None, dir.path(), &overrides).unwrap_err();
        assert!(err.to_string().contains("batch_size"), "{err}");
    }
}
