use std::fs;
use std::path::Path;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub runup: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const RUNUP_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            runup: Self::RUNUP_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.runup.clone();
        self.runup = self.runup.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.runup.as_str()) {
            eprintln!(
                "Config error: runup log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::RUNUP_LEVEL
            );
            self.runup = Self::RUNUP_LEVEL.to_owned();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Deflated,
    Stored,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ArchiveConfig {
    compression: String,
}

impl ArchiveConfig {
    const COMPRESSIONS: [&str; 2] = ["deflated", "stored"];

    const COMPRESSION_DEFLATED: &str = "deflated";
    const COMPRESSION_STORED: &str = "stored";

    pub fn compression(&self) -> Compression {
        // ensure_valid leaves one of the two known values behind
        match self.compression.as_str() {
            Self::COMPRESSION_STORED => Compression::Stored,
            _ => Compression::Deflated,
        }
    }

    fn default() -> Self {
        ArchiveConfig {
            compression: Self::COMPRESSION_DEFLATED.to_owned(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.compression.clone();
        self.compression = self.compression.trim().to_ascii_lowercase();
        if !Self::COMPRESSIONS.contains(&self.compression.as_str()) {
            eprintln!(
                "Config error: compression of '{}' is invalid - using default of '{}'",
                str_original,
                Self::COMPRESSION_DEFLATED
            );
            self.compression = Self::COMPRESSION_DEFLATED.to_owned();
        }
    }
}

/// Tool-level settings. Unrelated to the runup.yaml of a backup root.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub archive: ArchiveConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file located in the app's data directory,
    /// with `RUNUP_` environment variables layered on top (e.g. `RUNUP_LOGGING__RUNUP=debug`).
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        let config_path = project_dirs.data_local_dir().join("config.toml");
        let default_config = Config::default();

        // If the config file doesn't exist, write the default configuration to disk.
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(&config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Self {
        // Build a Figment instance that uses the defaults merged with the TOML file (if it exists)
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("RUNUP_").split("__"));

        // Attempt to extract the configuration; on error, log a message and fall back to defaults.
        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            Config::default()
        });

        config.ensure_valid();

        config
    }

    /// The loaded configuration, or defaults when nothing was loaded.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::default)
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.archive.ensure_valid();
    }
}
