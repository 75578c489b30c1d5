use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    const PATH: &str = "data/ewcs.db";
    const BUSY_TIMEOUT_MS: u64 = 5000;

    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from(Self::PATH),
            busy_timeout_ms: Self::BUSY_TIMEOUT_MS,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for log files. When absent, logs go to stderr only.
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const LEVEL: &str = "info";
    const DIRECTORY: &str = "logs";

    fn default() -> Self {
        LoggingConfig {
            level: Self::LEVEL.to_owned(),
            directory: Some(PathBuf::from(Self::DIRECTORY)),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.level.clone();
        self.level = self.level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.level.as_str()) {
            eprintln!(
                "Config error: log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::LEVEL
            );
            self.level = Self::LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub const FILE_NAME: &str = "ewcs-migrate.toml";
    pub const ENV_PREFIX: &str = "EWCS_MIGRATE_";

    /// Loads configuration from defaults, then the TOML file at `config_path` (if it
    /// exists), then `EWCS_MIGRATE_*` environment variables (`__` separates sections,
    /// e.g. `EWCS_MIGRATE_DATABASE__PATH`). On any error the defaults are used.
    pub fn load_config(config_path: &Path) -> Self {
        let mut config = Self::figment(config_path)
            .extract()
            .unwrap_or_else(|err| {
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

    fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load_config(Path::new(Config::FILE_NAME));
            assert_eq!(config, Config::default());
            assert_eq!(config.database.path, PathBuf::from("data/ewcs.db"));
            assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                Config::FILE_NAME,
                r#"
                [database]
                path = "/srv/ewcs/ewcs.db"
                busy_timeout_ms = 250

                [logging]
                level = "debug"
                "#,
            )?;
            jail.set_env("EWCS_MIGRATE_DATABASE__PATH", "override.db");

            let config = Config::load_config(Path::new(Config::FILE_NAME));
            assert_eq!(config.database.path, PathBuf::from("override.db"));
            assert_eq!(config.database.busy_timeout_ms, 250);
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.directory, Some(PathBuf::from("logs")));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_log_level_falls_back() {
        Jail::expect_with(|jail| {
            jail.create_file(Config::FILE_NAME, "[logging]\nlevel = \" LOUD \"\n")?;
            let config = Config::load_config(Path::new(Config::FILE_NAME));
            assert_eq!(config.logging.level, "info");
            Ok(())
        });
    }

    #[test]
    fn test_level_is_normalized() {
        Jail::expect_with(|jail| {
            jail.create_file(Config::FILE_NAME, "[logging]\nlevel = \" WARN\"\n")?;
            let config = Config::load_config(Path::new(Config::FILE_NAME));
            assert_eq!(config.logging.level, "warn");
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(Config::FILE_NAME, "[database]\nbusy_timeout_ms = \"soon\"\n")?;
            let config = Config::load_config(Path::new(Config::FILE_NAME));
            assert_eq!(config, Config::default());
            Ok(())
        });
    }
}
