use crate::error::{MigrationError, Result};
use crate::store::StoreConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "GAMELOG_CONFIG";
pub const DB_PATH_ENV: &str = "GAMELOG_DB";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub inputs: InputConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Locations of the flat input files. Relative file names resolve against
/// `directory`.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_input_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_game_log")]
    pub game_log: PathBuf,
    #[serde(default = "default_park_codes")]
    pub park_codes: PathBuf,
    #[serde(default = "default_person_codes")]
    pub person_codes: PathBuf,
    #[serde(default = "default_team_codes")]
    pub team_codes: PathBuf,
    /// Optional override for the built-in appearance catalog.
    #[serde(default)]
    pub appearance_types: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_true")]
    pub drop_raw_tables: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_game_log() -> PathBuf {
    PathBuf::from("game_log.csv")
}

fn default_park_codes() -> PathBuf {
    PathBuf::from("park_codes.csv")
}

fn default_person_codes() -> PathBuf {
    PathBuf::from("person_codes.csv")
}

fn default_team_codes() -> PathBuf {
    PathBuf::from("team_codes.csv")
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    5_000
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            drop_raw_tables: true,
            batch_size: default_batch_size(),
            report_path: None,
        }
    }
}

impl InputConfig {
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.directory.join(file)
        }
    }

    pub fn game_log_path(&self) -> PathBuf {
        self.resolve(&self.game_log)
    }

    pub fn park_codes_path(&self) -> PathBuf {
        self.resolve(&self.park_codes)
    }

    pub fn person_codes_path(&self) -> PathBuf {
        self.resolve(&self.person_codes)
    }

    pub fn team_codes_path(&self) -> PathBuf {
        self.resolve(&self.team_codes)
    }

    pub fn appearance_types_path(&self) -> Option<PathBuf> {
        self.appearance_types.as_deref().map(|p| self.resolve(p))
    }
}

impl Config {
    /// Loads the config from an explicit path, `GAMELOG_CONFIG`, or
    /// `config.toml`, in that order. `GAMELOG_DB` overrides the store path.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            MigrationError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&config_content)?;
        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            if !db_path.trim().is_empty() {
                config.store.path = PathBuf::from(db_path);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.migration.batch_size == 0 {
            return Err(MigrationError::Config(
                "migration.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(MigrationError::Config("store.path must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ForeignKeys;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [store]
            path = "mlb.db"
            foreign_keys = "enforced"

            [inputs]
            directory = "fixtures"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.foreign_keys, ForeignKeys::Enforced);
        assert_eq!(config.inputs.game_log_path(), PathBuf::from("fixtures/game_log.csv"));
        assert!(config.inputs.appearance_types_path().is_none());
        assert!(config.migration.drop_raw_tables);
        assert_eq!(config.migration.batch_size, 5_000);
    }

    #[test]
    fn test_foreign_key_setting_is_mandatory() {
        let result = Config::from_toml_str(
            r#"
            [store]
            path = "mlb.db"

            [inputs]
            "#,
        );
        assert!(matches!(result, Err(MigrationError::Toml(_))));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let result = Config::from_toml_str(
            r#"
            [store]
            path = "mlb.db"
            foreign_keys = "enforced"

            [inputs]

            [migration]
            batch_size = 0
            "#,
        );
        assert!(matches!(result, Err(MigrationError::Config(_))));
    }

    #[test]
    fn test_absolute_input_paths_are_kept() {
        let config = Config::from_toml_str(
            r#"
            [store]
            path = "mlb.db"
            foreign_keys = "disabled"

            [inputs]
            directory = "data"
            team_codes = "/srv/retro/team_codes.csv"
            appearance_types = "appearance_type.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.inputs.team_codes_path(), PathBuf::from("/srv/retro/team_codes.csv"));
        assert_eq!(
            config.inputs.appearance_types_path(),
            Some(PathBuf::from("data/appearance_type.csv"))
        );
    }
}
