//! Configuration file management for croplan.
//!
//! Provides a TOML-based config file at `~/.config/croplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use croplan_core::adjust::AdjustConfig;
use croplan_core::engine::{AgrrCli, Objective};
use croplan_core::weather::DEFAULT_MODEL;
use croplan_db::config::DbConfig;

/// Environment variable naming the `agrr` executable.
pub const AGRR_PATH_ENV: &str = "CROPLAN_AGRR_PATH";

const DEFAULT_AGRR_PATH: &str = "agrr";
const DEFAULT_TIMEOUT_SECS: u64 = 600;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub horizon: HorizonSection,
    #[serde(default)]
    pub weather: WeatherSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineSection {
    pub agrr_path: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HorizonSection {
    pub lookahead_years: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WeatherSection {
    pub model: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the croplan config directory: `$XDG_CONFIG_HOME/croplan` or
/// `~/.config/croplan`. The platform `dirs::config_dir()` is not used.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("croplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("croplan")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<ConfigFile> {
    toml::from_str(contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file may hold database credentials, so it is made owner-only on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct CroplanConfig {
    pub db_config: DbConfig,
    pub agrr_path: PathBuf,
    pub engine_timeout: Duration,
    pub lookahead_years: u32,
    pub model: String,
}

impl CroplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `CROPLAN_DATABASE_URL` > `[database] url` > `DbConfig::DEFAULT_URL`
    /// - agrr path: `CROPLAN_AGRR_PATH` > `[engine] agrr_path` > `agrr` on `PATH`
    /// - everything else: config file > default
    ///
    /// A missing config file is not an error; a malformed one is.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let path = config_path();
        let file_config = if path.exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };
        Self::from_sources(cli_db_url, file_config)
    }

    fn from_sources(cli_db_url: Option<&str>, file: ConfigFile) -> Result<Self> {
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::URL_ENV) {
            url
        } else if let Some(url) = file.database.url {
            url
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let agrr_path = std::env::var(AGRR_PATH_ENV)
            .ok()
            .or(file.engine.agrr_path)
            .unwrap_or_else(|| DEFAULT_AGRR_PATH.to_string());

        let timeout_secs = file.engine.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            anyhow::bail!("engine.timeout_secs must be greater than zero");
        }

        Ok(Self {
            db_config: DbConfig::new(db_url),
            agrr_path: PathBuf::from(agrr_path),
            engine_timeout: Duration::from_secs(timeout_secs),
            lookahead_years: file.horizon.lookahead_years.unwrap_or(0),
            model: file
                .weather
                .model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    pub fn agrr(&self) -> AgrrCli {
        AgrrCli::new(&self.agrr_path).with_timeout(self.engine_timeout)
    }

    pub fn adjust_config(&self, objective: Objective) -> AdjustConfig {
        AdjustConfig {
            lookahead_years: self.lookahead_years,
            optimizer_timeout: self.engine_timeout,
            objective,
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    const FULL: &str = r#"
[database]
url = "postgresql://file:5432/filedb"

[engine]
agrr_path = "/opt/agrr/bin/agrr"
timeout_secs = 90

[horizon]
lookahead_years = 2

[weather]
model = "arima"
"#;

    #[test]
    fn full_config_file_is_applied() {
        let _lock = lock_env();
        unsafe { std::env::remove_var(DbConfig::URL_ENV) };
        unsafe { std::env::remove_var(AGRR_PATH_ENV) };

        let config = CroplanConfig::from_sources(None, parse_config(FULL).unwrap()).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.agrr_path, PathBuf::from("/opt/agrr/bin/agrr"));
        assert_eq!(config.engine_timeout, Duration::from_secs(90));
        assert_eq!(config.lookahead_years, 2);
        assert_eq!(config.model, "arima");

        let adjust = config.adjust_config(Objective::MinimizeCost);
        assert_eq!(adjust.lookahead_years, 2);
        assert_eq!(adjust.optimizer_timeout, Duration::from_secs(90));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let _lock = lock_env();
        unsafe { std::env::remove_var(DbConfig::URL_ENV) };
        unsafe { std::env::remove_var(AGRR_PATH_ENV) };

        let config = CroplanConfig::from_sources(None, parse_config("").unwrap()).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.agrr_path, PathBuf::from("agrr"));
        assert_eq!(config.engine_timeout, Duration::from_secs(600));
        assert_eq!(config.lookahead_years, 0);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn cli_flag_overrides_env_and_file() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };

        let config = CroplanConfig::from_sources(
            Some("postgresql://cli:5432/clidb"),
            parse_config(FULL).unwrap(),
        )
        .unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        unsafe { std::env::remove_var(DbConfig::URL_ENV) };
    }

    #[test]
    fn env_overrides_file() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(AGRR_PATH_ENV, "/usr/local/bin/agrr") };

        let config = CroplanConfig::from_sources(None, parse_config(FULL).unwrap()).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.agrr_path, PathBuf::from("/usr/local/bin/agrr"));

        unsafe { std::env::remove_var(DbConfig::URL_ENV) };
        unsafe { std::env::remove_var(AGRR_PATH_ENV) };
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let _lock = lock_env();
        let file = parse_config("[engine]\ntimeout_secs = 0\n").unwrap();
        let err = CroplanConfig::from_sources(None, file).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn unknown_types_are_a_parse_error() {
        assert!(parse_config("[horizon]\nlookahead_years = \"two\"\n").is_err());
    }

    #[test]
    fn resolve_without_config_file_uses_defaults() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        unsafe { std::env::remove_var(DbConfig::URL_ENV) };

        let result = CroplanConfig::resolve(None);

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let config = result.expect("missing file is not an error");
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
    }

    #[test]
    fn save_then_resolve_reads_the_file() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        unsafe { std::env::remove_var(DbConfig::URL_ENV) };

        let file = ConfigFile {
            database: DatabaseSection {
                url: Some("postgresql://saved:5432/saved".into()),
            },
            ..ConfigFile::default()
        };
        let saved = save_config(&file);
        let resolved = CroplanConfig::resolve(None);
        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        saved.expect("save config");
        assert!(path.starts_with(tmp.path()));
        assert_eq!(
            resolved.unwrap().db_config.database_url,
            "postgresql://saved:5432/saved"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(&path).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("croplan/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
