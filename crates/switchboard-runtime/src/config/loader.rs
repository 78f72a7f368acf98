//! Configuration loader using figment.
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides passed to [`ConfigLoader::merge`]
//! 3. Profile-specific config file (`switchboard.{profile}.toml`)
//! 4. Main config file (`switchboard.toml` / `switchboard.yaml`)
//! 5. Environment variables (`SWITCHBOARD_*`)
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML configuration files (`switchboard.toml`, `config.toml`)
//! - `yaml-config`: enables YAML configuration files (`switchboard.yaml`, `switchboard.yml`, etc.)
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `SWITCHBOARD_` prefix with `__` as separator:
//!
//! - `SWITCHBOARD_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `SWITCHBOARD_SERVER__PORT=9000` → `server.port = 9000`
//! - `SWITCHBOARD_DISPATCH__ROUTE_FIELD=path` → `dispatch.route_field = "path"`
//!
//! # Example
//!
//! ```rust,ignore
//! use switchboard_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/switchboard.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::SwitchboardConfig;

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "SWITCHBOARD_";

/// Environment variable selecting the profile.
const PROFILE_ENV: &str = "SWITCHBOARD_PROFILE";

/// Directory name under the user config dir.
const APP_DIR: &str = "switchboard";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Parses a profile name. `prod` and `dev` are accepted as aliases.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads the profile from `SWITCHBOARD_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides.
    figment: Figment,
    /// Configuration profile.
    profile: Profile,
    /// Search paths for configuration files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds the user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join(APP_DIR)),
            None => self,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<SwitchboardConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: SwitchboardConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            server_addr = %config.server.addr(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(SwitchboardConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    /// Merges a single config file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(APP_DIR));
        }
        paths
    }

    /// Searches `search_paths × base_names`, merging a profile variant before
    /// the base file. Stops at the first base file found.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["switchboard.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &[
                    "switchboard.yaml",
                    "switchboard.yml",
                    "config.yaml",
                    "config.yml",
                ],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.dispatch.route_field, "reqPath");
            Ok(())
        });
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("Development"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env(PROFILE_ENV, "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("SWITCHBOARD_SERVER__PORT", "9100");
            jail.set_env("SWITCHBOARD_DISPATCH__ROUTE_FIELD", "path");
            jail.set_env("SWITCHBOARD_LOGGING__LEVEL", "debug");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.server.port, 9100);
            assert_eq!(config.dispatch.route_field, "path");
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            let result = ConfigLoader::new()
                .file(jail.directory().join("absent.toml"))
                .without_env()
                .load();
            assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_below_main_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "switchboard.production.toml",
                r#"
                [server]
                port = 7000
                path = "/prod"
                "#,
            )?;
            jail.create_file(
                "switchboard.toml",
                r#"
                [server]
                port = 7100

                [dispatch]
                reply_unknown_path = true
                "#,
            )?;

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.server.port, 7100);
            assert_eq!(config.server.path, "/prod");
            assert!(config.dispatch.reply_unknown_path);
            Ok(())
        });
    }
}
