//! Configuration file and settings types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default TCP port used as the single-instance token.
pub const DEFAULT_INSTANCE_PORT: u16 = 40738;

/// Default user agent for every request.
pub const DEFAULT_USER_AGENT: &str = "bong download manager/1.0";

/// Name of the catalog database inside the data directory.
pub const DATABASE_FILE: &str = "Recordings.db";

/// Remote service address and credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Host name, or a full base URL including the scheme.
    pub server: String,
    pub username: String,
    pub password: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: "www.bong.tv".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl ServiceConfig {
    /// Base URL without trailing slash; plain host names get `http://`.
    #[must_use]
    pub fn base_url(&self) -> String {
        let server = self.server.trim().trim_end_matches('/');
        if server.contains("://") {
            server.to_string()
        } else {
            format!("http://{server}")
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

/// General behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    /// Log at debug level.
    pub verbose: bool,
    /// Lifespan of cached service replies; 0 disables the cache.
    pub cache_life_minutes: u64,
    /// Local port bound to keep a second instance from starting.
    pub instance_port: u16,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            cache_life_minutes: 30,
            instance_port: DEFAULT_INSTANCE_PORT,
        }
    }
}

impl OptionsConfig {
    /// Cache lifespan as a duration.
    #[must_use]
    pub const fn cache_lifespan(&self) -> Duration {
        Duration::from_secs(self.cache_life_minutes.saturating_mul(60))
    }
}

/// Directory and file locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Holds the catalog database and the reply cache.
    pub data_dir: PathBuf,
    /// Holds one subdirectory per downloaded recording.
    pub recordings_dir: PathBuf,
    /// Log destination; stderr when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bong-dl");
        Self {
            recordings_dir: data_dir.join("rec"),
            data_dir,
            log_file: None,
        }
    }
}

impl PathConfig {
    /// Path of the catalog database.
    #[must_use]
    pub fn database(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

/// Settings for file transfers and service requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Additional attempts after a failed one.
    pub retries: u32,
    /// Connect and read timeout in seconds.
    pub timeout_secs: u64,
    /// Pause between attempts in seconds.
    pub retry_delay_secs: u64,
    /// Rate limit for transfers; 0 means unlimited.
    pub max_bytes_per_second: u64,
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            timeout_secs: 30,
            retry_delay_secs: 2,
            max_bytes_per_second: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TransferConfig {
    /// Sets the number of retries.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub const fn with_retry_delay_secs(mut self, secs: u64) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub const fn with_max_bytes_per_second(mut self, limit: u64) -> Self {
        self.max_bytes_per_second = limit;
        self
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Complete application configuration as read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub options: OptionsConfig,
    pub paths: PathConfig,
    pub transfer: TransferConfig,
}

impl AppConfig {
    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bong-dl")
            .join("config.toml")
    }

    /// Loads the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Checks that credentials are set and the directories exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.service.username.trim().is_empty() || self.service.password.is_empty() {
            return Err(Error::Config(
                "username and password must be set in [service]".to_string(),
            ));
        }
        for (name, dir) in [
            ("data_dir", &self.paths.data_dir),
            ("recordings_dir", &self.paths.recordings_dir),
        ] {
            if !dir.is_dir() {
                return Err(Error::Config(format!(
                    "{name} {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Effective settings for the start-of-run log, password masked.
    #[must_use]
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let paths = &self.paths;
        vec![
            ("server", self.service.base_url()),
            ("username", self.service.username.clone()),
            ("password", mask(&self.service.password)),
            ("verbose", self.options.verbose.to_string()),
            ("cache_life_minutes", self.options.cache_life_minutes.to_string()),
            ("data_dir", paths.data_dir.display().to_string()),
            ("recordings_dir", paths.recordings_dir.display().to_string()),
            (
                "log_file",
                paths
                    .log_file
                    .as_ref()
                    .map_or_else(|| "stderr".to_string(), |p| p.display().to_string()),
            ),
            ("retries", self.transfer.retries.to_string()),
            ("timeout_secs", self.transfer.timeout_secs.to_string()),
            (
                "max_bytes_per_second",
                self.transfer.max_bytes_per_second.to_string(),
            ),
        ]
    }

    /// A commented configuration file with the default settings.
    #[must_use]
    pub fn template() -> String {
        let defaults = Self::default();
        format!(
            "# bong-dl configuration\n\
             \n\
             [service]\n\
             server = \"{server}\"\n\
             username = \"\"\n\
             password = \"\"\n\
             \n\
             [options]\n\
             verbose = false\n\
             # Minutes a cached reply stays valid, 0 disables the cache.\n\
             cache_life_minutes = {cache}\n\
             instance_port = {port}\n\
             \n\
             [paths]\n\
             # Both directories must exist.\n\
             data_dir = {data:?}\n\
             recordings_dir = {rec:?}\n\
             # log_file = \"/var/log/bong-dl.log\"\n\
             \n\
             [transfer]\n\
             retries = {retries}\n\
             timeout_secs = {timeout}\n\
             retry_delay_secs = {delay}\n\
             max_bytes_per_second = 0\n\
             user_agent = \"{ua}\"\n",
            server = defaults.service.server,
            cache = defaults.options.cache_life_minutes,
            port = defaults.options.instance_port,
            data = defaults.paths.data_dir.display().to_string(),
            rec = defaults.paths.recordings_dir.display().to_string(),
            retries = defaults.transfer.retries,
            timeout = defaults.transfer.timeout_secs,
            delay = defaults.transfer.retry_delay_secs,
            ua = defaults.transfer.user_agent,
        )
    }

    /// Writes [`template`](Self::template) to `path` unless a file exists.
    ///
    /// Returns `false` when the file was already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write_template(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::template())?;

        // The file will hold credentials.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(true)
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.options.cache_life_minutes, 30);
        assert_eq!(config.options.instance_port, 40738);
        assert_eq!(config.transfer.retries, 5);
        assert_eq!(config.transfer.timeout(), Duration::from_secs(30));
        assert_eq!(config.transfer.user_agent, "bong download manager/1.0");
        assert!(config.paths.data_dir.to_string_lossy().contains("bong-dl"));
        assert!(config.paths.database().ends_with("Recordings.db"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            "[service]\nusername = \"alice\"\npassword = \"pw\"\n[options]\ncache_life_minutes = 0\n",
        )
        .unwrap();
        assert_eq!(config.service.username, "alice");
        assert_eq!(config.service.server, "www.bong.tv");
        assert_eq!(config.options.cache_lifespan(), Duration::ZERO);
        assert_eq!(config.transfer.retries, 5);
    }

    #[test]
    fn base_url_adds_scheme_when_missing() {
        let mut service = ServiceConfig::default();
        assert_eq!(service.base_url(), "http://www.bong.tv");
        service.server = "https://example.tv/".into();
        assert_eq!(service.base_url(), "https://example.tv");
    }

    #[test]
    fn password_is_masked() {
        let mut config = AppConfig::default();
        config.service.password = "hunter2".into();
        assert!(!format!("{config:?}").contains("hunter2"));
        assert!(config.summary().iter().all(|(_, v)| !v.contains("hunter2")));
    }

    #[test]
    fn validate_requires_credentials_and_dirs() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.paths.data_dir = dir.path().to_path_buf();
        config.paths.recordings_dir = dir.path().join("rec");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.service.username = "alice".into();
        config.service.password = "pw".into();
        assert!(config.validate().is_err());

        std::fs::create_dir(dir.path().join("rec")).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn template_parses_to_defaults() {
        let parsed: AppConfig = toml::from_str(&AppConfig::template()).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn write_template_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bong-dl").join("config.toml");
        assert!(AppConfig::write_template(&path).unwrap());
        std::fs::write(&path, "[service]\n").unwrap();
        assert!(!AppConfig::write_template(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[service]\n");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            AppConfig::load(&dir.path().join("missing.toml")),
            Err(Error::Config(_))
        ));
    }
}
