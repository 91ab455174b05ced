// src/config.rs
// Configuration system for dirserve

use arc_swap::ArcSwap;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::middleware::rate_limit::Rate;
use crate::serve::listing::DEFAULT_TIME_FORMAT;

pub const ENV_PREFIX: &str = "DIRSERVE_";
pub const MODE_VAR: &str = "DIRSERVE_MODE";
pub const DEFAULT_MODE: &str = "development";
const CONFIG_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];
const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Accept `8080` as well as `"8080"` for port settings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(text) => text,
        Port::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    #[serde(deserialize_with = "string_or_number")]
    pub port: String,
    pub basic: bool,
    pub user: String,
    pub gzip: bool,
    #[serde(rename = "logdir")]
    pub log_dir: String,
    #[serde(rename = "ratelimiter")]
    pub rate_limiter: String,
    #[serde(rename = "readtimeout")]
    pub read_timeout: u64,
    #[serde(rename = "writetimeout")]
    pub write_timeout: u64,
    #[serde(rename = "wwwroot")]
    pub www_root: String,
    #[serde(rename = "autoindextimeformat")]
    pub autoindex_time_format: String,
    #[serde(rename = "autoindexexactsize")]
    pub autoindex_exact_size: bool,
    #[serde(rename = "previewhtml")]
    pub preview_html: bool,
    #[serde(rename = "enablehttps")]
    pub enable_https: bool,
    #[serde(rename = "httpsport", deserialize_with = "string_or_number")]
    pub https_port: String,
    #[serde(rename = "httpscertfile")]
    pub https_cert_file: String,
    #[serde(rename = "httpskeyfile")]
    pub https_key_file: String,
    /// Bytes per second per download, `<= 0` means unlimited
    #[serde(rename = "speedlimiter")]
    pub speed_limiter: i64,
    #[serde(rename = "refererlimiter")]
    pub referer_limiter: bool,
    pub etag: bool,
    #[serde(rename = "followsymlinks")]
    pub follow_symlinks: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: String::new(),
            port: String::new(),
            basic: false,
            user: "admin:admin".to_string(),
            gzip: true,
            log_dir: String::new(),
            rate_limiter: String::new(),
            read_timeout: 10,
            write_timeout: 10,
            www_root: String::new(),
            autoindex_time_format: DEFAULT_TIME_FORMAT.to_string(),
            autoindex_exact_size: false,
            preview_html: true,
            enable_https: false,
            https_port: String::new(),
            https_cert_file: String::new(),
            https_key_file: String::new(),
            speed_limiter: 0,
            referer_limiter: false,
            etag: true,
            follow_symlinks: false,
        }
    }
}

impl AppConfig {
    pub fn www_root_path(&self) -> PathBuf {
        if self.www_root.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.www_root)
        }
    }

    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        }
    }

    /// Per-download limit in bytes per second, if any.
    pub fn speed_limit(&self) -> Option<u64> {
        (self.speed_limiter > 0).then_some(self.speed_limiter as u64)
    }

    /// `user:password`, split on the first colon.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.user.split_once(':')
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.basic && self.credentials().is_none() {
            return Err(ConfigError::ValidationError(
                "user must have the form user:password when basic auth is enabled".to_string(),
            ));
        }

        if !self.rate_limiter.is_empty() {
            Rate::parse(&self.rate_limiter)
                .map_err(|e| ConfigError::ValidationError(format!("ratelimiter: {}", e)))?;
        }

        let format_ok = !StrftimeItems::new(&self.autoindex_time_format)
            .any(|item| matches!(item, Item::Error));
        if !format_ok {
            return Err(ConfigError::ValidationError(format!(
                "invalid autoindextimeformat: {}",
                self.autoindex_time_format
            )));
        }

        for (key, port) in [("port", &self.port), ("httpsport", &self.https_port)] {
            if !port.is_empty() && port.parse::<u16>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "{} is not a valid port: {}",
                    key, port
                )));
            }
        }

        if self.enable_https && self.https_cert_file.is_empty() != self.https_key_file.is_empty() {
            return Err(ConfigError::ValidationError(
                "httpscertfile and httpskeyfile must be given together".to_string(),
            ));
        }

        let root = self.www_root_path();
        if !root.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "wwwroot is not a directory: {}",
                root.display()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub version: String,
    pub app: AppConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    FileNotFound(String),
    ParseError(String),
    ValidationError(String),
    IoError(std::io::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Configuration file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigError::ValidationError(msg) => {
                write!(f, "Configuration validation failed: {}", msg)
            }
            ConfigError::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Settings given as raw strings, keyed by configuration key.
/// Used for command-line flags and environment variables alike.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    values: Vec<(String, String)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.values.push((key.to_string(), value.to_string()));
    }

    /// Return `app` with every override applied, typed after the field it
    /// replaces.
    pub fn apply(&self, app: &AppConfig) -> Result<AppConfig, ConfigError> {
        if self.values.is_empty() {
            return Ok(app.clone());
        }

        let mut value =
            serde_json::to_value(app).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let fields = value
            .as_object_mut()
            .ok_or_else(|| ConfigError::ParseError("configuration is not a map".to_string()))?;

        for (key, raw) in &self.values {
            let slot = fields
                .get_mut(key)
                .ok_or_else(|| ConfigError::ValidationError(format!("unknown setting: {}", key)))?;
            let replacement = match slot {
                Value::Bool(_) => Value::Bool(parse_bool(raw).ok_or_else(|| {
                    ConfigError::ParseError(format!("{}: expected a boolean, got {:?}", key, raw))
                })?),
                Value::Number(_) => Value::from(raw.trim().parse::<i64>().map_err(|_| {
                    ConfigError::ParseError(format!("{}: expected a number, got {:?}", key, raw))
                })?),
                _ => Value::String(raw.clone()),
            };
            *slot = replacement;
        }

        serde_json::from_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// The configuration in effect, with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub version: String,
    pub app: AppConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    mode: String,
    search_paths: Vec<PathBuf>,
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new(mode: impl Into<String>, search_paths: Vec<PathBuf>) -> Self {
        Self {
            mode: mode.into(),
            search_paths,
            env: None,
        }
    }

    /// Mode from `DIRSERVE_MODE`, the standard search locations.
    pub fn from_env() -> Self {
        let mode = std::env::var(MODE_VAR)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODE.to_string());

        let mut search_paths = vec![
            PathBuf::from("."),
            PathBuf::from("configs"),
            PathBuf::from(format!("/etc/{}", env!("CARGO_PKG_NAME"))),
        ];
        if let Some(home) = std::env::var_os("HOME") {
            search_paths.push(PathBuf::from(home).join(format!(".{}", env!("CARGO_PKG_NAME"))));
        }

        Self::new(mode, search_paths)
    }

    /// Read variables from this map instead of the process environment.
    #[cfg(test)]
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    /// First `<mode>.<ext>` found in the search paths.
    pub fn discover(&self) -> Option<PathBuf> {
        for dir in &self.search_paths {
            for ext in CONFIG_EXTENSIONS {
                let candidate = dir.join(format!("{}.{}", self.mode, ext));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    pub fn read_file(path: &Path) -> Result<Configuration, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => serde_json::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e))),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e))),
            other => Err(ConfigError::ParseError(format!(
                "{}: unsupported configuration format {:?}",
                path.display(),
                other
            ))),
        }
    }

    fn env_overrides(&self, app: &AppConfig) -> Result<Overrides, ConfigError> {
        let value =
            serde_json::to_value(app).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut overrides = Overrides::new();
        if let Some(fields) = value.as_object() {
            for key in fields.keys() {
                let var = format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase());
                if let Some(raw) = self.env_var(&var) {
                    log::debug!("{} overrides {}", var, key);
                    overrides.set(key, raw);
                }
            }
        }
        Ok(overrides)
    }

    /// Defaults, then the file, then the environment, then `cli`.
    pub fn load(
        &self,
        custom: Option<&Path>,
        cli: &Overrides,
    ) -> Result<LoadedConfig, ConfigError> {
        let source = match custom {
            Some(path) => Some(path.to_path_buf()),
            None => self.discover(),
        };

        let file_config = match &source {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::read_file(path)?
            }
            None => {
                log::debug!("No {} configuration file found, using defaults", self.mode);
                Configuration::default()
            }
        };

        let app = self.env_overrides(&file_config.app)?.apply(&file_config.app)?;
        let app = cli.apply(&app)?;
        app.validate()?;

        Ok(LoadedConfig {
            version: file_config.version,
            app,
            source,
        })
    }
}

/// Atomically replaceable configuration snapshot shared by all workers.
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    pub fn new(app: AppConfig) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(app)),
        }
    }

    /// The snapshot a request works with from start to finish.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    pub fn replace(&self, app: AppConfig) {
        self.current.store(Arc::new(app));
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Poll `source` and swap in a fresh snapshot whenever it changes.
/// Reloads that fail to parse or validate are logged and dropped.
pub fn watch(
    store: ConfigStore,
    loader: ConfigLoader,
    source: PathBuf,
    cli: Overrides,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_seen = modified_time(&source);
        let mut ticker = tokio::time::interval(RELOAD_POLL_INTERVAL);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let current = modified_time(&source);
            if current.is_none() || current == last_seen {
                continue;
            }
            last_seen = current;

            let (loader, path, cli) = (loader.clone(), source.clone(), cli.clone());
            let reloaded =
                tokio::task::spawn_blocking(move || loader.load(Some(&path), &cli)).await;

            match reloaded {
                Ok(Ok(loaded)) => {
                    store.replace(loaded.app);
                    log::info!("Configuration reloaded from {}", source.display());
                }
                Ok(Err(err)) => {
                    log::warn!("Ignoring changed configuration {}: {}", source.display(), err)
                }
                Err(err) => log::warn!("Configuration reload task failed: {}", err),
            }
        }
    })
}
