//! Application configuration.
//!
//! Configuration is read once at startup from built-in defaults, an optional
//! TOML file and `RELAYHOST__SECTION__KEY` environment variables, then shared
//! read-only by every component.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::container::{self, ResourceLimits, RuntimeType};

/// Application name, used for config paths and the environment prefix.
pub const APP_NAME: &str = "relayhost";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub profile: String,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub control_plane: ControlPlaneConfig,
    pub local: LocalConfig,
    pub relay: RelayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            control_plane: ControlPlaneConfig::default(),
            local: LocalConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

/// Remote control plane that may own session provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Base URL, e.g. "https://control.example.com/api". Unset disables delegation.
    pub base_url: Option<String>,
    /// Path appended to the base for host and teardown requests.
    pub path: String,
    /// Value sent in the `x-api-key` header.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path: "/host".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl ControlPlaneConfig {
    /// The configured base URL, if delegation is enabled.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
    }
}

/// Local container execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Allow shelling out to a container runtime on this host.
    pub enabled: bool,
    /// Container runtime type (auto-detected if not set).
    pub runtime: Option<RuntimeType>,
    /// Custom path to the container runtime binary.
    pub binary: Option<String>,
    /// Game server image.
    pub image: String,
    /// Prefix for generated container names.
    pub name_prefix: String,
    pub host_port: Option<u16>,
    pub container_port: Option<u16>,
    pub cpus: Option<String>,
    pub cpuset: Option<String>,
    pub memory: Option<String>,
    pub cpu_shares: Option<u32>,
    /// How long to wait for the join code in the container logs.
    pub log_timeout_ms: u64,
    /// User service base URL handed to the game server.
    pub user_service_url: Option<String>,
    /// Let the game server skip TLS verification.
    pub allow_insecure_tls: bool,
    /// Game API key handed to the game server.
    pub game_api_key: Option<String>,
    /// Extra `KEY=VALUE` environment entries.
    pub extra_env: Vec<String>,
    /// Extra runtime CLI tokens, inserted before the image.
    pub extra_args: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            runtime: None,
            binary: None,
            image: "relay-game-server:latest".to_string(),
            name_prefix: "relay-host".to_string(),
            host_port: None,
            container_port: None,
            cpus: None,
            cpuset: None,
            memory: None,
            cpu_shares: None,
            log_timeout_ms: 20_000,
            user_service_url: None,
            allow_insecure_tls: false,
            game_api_key: None,
            extra_env: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

impl LocalConfig {
    /// Port mapping, only when both sides are configured.
    pub fn port_mapping(&self) -> Option<(u16, u16)> {
        self.host_port.zip(self.container_port)
    }

    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpus: self.cpus.clone(),
            cpuset: self.cpuset.clone(),
            memory: self.memory.clone(),
            cpu_shares: self.cpu_shares,
        }
    }

    /// Parse `extra_env` into ordered key/value pairs.
    pub fn parsed_extra_env(&self) -> Result<Vec<(String, String)>> {
        self.extra_env
            .iter()
            .map(|entry| -> Result<(String, String)> {
                let (key, value) = entry
                    .split_once('=')
                    .ok_or_else(|| anyhow!("extra env entry '{entry}' must be KEY=VALUE"))?;
                let key = key.trim();
                container::validate_env_var_key(key)?;
                Ok((key.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Defaults handed to the game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub scene: String,
    pub region: String,
    pub max_connections: u32,
    /// Relay WebSocket URL returned to clients.
    pub ws_url: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scene: "Lobby".to_string(),
            region: "auto".to_string(),
            max_connections: 8,
            ws_url: None,
        }
    }
}

impl AppConfig {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if let Some(base) = self.control_plane.base_url()
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            bail!("control_plane.base_url must be an http(s) URL, got '{base}'");
        }

        if self.local.log_timeout_ms == 0 {
            bail!("local.log_timeout_ms must be greater than zero");
        }

        if self.local.enabled {
            container::validate_image_name(&self.local.image)
                .context("local.image is invalid")?;
            self.local
                .parsed_extra_env()
                .context("local.extra_env is invalid")?;
        }

        Ok(())
    }
}

/// Environment variable prefix, e.g. `RELAYHOST`.
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Default config file: `$XDG_CONFIG_HOME/relayhost/config.toml`, falling back
/// to the platform config directory and then `~/.config`.
pub fn default_config_path() -> Result<PathBuf> {
    let dir = env::var_os("XDG_CONFIG_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))?;
    Ok(dir.join(APP_NAME).join("config.toml"))
}

/// Resolve a `--config` argument. `~` and `$VARS` are expanded and a
/// directory resolves to the `config.toml` inside it.
pub fn resolve_config_path(path: Option<&Path>) -> Result<PathBuf> {
    let Some(path) = path else {
        return default_config_path();
    };
    let path = match path.to_str() {
        Some(text) => PathBuf::from(
            shellexpand::full(text)
                .with_context(|| format!("expanding config path {text}"))?
                .as_ref(),
        ),
        None => path.to_path_buf(),
    };
    Ok(if path.is_dir() {
        path.join("config.toml")
    } else {
        path
    })
}

/// Load configuration from `config_file` (optional) and the environment.
pub fn load(config_file: &Path) -> Result<AppConfig> {
    let env_prefix = env_prefix();
    let built = Config::builder()
        .set_default("profile", "default")?
        .set_default("logging.level", "info")?
        .add_source(
            File::from(config_file)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(env_prefix.as_str())
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("local.extra_env")
                .with_list_parse_key("local.extra_args")
                .with_list_parse_key("server.cors_origins"),
        )
        .build()
        .with_context(|| format!("loading config from {}", config_file.display()))?;

    let config: AppConfig = built
        .try_deserialize()
        .context("deserializing configuration")?;
    Ok(config)
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = format!("# Configuration for {APP_NAME}\n# File: {}\n\n", path.display());
    body.push_str(&toml);
    std::fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}
