//! Agent configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use lessonkit_common::{LessonKitError, LogConfig, Result};
use lessonkit_net::LoaderConfig;
use lessonkit_sw::router::DEFAULT_IMAGE_EXTENSIONS;
use lessonkit_sw::{CacheVersions, RouterConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Environment variable overriding [`AgentConfig::origin`].
pub const ENV_ORIGIN: &str = "LESSONKIT_ORIGIN";

/// Environment variable overriding [`RoutingConfig::backend_origins`]
/// (comma-separated).
pub const ENV_BACKEND_ORIGIN: &str = "LESSONKIT_BACKEND_ORIGIN";

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Origin the app is served from
    pub origin: String,

    /// Cache namespaces
    pub cache: CacheConfig,

    /// Request routing
    pub routing: RoutingConfig,

    /// Asset paths pre-cached on install
    pub app_shell: Vec<String>,

    /// HTTP client settings
    pub network: NetworkConfig,

    /// Reminder notifications
    pub notifications: NotificationConfig,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log format (pretty, compact, json)
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix of every cache name
    pub prefix: String,

    pub shell_version: u32,
    pub image_version: u32,
    pub runtime_version: u32,

    /// Maximum entries kept in the image cache
    pub max_image_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path fragment identifying remote API calls
    pub api_path_fragment: String,

    /// Origins of remote backends
    pub backend_origins: Vec<String>,

    /// Suffixes classified as images
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// User agent string
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Icon shown with every reminder
    pub icon: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5173/".to_string(),
            cache: CacheConfig::default(),
            routing: RoutingConfig::default(),
            app_shell: [
                "/",
                "/index.html",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            network: NetworkConfig::default(),
            notifications: NotificationConfig::default(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let versions = CacheVersions::default();
        Self {
            prefix: versions.prefix,
            shell_version: versions.shell,
            image_version: versions.image,
            runtime_version: versions.runtime,
            max_image_entries: 60,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_path_fragment: "/api/".to_string(),
            backend_origins: Vec::new(),
            image_extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let loader = LoaderConfig::default();
        Self {
            user_agent: loader.user_agent,
            timeout_secs: loader.default_timeout.as_secs(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: Some(lessonkit_reminders::notification::DEFAULT_ICON.to_string()),
        }
    }
}

impl AgentConfig {
    /// Default config file location (`<config dir>/lessonkit/agent.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lessonkit").join("agent.json"))
    }

    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json(&raw)?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Parse from JSON text; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply `LESSONKIT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = lookup(ENV_ORIGIN) {
            debug!(%origin, "Origin overridden from environment");
            self.origin = origin;
        }
        if let Some(backends) = lookup(ENV_BACKEND_ORIGIN) {
            self.routing.backend_origins = backends
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            debug!(backends = ?self.routing.backend_origins, "Backend origins overridden from environment");
        }
    }

    /// Check that every URL parses and the app shell is not empty.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;
        self.backend_urls()?;
        if self.app_shell.is_empty() {
            return Err(LessonKitError::config("app_shell must list at least one asset"));
        }
        if self.network.timeout_secs == 0 {
            return Err(LessonKitError::config("network.timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).map_err(|e| {
            LessonKitError::config_with_source(format!("invalid origin '{}'", self.origin), e)
        })
    }

    pub fn backend_urls(&self) -> Result<Vec<Url>> {
        self.routing
            .backend_origins
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    LessonKitError::config_with_source(format!("invalid backend origin '{}'", raw), e)
                })
            })
            .collect()
    }

    pub fn cache_versions(&self) -> CacheVersions {
        CacheVersions {
            prefix: self.cache.prefix.clone(),
            shell: self.cache.shell_version,
            image: self.cache.image_version,
            runtime: self.cache.runtime_version,
        }
    }

    pub fn router_config(&self) -> Result<RouterConfig> {
        Ok(RouterConfig::new(
            self.origin_url()?,
            self.app_shell.as_slice(),
            self.routing.image_extensions.as_slice(),
            &self.routing.api_path_fragment,
            &self.backend_urls()?,
        ))
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        Ok(WorkerConfig {
            origin: self.origin_url()?,
            versions: self.cache_versions(),
            app_shell: self.app_shell.clone(),
            max_image_entries: self.cache.max_image_entries,
            router: self.router_config()?,
        })
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            user_agent: self.network.user_agent.clone(),
            default_timeout: Duration::from_secs(self.network.timeout_secs),
            ..Default::default()
        }
    }

    pub fn log_config(&self) -> Result<LogConfig> {
        LogConfig::from_names(&self.log_level, &self.log_format)
    }
}
