use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Declares a closed configuration enum together with its accepted spellings.
/// Dashes and underscores are interchangeable and matching is case-insensitive.
macro_rules! config_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $expected:literal {
            $($variant:ident => $canon:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const EXPECTED: &'static str = $expected;

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $canon),+
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
                match normalized.as_str() {
                    $($canon $(| $alias)* => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                value.parse().map_err(|_| {
                    ::serde::de::Error::custom(format!(
                        "invalid value `{}`, expected one of: {}",
                        value, $expected
                    ))
                })
            }
        }
    };
}

mod task;

pub use task::*;

config_enum! {
    /// Deployment mode gating which task kinds may execute
    Environment, "dev, test, prod" {
        Dev => "dev" | "development",
        Test => "test",
        Prod => "prod" | "production",
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Dev
    }
}

config_enum! {
    /// Whether the generation backend is called at all
    GenerationMode, "live, disabled" {
        Live => "live" | "dev",
        Disabled => "disabled" | "off",
    }
}

impl Default for GenerationMode {
    fn default() -> Self {
        GenerationMode::Live
    }
}

/// Errors raised while loading `system.yaml`
#[derive(Debug, thiserror::Error)]
pub enum SystemConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("failed to read system config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse system config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid llm.url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid llm.timeout `{value}`: {source}")]
    InvalidTimeout {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
}

/// Process-wide configuration loaded once at startup
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SystemConfig {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,
    /// Generation backend settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedder used by the vector index
    #[serde(default)]
    pub embedder: EmbedderConfig,
    /// Mutable policy flags
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Query routing settings
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Generation backend settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider name ("gateway", "ollama" or "openai")
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Endpoint override for the provider
    #[serde(default)]
    pub url: Option<String>,
    /// Default model, tasks may override it
    #[serde(default)]
    pub model: Option<String>,
    /// Request timeout in humantime format, e.g. "120s"
    #[serde(default = "default_llm_timeout")]
    pub timeout: String,
    /// Live generation or debug-only answers
    #[serde(default)]
    pub mode: GenerationMode,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            url: None,
            model: None,
            timeout: default_llm_timeout(),
            mode: GenerationMode::default(),
        }
    }
}

impl LlmConfig {
    /// Parses the configured timeout
    pub fn timeout(&self) -> Result<Duration, SystemConfigError> {
        humantime::parse_duration(&self.timeout).map_err(|source| {
            SystemConfigError::InvalidTimeout {
                value: self.timeout.clone(),
                source,
            }
        })
    }
}

/// Embedder configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmbedderConfig {
    /// "hashing" (offline) or "openai"
    #[serde(default = "default_embedder_provider")]
    pub provider: String,
    /// Model name for remote embedders
    #[serde(default)]
    pub model: Option<String>,
    /// Vector size of the hashing embedder
    #[serde(default = "default_embedder_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: default_embedder_provider(),
            model: None,
            dimensions: default_embedder_dimensions(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PolicyConfig {
    /// Lets corporate tasks run in the dev environment
    #[serde(default)]
    pub allow_corporate_in_dev: bool,
}

/// Default task used when classification cannot be parsed
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default = "default_task_id")]
    pub default_task_id: String,
    #[serde(default = "default_task_type")]
    pub default_task_type: TaskKind,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_task_id: default_task_id(),
            default_task_type: default_task_type(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding one YAML file per task
    #[serde(default = "default_tasks_dir")]
    pub tasks_dir: PathBuf,
    /// Directory where exported answers are written
    #[serde(default = "default_exports_dir")]
    pub exports_dir: PathBuf,
    /// Directory for rotated log files
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tasks_dir: default_tasks_dir(),
            exports_dir: default_exports_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

fn default_llm_provider() -> String {
    "gateway".to_string()
}

fn default_llm_timeout() -> String {
    "120s".to_string()
}

fn default_embedder_provider() -> String {
    "hashing".to_string()
}

fn default_embedder_dimensions() -> usize {
    256
}

fn default_task_id() -> String {
    "demo_hello".to_string()
}

fn default_task_type() -> TaskKind {
    TaskKind::Demo
}

fn default_tasks_dir() -> PathBuf {
    PathBuf::from("config/tasks")
}

fn default_exports_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl SystemConfig {
    /// Checks the values serde cannot check on its own
    pub fn validate(&self) -> Result<(), SystemConfigError> {
        if let Some(raw) = &self.llm.url {
            url::Url::parse(raw).map_err(|source| SystemConfigError::InvalidUrl {
                url: raw.clone(),
                source,
            })?;
        }
        self.llm.timeout()?;
        Ok(())
    }
}

/// Loads and validates the system configuration from a YAML file
///
/// # Arguments
///
/// * `path` - Path to `system.yaml`
///
/// # Errors
///
/// Returns an error if:
/// * The file does not exist or cannot be read
/// * The YAML content cannot be parsed into a SystemConfig
/// * The LLM url or timeout are malformed
pub fn load_system_config(path: &Path) -> Result<SystemConfig, SystemConfigError> {
    if !path.is_file() {
        return Err(SystemConfigError::NotFound(path.display().to_string()));
    }
    let yaml_str = fs::read_to_string(path).map_err(|source| SystemConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: SystemConfig =
        serde_yaml::from_str(&yaml_str).map_err(|source| SystemConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })?;
    config.validate()?;
    info!(
        "Loaded system configuration: environment={}, llm={}",
        config.environment, config.llm.provider
    );
    Ok(config)
}
