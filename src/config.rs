//! Configuration management for the PlantUML server

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::diagram::normalize::DEFAULT_MAX_SOURCE_BYTES;
use crate::render::{CacheConfig, CoordinatorConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub mcp: McpConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// PlantUML executable (a wrapper script or `java`)
    pub command: String,
    /// Arguments placed before the pipe-mode flags, e.g. `-jar plantuml.jar`
    pub args: Vec<String>,
    /// Overrides the version detected from the renderer
    pub version: Option<String>,
    pub timeout: Duration,
    pub max_concurrent_renders: usize,
    pub max_source_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct McpConfig {
    pub enabled: bool,
    /// Bearer token required when non-empty
    pub api_key: String,
    /// Maximum diagrams per workspace session
    pub workspace_limit: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            render: RenderConfig::default(),
            cache: CacheConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        let coordinator = CoordinatorConfig::default();
        RenderConfig {
            command: "plantuml".to_string(),
            args: Vec::new(),
            version: None,
            timeout: coordinator.render_timeout,
            max_concurrent_renders: coordinator.max_concurrent_renders,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        McpConfig {
            enabled: false,
            api_key: String::new(),
            workspace_limit: 20,
        }
    }
}

impl RenderConfig {
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            render_timeout: self.timeout,
            max_concurrent_renders: self.max_concurrent_renders,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or(&var, "SERVER_PORT", defaults.server.port)?,
            },
            render: RenderConfig {
                command: var("PLANTUML_COMMAND").unwrap_or(defaults.render.command),
                args: var("PLANTUML_ARGS")
                    .map(|args| args.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                version: var("PLANTUML_RENDERER_VERSION"),
                timeout: Duration::from_secs(parse_or(
                    &var,
                    "PLANTUML_RENDER_TIMEOUT_SECS",
                    defaults.render.timeout.as_secs(),
                )?),
                max_concurrent_renders: parse_or(
                    &var,
                    "PLANTUML_MAX_CONCURRENT_RENDERS",
                    defaults.render.max_concurrent_renders,
                )?,
                max_source_bytes: parse_or(
                    &var,
                    "PLANTUML_MAX_SOURCE_BYTES",
                    defaults.render.max_source_bytes,
                )?,
            },
            cache: CacheConfig {
                max_entries: parse_or(&var, "PLANTUML_CACHE_MAX_ENTRIES", defaults.cache.max_entries)?,
                max_bytes: parse_or(&var, "PLANTUML_CACHE_MAX_BYTES", defaults.cache.max_bytes)?,
                ttl: Duration::from_secs(parse_or(
                    &var,
                    "PLANTUML_CACHE_TTL_SECS",
                    defaults.cache.ttl.as_secs(),
                )?),
            },
            mcp: McpConfig {
                enabled: var("PLANTUML_MCP_ENABLED")
                    .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                    .unwrap_or(defaults.mcp.enabled),
                api_key: var("PLANTUML_MCP_API_KEY")
                    .map(|v| v.trim().to_string())
                    .unwrap_or(defaults.mcp.api_key),
                workspace_limit: parse_or(
                    &var,
                    "PLANTUML_MCP_WORKSPACE_LIMIT",
                    defaults.mcp.workspace_limit,
                )?,
            },
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}
