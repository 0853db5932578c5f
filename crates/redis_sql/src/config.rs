//! Connection options and client configuration.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::parser::HintKey;

/// Property key enabling command-specific converted columns.
pub const EXTRA_COLUMN_CONVERSION_PROPERTY: &str = "extraColumnConversion";
/// Property key enabling key/value projections of hash replies.
pub const HASH_RESULT_CONVERSION_PROPERTY: &str = "hashResultConversion";

/// Optional result shaping, both enabled by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Features {
    pub extra_column_conversions: bool,
    pub hash_result_conversions: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            extra_column_conversions: true,
            hash_result_conversions: true,
        }
    }
}

impl Features {
    /// Reads the flags from a property map. Missing or unrecognized values
    /// keep the default.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            extra_column_conversions: parse_flag(
                properties.get(EXTRA_COLUMN_CONVERSION_PROPERTY).map(String::as_str),
                defaults.extra_column_conversions,
            ),
            hash_result_conversions: parse_flag(
                properties.get(HASH_RESULT_CONVERSION_PROPERTY).map(String::as_str),
                defaults.hash_result_conversions,
            ),
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            extra_column_conversions: parse_flag(
                std::env::var("REDIS_SQL_EXTRA_COLUMN_CONVERSIONS").ok().as_deref(),
                defaults.extra_column_conversions,
            ),
            hash_result_conversions: parse_flag(
                std::env::var("REDIS_SQL_HASH_RESULT_CONVERSIONS").ok().as_deref(),
                defaults.hash_result_conversions,
            ),
        }
    }
}

/// Per-connection statement handling options.
#[derive(Clone, Debug, Default)]
pub struct ConnectionOptions {
    pub features: Features,
    /// Hint keys kept by the parser. Empty means [`HintKey::DEFAULT_ALLOWED`].
    pub allowed_hint_keys: Vec<HintKey>,
}

impl ConnectionOptions {
    pub fn from_env() -> Self {
        Self {
            features: Features::from_env(),
            allowed_hint_keys: Vec::new(),
        }
    }
}

/// Single-node client settings.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// `host:port` of the node.
    pub addr: String,
    pub db_index: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_name: Option<String>,
    pub connect_timeout: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            db_index: 0,
            username: None,
            password: None,
            client_name: Some(env!("CARGO_PKG_NAME").to_string()),
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl NodeConfig {
    /// Loads node settings from environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let addr = std::env::var("REDIS_SQL_ADDR").unwrap_or(defaults.addr);
        let db_index = parse_i64(std::env::var("REDIS_SQL_DB").ok(), defaults.db_index)
            .context("REDIS_SQL_DB")?;
        Ok(Self {
            addr,
            db_index,
            username: std::env::var("REDIS_SQL_USERNAME").ok(),
            password: std::env::var("REDIS_SQL_PASSWORD").ok(),
            ..defaults
        })
    }
}

/// Cluster client settings.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// `host:port` seeds tried in order for slot discovery.
    pub seeds: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            username: None,
            password: None,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ClusterConfig {
    /// Loads cluster settings; `REDIS_SQL_CLUSTER_NODES` is required.
    pub fn from_env() -> Result<Self> {
        let nodes = std::env::var("REDIS_SQL_CLUSTER_NODES")
            .context("REDIS_SQL_CLUSTER_NODES is not set")?;
        let seeds = parse_node_list(&nodes)?;
        Ok(Self {
            seeds,
            username: std::env::var("REDIS_SQL_USERNAME").ok(),
            password: std::env::var("REDIS_SQL_PASSWORD").ok(),
            ..Self::default()
        })
    }
}

/// Splits a comma separated `host:port` list, rejecting entries without a
/// numeric port.
pub fn parse_node_list(raw: &str) -> Result<Vec<String>> {
    let mut nodes = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (host, port) = entry
            .rsplit_once(':')
            .with_context(|| format!("invalid node address (missing port): {entry}"))?;
        anyhow::ensure!(!host.is_empty(), "invalid node address (missing host): {entry}");
        port.parse::<u16>()
            .with_context(|| format!("invalid node port: {entry}"))?;
        nodes.push(entry.to_string());
    }
    anyhow::ensure!(!nodes.is_empty(), "node list is empty");
    Ok(nodes)
}

/// Parses a boolean flag with fallback default.
fn parse_flag(value: Option<&str>, default_value: bool) -> bool {
    match value.map(|raw| raw.trim().to_ascii_lowercase()) {
        Some(raw) => match raw.as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => default_value,
        },
        None => default_value,
    }
}

/// Parses an optional `i64` with fallback default.
fn parse_i64(value: Option<String>, default_value: i64) -> Result<i64> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("invalid i64 value: {raw}")),
        None => Ok(default_value),
    }
}
