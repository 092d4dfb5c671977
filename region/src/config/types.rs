//! Configuration data types for the region service.

use alloc::sync::Arc;
use core::time::Duration;
use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use metalfleet_common::DEFAULT_RACK_AGENT_PORT;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;

use crate::{
    address_space::StatisticsSettings,
    discovery::{RackAgent, ScanSettings},
    permission::Principal,
};

/// A rack agent the region may dispatch scans to.
#[derive(Debug, Deserialize, Clone)]
pub struct Rack {
    /// IP address or hostname the agent listens on.
    pub ip: String,
    #[serde(default = "default_rack_port")]
    pub port: u16,
    /// Shared secret for HMAC signing of requests.
    pub shared_secret: Arc<SecretString>,
}

impl PartialEq for Rack {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip
            && self.port == other.port
            && self.shared_secret.expose_secret() == other.shared_secret.expose_secret()
    }
}

/// An API user, identified by a bearer token.
#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub token: Arc<SecretString>,
    #[serde(default)]
    pub admin: bool,
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.admin == other.admin && self.token.expose_secret() == other.token.expose_secret()
    }
}

/// HTTP server binding configuration section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
}

/// Configuration for the optional `SQLite` database.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Path to the `SQLite` database file. Relative paths are resolved relative to the config file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// When false the region runs without persistence even if this table exists.
    #[serde(default = "do_db_enable")]
    pub enable: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            enable: do_db_enable(),
        }
    }
}

/// Limits for active discovery scans, in milliseconds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: default_agent_timeout_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl From<ScanConfig> for ScanSettings {
    fn from(config: ScanConfig) -> Self {
        Self {
            agent_timeout: Duration::from_millis(config.agent_timeout_ms),
            scan_timeout: Duration::from_millis(config.scan_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsConfig {
    /// Free blocks smaller than this are never suggested.
    #[serde(default = "default_min_suggestion_size")]
    pub min_suggestion_size: u128,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            min_suggestion_size: default_min_suggestion_size(),
        }
    }
}

impl From<StatisticsConfig> for StatisticsSettings {
    fn from(config: StatisticsConfig) -> Self {
        Self {
            min_suggestion_size: config.min_suggestion_size.max(1),
        }
    }
}

const fn default_rack_port() -> u16 {
    DEFAULT_RACK_AGENT_PORT
}

fn default_db_path() -> String {
    "./metalfleet.db".to_string()
}

const fn do_db_enable() -> bool {
    true
}

const fn default_agent_timeout_ms() -> u64 {
    10_000
}

const fn default_scan_timeout_ms() -> u64 {
    30_000
}

const fn default_min_suggestion_size() -> u128 {
    1
}

/// Root config structure of the region service.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegionConfig {
    pub server: ServerConfig,
    /// Persistence is disabled when omitted.
    #[serde(default)]
    pub db: Option<DbConfig>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    /// Rack agents by hostname.
    #[serde(default)]
    pub racks: HashMap<String, Rack>,
    /// API users by name.
    #[serde(default)]
    pub users: HashMap<String, User>,
}

impl RegionConfig {
    /// Resolves a bearer token to the user it belongs to.
    #[must_use]
    pub fn principal_for_token(&self, token: &str) -> Option<Principal> {
        self.users
            .iter()
            .find(|&(_, user)| user.token.expose_secret() == token)
            .map(|(name, user)| Principal {
                name: name.clone(),
                admin: user.admin,
            })
    }

    /// The configured racks as dispatch targets, sorted by name.
    #[must_use]
    pub fn rack_agents(&self) -> Vec<RackAgent> {
        let mut agents: Vec<RackAgent> = self
            .racks
            .iter()
            .map(|(name, rack)| RackAgent {
                name: name.clone(),
                ip: rack.ip.clone(),
                port: rack.port,
                shared_secret: rack.shared_secret.clone(),
            })
            .collect();
        agents.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        agents
    }
}

/// Resolves a path from the config file to an absolute one.
///
/// Relative paths are joined onto the config file's directory, `:memory:` is
/// passed through untouched.
pub fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    let resolved = if path.is_absolute() || relative_path == ":memory:" {
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // The file may not exist yet, so no canonicalize().
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}
