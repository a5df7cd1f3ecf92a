use serde::Deserialize;

use crate::shardwire::common::{Error, Result};

/// Static configuration for one backend server (spec §3 Backend identity).
/// Cascades missing fields from [`ClusterConfig::default`], mirroring the
/// teacher's `Postgres::load` cascading into `replicas`.
#[derive(Deserialize, Debug, Clone)]
pub struct BackendConfig {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Used as the denominator in least-load selection metrics (spec §3).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_host() -> String { "127.0.0.1".to_string() }
const fn default_port() -> u16 { 3306 }
const fn default_weight() -> u32 { 1000 }

impl BackendConfig {
    pub(crate) fn load(&mut self, defaults: &BackendConfig) -> Result<()> {
        if self.host.is_empty() {
            self.host = defaults.host.clone();
        }
        if self.port == 0 {
            self.port = defaults.port;
        }
        if self.user.is_empty() {
            self.user = defaults.user.clone();
        }
        if self.name.is_empty() {
            return Err(Error::new("backend name cannot be empty"));
        }
        Ok(())
    }
}

/// A replication cluster: one primary plus zero or more replicas (spec §2,
/// "one primary writer, zero or more replicas").
#[derive(Deserialize, Debug, Clone)]
pub struct ClusterConfig {
    pub backends: Vec<BackendConfig>,
    /// Defaults used to fill any empty/omitted field of each `BackendConfig`.
    #[serde(default)]
    pub default: BackendConfig,
    /// Replication credentials used by `do_failover`'s `CHANGE MASTER TO` step (spec §4.6).
    #[serde(default)]
    pub replication_user: String,
    #[serde(default)]
    pub replication_password: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            name: String::new(),
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            weight: default_weight(),
        }
    }
}

impl ClusterConfig {
    pub(crate) fn load(&mut self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(Error::new("cluster must define at least one backend"));
        }
        for backend in &mut self.backends {
            backend.load(&self.default)?;
        }
        Ok(())
    }
}
