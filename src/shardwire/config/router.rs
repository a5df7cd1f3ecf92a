use serde::Deserialize;

use crate::shardwire::config::enums::{SlaveCount, SlaveSelectionCriteria};

/// Recognized RWR router options (spec §6).
#[derive(Deserialize, Debug, Clone)]
pub struct RwrConfig {
    #[serde(default)]
    pub max_slave_connections: SlaveCount,
    /// Seconds; `None` means no limit.
    #[serde(default)]
    pub max_slave_replication_lag: Option<u64>,
    #[serde(default)]
    pub slave_selection_criteria: SlaveSelectionCriteria,
}

impl Default for RwrConfig {
    fn default() -> Self {
        RwrConfig {
            max_slave_connections: SlaveCount::default(),
            max_slave_replication_lag: None,
            slave_selection_criteria: SlaveSelectionCriteria::default(),
        }
    }
}

/// Recognized SR router options (spec §6).
#[derive(Deserialize, Debug, Clone)]
pub struct SrConfig {
    #[serde(default)]
    pub ignore_databases: Vec<String>,
    #[serde(default)]
    pub ignore_databases_regex: Option<String>,
    /// 0 means unlimited (spec §4.2 History-size guard / §8 boundary behaviors).
    #[serde(default)]
    pub max_sescmd_history: usize,
    #[serde(default)]
    pub disable_sescmd_history: bool,
    #[serde(default)]
    pub refresh_databases: bool,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub preferred_server: Option<String>,
}

const fn default_refresh_interval() -> u64 { 300 }

impl Default for SrConfig {
    fn default() -> Self {
        SrConfig {
            ignore_databases: Vec::new(),
            ignore_databases_regex: None,
            max_sescmd_history: 0,
            disable_sescmd_history: false,
            refresh_databases: false,
            refresh_interval: default_refresh_interval(),
            debug: false,
            preferred_server: None,
        }
    }
}
