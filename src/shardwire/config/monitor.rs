use serde::Deserialize;

/// Recognized monitor configuration options, exhaustive per spec §6.
#[derive(Deserialize, Debug, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub detect_replication_lag: bool,
    #[serde(default = "default_true")]
    pub detect_stale_master: bool,
    #[serde(default = "default_true")]
    pub detect_stale_slave: bool,
    #[serde(default)]
    pub mysql51_replication: bool,
    #[serde(default)]
    pub multimaster: bool,
    #[serde(default)]
    pub detect_standalone_master: bool,
    #[serde(default = "default_failcount")]
    pub failcount: u32,
    #[serde(default = "default_true")]
    pub allow_cluster_recovery: bool,
    #[serde(default = "default_true")]
    pub allow_external_slaves: bool,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub failover: bool,
    #[serde(default)]
    pub failover_script: Option<String>,
    #[serde(default = "default_failover_timeout")]
    pub failover_timeout: u64,
    #[serde(default)]
    pub switchover: bool,
    #[serde(default)]
    pub switchover_script: Option<String>,
    #[serde(default = "default_switchover_timeout")]
    pub switchover_timeout: u64,
    #[serde(default = "default_true")]
    pub verify_master_failure: bool,
    #[serde(default = "default_master_failure_timeout")]
    pub master_failure_timeout: u64,
    /// Base tick interval T_base (spec §4.6 Probe loop), nominally 100ms.
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    /// Configured monitor interval T_mon (spec §4.6 Probe loop), nominally 2s.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

fn default_true() -> bool { true }
const fn default_failcount() -> u32 { 5 }
const fn default_failover_timeout() -> u64 { 90 }
const fn default_switchover_timeout() -> u64 { 90 }
const fn default_master_failure_timeout() -> u64 { 10 }
const fn default_base_interval_ms() -> u64 { 100 }
const fn default_monitor_interval_ms() -> u64 { 2_000 }

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            detect_replication_lag: false,
            detect_stale_master: true,
            detect_stale_slave: true,
            mysql51_replication: false,
            multimaster: false,
            detect_standalone_master: false,
            failcount: default_failcount(),
            allow_cluster_recovery: true,
            allow_external_slaves: true,
            script: None,
            failover: false,
            failover_script: None,
            failover_timeout: default_failover_timeout(),
            switchover: false,
            switchover_script: None,
            switchover_timeout: default_switchover_timeout(),
            verify_master_failure: true,
            master_failure_timeout: default_master_failure_timeout(),
            base_interval_ms: default_base_interval_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}
