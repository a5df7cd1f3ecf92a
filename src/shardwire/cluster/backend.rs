use std::sync::atomic::{AtomicU32, AtomicU64, Ordering::Relaxed};

use crate::shardwire::cluster::role::RoleFlags;
use crate::shardwire::config::BackendConfig;

/// GTID position: `(domain, server_id, sequence)` (spec GLOSSARY "GTID").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Gtid {
    pub domain: u32,
    pub server_id: u64,
    pub sequence: u64,
}

/// A backend database server (spec §3 "Backend"). Identity and weight come
/// from configuration; everything else is monitor-derived runtime state.
///
/// Connection counters are plain atomics rather than fields behind the
/// router lock: §5 calls the backend list "read-mostly", and selection
/// (§4.3) reads every backend's counters on the hot path without wanting to
/// contend with the router's own write lock.
#[derive(Debug)]
pub struct Backend {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub weight: u32,

    roles: RoleFlags,

    /// Current-connections counter across every router instance sharing this backend.
    global_connections: AtomicU32,
    /// Current-connections counter scoped to this proxy's own router instance.
    router_connections: AtomicU32,

    pub replication_lag_secs: u64,
    pub tree_depth: u32,
    pub server_id: u64,
    pub master_id: u64,
    pub child_server_ids: Vec<u64>,

    pub gtid_io_pos: Gtid,
    pub gtid_slave_pos: Gtid,
    consecutive_failures: AtomicU64,
}

impl Backend {
    pub fn from_config(cfg: &BackendConfig) -> Self {
        Backend {
            name: cfg.name.clone(),
            host: cfg.host.clone(),
            port: cfg.port,
            weight: cfg.weight,
            roles: RoleFlags::empty(),
            global_connections: AtomicU32::new(0),
            router_connections: AtomicU32::new(0),
            replication_lag_secs: 0,
            tree_depth: 0,
            server_id: 0,
            master_id: 0,
            child_server_ids: Vec::new(),
            gtid_io_pos: Gtid::default(),
            gtid_slave_pos: Gtid::default(),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    pub fn roles(&self) -> RoleFlags {
        self.roles
    }

    pub fn set_roles(&mut self, roles: RoleFlags) {
        self.roles = roles;
    }

    pub fn is_running(&self) -> bool {
        self.roles.contains(RoleFlags::RUNNING) && !self.roles.contains(RoleFlags::MAINTENANCE)
    }

    pub fn is_master(&self) -> bool {
        self.roles.contains(RoleFlags::MASTER)
    }

    pub fn is_usable(&self) -> bool {
        self.is_running() && !self.roles.contains(RoleFlags::AUTH_ERROR)
    }

    pub fn global_connections(&self) -> u32 {
        self.global_connections.load(Relaxed)
    }

    pub fn router_connections(&self) -> u32 {
        self.router_connections.load(Relaxed)
    }

    pub fn incr_connections(&self) {
        self.global_connections.fetch_add(1, Relaxed);
        self.router_connections.fetch_add(1, Relaxed);
    }

    pub fn decr_connections(&self) {
        self.global_connections.fetch_update(Relaxed, Relaxed, |v| Some(v.saturating_sub(1))).ok();
        self.router_connections.fetch_update(Relaxed, Relaxed, |v| Some(v.saturating_sub(1))).ok();
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Relaxed)
    }

    pub fn record_probe_failure(&self) -> u64 {
        self.consecutive_failures.fetch_add(1, Relaxed) + 1
    }

    pub fn record_probe_success(&self) {
        self.consecutive_failures.store(0, Relaxed);
    }
}

/// Owns the backend descriptor vector for one cluster; sessions hold stable
/// indices into it rather than pointers (spec §9, re-architecting the
/// source's raw pointer graph).
#[derive(Debug, Default)]
pub struct BackendTable {
    backends: Vec<Backend>,
}

impl BackendTable {
    pub fn from_configs(configs: &[BackendConfig]) -> Self {
        BackendTable { backends: configs.iter().map(Backend::from_config).collect() }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.backends.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Backend> {
        self.backends.get_mut(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.backends.iter().position(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Backend)> {
        self.backends.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Backend)> {
        self.backends.iter_mut().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str) -> BackendConfig {
        let mut c = BackendConfig::default();
        c.name = name.to_string();
        c
    }

    #[test]
    fn connection_counters_round_trip() {
        let b = Backend::from_config(&cfg("b1"));
        b.incr_connections();
        b.incr_connections();
        b.decr_connections();
        assert_eq!(b.global_connections(), 1);
        assert_eq!(b.router_connections(), 1);
    }

    #[test]
    fn running_excludes_maintenance() {
        let mut b = Backend::from_config(&cfg("b1"));
        b.set_roles(RoleFlags::RUNNING | RoleFlags::MAINTENANCE);
        assert!(!b.is_running());
    }

    #[test]
    fn index_of_finds_backend_by_name() {
        let table = BackendTable::from_configs(&[cfg("a"), cfg("b")]);
        assert_eq!(table.index_of("b"), Some(1));
        assert_eq!(table.index_of("missing"), None);
    }
}
