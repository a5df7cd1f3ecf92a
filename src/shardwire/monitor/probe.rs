use tracing::info;

use crate::shardwire::cluster::{BackendTable, Gtid, RoleFlags};
use crate::shardwire::config::MonitorConfig;
use crate::shardwire::monitor::monitored_server::MonitoredServer;
use crate::shardwire::monitor::topology::Topology;

/// Fields extracted from one backend's probe (spec §4.6 step 4: server-version
/// detection, `SELECT @@server_id, @@read_only`, `SHOW [ALL] SLAVES STATUS`).
/// Real connection/query execution is external (spec §1).
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub reachable: bool,
    pub auth_ok: bool,
    pub server_id: u64,
    pub read_only: bool,
    pub slave_configured: bool,
    pub io_thread_running: bool,
    pub sql_thread_running: bool,
    pub master_server_id: u64,
    pub heartbeat_count: u64,
    pub gtid_io_pos: Gtid,
    pub gtid_slave_pos: Gtid,
    /// Coarse-clock timestamp of the last replication event seen, 0 if none this probe.
    pub last_event_timestamp: u32,
}

pub trait Prober {
    fn probe(&self, backend_index: usize) -> ProbeResult;
}

pub trait EventScriptRunner {
    /// Runs the configured per-event state-change script; returns whether it succeeded.
    fn run(&self, script_path: &str, backend_name: &str, previous: RoleFlags, current: RoleFlags) -> bool;
}

#[derive(Debug, Default)]
pub struct TickOutcome {
    pub any_status_changed: bool,
    /// Backends that went from running to not-running this tick (spec §4.6 step 9: "hang up
    /// connections to newly-failed backends").
    pub newly_failed: Vec<usize>,
}

/// Step 2: whether this tick runs the full probe pass or is skipped through to step 10.
pub fn should_run_full_tick(tick_number: u64, base_interval_ms: u64, monitor_interval_ms: u64, server_pending_changes: bool) -> bool {
    if server_pending_changes || monitor_interval_ms == 0 {
        return true;
    }
    (tick_number * base_interval_ms) % monitor_interval_ms < base_interval_ms
}

/// Runs one monitor tick's steps 3-10 (spec §4.6). Step 1 (the inter-tick
/// sleep) and step 11 (failover check) are driven by the caller.
pub fn run_tick(
    cluster: &mut BackendTable,
    servers: &mut [MonitoredServer],
    cfg: &MonitorConfig,
    prober: &dyn Prober,
    script_runner: Option<&dyn EventScriptRunner>,
    tick_number: u64,
    server_pending_changes: bool,
) -> TickOutcome {
    let mut outcome = TickOutcome::default();

    if !should_run_full_tick(tick_number, cfg.base_interval_ms, cfg.monitor_interval_ms, server_pending_changes) {
        return outcome;
    }

    // Step 3.
    for s in servers.iter_mut() {
        let current = cluster.get(s.backend_index).map(|b| b.roles()).unwrap_or_default();
        s.snapshot_pending(current);
    }

    // Step 4.
    let mut server_ids = vec![0u64; servers.len()];
    let mut master_ids = vec![0u64; servers.len()];
    for (i, s) in servers.iter_mut().enumerate() {
        let probe = prober.probe(s.backend_index);
        server_ids[i] = probe.server_id;
        master_ids[i] = probe.master_server_id;
        s.read_only = probe.read_only;
        s.slave_configured = probe.slave_configured;
        s.io_thread_running = probe.io_thread_running;
        s.sql_thread_running = probe.sql_thread_running;
        s.master_server_id = probe.master_server_id;
        s.heartbeat_count = probe.heartbeat_count;
        s.gtid_io_pos = probe.gtid_io_pos;
        s.gtid_slave_pos = probe.gtid_slave_pos;
        if probe.last_event_timestamp != 0 {
            s.last_event_timestamp = probe.last_event_timestamp;
        }

        let mut pending = RoleFlags::empty();
        if let Some(b) = cluster.get_mut(s.backend_index) {
            if probe.reachable && probe.auth_ok {
                b.record_probe_success();
                pending.insert(RoleFlags::RUNNING);
            } else {
                b.record_probe_failure();
                if probe.reachable && !probe.auth_ok {
                    pending.insert(RoleFlags::AUTH_ERROR);
                }
            }
        }
        s.set_pending_status(pending);
    }

    // Steps 5-6: replication tree + cycle detection.
    let topo = Topology::build(&server_ids, &master_ids);
    for (i, s) in servers.iter_mut().enumerate() {
        let mut pending = s.pending_status();
        if !pending.contains(RoleFlags::RUNNING) {
            continue;
        }
        if topo.cycle_id[i] >= 0 {
            pending.insert(if s.read_only { RoleFlags::SLAVE } else { RoleFlags::MASTER });
        } else if s.slave_configured && topo.parent[i].is_none() {
            pending.insert(RoleFlags::SLAVE | RoleFlags::SLAVE_OF_EXTERNAL_MASTER);
        } else if topo.depth[i] == 0 {
            pending.insert(RoleFlags::MASTER);
        } else if topo.depth[i] != u32::MAX {
            pending.insert(RoleFlags::SLAVE);
            if !topo.children[i].is_empty() {
                pending.insert(RoleFlags::RELAY_MASTER);
            }
        }
        s.set_pending_status(pending);
    }

    // Step 7: stale-primary detection.
    if cfg.detect_stale_master && !topo.has_cycles() {
        for i in 0..servers.len() {
            let was_master = servers[i].previous_status().contains(RoleFlags::MASTER);
            let running = servers[i].pending_status().contains(RoleFlags::RUNNING);
            let has_slaves = !topo.children[i].is_empty();
            if was_master && running && !has_slaves {
                let mut p = servers[i].pending_status();
                p.insert(RoleFlags::MASTER | RoleFlags::STALE_STATUS);
                servers[i].set_pending_status(p);
            }
        }
    }

    // Step 8: standalone-master detection.
    if cfg.detect_standalone_master {
        let running: Vec<usize> =
            (0..servers.len()).filter(|&i| servers[i].pending_status().contains(RoleFlags::RUNNING)).collect();
        if running.len() == 1 {
            let survivor = running[0];
            let others_failed = (0..servers.len()).filter(|&i| i != survivor).all(|i| {
                cluster
                    .get(servers[i].backend_index)
                    .map_or(true, |b| b.consecutive_failures() >= cfg.failcount as u64)
            });
            if others_failed {
                let mut p = servers[survivor].pending_status();
                p.insert(RoleFlags::MASTER | RoleFlags::STALE_STATUS);
                servers[survivor].set_pending_status(p);
                if !cfg.allow_cluster_recovery {
                    for i in 0..servers.len() {
                        if i != survivor {
                            let mut p2 = servers[i].pending_status();
                            p2.insert(RoleFlags::MAINTENANCE);
                            servers[i].set_pending_status(p2);
                        }
                    }
                }
            }
        }
    }

    // Step 9: publish pending -> current atomically; note newly-failed backends.
    for s in servers.iter_mut() {
        let was_running = s.previous_status().contains(RoleFlags::RUNNING);
        let changed = s.publish();
        if changed {
            outcome.any_status_changed = true;
        }
        let now_running = s.previous_status().contains(RoleFlags::RUNNING);
        if was_running && !now_running {
            outcome.newly_failed.push(s.backend_index);
        }
        if let Some(b) = cluster.get_mut(s.backend_index) {
            b.set_roles(s.previous_status());
        }
    }

    // Step 10: per-backend state-change scripts, firing only on the tick
    // where the published status actually transitioned (spec §3 "new event"
    // edge-trigger flag), not on every tick a backend happens to be in a
    // non-empty role.
    if let Some(runner) = script_runner {
        if let Some(script) = &cfg.script {
            for s in servers.iter() {
                if let Some(b) = cluster.get(s.backend_index) {
                    if s.has_new_event() {
                        let ok = runner.run(script, &b.name, s.previous_status(), s.previous_status());
                        if !ok {
                            info!(backend = %b.name, "state-change script reported failure");
                        }
                    }
                }
            }
        }
    }

    outcome
}
