//! Assembles the probe -> failover tick loop (spec §4.6 steps 1-11) that
//! `run_servers` spawns as a background task: sleep, [`run_tick`], then
//! consult [`FailoverGate`] and run failover if warranted. Mirrors the
//! teacher's `coarse_monotonic_clock_updater` shape of "one `tokio::spawn`ed
//! `loop { sleep; do_work }` task owned by the runtime entry point".

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::shardwire::cluster::{BackendTable, RoleFlags};
use crate::shardwire::common::coarse_monotonic_now;
use crate::shardwire::config::MonitorConfig;
use crate::shardwire::monitor::{
    do_failover, maintain_on_master, read_lag_on_replica, run_tick, select_candidate, should_failover, EventScriptRunner,
    FailoverDecision, FailoverGate, FailoverSql, HeartbeatSql, MonitoredServer, Prober,
};

/// Backend-facing collaborators the tick loop drives (spec §1's "real
/// connection/query execution is external" collaborators, bundled so
/// `run_servers` has a single thing to construct and hand down).
///
/// Bounded by `Send + Sync` (beyond what the bare traits require) because
/// the tick loop is a `tokio::spawn`ed task: these references are held
/// across its `.await` points, so the future itself must be `Send`.
pub struct MonitorBackends<'a> {
    pub prober: &'a (dyn Prober + Send + Sync),
    pub failover_sql: &'a (dyn FailoverSql + Send + Sync),
    pub heartbeat_sql: Option<&'a (dyn HeartbeatSql + Send + Sync)>,
    pub script_runner: Option<&'a (dyn EventScriptRunner + Send + Sync)>,
}

/// Outcome of one [`tick`], for callers (tests, mainly) that want to observe
/// what the tick decided without re-deriving it from `FailoverGate`/logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStepOutcome {
    NoMasterKnownYet,
    Decided(FailoverDecision),
    FailoverRan { candidate_backend_index: usize, redirected: usize },
    FailoverFailed,
}

/// Runs the tick loop forever; spawned with `tokio::spawn` by `run_servers`
/// and never expected to return. Thin wrapper around [`tick`] so the
/// per-tick decision logic is independently callable (and testable) without
/// an infinite loop or a real sleep.
pub async fn run(
    cfg: &MonitorConfig,
    cluster: Arc<Mutex<BackendTable>>,
    gate: Arc<FailoverGate>,
    backends: MonitorBackends<'_>,
    replication_user: &str,
    replication_password: &str,
    maxscale_id: i32,
) {
    let mut servers: Vec<MonitoredServer> = {
        let cluster = cluster.lock().await;
        (0..cluster.len()).map(MonitoredServer::new).collect()
    };

    // Tracks which backend last held the MASTER role. The role flags a
    // downed master carries get cleared by `run_tick` step 4-6 once it stops
    // responding, so `should_failover` needs this remembered separately from
    // "whichever server currently has RoleFlags::MASTER".
    let mut known_master_idx: Option<usize> = None;
    let mut tick_number = 0u64;

    loop {
        tokio::time::sleep(Duration::from_millis(cfg.base_interval_ms)).await;
        tick(
            cfg,
            &cluster,
            &mut servers,
            &mut known_master_idx,
            &mut tick_number,
            &gate,
            &backends,
            replication_user,
            replication_password,
            maxscale_id,
        )
        .await;
    }
}

/// Runs steps 3-11 of one tick (spec §4.6): probe, publish, heartbeat
/// maintenance, then `should_failover`/`do_failover`. Separated from [`run`]
/// so it can be driven directly (no sleep, no infinite loop) by tests and,
/// eventually, by an admin-triggered "check now" surface.
#[allow(clippy::too_many_arguments)]
pub async fn tick(
    cfg: &MonitorConfig,
    cluster: &Mutex<BackendTable>,
    servers: &mut Vec<MonitoredServer>,
    known_master_idx: &mut Option<usize>,
    tick_number: &mut u64,
    gate: &FailoverGate,
    backends: &MonitorBackends<'_>,
    replication_user: &str,
    replication_password: &str,
    maxscale_id: i32,
) -> TickStepOutcome {
    let mut cluster = cluster.lock().await;
    let outcome = run_tick(
        &mut cluster,
        servers,
        cfg,
        backends.prober,
        backends.script_runner.map(|r| r as &dyn EventScriptRunner),
        *tick_number,
        false,
    );
    *tick_number = tick_number.wrapping_add(1);
    if !outcome.newly_failed.is_empty() {
        // Spec §4.6 step 9 calls for hanging up connections to these backends; that
        // lives in the accept-loop/session layer once a `ConnectionHandler` exists.
        warn!(backends = ?outcome.newly_failed, "backends newly failed this tick");
    }

    if let Some(idx) = servers.iter().position(|s| s.previous_status().contains(RoleFlags::MASTER)) {
        *known_master_idx = Some(idx);
    }

    let replica_idxs: Vec<usize> =
        servers.iter().enumerate().filter(|(_, s)| s.previous_status().contains(RoleFlags::SLAVE)).map(|(i, _)| i).collect();

    if cfg.detect_replication_lag {
        if let (Some(sql), Some(replica_master_id)) =
            (backends.heartbeat_sql, replica_idxs.first().map(|&i| servers[i].master_server_id as i32))
        {
            let now = coarse_monotonic_now();
            if let Some(mi) = *known_master_idx {
                maintain_on_master(sql, servers[mi].backend_index, maxscale_id, replica_master_id, now);
            }
            for &ri in &replica_idxs {
                if let Some(lag) = read_lag_on_replica(sql, servers[ri].backend_index, replica_master_id, maxscale_id, now) {
                    if let Some(b) = cluster.get_mut(servers[ri].backend_index) {
                        b.replication_lag_secs = lag as u64;
                    }
                }
            }
        }
    }

    let Some(master_idx) = *known_master_idx else {
        return TickStepOutcome::NoMasterKnownYet;
    };
    let running_master_count = servers
        .iter()
        .filter(|s| s.previous_status().contains(RoleFlags::MASTER) && s.previous_status().contains(RoleFlags::RUNNING))
        .count();
    let topology_is_flat = running_master_count <= 1;

    let replicas: Vec<&MonitoredServer> = replica_idxs.iter().map(|&i| &servers[i]).collect();
    let decision = should_failover(cfg, gate, &servers[master_idx], &replicas, topology_is_flat);
    if decision != FailoverDecision::Run {
        if !matches!(decision, FailoverDecision::Disabled | FailoverDecision::MasterNotDown) {
            warn!(?decision, "failover not run this tick");
        }
        return TickStepOutcome::Decided(decision);
    }

    let running_replicas: Vec<&MonitoredServer> =
        replicas.iter().copied().filter(|r| r.previous_status().contains(RoleFlags::RUNNING)).collect();
    let Some(candidate) = select_candidate(&running_replicas) else {
        warn!("failover triggered but no usable candidate replica");
        return TickStepOutcome::Decided(decision);
    };
    let candidate_backend_index = candidate.backend_index;
    let redirect_set: Vec<usize> =
        replica_idxs.iter().map(|&i| servers[i].backend_index).filter(|&idx| idx != candidate_backend_index).collect();

    let result = do_failover(
        &cluster,
        cfg,
        candidate_backend_index,
        &redirect_set,
        replication_user,
        replication_password,
        backends.failover_sql,
    )
    .await;
    match result {
        Ok(redirected) => {
            info!(candidate = candidate_backend_index, redirected, "failover completed");
            TickStepOutcome::FailoverRan { candidate_backend_index, redirected }
        }
        Err(e) => {
            error!(error = %e, "failover failed, disabling automatic failover");
            gate.disable_permanently();
            TickStepOutcome::FailoverFailed
        }
    }
}
