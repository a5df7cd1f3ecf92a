use std::time::Duration;

use tracing::warn;

use crate::shardwire::cluster::BackendTable;
use crate::shardwire::common::{coarse_monotonic_now, Error, Result};
use crate::shardwire::config::MonitorConfig;
use crate::shardwire::monitor::monitored_server::MonitoredServer;
use crate::shardwire::monitor::FailoverGate;

/// SQL/administrative actions `do_failover` and `redirect` issue against a
/// candidate or redirected replica (spec §4.6). Real connection/exec is
/// external, mirroring [`crate::shardwire::router::BackendWriter`]'s split
/// between decision logic and socket I/O.
pub trait FailoverSql {
    fn stop_slave(&self, backend_index: usize) -> Result<()>;
    fn reset_slave_all(&self, backend_index: usize) -> Result<()>;
    fn set_read_only(&self, backend_index: usize, read_only: bool) -> Result<()>;
    fn change_master_to(
        &self,
        backend_index: usize,
        new_master_host: &str,
        new_master_port: u16,
        repl_user: &str,
        repl_password: &str,
    ) -> Result<()>;
    fn start_slave(&self, backend_index: usize) -> Result<()>;
    /// Polls and returns the candidate's current relay-log backlog (spec §4.6 step 2).
    fn relay_log_backlog(&self, backend_index: usize) -> i128;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverDecision {
    Disabled,
    MasterNotDown,
    MasterAliveButUnreachable,
    TopologyNotFlat,
    Run,
}

/// Spec §4.6 step 11's gate: decides whether failover should run this tick.
/// Consults [`FailoverGate`] rather than `cfg.failover` directly, since the
/// gate (not the static config) is what a failed switchover permanently
/// disables at runtime.
pub fn should_failover(
    cfg: &MonitorConfig,
    gate: &FailoverGate,
    master: &MonitoredServer,
    replicas: &[&MonitoredServer],
    topology_is_flat: bool,
) -> FailoverDecision {
    use crate::shardwire::cluster::RoleFlags;

    if !gate.is_enabled() {
        return FailoverDecision::Disabled;
    }
    if master.previous_status().contains(RoleFlags::RUNNING) {
        return FailoverDecision::MasterNotDown;
    }
    if cfg.verify_master_failure {
        let now = coarse_monotonic_now();
        let corroborated_down = replicas
            .iter()
            .all(|r| now.saturating_sub(r.last_event_timestamp) >= cfg.master_failure_timeout as u32);
        if !corroborated_down {
            return FailoverDecision::MasterAliveButUnreachable;
        }
    }
    if !topology_is_flat {
        return FailoverDecision::TopologyNotFlat;
    }
    FailoverDecision::Run
}

/// Picks the replica with the most advanced GTID position as the failover
/// candidate (spec §4.6 step 2: "most advanced replica by GTID position").
pub fn select_candidate<'a>(running_replicas: &[&'a MonitoredServer]) -> Option<&'a MonitoredServer> {
    running_replicas
        .iter()
        .filter(|s| s.sql_thread_running)
        .max_by_key(|s| (s.gtid_io_pos.sequence, s.gtid_slave_pos.sequence))
        .copied()
}

async fn drain_relay_log(sql: &(dyn FailoverSql + Send + Sync), candidate_backend_index: usize, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if sql.relay_log_backlog(candidate_backend_index) <= 0 {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::failover_failed("candidate's relay log did not drain before failover_timeout"));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn promote(sql: &(dyn FailoverSql + Send + Sync), candidate_backend_index: usize) -> Result<()> {
    sql.stop_slave(candidate_backend_index)?;
    sql.reset_slave_all(candidate_backend_index)?;
    sql.set_read_only(candidate_backend_index, false)?;
    Ok(())
}

/// Redirects the remaining replicas to the newly promoted master (spec §4.6
/// step 2's final stage). Best-effort: one replica failing to redirect does
/// not abort the others.
async fn redirect(
    sql: &(dyn FailoverSql + Send + Sync),
    redirect_set: &[usize],
    cluster: &BackendTable,
    new_master_backend_index: usize,
    repl_user: &str,
    repl_password: &str,
) -> Result<usize> {
    let new_master = cluster.get(new_master_backend_index).ok_or_else(Error::no_usable_backend)?;
    let host = new_master.host.clone();
    let port = new_master.port;
    let mut successes = 0;
    for &idx in redirect_set {
        let result: Result<()> = (|| {
            sql.stop_slave(idx)?;
            sql.change_master_to(idx, &host, port, repl_user, repl_password)?;
            sql.start_slave(idx)?;
            Ok(())
        })();
        match result {
            Ok(()) => successes += 1,
            Err(e) => warn!(backend = idx, error = %e, "redirect to new master failed for replica"),
        }
    }
    if successes == 0 && !redirect_set.is_empty() {
        return Err(Error::failover_failed("no replica could be redirected to the new master"));
    }
    Ok(successes)
}

/// Runs the full failover procedure: drain, promote, redirect (spec §4.6 step 2).
/// Returns the number of replicas successfully redirected.
pub async fn do_failover(
    cluster: &BackendTable,
    cfg: &MonitorConfig,
    candidate_backend_index: usize,
    redirect_set: &[usize],
    repl_user: &str,
    repl_password: &str,
    sql: &(dyn FailoverSql + Send + Sync),
) -> Result<usize> {
    drain_relay_log(sql, candidate_backend_index, Duration::from_secs(cfg.failover_timeout)).await?;
    promote(sql, candidate_backend_index).await?;
    redirect(sql, redirect_set, cluster, candidate_backend_index, repl_user, repl_password).await
}

pub trait ScriptRunner {
    /// Runs an external script with the given environment, returning its exit code.
    fn run(&self, script_path: &str, env: &[(String, String)]) -> i32;
}

pub struct SwitchoverRequest<'a> {
    pub current_master: &'a str,
    pub new_master: &'a str,
    pub nodelist: Vec<String>,
    pub slavelist: Vec<String>,
    pub credentials: &'a str,
}

/// Operator-triggered switchover (spec §4.6 / §6): runs `switchover_script`
/// with `CURRENT_MASTER`/`NEW_MASTER`/`NODELIST`/`SLAVELIST`/`CREDENTIALS`
/// set, succeeding only on exit code 0.
pub fn run_switchover(cfg: &MonitorConfig, req: &SwitchoverRequest, runner: &dyn ScriptRunner) -> Result<()> {
    let script = cfg
        .switchover_script
        .as_deref()
        .ok_or_else(|| Error::failover_precondition("no switchover_script configured"))?;
    let env = vec![
        ("CURRENT_MASTER".to_string(), req.current_master.to_string()),
        ("NEW_MASTER".to_string(), req.new_master.to_string()),
        ("NODELIST".to_string(), req.nodelist.join(",")),
        ("SLAVELIST".to_string(), req.slavelist.join(",")),
        ("CREDENTIALS".to_string(), req.credentials.to_string()),
    ];
    let code = runner.run(script, &env);
    if code == 0 {
        Ok(())
    } else {
        Err(Error::failover_failed(format!("switchover script exited with code {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shardwire::cluster::Gtid;

    fn server(backend_index: usize, seq: u64) -> MonitoredServer {
        let mut s = MonitoredServer::new(backend_index);
        s.sql_thread_running = true;
        s.gtid_io_pos = Gtid { domain: 0, server_id: 1, sequence: seq };
        s.gtid_slave_pos = Gtid { domain: 0, server_id: 1, sequence: seq };
        s
    }

    #[test]
    fn candidate_is_the_most_advanced_replica() {
        let a = server(0, 10);
        let b = server(1, 50);
        let c = server(2, 30);
        let picked = select_candidate(&[&a, &b, &c]).unwrap();
        assert_eq!(picked.backend_index, 1);
    }

    #[test]
    fn candidate_excludes_replicas_with_stopped_sql_thread() {
        let mut a = server(0, 100);
        a.sql_thread_running = false;
        let b = server(1, 10);
        let picked = select_candidate(&[&a, &b]).unwrap();
        assert_eq!(picked.backend_index, 1);
    }

    #[test]
    fn disabled_failover_never_runs() {
        let cfg = MonitorConfig::default();
        let gate = FailoverGate::new(false);
        let mut master = MonitoredServer::new(0);
        master.set_pending_status(crate::shardwire::cluster::RoleFlags::empty());
        master.publish();
        let decision = should_failover(&cfg, &gate, &master, &[], true);
        assert_eq!(decision, FailoverDecision::Disabled);
    }

    #[test]
    fn a_gate_disabled_at_runtime_blocks_failover_even_when_configured_on() {
        let mut cfg = MonitorConfig::default();
        cfg.failover = true;
        let gate = FailoverGate::new(true);
        gate.disable_permanently();
        let mut master = MonitoredServer::new(0);
        master.set_pending_status(crate::shardwire::cluster::RoleFlags::empty());
        master.publish();
        let decision = should_failover(&cfg, &gate, &master, &[], true);
        assert_eq!(decision, FailoverDecision::Disabled);
    }

    #[test]
    fn running_master_blocks_failover() {
        let mut cfg = MonitorConfig::default();
        cfg.failover = true;
        let gate = FailoverGate::new(true);
        let mut master = MonitoredServer::new(0);
        master.set_pending_status(crate::shardwire::cluster::RoleFlags::RUNNING | crate::shardwire::cluster::RoleFlags::MASTER);
        master.publish();
        let decision = should_failover(&cfg, &gate, &master, &[], true);
        assert_eq!(decision, FailoverDecision::MasterNotDown);
    }

    #[test]
    fn switchover_without_configured_script_is_a_precondition_error() {
        let cfg = MonitorConfig::default();
        struct NoopRunner;
        impl ScriptRunner for NoopRunner {
            fn run(&self, _script_path: &str, _env: &[(String, String)]) -> i32 {
                0
            }
        }
        let req = SwitchoverRequest {
            current_master: "m1",
            new_master: "m2",
            nodelist: vec![],
            slavelist: vec![],
            credentials: "user:pass",
        };
        let err = run_switchover(&cfg, &req, &NoopRunner).unwrap_err();
        assert!(!err.is_fatal());
    }
}
