pub mod shardwire;
#[cfg(test)]
mod tests;

use std::io;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::Mutex;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::shardwire::cluster::BackendTable;
use crate::shardwire::common::{coarse_monotonic_clock_updater, Error, Result};
use crate::shardwire::config::{load_config, Settings};
use crate::shardwire::monitor::{
    run_monitor_loop, EventScriptRunner, FailoverGate, FailoverSql, HeartbeatSql, MonitorBackends, ProbeResult, Prober,
};

pub fn init_tracing(max_level: Level) {
    let subscriber = FmtSubscriber::builder().with_max_level(max_level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Loads configuration settings, searched for per [`shardwire::config::load_config`].
pub fn init_settings() -> Result<&'static Settings> {
    load_config()?;
    Ok(shardwire::config::conf())
}

pub fn init_runtime(conf: &Settings) -> io::Result<Runtime> {
    Builder::new_multi_thread().worker_threads(conf.num_workers as usize).enable_all().build()
}

/// Placeholder for the monitor's backend-facing collaborators (probing,
/// failover SQL, heartbeat-table SQL) until a real MySQL wire-protocol
/// client is wired in (spec §1: "real connection/query execution is
/// external"). Reports every backend unreachable rather than silently doing
/// nothing, so a deployment without that client wired up fails loudly
/// instead of looking like a healthy, idle cluster.
struct UnconnectedBackendIo;

impl Prober for UnconnectedBackendIo {
    fn probe(&self, _backend_index: usize) -> ProbeResult {
        ProbeResult::default()
    }
}

impl FailoverSql for UnconnectedBackendIo {
    fn stop_slave(&self, _backend_index: usize) -> Result<()> {
        Err(Error::new("no backend SQL connection wired up"))
    }
    fn reset_slave_all(&self, _backend_index: usize) -> Result<()> {
        Err(Error::new("no backend SQL connection wired up"))
    }
    fn set_read_only(&self, _backend_index: usize, _read_only: bool) -> Result<()> {
        Err(Error::new("no backend SQL connection wired up"))
    }
    fn change_master_to(
        &self,
        _backend_index: usize,
        _new_master_host: &str,
        _new_master_port: u16,
        _repl_user: &str,
        _repl_password: &str,
    ) -> Result<()> {
        Err(Error::new("no backend SQL connection wired up"))
    }
    fn start_slave(&self, _backend_index: usize) -> Result<()> {
        Err(Error::new("no backend SQL connection wired up"))
    }
    fn relay_log_backlog(&self, _backend_index: usize) -> i128 {
        0
    }
}

impl HeartbeatSql for UnconnectedBackendIo {
    fn execute(&self, _backend_index: usize, _sql: &str) -> Result<()> {
        Err(Error::new("no backend SQL connection wired up"))
    }
    fn query_timestamp(&self, _backend_index: usize, _sql: &str) -> Result<Option<u32>> {
        Err(Error::new("no backend SQL connection wired up"))
    }
}

impl EventScriptRunner for UnconnectedBackendIo {
    fn run(&self, script_path: &str, backend_name: &str, previous: crate::shardwire::cluster::RoleFlags, current: crate::shardwire::cluster::RoleFlags) -> bool {
        tracing::warn!(script_path, backend_name, %previous, %current, "state-change script runner not wired up, skipping");
        false
    }
}

pub fn run_servers(conf: &'static Settings, tokio: &Runtime) {
    tokio.block_on(async move {
        tokio::spawn(coarse_monotonic_clock_updater());

        let cluster = Arc::new(Mutex::new(BackendTable::from_configs(&conf.cluster.backends)));
        let gate = Arc::new(FailoverGate::new(conf.monitor.failover));
        let backend_io: &'static UnconnectedBackendIo = Box::leak(Box::new(UnconnectedBackendIo));
        let backends = MonitorBackends {
            prober: backend_io,
            failover_sql: backend_io,
            heartbeat_sql: Some(backend_io),
            script_runner: Some(backend_io),
        };
        tokio::spawn(run_monitor_loop(
            &conf.monitor,
            cluster,
            gate,
            backends,
            &conf.cluster.replication_user,
            &conf.cluster.replication_password,
            0,
        ));

        // TODO wire an accept loop per `shardwire::service::Service` once a
        // concrete `ConnectionHandler` implementing the MySQL wire-protocol
        // session loop exists; routing decisions themselves already live in
        // `shardwire::engine`.
    });
}
