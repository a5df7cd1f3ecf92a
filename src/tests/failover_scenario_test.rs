use std::sync::Mutex;

use crate::shardwire::cluster::Gtid;
use crate::shardwire::config::MonitorConfig;
use crate::shardwire::monitor::{
    do_failover, select_candidate, should_failover, FailoverDecision, FailoverGate, FailoverSql, MonitoredServer,
};
use crate::shardwire::common::Result;
use crate::tests::common::cluster;

struct RecordingSql {
    calls: Mutex<Vec<String>>,
}

impl RecordingSql {
    fn new() -> Self {
        RecordingSql { calls: Mutex::new(Vec::new()) }
    }
}

impl FailoverSql for RecordingSql {
    fn stop_slave(&self, backend_index: usize) -> Result<()> {
        self.calls.lock().unwrap().push(format!("stop_slave:{}", backend_index));
        Ok(())
    }

    fn reset_slave_all(&self, backend_index: usize) -> Result<()> {
        self.calls.lock().unwrap().push(format!("reset_slave_all:{}", backend_index));
        Ok(())
    }

    fn set_read_only(&self, backend_index: usize, read_only: bool) -> Result<()> {
        self.calls.lock().unwrap().push(format!("set_read_only:{}:{}", backend_index, read_only));
        Ok(())
    }

    fn change_master_to(&self, backend_index: usize, _host: &str, _port: u16, _user: &str, _password: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("change_master_to:{}", backend_index));
        Ok(())
    }

    fn start_slave(&self, backend_index: usize) -> Result<()> {
        self.calls.lock().unwrap().push(format!("start_slave:{}", backend_index));
        Ok(())
    }

    fn relay_log_backlog(&self, _backend_index: usize) -> i128 {
        0
    }
}

/// Monitor tick observes primary P down, replicas R1 (GTID seq 100) and R2
/// (seq 102); `verify_master_failure` is on and neither replica has seen an
/// event from P recently. Failover picks R2, drains instantly (backlog is
/// already zero), promotes it, then redirects R1.
#[tokio::test]
async fn s7_failover_promotes_the_most_advanced_replica_and_redirects_the_rest() {
    let cluster = cluster(&["p", "r1", "r2"]);

    let mut cfg = MonitorConfig::default();
    cfg.failover = true;
    cfg.verify_master_failure = true;
    cfg.master_failure_timeout = 0;

    let mut master = MonitoredServer::new(0);
    master.publish(); // stays at the empty (not-RUNNING) default status.

    let mut r1 = MonitoredServer::new(1);
    r1.sql_thread_running = true;
    r1.gtid_io_pos = Gtid { domain: 0, server_id: 10, sequence: 100 };
    r1.gtid_slave_pos = Gtid { domain: 0, server_id: 10, sequence: 100 };

    let mut r2 = MonitoredServer::new(2);
    r2.sql_thread_running = true;
    r2.gtid_io_pos = Gtid { domain: 0, server_id: 11, sequence: 102 };
    r2.gtid_slave_pos = Gtid { domain: 0, server_id: 11, sequence: 102 };

    let gate = FailoverGate::new(true);
    let decision = should_failover(&cfg, &gate, &master, &[&r1, &r2], true);
    assert_eq!(decision, FailoverDecision::Run);

    let candidate = select_candidate(&[&r1, &r2]).expect("a candidate must be chosen");
    assert_eq!(candidate.backend_index, 2);

    let sql = RecordingSql::new();
    let redirected = do_failover(&cluster, &cfg, candidate.backend_index, &[1], "repl", "pw", &sql).await.unwrap();
    assert_eq!(redirected, 1);

    let calls = sql.calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            "stop_slave:2".to_string(),
            "reset_slave_all:2".to_string(),
            "set_read_only:2:false".to_string(),
            "stop_slave:1".to_string(),
            "change_master_to:1".to_string(),
            "start_slave:1".to_string(),
        ]
    );
}

/// A master still marked RUNNING blocks failover even if it was requested.
#[test]
fn s7_running_master_is_never_failed_over() {
    let mut cfg = MonitorConfig::default();
    cfg.failover = true;

    let mut master = MonitoredServer::new(0);
    master.set_pending_status(crate::shardwire::cluster::RoleFlags::RUNNING | crate::shardwire::cluster::RoleFlags::MASTER);
    master.publish();

    let gate = FailoverGate::new(true);
    let decision = should_failover(&cfg, &gate, &master, &[], true);
    assert_eq!(decision, FailoverDecision::MasterNotDown);
}
