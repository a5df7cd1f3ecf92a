//! Replication heartbeat table maintenance (spec §6 "Persisted state",
//! original_source `mysql_mon.cc`'s `set_master_heartbeat`/
//! `set_slave_heartbeat`): when enabled, the monitor writes its own
//! timestamp into a row on the primary and reads it back from replicas to
//! measure lag directly, which is more accurate than a replica's own
//! `Seconds_Behind_Master` estimate (clock skew and long-running events
//! both throw that off).
//!
//! Modeled as a plain row struct plus the SQL text needed to create, purge,
//! upsert, and read it — no ORM, matching the rest of this crate's direct
//! SQL-as-text approach in [`super::failover::run_switchover`]. Execution is
//! abstracted behind [`HeartbeatSql`] the same way [`super::failover::FailoverSql`]
//! abstracts the failover procedure's queries, so this is unit-testable
//! without a real connection.

use tracing::warn;

use crate::shardwire::common::Result;

pub const HEARTBEAT_TABLE: &str = "maxscale_schema.replication_heartbeat";

/// One row of `maxscale_schema.replication_heartbeat` (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRow {
    pub maxscale_id: i32,
    pub master_server_id: i32,
    pub master_timestamp: u32,
}

pub fn create_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (maxscale_id INT NOT NULL, master_server_id INT NOT NULL, \
         master_timestamp INT UNSIGNED NOT NULL, PRIMARY KEY (master_server_id, maxscale_id))",
        HEARTBEAT_TABLE
    )
}

/// Drops rows older than `max_age_secs` (the original keeps 48 hours).
pub fn purge_sql(now: u32, max_age_secs: u32) -> String {
    format!("DELETE FROM {} WHERE master_timestamp < {}", HEARTBEAT_TABLE, now.saturating_sub(max_age_secs))
}

pub fn upsert_sql(row: HeartbeatRow) -> String {
    format!(
        "REPLACE INTO {} (master_server_id, maxscale_id, master_timestamp) VALUES ({}, {}, {})",
        HEARTBEAT_TABLE, row.master_server_id, row.maxscale_id, row.master_timestamp
    )
}

pub fn select_sql(master_server_id: i32, maxscale_id: i32) -> String {
    format!(
        "SELECT master_timestamp FROM {} WHERE master_server_id = {} AND maxscale_id = {}",
        HEARTBEAT_TABLE, master_server_id, maxscale_id
    )
}

/// The queries `maintain_on_master`/`read_on_replica` issue, abstracted so
/// callers can substitute a real connection or a test double.
pub trait HeartbeatSql {
    fn execute(&self, backend_index: usize, sql: &str) -> Result<()>;
    /// Returns the `master_timestamp` column, if a row exists.
    fn query_timestamp(&self, backend_index: usize, sql: &str) -> Result<Option<u32>>;
}

const MAX_AGE_SECS: u32 = 48 * 3600;

/// Creates the table if missing, purges stale rows, and upserts this
/// MaxScale's current timestamp against the primary (spec §1.5). Best-effort:
/// any failure is logged and swallowed, never propagated to fail a tick.
pub fn maintain_on_master(sql: &dyn HeartbeatSql, master_backend_index: usize, maxscale_id: i32, master_server_id: i32, now: u32) {
    if let Err(e) = sql.execute(master_backend_index, &create_table_sql()) {
        warn!(error = %e, "replication heartbeat: could not ensure table exists");
        return;
    }
    if let Err(e) = sql.execute(master_backend_index, &purge_sql(now, MAX_AGE_SECS)) {
        warn!(error = %e, "replication heartbeat: purge failed");
    }
    let row = HeartbeatRow { maxscale_id, master_server_id, master_timestamp: now };
    if let Err(e) = sql.execute(master_backend_index, &upsert_sql(row)) {
        warn!(error = %e, "replication heartbeat: upsert failed");
    }
}

/// Reads the heartbeat row back from a replica and returns the lag in
/// seconds (`now - master_timestamp`), or `None` if no row was found or the
/// query failed.
pub fn read_lag_on_replica(
    sql: &dyn HeartbeatSql,
    replica_backend_index: usize,
    master_server_id: i32,
    maxscale_id: i32,
    now: u32,
) -> Option<u32> {
    match sql.query_timestamp(replica_backend_index, &select_sql(master_server_id, maxscale_id)) {
        Ok(Some(ts)) => Some(now.saturating_sub(ts)),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "replication heartbeat: read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeSql {
        rows: RefCell<HashMap<(i32, i32), u32>>,
        fail_next: bool,
    }

    impl HeartbeatSql for FakeSql {
        fn execute(&self, _backend_index: usize, sql: &str) -> Result<()> {
            if self.fail_next {
                return Err(crate::shardwire::common::Error::new("boom"));
            }
            if sql.starts_with("REPLACE") {
                self.rows.borrow_mut().insert((1, 7), 1000);
            }
            Ok(())
        }

        fn query_timestamp(&self, _backend_index: usize, _sql: &str) -> Result<Option<u32>> {
            Ok(self.rows.borrow().get(&(1, 7)).copied())
        }
    }

    #[test]
    fn upsert_then_read_back_computes_lag() {
        let sql = FakeSql { rows: RefCell::new(HashMap::new()), fail_next: false };
        maintain_on_master(&sql, 0, 7, 1, 1000);
        let lag = read_lag_on_replica(&sql, 1, 1, 7, 1005);
        assert_eq!(lag, Some(5));
    }

    #[test]
    fn missing_row_yields_no_lag() {
        let sql = FakeSql { rows: RefCell::new(HashMap::new()), fail_next: false };
        let lag = read_lag_on_replica(&sql, 1, 1, 7, 1005);
        assert_eq!(lag, None);
    }

    #[test]
    fn maintenance_failure_is_swallowed_not_propagated() {
        let sql = FakeSql { rows: RefCell::new(HashMap::new()), fail_next: true };
        maintain_on_master(&sql, 0, 7, 1, 1000); // must not panic
    }

    #[test]
    fn create_table_sql_matches_the_documented_schema() {
        let ddl = create_table_sql();
        assert!(ddl.contains("maxscale_id INT NOT NULL"));
        assert!(ddl.contains("PRIMARY KEY (master_server_id, maxscale_id)"));
    }
}
