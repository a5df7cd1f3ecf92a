use std::sync::Mutex;

use bytes::Bytes;

use crate::shardwire::config::RwrConfig;
use crate::shardwire::engine::{route_query, RouteOutcome, RouterInstance};
use crate::shardwire::router::{BackendWriter, RouteHints};
use crate::shardwire::session::ClientSession;
use crate::shardwire::common::Result;
use crate::tests::common::{cluster, session_with_refs};

struct RecordingWriter {
    writes: Mutex<Vec<(usize, Bytes)>>,
}

impl RecordingWriter {
    fn new() -> Self {
        RecordingWriter { writes: Mutex::new(Vec::new()) }
    }

    fn backend_indexes(&self) -> Vec<usize> {
        self.writes.lock().unwrap().iter().map(|(idx, _)| *idx).collect()
    }
}

impl BackendWriter for RecordingWriter {
    fn write(&self, backend_index: usize, stmt_buf: &Bytes) -> Result<()> {
        self.writes.lock().unwrap().push((backend_index, stmt_buf.clone()));
        Ok(())
    }
}

fn route(session: &mut ClientSession, cluster: &crate::shardwire::cluster::BackendTable, cfg: &RwrConfig, sql: &str, writer: &RecordingWriter) -> RouteOutcome {
    route_query(
        session,
        cluster,
        &RouterInstance::ReadWriteSplit { cfg },
        Bytes::copy_from_slice(sql.as_bytes()),
        0x03,
        &RouteHints::default(),
        writer,
    )
    .unwrap()
}

/// `SET @a=1;` `SELECT @a;` against one primary + two replicas: the `SET`
/// replays to every backend, the `SELECT` goes to a single replica.
#[test]
fn s1_uservar_assignment_then_read_splits_all_then_slave() {
    let cluster = cluster(&["primary", "r1", "r2"]);
    let mut session = session_with_refs(&cluster, 0);
    let cfg = RwrConfig::default();
    let writer = RecordingWriter::new();

    let outcome = route(&mut session, &cluster, &cfg, "SET @a=1", &writer);
    assert_eq!(outcome, RouteOutcome::Dispatched);
    let mut hit = writer.backend_indexes();
    hit.sort();
    assert_eq!(hit, vec![0, 1, 2]);

    let outcome = route(&mut session, &cluster, &cfg, "SELECT @a", &writer);
    assert_eq!(outcome, RouteOutcome::Dispatched);
    let second_write = writer.writes.lock().unwrap()[3].0;
    assert!(second_write == 1 || second_write == 2);
}

/// `BEGIN;` `SELECT * FROM t;` `COMMIT;`: every statement targets MASTER,
/// the middle one because a transaction is active.
#[test]
fn s2_active_transaction_forces_every_statement_to_master() {
    let cluster = cluster(&["primary", "r1", "r2"]);
    let mut session = session_with_refs(&cluster, 0);
    let cfg = RwrConfig::default();
    let writer = RecordingWriter::new();

    route(&mut session, &cluster, &cfg, "BEGIN", &writer);
    assert!(session.transaction_active);
    assert_eq!(writer.writes.lock().unwrap()[0].0, 0);

    route(&mut session, &cluster, &cfg, "SELECT * FROM t", &writer);
    assert_eq!(writer.writes.lock().unwrap()[1].0, 0);

    route(&mut session, &cluster, &cfg, "COMMIT", &writer);
    assert!(!session.transaction_active);
    assert_eq!(writer.writes.lock().unwrap()[2].0, 0);
}

/// `SELECT LAST_INSERT_ID();` always targets MASTER (MASTER_READ), even
/// with no transaction open.
#[test]
fn s3_last_insert_id_targets_master() {
    let cluster = cluster(&["primary", "r1", "r2"]);
    let mut session = session_with_refs(&cluster, 0);
    let cfg = RwrConfig::default();
    let writer = RecordingWriter::new();

    route(&mut session, &cluster, &cfg, "SELECT LAST_INSERT_ID()", &writer);
    assert_eq!(writer.writes.lock().unwrap()[0].0, 0);
}

/// `CREATE TEMPORARY TABLE tmp(id INT);` `SELECT * FROM tmp;`: both
/// statements go to MASTER, the second because `tmp` was recorded as a
/// temp table owned there.
#[test]
fn s4_temp_table_reads_stick_to_the_creating_backend() {
    let cluster = cluster(&["primary", "r1", "r2"]);
    let mut session = session_with_refs(&cluster, 0);
    let cfg = RwrConfig::default();
    let writer = RecordingWriter::new();

    route(&mut session, &cluster, &cfg, "CREATE TEMPORARY TABLE tmp(id INT)", &writer);
    assert_eq!(writer.writes.lock().unwrap()[0].0, 0);
    assert_eq!(session.temp_table_owner("", "tmp"), Some(0));

    route(&mut session, &cluster, &cfg, "SELECT * FROM tmp", &writer);
    assert_eq!(writer.writes.lock().unwrap()[1].0, 0);
}
