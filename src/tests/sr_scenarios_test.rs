use std::sync::Mutex;

use bytes::Bytes;

use crate::shardwire::config::SrConfig;
use crate::shardwire::engine::{route_query, RouteOutcome, RouterInstance};
use crate::shardwire::router::{BackendWriter, RouteHints, ShardMap};
use crate::shardwire::common::Result;
use crate::tests::common::{cluster, session_with_refs};

struct RecordingWriter {
    writes: Mutex<Vec<(usize, Bytes)>>,
}

impl RecordingWriter {
    fn new() -> Self {
        RecordingWriter { writes: Mutex::new(Vec::new()) }
    }
}

impl BackendWriter for RecordingWriter {
    fn write(&self, backend_index: usize, stmt_buf: &Bytes) -> Result<()> {
        self.writes.lock().unwrap().push((backend_index, stmt_buf.clone()));
        Ok(())
    }
}

/// `USE shard_b;` `SELECT * FROM customers;` against a shard map
/// `{shard_a -> B1, shard_b -> B2}`: both statements land on B2, and the
/// `USE` adopts `shard_b` as the session's current database.
#[test]
fn s5_use_then_unqualified_read_route_to_the_named_shard() {
    let cluster = cluster(&["b1", "b2"]);
    let mut session = session_with_refs(&cluster, 0);
    let cfg = SrConfig::default();
    let mut shard_map = ShardMap::new();
    shard_map.insert("shard_a".to_string(), 0);
    shard_map.insert("shard_b".to_string(), 1);
    let writer = RecordingWriter::new();

    let outcome = route_query(
        &mut session,
        &cluster,
        &RouterInstance::Schema { cfg: &cfg, shard_map: &shard_map },
        Bytes::from_static(b"USE shard_b"),
        0x03,
        &RouteHints::default(),
        &writer,
    )
    .unwrap();
    assert_eq!(outcome, RouteOutcome::Dispatched);
    assert_eq!(writer.writes.lock().unwrap()[0].0, 1);
    assert_eq!(session.current_db.as_deref(), Some("shard_b"));

    let outcome = route_query(
        &mut session,
        &cluster,
        &RouterInstance::Schema { cfg: &cfg, shard_map: &shard_map },
        Bytes::from_static(b"SELECT * FROM customers"),
        0x03,
        &RouteHints::default(),
        &writer,
    )
    .unwrap();
    assert_eq!(outcome, RouteOutcome::Dispatched);
    assert_eq!(writer.writes.lock().unwrap()[1].0, 1);
}

/// `SHOW SHARDS;` against map `{a -> B1, b -> B2}`: intercepted with rows
/// `(a, b1), (b, b2)`, no backend contacted.
#[test]
fn s6_show_shards_is_answered_from_the_map_without_touching_a_backend() {
    let cluster = cluster(&["b1", "b2"]);
    let mut session = session_with_refs(&cluster, 0);
    let cfg = SrConfig::default();
    let mut shard_map = ShardMap::new();
    shard_map.insert("a".to_string(), 0);
    shard_map.insert("b".to_string(), 1);
    let writer = RecordingWriter::new();

    let outcome = route_query(
        &mut session,
        &cluster,
        &RouterInstance::Schema { cfg: &cfg, shard_map: &shard_map },
        Bytes::from_static(b"SHOW SHARDS"),
        0x03,
        &RouteHints::default(),
        &writer,
    )
    .unwrap();

    assert_eq!(
        outcome,
        RouteOutcome::InterceptedRows(vec![
            vec!["a".to_string(), "b1".to_string()],
            vec!["b".to_string(), "b2".to_string()],
        ])
    );
    assert!(writer.writes.lock().unwrap().is_empty());
}
