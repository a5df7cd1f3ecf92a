//! The three routing entry points a connection-handling layer calls into
//! (spec §6: `routeQuery`, `clientReply`, `handleError`), plus `switchover`.
//! Everything here is synchronous decision logic over [`ClientSession`] and
//! [`BackendTable`]; the caller holds the session's lock for the duration
//! (spec §5 "Per-session lock") and performs the actual backend I/O through
//! the [`BackendWriter`] trait.

use bytes::Bytes;

use crate::shardwire::cluster::BackendTable;
use crate::shardwire::common::{Error, Result};
use crate::shardwire::config::{RwrConfig, SrConfig};
use crate::shardwire::monitor::{self, FailoverGate, ScriptRunner, SwitchoverRequest};
use crate::shardwire::config::MonitorConfig;
use crate::shardwire::qc::{classify, Operation, PacketKind, TypeMask};
use crate::shardwire::router::{
    self, compute_route_target, compute_target as sr_compute_target, dispatch, handle_reply, intercept,
    show_databases_rows, show_shards_rows, update_transaction_state, BackendWriter, Intercepted, RouteHints,
    RouteTarget, ShardMap, SrTarget,
};
use crate::shardwire::session::ClientSession;

/// Which router mode a proxy instance runs in (spec §2: "a given proxy
/// instance runs one or the other against a cluster").
pub enum RouterInstance<'a> {
    ReadWriteSplit { cfg: &'a RwrConfig },
    Schema { cfg: &'a SrConfig, shard_map: &'a ShardMap },
}

/// What `route_query` produced, beyond "dispatched to a backend": an
/// intercepted statement (spec §4.5) is answered with rows synthesized here
/// rather than a backend round trip; encoding them onto the wire is the
/// caller's job (spec §1 "low-level socket I/O... out of scope").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Dispatched,
    InterceptedRows(Vec<Vec<String>>),
}

/// `routeQuery(session, buffer) -> int` (spec §6). `Ok` means the caller
/// continues (1 in the spec's literal return convention); `Err` means the
/// session must close if [`Error::is_fatal`], or a protocol error packet
/// should be surfaced to the client otherwise (spec §7).
pub fn route_query(
    session: &mut ClientSession,
    cluster: &BackendTable,
    router: &RouterInstance,
    stmt_buf: Bytes,
    packet_type: u8,
    hints: &RouteHints,
    writer: &dyn BackendWriter,
) -> Result<RouteOutcome> {
    let classified = classify(&stmt_buf, PacketKind::Query);

    match router {
        RouterInstance::ReadWriteSplit { cfg } => {
            update_transaction_state(session, classified.type_mask);

            // Temp tables aren't replicated (spec §8 scenario S4): a read
            // that names one must go back to whichever backend created it,
            // overriding the usual READ -> SLAVE target.
            let current_db = session.current_db.clone().unwrap_or_default();
            let touches_temp_table = classified
                .referenced_tables
                .iter()
                .any(|table| session.temp_table_owner(&current_db, table).is_some());
            let target = if touches_temp_table {
                RouteTarget::master()
            } else {
                compute_route_target(classified.type_mask, session.transaction_active, hints)
            };

            if classified.type_mask.contains(TypeMask::CREATE_TMP_TABLE) {
                if let Some(table_name) = &classified.created_table_name {
                    let idx = session.master_refs_index().unwrap_or(0);
                    session.record_temp_table(current_db, table_name.clone(), idx);
                }
            }

            dispatch(session, cluster, cfg.slave_selection_criteria, &target, stmt_buf, packet_type, writer)?;
            Ok(RouteOutcome::Dispatched)
        }
        RouterInstance::Schema { shard_map, .. } => {
            let statement = String::from_utf8_lossy(&stmt_buf);
            if let Some(which) = intercept(&statement) {
                return Ok(reply_intercepted(which, cluster, shard_map));
            }

            update_transaction_state(session, classified.type_mask);
            let target = sr_compute_target(
                classified.type_mask,
                &classified.referenced_dbs,
                &classified.referenced_tables,
                session,
                cluster,
                shard_map,
                hints,
            )?;
            // `USE <db>` resolves to its owning backend like any other
            // single-shard statement; once routed, adopt it as the
            // session's current database (spec §8 scenario S5).
            if matches!(target, SrTarget::Backend(_)) && classified.operation == Operation::Use {
                if let Some(db) = classified.referenced_dbs.first() {
                    session.current_db = Some(db.clone());
                }
            }
            dispatch_sr(session, cluster, target, stmt_buf, packet_type, writer)?;
            Ok(RouteOutcome::Dispatched)
        }
    }
}

fn reply_intercepted(which: Intercepted, cluster: &BackendTable, shard_map: &ShardMap) -> RouteOutcome {
    let rows = match which {
        Intercepted::ShowShards => {
            show_shards_rows(shard_map, cluster).into_iter().map(|(db, backend)| vec![db, backend]).collect()
        }
        Intercepted::ShowDatabases => show_databases_rows(shard_map, cluster).into_iter().map(|db| vec![db]).collect(),
    };
    RouteOutcome::InterceptedRows(rows)
}

fn write_one(session: &mut ClientSession, refs_index: usize, stmt_buf: Bytes, writer: &dyn BackendWriter) -> Result<()> {
    let backend_index = session.backend_refs()[refs_index].backend_index;
    writer.write(backend_index, &stmt_buf)?;
    let r = &mut session.backend_refs_mut()[refs_index];
    r.set_pending_statement(stmt_buf);
    r.begin_wait();
    Ok(())
}

fn dispatch_sr(
    session: &mut ClientSession,
    cluster: &BackendTable,
    target: SrTarget,
    stmt_buf: Bytes,
    packet_type: u8,
    writer: &dyn BackendWriter,
) -> Result<()> {
    match target {
        SrTarget::Intercepted(_) => unreachable!("interception is resolved before SR target computation"),
        SrTarget::All => {
            session.command_log_mut().append(stmt_buf, packet_type)?;
            for i in 0..session.backend_refs().len() {
                router::replay_pending_commands(session, i, writer)?;
            }
            Ok(())
        }
        SrTarget::Any => {
            let idx = session
                .backend_refs()
                .iter()
                .position(|r| !r.is_closed() && cluster.get(r.backend_index).map_or(false, |b| b.is_running()))
                .ok_or_else(Error::no_usable_backend)?;
            write_one(session, idx, stmt_buf, writer)
        }
        SrTarget::Backend(backend_index) => {
            let idx = session
                .backend_refs()
                .iter()
                .position(|r| r.backend_index == backend_index && !r.is_closed())
                .ok_or_else(Error::no_usable_backend)?;
            write_one(session, idx, stmt_buf, writer)
        }
    }
}

/// `clientReply(session, buffer, originating_backend) -> void` (spec §6).
/// `originating_backend` names a backend in the cluster's [`BackendTable`];
/// this resolves it to the session's reference before continuing the replay
/// cursor (spec §4.4 Reply handling).
pub fn client_reply(
    session: &mut ClientSession,
    originating_backend_index: usize,
    reply: Bytes,
    writer: &dyn BackendWriter,
) -> Result<Option<Bytes>> {
    let refs_index = session
        .backend_refs()
        .iter()
        .position(|r| r.backend_index == originating_backend_index && !r.is_closed())
        .ok_or_else(Error::no_usable_backend)?;
    handle_reply(session, refs_index, reply, writer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    NewConnection,
    ReplyClient,
}

/// `handleError(session, errmsg, failed_backend, action, out succeeded)`
/// (spec §6; taxonomy item 3 in §7: "Backend write failure —
/// `handleError(NEW_CONNECTION)` runs; attempts to pick a replacement from
/// remaining backends; on success the session continues transparently; on
/// failure the session is closed."). `reconnect` performs the actual
/// candidate pick + connect and is supplied by the caller (spec §1 "external
/// collaborators").
pub fn handle_error(
    session: &mut ClientSession,
    failed_backend_index: usize,
    action: ErrorAction,
    reconnect: &dyn Fn(usize) -> Option<usize>,
) -> bool {
    let Some(refs_index) =
        session.backend_refs().iter().position(|r| r.backend_index == failed_backend_index && !r.is_closed())
    else {
        return false;
    };

    session.backend_refs_mut()[refs_index].mark_closed();

    match action {
        ErrorAction::ReplyClient => false,
        ErrorAction::NewConnection => match reconnect(failed_backend_index) {
            Some(replacement_backend_index) => match session.add_backend_ref(replacement_backend_index) {
                Ok(new_refs_index) => {
                    session.backend_refs_mut()[new_refs_index].mark_in_use();
                    if session.master().map(|m| m.backend_index) == Some(failed_backend_index) {
                        session.set_master(new_refs_index);
                    }
                    true
                }
                // Session command history is disabled and already past position 0:
                // the replacement can't be replayed up to date, so it can't join.
                Err(_) => false,
            },
            None => false,
        },
    }
}

/// `switchover(monitor_name, new_master, [current_master])` (spec §6, §4.6).
/// A failed switchover while failover was enabled permanently disables it
/// (spec §4.6: "or permanently disables failover if the switchover fails
/// and failover was enabled").
pub fn switchover(cfg: &MonitorConfig, gate: &FailoverGate, req: &SwitchoverRequest, runner: &dyn ScriptRunner) -> Result<()> {
    match monitor::run_switchover(cfg, req, runner) {
        Ok(()) => Ok(()),
        Err(e) => {
            if gate.is_enabled() {
                gate.disable_permanently();
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shardwire::config::BackendConfig;
    use std::sync::Mutex;

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

    fn cluster(names: &[&str]) -> BackendTable {
        let configs: Vec<BackendConfig> = names
            .iter()
            .map(|n| {
                let mut c = BackendConfig::default();
                c.name = n.to_string();
                c
            })
            .collect();
        BackendTable::from_configs(&configs)
    }

    fn session_with_refs(cluster: &BackendTable, master_backend: usize) -> ClientSession {
        let mut s = ClientSession::new(0, false);
        for i in 0..cluster.len() {
            let idx = s.add_backend_ref(i).unwrap();
            s.backend_refs_mut()[idx].mark_in_use();
            if i == master_backend {
                s.set_master(idx);
            }
        }
        s
    }

    #[test]
    fn read_query_dispatches_to_a_replica() {
        let cluster = cluster(&["primary", "replica"]);
        let mut session = session_with_refs(&cluster, 0);
        let cfg = RwrConfig::default();
        let writer = RecordingWriter::new();
        let outcome = route_query(
            &mut session,
            &cluster,
            &RouterInstance::ReadWriteSplit { cfg: &cfg },
            Bytes::from_static(b"SELECT 1"),
            0x03,
            &RouteHints::default(),
            &writer,
        )
        .unwrap();
        assert_eq!(outcome, RouteOutcome::Dispatched);
        assert_eq!(writer.writes.lock().unwrap()[0].0, 1);
    }

    #[test]
    fn show_shards_is_intercepted_without_touching_a_backend() {
        let cluster = cluster(&["b1"]);
        let mut session = session_with_refs(&cluster, 0);
        let mut shard_map = ShardMap::new();
        shard_map.insert("shard_a".to_string(), 0);
        let sr_cfg = SrConfig::default();
        let writer = RecordingWriter::new();
        let outcome = route_query(
            &mut session,
            &cluster,
            &RouterInstance::Schema { cfg: &sr_cfg, shard_map: &shard_map },
            Bytes::from_static(b"SHOW SHARDS"),
            0x03,
            &RouteHints::default(),
            &writer,
        )
        .unwrap();
        assert_eq!(outcome, RouteOutcome::InterceptedRows(vec![vec!["shard_a".to_string(), "b1".to_string()]]));
        assert!(writer.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn handle_error_reconnects_and_keeps_session_open() {
        let cluster = cluster(&["primary", "replica", "spare"]);
        let mut session = session_with_refs(&cluster, 0);
        let reconnected = handle_error(&mut session, 0, ErrorAction::NewConnection, &|_| Some(2));
        assert!(reconnected);
        assert_eq!(session.master().unwrap().backend_index, 2);
    }

    #[test]
    fn handle_error_without_a_replacement_fails() {
        let cluster = cluster(&["primary"]);
        let mut session = session_with_refs(&cluster, 0);
        let reconnected = handle_error(&mut session, 0, ErrorAction::NewConnection, &|_| None);
        assert!(!reconnected);
    }

    #[test]
    fn handle_error_refuses_to_join_a_replacement_once_history_is_disabled_and_in_use() {
        let cluster = cluster(&["primary", "replica", "spare"]);
        let mut session = ClientSession::new(0, true);
        let r0 = session.add_backend_ref(0).unwrap();
        session.backend_refs_mut()[r0].mark_in_use();
        session.set_master(r0);
        session.command_log_mut().append(Bytes::from_static(b"SET @a=1"), 0x03).unwrap();

        let reconnected = handle_error(&mut session, 0, ErrorAction::NewConnection, &|_| Some(2));
        assert!(!reconnected);
    }
}
