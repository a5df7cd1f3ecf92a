use bytes::Bytes;
use tracing::warn;

use crate::shardwire::cluster::BackendTable;
use crate::shardwire::common::{weighted_load, Error, Result};
use crate::shardwire::config::SlaveSelectionCriteria;
use crate::shardwire::qc::TypeMask;
use crate::shardwire::router::target::{RouteHints, RouteTarget};
use crate::shardwire::session::ClientSession;

/// The non-blocking write contract the router dispatches through (spec §1:
/// "low-level socket I/O and the event loop...only the scheduling contract
/// is used"). A real implementation enqueues onto the owning connection's
/// write buffer without blocking the calling task.
pub trait BackendWriter {
    fn write(&self, backend_index: usize, stmt_buf: &Bytes) -> Result<()>;
}

/// `target` computation for a classified statement (spec §4.4).
pub fn compute_route_target(mask: TypeMask, transaction_active: bool, hints: &RouteHints) -> RouteTarget {
    let target = if mask.intersects(TypeMask::SESSION_WRITE | TypeMask::PREPARE_STMT | TypeMask::PREPARE_NAMED_STMT) {
        RouteTarget::all()
    } else if mask.contains(TypeMask::READ) && !mask.contains(TypeMask::MASTER_READ) && !transaction_active {
        RouteTarget::slave_with_hints(hints)
    } else {
        RouteTarget::master()
    };

    if transaction_active && !target.is_all() {
        return RouteTarget::master();
    }
    target
}

/// Autocommit / transaction-state tracking, independent of routing (spec §4.4).
pub fn update_transaction_state(session: &mut ClientSession, mask: TypeMask) {
    if session.autocommit && mask.contains(TypeMask::DISABLE_AUTOCOMMIT) {
        session.autocommit = false;
        session.transaction_active = true;
        return;
    }
    if !session.transaction_active && mask.contains(TypeMask::BEGIN_TRX) {
        session.transaction_active = true;
        return;
    }
    if session.autocommit
        && session.transaction_active
        && mask.intersects(TypeMask::COMMIT | TypeMask::ROLLBACK)
    {
        session.transaction_active = false;
        return;
    }
    if !session.autocommit && mask.contains(TypeMask::ENABLE_AUTOCOMMIT) {
        session.autocommit = true;
        session.transaction_active = false;
    }
}

/// Picks a replica among the session's live, non-master backend references
/// (spec §4.3 Selection, §4.4 SLAVE dispatch).
pub fn select_replica(
    session: &ClientSession,
    cluster: &BackendTable,
    criteria: SlaveSelectionCriteria,
    target: &RouteTarget,
) -> Option<usize> {
    let master_backend_index = session.master().map(|m| m.backend_index);

    if let Some(name) = &target.named_server {
        if let Some(idx) = session
            .backend_refs()
            .iter()
            .position(|r| !r.is_closed() && cluster.get(r.backend_index).map(|b| &b.name) == Some(name))
        {
            if Some(session.backend_refs()[idx].backend_index) != master_backend_index {
                return Some(idx);
            }
        }
    }

    session
        .backend_refs()
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_closed() && Some(r.backend_index) != master_backend_index)
        .filter_map(|(i, r)| {
            let backend = cluster.get(r.backend_index)?;
            if let Some(max_lag) = target.max_slave_replication_lag {
                if backend.replication_lag_secs > max_lag {
                    return None;
                }
            }
            let raw = match criteria {
                SlaveSelectionCriteria::LeastGlobalConnections => backend.global_connections() as u64,
                SlaveSelectionCriteria::LeastRouterConnections => backend.router_connections() as u64,
                SlaveSelectionCriteria::LeastBehindMaster => backend.replication_lag_secs,
                SlaveSelectionCriteria::LeastCurrentOperations => backend.router_connections() as u64,
            };
            Some((i, weighted_load(raw, backend.weight)))
        })
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

fn master_refs_index(session: &ClientSession) -> Option<usize> {
    let master_backend_index = session.master()?.backend_index;
    session.backend_refs().iter().position(|r| r.backend_index == master_backend_index && !r.is_closed())
}

/// Writes `stmt_buf` to `refs_index` and marks the reference as carrying a
/// pending non-session statement (spec §3 Backend Reference).
fn write_non_session_statement(
    session: &mut ClientSession,
    refs_index: usize,
    stmt_buf: Bytes,
    writer: &dyn BackendWriter,
) -> Result<()> {
    let backend_index = session.backend_refs()[refs_index].backend_index;
    writer.write(backend_index, &stmt_buf)?;
    let r = &mut session.backend_refs_mut()[refs_index];
    r.set_pending_statement(stmt_buf);
    r.begin_wait();
    Ok(())
}

/// Dispatches one statement per its resolved route target (spec §4.4 Dispatch).
pub fn dispatch(
    session: &mut ClientSession,
    cluster: &BackendTable,
    criteria: SlaveSelectionCriteria,
    target: &RouteTarget,
    stmt_buf: Bytes,
    packet_type: u8,
    writer: &dyn BackendWriter,
) -> Result<()> {
    if target.is_all() {
        session.command_log_mut().append(stmt_buf, packet_type)?;
        for i in 0..session.backend_refs().len() {
            replay_pending_commands(session, i, writer)?;
        }
        return Ok(());
    }

    if target.is_master() {
        return match master_refs_index(session) {
            Some(idx) => write_non_session_statement(session, idx, stmt_buf, writer),
            None => Err(Error::no_usable_backend()),
        };
    }

    // SLAVE (+ NAMED_SERVER, + RLAG_MAX): fall back to the primary and log if no eligible replica exists.
    match select_replica(session, cluster, criteria, target) {
        Some(idx) => write_non_session_statement(session, idx, stmt_buf, writer),
        None => {
            warn!("no eligible replica for SLAVE-targeted statement, falling back to master");
            dispatch(session, cluster, criteria, &RouteTarget::master(), stmt_buf, packet_type, writer)
        }
    }
}

/// Writes the next replayable session command to `refs_index` if its cursor
/// is idle and it has fallen behind the log (spec §4.2 Replay protocol, §4.4
/// Dispatch "ALL": "if its cursor is idle, start executing; otherwise the
/// cursor will pick it up when it drains").
pub fn replay_pending_commands(session: &mut ClientSession, refs_index: usize, writer: &dyn BackendWriter) -> Result<()> {
    let log_next = session.command_log().next_position();
    let (backend_index, cursor_pos) = {
        let r = &session.backend_refs()[refs_index];
        if !r.is_in_use() || r.is_waiting_result() {
            return Ok(());
        }
        let pos = r.cursor().position();
        if pos >= log_next {
            return Ok(());
        }
        (r.backend_index, pos)
    };

    let stmt_buf = match session.command_log().get(cursor_pos) {
        Some(cmd) => cmd.stmt_buf.clone(),
        None => return Ok(()),
    };
    writer.write(backend_index, &stmt_buf)?;
    session.backend_refs_mut()[refs_index].begin_wait();
    Ok(())
}

/// A reply arrived from `refs_index` (spec §4.4 Reply handling). Returns the
/// bytes to forward to the client, if any, and continues the replay cursor
/// if more replayed work is now pending.
pub fn handle_reply(session: &mut ClientSession, refs_index: usize, reply: Bytes, writer: &dyn BackendWriter) -> Result<Option<Bytes>> {
    let forward = session.process_reply(refs_index, reply);
    replay_pending_commands(session, refs_index, writer)?;
    Ok(forward)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_write_always_targets_all_ignoring_hints() {
        let hints = RouteHints { route_to_master: true, ..Default::default() };
        let target = compute_route_target(TypeMask::SESSION_WRITE, false, &hints);
        assert!(target.is_all());
    }

    #[test]
    fn read_with_no_transaction_targets_slave() {
        let target = compute_route_target(TypeMask::READ, false, &RouteHints::default());
        assert!(target.is_slave());
    }

    #[test]
    fn read_with_active_transaction_targets_master() {
        let target = compute_route_target(TypeMask::READ, true, &RouteHints::default());
        assert!(target.is_master());
    }

    #[test]
    fn write_targets_master() {
        let target = compute_route_target(TypeMask::WRITE, false, &RouteHints::default());
        assert!(target.is_master());
    }

    #[test]
    fn route_to_master_hint_overrides_slave() {
        let hints = RouteHints { route_to_master: true, ..Default::default() };
        let target = compute_route_target(TypeMask::READ, false, &hints);
        assert!(target.is_master());
    }

    #[test]
    fn disable_autocommit_opens_a_transaction() {
        let mut session = ClientSession::new(0, false);
        update_transaction_state(&mut session, TypeMask::DISABLE_AUTOCOMMIT);
        assert!(!session.autocommit);
        assert!(session.transaction_active);
    }

    #[test]
    fn commit_closes_an_autocommit_on_transaction() {
        let mut session = ClientSession::new(0, false);
        session.transaction_active = true;
        update_transaction_state(&mut session, TypeMask::COMMIT);
        assert!(!session.transaction_active);
    }

    #[test]
    fn enable_autocommit_closes_transaction() {
        let mut session = ClientSession::new(0, false);
        session.autocommit = false;
        session.transaction_active = true;
        update_transaction_state(&mut session, TypeMask::ENABLE_AUTOCOMMIT);
        assert!(session.autocommit);
        assert!(!session.transaction_active);
    }
}
