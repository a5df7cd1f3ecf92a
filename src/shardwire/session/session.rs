use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use crate::shardwire::common::{Error, Result};
use crate::shardwire::session::backend_ref::BackendReference;
use crate::shardwire::session::command_log::SessionCommandLog;

/// Shard-routing initialization state bitmask (spec §3 Client Session:
/// "an initialization-state bitmask for shard routing").
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ShardInitState(u8);

impl ShardInitState {
    pub const UNINIT: ShardInitState = ShardInitState(0x00);
    pub const MAPPING: ShardInitState = ShardInitState(0x01);
    pub const USE_DB: ShardInitState = ShardInitState(0x02);
    pub const FAILED: ShardInitState = ShardInitState(0x04);
    pub const READY: ShardInitState = ShardInitState(0x08);

    pub fn contains(&self, other: ShardInitState) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    pub fn is_ready(&self) -> bool {
        self.contains(ShardInitState::READY)
    }

    pub fn is_failed(&self) -> bool {
        self.contains(ShardInitState::FAILED)
    }
}

/// A client connection and everything it needs routed and replayed (spec §3
/// "Client Session"). Combines the session-command log (C2) and the backend
/// reference set (C3) under one lock-held-together unit, matching §5's
/// "every mutation of a session's backend reference set or session-command
/// log must hold that session's lock" — the lock itself is the caller's
/// `tokio::sync::Mutex<ClientSession>`, not modeled here.
pub struct ClientSession {
    pub current_db: Option<String>,
    pub autocommit: bool,
    pub transaction_active: bool,
    command_log: SessionCommandLog,
    backend_refs: Vec<BackendReference>,
    /// Index into `backend_refs` of the session's current primary reference,
    /// if any (spec §3 invariant: at most one master ref at a time).
    master_ref: Option<usize>,
    shard_init_state: ShardInitState,
    queued_statements: VecDeque<Bytes>,
    /// `(current_db, table_name) -> backend_refs index` for `CREATE
    /// TEMPORARY TABLE` tracking (spec §4.5, §8 scenario S4). RWR only
    /// checks whether an entry exists to force later reads back to the
    /// backend that created it; SR also uses the stored index.
    temp_tables: HashMap<(String, String), usize>,
}

impl ClientSession {
    pub fn new(max_sescmd_history: usize, disable_sescmd_history: bool) -> Self {
        ClientSession {
            current_db: None,
            autocommit: true,
            transaction_active: false,
            command_log: SessionCommandLog::new(max_sescmd_history, disable_sescmd_history),
            backend_refs: Vec::new(),
            master_ref: None,
            shard_init_state: ShardInitState::UNINIT,
            queued_statements: VecDeque::new(),
            temp_tables: HashMap::new(),
        }
    }

    pub fn command_log(&self) -> &SessionCommandLog {
        &self.command_log
    }

    pub fn command_log_mut(&mut self) -> &mut SessionCommandLog {
        &mut self.command_log
    }

    pub fn backend_refs(&self) -> &[BackendReference] {
        &self.backend_refs
    }

    pub fn backend_refs_mut(&mut self) -> &mut [BackendReference] {
        &mut self.backend_refs
    }

    /// Adds a reference to `backend_index` (into the cluster's `BackendTable`),
    /// with its cursor positioned at the log's current head. Errors if
    /// `disable_sescmd_history` is set and the session has already issued
    /// commands: with history disabled the log keeps nothing behind the
    /// slowest live cursor, so a backend joining now has no way to catch up
    /// on what it missed (spec §8 boundary behaviors).
    pub fn add_backend_ref(&mut self, backend_index: usize) -> Result<usize> {
        if self.command_log.history_disabled() && self.command_log.next_position() > 0 {
            return Err(Error::sescmd_history_unavailable());
        }
        self.backend_refs.push(BackendReference::new(backend_index, &self.command_log));
        Ok(self.backend_refs.len() - 1)
    }

    pub fn master(&self) -> Option<&BackendReference> {
        self.master_ref.and_then(|i| self.backend_refs.get(i))
    }

    pub fn master_mut(&mut self) -> Option<&mut BackendReference> {
        match self.master_ref {
            Some(i) => self.backend_refs.get_mut(i),
            None => None,
        }
    }

    /// The master reference's position in `backend_refs`, if one is selected.
    pub fn master_refs_index(&self) -> Option<usize> {
        self.master_ref
    }

    /// Re-selects the master reference only if the previous one was marked
    /// closed, or none was ever selected (spec §3 invariant).
    pub fn set_master(&mut self, refs_index: usize) {
        if let Some(current) = self.master_ref {
            if !self.backend_refs[current].is_closed() {
                return;
            }
        }
        self.master_ref = Some(refs_index);
    }

    pub fn shard_init_state(&self) -> ShardInitState {
        self.shard_init_state
    }

    pub fn set_shard_init_state(&mut self, state: ShardInitState) {
        self.shard_init_state = state;
    }

    pub fn queue_statement(&mut self, stmt_buf: Bytes) {
        self.queued_statements.push_back(stmt_buf);
    }

    pub fn drain_queued_statements(&mut self) -> Vec<Bytes> {
        self.queued_statements.drain(..).collect()
    }

    pub fn record_temp_table(&mut self, db: String, table: String, backend_refs_index: usize) {
        self.temp_tables.insert((db, table), backend_refs_index);
    }

    pub fn temp_table_owner(&self, db: &str, table: &str) -> Option<usize> {
        self.temp_tables.get(&(db.to_string(), table.to_string())).copied()
    }

    pub fn drop_temp_table(&mut self, db: &str, table: &str) {
        self.temp_tables.remove(&(db.to_string(), table.to_string()));
    }

    /// The smallest cursor position among live backend references, or the
    /// log's `next_position()` if none are live — the value `prune()` needs
    /// (spec §4.2).
    pub fn min_live_cursor(&self) -> u64 {
        self.backend_refs
            .iter()
            .filter(|r| !r.is_closed())
            .map(|r| r.cursor().position())
            .min()
            .unwrap_or_else(|| self.command_log.next_position())
    }

    pub fn prune_command_log(&mut self) {
        let min_cursor = self.min_live_cursor();
        self.command_log.prune(min_cursor);
    }

    /// Matches a reply arriving on `backend_refs_index` to either the front
    /// session command on that backend's cursor, or the single pending
    /// non-session statement (spec §4.4 "Reply handling"). Direct field
    /// access (rather than the `command_log()`/`backend_refs_mut()`
    /// accessors) lets the borrow checker see `command_log` and
    /// `backend_refs` as disjoint.
    pub fn process_reply(&mut self, backend_refs_index: usize, reply: Bytes) -> Option<Bytes> {
        let r = &mut self.backend_refs[backend_refs_index];
        if r.cursor().is_idle(&self.command_log) {
            let pending = r.take_pending_statement();
            r.end_wait();
            pending.map(|_| reply)
        } else {
            r.end_wait();
            r.cursor_mut().process_reply(&self.command_log, reply)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_is_not_reselected_while_in_use() {
        let mut s = ClientSession::new(0, false);
        let r0 = s.add_backend_ref(0).unwrap();
        let r1 = s.add_backend_ref(1).unwrap();
        s.set_master(r0);
        s.set_master(r1);
        assert_eq!(s.master().unwrap().backend_index, 0);
    }

    #[test]
    fn master_is_reselected_after_close() {
        let mut s = ClientSession::new(0, false);
        let r0 = s.add_backend_ref(0).unwrap();
        let r1 = s.add_backend_ref(1).unwrap();
        s.set_master(r0);
        s.master_mut().unwrap().mark_closed();
        s.set_master(r1);
        assert_eq!(s.master().unwrap().backend_index, 1);
    }

    #[test]
    fn temp_table_tracking_round_trips() {
        let mut s = ClientSession::new(0, false);
        s.record_temp_table("shard_a".to_string(), "tmp".to_string(), 0);
        assert_eq!(s.temp_table_owner("shard_a", "tmp"), Some(0));
        s.drop_temp_table("shard_a", "tmp");
        assert_eq!(s.temp_table_owner("shard_a", "tmp"), None);
    }

    #[test]
    fn min_live_cursor_ignores_closed_refs() {
        let mut s = ClientSession::new(0, false);
        s.command_log_mut().append(Bytes::from_static(b"USE a"), 0x03).unwrap();
        let r0 = s.add_backend_ref(0).unwrap();
        let r1 = s.add_backend_ref(1).unwrap();
        s.backend_refs_mut()[r0].cursor_mut().advance();
        s.backend_refs_mut()[r1].mark_closed();
        assert_eq!(s.min_live_cursor(), 1);
    }

    #[test]
    fn a_backend_joining_mid_session_with_history_disabled_is_rejected() {
        let mut s = ClientSession::new(0, true);
        s.add_backend_ref(0).unwrap(); // the first backend joins before any statement runs.
        s.command_log_mut().append(Bytes::from_static(b"SET @a=1"), 0x03).unwrap();
        let err = s.add_backend_ref(1).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn disabled_history_still_allows_the_first_backend_to_join() {
        let mut s = ClientSession::new(0, true);
        assert!(s.add_backend_ref(0).is_ok());
    }
}
