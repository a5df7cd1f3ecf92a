use bytes::Bytes;

use crate::shardwire::session::command_log::{BackendCursor, SessionCommandLog};

/// Per-(session, backend) state bitfield (spec §3 Backend Reference, §4.3).
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct BackendRefFlags(u8);

impl BackendRefFlags {
    pub const IN_USE: BackendRefFlags = BackendRefFlags(0x01);
    pub const QUERY_ACTIVE: BackendRefFlags = BackendRefFlags(0x02);
    pub const CLOSED: BackendRefFlags = BackendRefFlags(0x04);
    /// SR only: set after the backend has returned a complete `SHOW DATABASES` reply.
    pub const MAPPED: BackendRefFlags = BackendRefFlags(0x08);

    pub fn contains(&self, other: BackendRefFlags) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    fn insert(&mut self, other: BackendRefFlags) {
        self.0 |= other.0;
    }

    fn remove(&mut self, other: BackendRefFlags) {
        self.0 &= !other.0;
    }
}

/// A statement dispatched outside the session-command replay machinery,
/// between write and final reply (spec §3 "a single pending non-session
/// statement slot").
#[derive(Debug)]
pub struct PendingStatement {
    pub stmt_buf: Bytes,
}

/// Per (session, backend) state (spec §3 "Backend Reference", §4.3).
///
/// `backend_index` is a stable index into the owning cluster's
/// [`crate::shardwire::cluster::BackendTable`] rather than a pointer (spec
/// §9's re-architecting note).
#[derive(Debug)]
pub struct BackendReference {
    pub backend_index: usize,
    flags: BackendRefFlags,
    outstanding_result_waits: u32,
    cursor: BackendCursor,
    /// SR only: `SHOW DATABASES` rows collected so far, across reply packets.
    map_response_buf: Vec<(String,)>,
    pending_statement: Option<PendingStatement>,
}

impl BackendReference {
    /// A newly selected backend reference; becomes `in-use` once the
    /// connection attempt completes (spec §4.3 "`in-use` set on successful connect").
    pub fn new(backend_index: usize, log: &SessionCommandLog) -> Self {
        BackendReference {
            backend_index,
            flags: BackendRefFlags::default(),
            outstanding_result_waits: 0,
            cursor: BackendCursor::at_head(log),
            map_response_buf: Vec::new(),
            pending_statement: None,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.flags.contains(BackendRefFlags::IN_USE) && !self.flags.contains(BackendRefFlags::CLOSED)
    }

    pub fn mark_in_use(&mut self) {
        self.flags.insert(BackendRefFlags::IN_USE);
    }

    pub fn is_closed(&self) -> bool {
        self.flags.contains(BackendRefFlags::CLOSED)
    }

    /// `closed` set on disconnect or explicit close; `in-use` cleared simultaneously (spec §4.3).
    pub fn mark_closed(&mut self) {
        self.flags.insert(BackendRefFlags::CLOSED);
        self.flags.remove(BackendRefFlags::IN_USE);
    }

    pub fn is_query_active(&self) -> bool {
        self.flags.contains(BackendRefFlags::QUERY_ACTIVE)
    }

    pub fn set_query_active(&mut self) {
        self.flags.insert(BackendRefFlags::QUERY_ACTIVE);
    }

    pub fn clear_query_active(&mut self) {
        self.flags.remove(BackendRefFlags::QUERY_ACTIVE);
    }

    pub fn is_mapped(&self) -> bool {
        self.flags.contains(BackendRefFlags::MAPPED)
    }

    pub fn mark_mapped(&mut self) {
        self.flags.insert(BackendRefFlags::MAPPED);
    }

    /// `waiting-result incremented on write of a statement expecting a reply` (spec §4.3).
    pub fn begin_wait(&mut self) {
        self.outstanding_result_waits += 1;
    }

    /// `decremented on reply` (spec §4.3).
    pub fn end_wait(&mut self) {
        self.outstanding_result_waits = self.outstanding_result_waits.saturating_sub(1);
    }

    pub fn is_waiting_result(&self) -> bool {
        self.outstanding_result_waits > 0
    }

    pub fn cursor(&self) -> &BackendCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut BackendCursor {
        &mut self.cursor
    }

    /// `query-active` between dispatch and reply for a non-session statement;
    /// `set_pending_statement` panics if one is already outstanding, enforcing
    /// the invariant "at most one non-session statement may be query-active
    /// on a backend at any time" (spec §3).
    pub fn set_pending_statement(&mut self, stmt_buf: Bytes) {
        debug_assert!(self.pending_statement.is_none(), "backend already has a query-active statement");
        self.pending_statement = Some(PendingStatement { stmt_buf });
        self.set_query_active();
    }

    pub fn take_pending_statement(&mut self) -> Option<PendingStatement> {
        self.clear_query_active();
        self.pending_statement.take()
    }

    pub fn push_map_response_row(&mut self, database: String) {
        self.map_response_buf.push((database,));
    }

    pub fn take_map_response_rows(&mut self) -> Vec<String> {
        self.map_response_buf.drain(..).map(|(db,)| db).collect()
    }
}
