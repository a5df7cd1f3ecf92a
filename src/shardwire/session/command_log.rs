use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering::{AcqRel, Acquire}};

use bytes::Bytes;

use crate::shardwire::common::{Error, Result};

/// An append-only element of the session command log (spec §3 Session Command).
/// `replied` flips true the first time *any* backend returns the reply for
/// this command (spec §3 invariant: "the reply forwarded to the client is
/// the reply from the first backend to complete it").
#[derive(Debug)]
pub struct SessionCommand {
    pub stmt_buf: Bytes,
    pub packet_type: u8,
    pub position: u64,
    replied: AtomicBool,
}

impl SessionCommand {
    fn new(stmt_buf: Bytes, packet_type: u8, position: u64) -> Self {
        SessionCommand { stmt_buf, packet_type, position, replied: AtomicBool::new(false) }
    }

    pub fn replied_to_client(&self) -> bool {
        self.replied.load(Acquire)
    }

    /// Returns true iff this call is the first to mark the command replied.
    fn mark_replied_if_first(&self) -> bool {
        self.replied.compare_exchange(false, true, AcqRel, Acquire).is_ok()
    }
}

/// Ordered, append-only per-session log of statements whose effect must be
/// replayed on every backend the session later uses (spec §4.2).
///
/// Re-architected per spec §9 from the teacher's domain's intrusive linked
/// list into a plain `VecDeque` plus integer cursor positions (see
/// [`BackendCursor`]), so pruning is `min(cursor) vs front of vector`.
pub struct SessionCommandLog {
    commands: VecDeque<SessionCommand>,
    next_position: u64,
    max_history: usize,
    history_disabled: bool,
}

impl SessionCommandLog {
    pub fn new(max_history: usize, history_disabled: bool) -> Self {
        SessionCommandLog {
            commands: VecDeque::new(),
            next_position: 0,
            max_history,
            history_disabled,
        }
    }

    /// `append(stmt_buf, packet_type) -> position` (spec §4.2).
    pub fn append(&mut self, stmt_buf: Bytes, packet_type: u8) -> Result<u64> {
        let position = self.next_position;
        self.next_position += 1;
        self.commands.push_back(SessionCommand::new(stmt_buf, packet_type, position));
        if self.max_history != 0 && self.commands.len() > self.max_history {
            return Err(Error::history_limit_exceeded(self.max_history));
        }
        Ok(position)
    }

    pub fn get(&self, position: u64) -> Option<&SessionCommand> {
        let front = self.commands.front()?.position;
        if position < front {
            return None;
        }
        self.commands.get((position - front) as usize)
    }

    /// Position of the oldest surviving command, or the next position to be
    /// assigned if the log is empty (so a brand new cursor starts "at the
    /// head" per spec §4.2 `cursor_for`, whether or not anything has been
    /// pruned yet).
    pub fn front_position(&self) -> u64 {
        self.commands.front().map(|c| c.position).unwrap_or(self.next_position)
    }

    pub fn next_position(&self) -> u64 {
        self.next_position
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn history_disabled(&self) -> bool {
        self.history_disabled
    }

    /// `prune()` (spec §4.2): drops commands every live cursor has passed.
    /// `min_live_cursor` is the smallest position among all live backend
    /// cursors (or `next_position()` if there are no live backends at all).
    pub fn prune(&mut self, min_live_cursor: u64) {
        loop {
            let front_pos = match self.commands.front() {
                Some(c) => c.position,
                None => break,
            };
            let prunable = if self.history_disabled {
                min_live_cursor >= front_pos
            } else {
                front_pos < min_live_cursor
            };
            if !prunable {
                break;
            }
            self.commands.pop_front();
        }
    }
}

/// A per-backend position in the session-command log (spec GLOSSARY "Cursor").
/// Owned by the backend reference it tracks progress for (spec §3 Backend
/// Reference). The cursor only ever advances.
#[derive(Debug, Clone, Copy)]
pub struct BackendCursor {
    position: u64,
}

impl BackendCursor {
    /// `cursor_for(backend) -> cursor`: on first use, positioned at the head (spec §4.2).
    pub fn at_head(log: &SessionCommandLog) -> Self {
        BackendCursor { position: log.front_position() }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// True once the cursor has executed every command appended so far.
    pub fn is_idle(&self, log: &SessionCommandLog) -> bool {
        self.position >= log.next_position()
    }

    /// `cursor.current()` (spec §4.2): the command this cursor should execute next.
    pub fn current<'a>(&self, log: &'a SessionCommandLog) -> Option<&'a SessionCommand> {
        log.get(self.position)
    }

    /// `cursor.next()` (spec §4.2): advances past the current command.
    pub fn advance(&mut self) {
        self.position += 1;
    }

    /// `cursor.process_reply(reply_buf) -> maybe_forward` (spec §4.2).
    /// An empty reply buffer never advances the cursor (spec §8 boundary
    /// behaviors). Returns the bytes to forward to the client the first time
    /// any backend completes this command, or `None` if it should be
    /// discarded (a faster backend already completed it) or there is no
    /// current command to match against.
    pub fn process_reply(&mut self, log: &SessionCommandLog, reply: Bytes) -> Option<Bytes> {
        if reply.is_empty() {
            return None;
        }
        let cmd = log.get(self.position)?;
        self.advance();
        if cmd.mark_replied_if_first() {
            Some(reply)
        } else {
            None
        }
    }
}
