use crate::shardwire::cluster::{Gtid, RoleFlags};

/// A backend wrapped with monitor-private state (spec §3 "Monitored Server").
/// `pending` is staged during a tick and published to the backend's real
/// role flags only at step 9 ("Publish pending → current atomically"),
/// matching the invariant "in any monitor tick, the published status of a
/// backend equals the pending status at the end of the tick" (spec §3).
#[derive(Debug)]
pub struct MonitoredServer {
    pub backend_index: usize,
    previous_status: RoleFlags,
    pending_status: RoleFlags,
    pub consecutive_errors: u64,
    /// Coarse-clock timestamp of the last replication event seen from this
    /// server's source (used by `verify_master_failure`, spec §4.6 step 11).
    pub last_event_timestamp: u32,
    pub read_only: bool,
    pub slave_configured: bool,
    pub io_thread_running: bool,
    pub sql_thread_running: bool,
    pub master_server_id: u64,
    pub heartbeat_count: u64,
    pub gtid_io_pos: Gtid,
    pub gtid_slave_pos: Gtid,
    /// "New event" edge-trigger flag (spec §3 "Monitored Server"): set by
    /// `publish()` only on the tick where the published status actually
    /// changed, so state-change scripts (spec §4.6 step 10) fire once per
    /// transition rather than once per tick.
    new_event: bool,
}

impl MonitoredServer {
    pub fn new(backend_index: usize) -> Self {
        MonitoredServer {
            backend_index,
            previous_status: RoleFlags::empty(),
            pending_status: RoleFlags::empty(),
            consecutive_errors: 0,
            last_event_timestamp: 0,
            read_only: true,
            slave_configured: false,
            io_thread_running: false,
            sql_thread_running: false,
            master_server_id: 0,
            heartbeat_count: 0,
            gtid_io_pos: Gtid::default(),
            gtid_slave_pos: Gtid::default(),
            new_event: false,
        }
    }

    pub fn previous_status(&self) -> RoleFlags {
        self.previous_status
    }

    pub fn pending_status(&self) -> RoleFlags {
        self.pending_status
    }

    /// Step 3: "Snapshot each backend's status to pending status."
    pub fn snapshot_pending(&mut self, current: RoleFlags) {
        self.pending_status = current;
    }

    pub fn set_pending_status(&mut self, status: RoleFlags) {
        self.pending_status = status;
    }

    /// Step 9: publishes `pending_status` and reports whether it changed,
    /// also storing that result as the "new event" edge-trigger flag (spec
    /// §3) for step 10 to consult.
    pub fn publish(&mut self) -> bool {
        let changed = self.pending_status != self.previous_status;
        self.previous_status = self.pending_status;
        self.new_event = changed;
        changed
    }

    /// Whether this backend's last `publish()` was an actual status
    /// transition (spec §3 "new event" edge-trigger flag).
    pub fn has_new_event(&self) -> bool {
        self.new_event
    }

    /// Relay-log drain distance used by `do_failover` step 2 (spec §4.6).
    pub fn relay_log_backlog(&self) -> i128 {
        self.gtid_io_pos.sequence as i128 - self.gtid_slave_pos.sequence as i128
    }
}
