mod failover;
mod heartbeat;
mod loop_task;
mod module_command;
mod monitored_server;
mod probe;
mod topology;

pub use failover::{
    do_failover, run_switchover, select_candidate, should_failover, FailoverDecision, FailoverSql, ScriptRunner,
    SwitchoverRequest,
};
pub use heartbeat::{maintain_on_master, read_lag_on_replica, HeartbeatRow, HeartbeatSql, HEARTBEAT_TABLE};
pub use loop_task::{run as run_monitor_loop, tick as run_monitor_tick, MonitorBackends, TickStepOutcome};
pub use module_command::{CommandRegistry, ModuleCommand, SwitchoverCommand};
pub use monitored_server::MonitoredServer;
pub use probe::{run_tick, should_run_full_tick, EventScriptRunner, ProbeResult, Prober, TickOutcome};
pub use topology::Topology;

use std::sync::atomic::{AtomicBool, Ordering::Relaxed};

/// Tracks whether automatic failover is currently armed. A failed
/// `switchover` permanently disables failover until an operator re-enables
/// it (spec §4.6: "or permanently disables failover if the switchover
/// fails and failover was enabled").
#[derive(Debug, Default)]
pub struct FailoverGate {
    enabled: AtomicBool,
}

impl FailoverGate {
    pub fn new(initially_enabled: bool) -> Self {
        FailoverGate { enabled: AtomicBool::new(initially_enabled) }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Relaxed)
    }

    pub fn disable_permanently(&self) {
        self.enabled.store(false, Relaxed);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_starts_enabled_and_can_be_disabled_permanently() {
        let gate = FailoverGate::new(true);
        assert!(gate.is_enabled());
        gate.disable_permanently();
        assert!(!gate.is_enabled());
    }
}
