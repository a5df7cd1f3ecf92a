//! End-to-end scenario tests, compiled into the library under `cfg(test)`
//! rather than as a separate `tests/` binary, so they can see crate
//! internals the same way the unit tests scattered through `shardwire/`
//! do. Each file here exercises one or more of the scenarios enumerated
//! under "End-to-end scenarios" in the routing design notes.

mod common;
mod rwr_scenarios_test;
mod sr_scenarios_test;
mod failover_scenario_test;
