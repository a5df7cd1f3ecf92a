mod rwr;
mod shard_map;
mod sr;
mod target;

pub use rwr::{compute_route_target, dispatch, handle_reply, replay_pending_commands, select_replica, update_transaction_state, BackendWriter};
pub use shard_map::{apply_discovered_database, ShardMap, ShardMapCache, ShardMapState};
pub use sr::{compile_ignore_regex, compute_target, intercept, show_databases_rows, show_shards_rows, Intercepted, SrTarget};
pub use target::{RouteHints, RouteTarget, RouteTargetFlags};
