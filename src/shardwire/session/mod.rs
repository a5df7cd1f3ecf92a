mod backend_ref;
mod command_log;
mod session;

pub use backend_ref::{BackendRefFlags, BackendReference, PendingStatement};
pub use command_log::{BackendCursor, SessionCommand, SessionCommandLog};
pub use session::{ClientSession, ShardInitState};
