mod backend;
mod role;

pub use backend::{Backend, BackendTable, Gtid};
pub use role::RoleFlags;
