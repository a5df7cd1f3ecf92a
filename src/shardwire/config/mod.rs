mod backend;
mod config;
mod enums;
mod monitor;
mod router;

pub use backend::{BackendConfig, ClusterConfig};
pub use config::{conf, load_config, RouterMode, Settings};
pub use enums::{SlaveCount, SlaveSelectionCriteria};
pub use monitor::MonitorConfig;
pub use router::{RwrConfig, SrConfig};

#[cfg(test)]
pub use config::load_config_from_str;
