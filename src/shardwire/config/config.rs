use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::{debug, info, info_span};

use crate::shardwire::common::{Error, Result};
use crate::shardwire::config::backend::ClusterConfig;
use crate::shardwire::config::monitor::MonitorConfig;
use crate::shardwire::config::router::{RwrConfig, SrConfig};

/// Which router mode the proxy runs in. Spec §2 describes RWR and SR as
/// separate router components; a given proxy instance runs one or the other
/// against a cluster, picked in configuration.
#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    ReadWriteSplit,
    Schema,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(skip)]
    config_path: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    pub router_mode: RouterMode,
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub rwr: RwrConfig,
    #[serde(default)]
    pub sr: SrConfig,
}

fn default_host() -> String { "0.0.0.0".to_string() }
const fn default_port() -> u16 { 3306 }
fn default_num_workers() -> u32 { num_cpus::get() as u32 }
const fn default_max_connections() -> u32 { 10_000 }

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Returns the loaded global settings. Panics if [`load_config`] hasn't run yet.
pub fn conf() -> &'static Settings {
    SETTINGS.get().expect("configuration not loaded")
}

/// Loads settings from a YAML config file, located by [`find_config_file`],
/// cascades backend defaults, and publishes them as the process-wide config.
pub fn load_config() -> Result<()> {
    let _span = info_span!("loading config file").entered();
    let config_path = find_config_file("shardwire.yaml")?;
    info!(config_path = %config_path.to_string_lossy(), "found config file");
    let file = File::open(&config_path)?;

    let mut settings: Settings = serde_yaml::from_reader(file)?;
    settings.config_path = config_path;
    settings.load()?;

    SETTINGS.set(settings).map_err(|_| Error::new("configuration already loaded"))
}

#[cfg(test)]
pub fn load_config_from_str(yaml: &str) -> Result<Settings> {
    let mut settings: Settings = serde_yaml::from_str(yaml)?;
    settings.load()?;
    Ok(settings)
}

impl Settings {
    fn load(&mut self) -> Result<()> {
        self.cluster.load()
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn find_config_file(config_name: &str) -> Result<PathBuf> {
    if let Some(path) = env::args().nth(1) {
        debug!("using config_path passed on command line");
        return Ok(PathBuf::from(path));
    }

    if let Ok(start) = env::current_dir() {
        let mut dir = start.as_path();
        loop {
            let fp = Path::join(dir, config_name);
            if fp.exists() {
                return Ok(fp);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    let home = env::var("HOME").unwrap_or_else(|_| "~/".to_string());
    let conf_path = Path::join(Path::new(&home), Path::join(Path::new(".config/shardwire"), config_name));
    debug!(path = %conf_path.to_string_lossy(), "checking for config file");
    if conf_path.exists() {
        return Ok(conf_path);
    }

    Err(Error::new(format!("could not find config file {}", config_name)))
}
