//! Module-command registration surface (spec §6): operator-triggered
//! administrative actions like `switchover` are described as being
//! "registered with the module-command subsystem" rather than invoked
//! directly. That subsystem is out of scope here, so its contract is
//! modeled directly: a [`ModuleCommand`] trait plus a small
//! [`CommandRegistry`] the monitor registers `switchover` against at
//! construction time.
//!
//! Grounded on the teacher's plugin registration list (`riverdb::plugins`),
//! which keeps an ordered list of handlers behind `unsafe static mut`
//! because it's populated once at process startup before any async runtime
//! exists. Module commands here run at arbitrary times from an operator
//! request, so that assumption doesn't hold; a `Mutex<Vec<_>>` is the safe
//! equivalent with none of the teacher's startup-ordering constraints.

use std::sync::Mutex;

use crate::shardwire::common::{Error, Result};
use crate::shardwire::monitor::failover::{run_switchover, ScriptRunner, SwitchoverRequest};
use crate::shardwire::config::MonitorConfig;

/// One administrative command an operator can invoke by name.
pub trait ModuleCommand: Send + Sync {
    fn name(&self) -> &'static str;

    /// `args` is positional: for `switchover`, `[new_master, current_master]`.
    fn run(&self, args: &[String]) -> Result<()>;
}

/// In-process registry of module commands, looked up by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Mutex<Vec<Box<dyn ModuleCommand>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        CommandRegistry { commands: Mutex::new(Vec::new()) }
    }

    pub fn register(&self, command: Box<dyn ModuleCommand>) {
        self.commands.lock().unwrap().push(command);
    }

    pub fn invoke(&self, name: &str, args: &[String]) -> Result<()> {
        let commands = self.commands.lock().unwrap();
        match commands.iter().find(|c| c.name() == name) {
            Some(c) => c.run(args),
            None => Err(Error::new(format!("no module command registered as '{}'", name))),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.lock().unwrap().iter().map(|c| c.name().to_string()).collect()
    }
}

/// The `switchover` module command (spec §4.6 / §6): wraps
/// [`run_switchover`] with a fixed config, node list, and credentials so
/// an operator can trigger it as `invoke("switchover", &[new_master])`.
pub struct SwitchoverCommand<R: ScriptRunner> {
    cfg: MonitorConfig,
    nodelist: Vec<String>,
    slavelist: Vec<String>,
    credentials: String,
    runner: R,
}

impl<R: ScriptRunner> SwitchoverCommand<R> {
    pub fn new(cfg: MonitorConfig, nodelist: Vec<String>, slavelist: Vec<String>, credentials: String, runner: R) -> Self {
        SwitchoverCommand { cfg, nodelist, slavelist, credentials, runner }
    }
}

impl<R: ScriptRunner + Send + Sync> ModuleCommand for SwitchoverCommand<R> {
    fn name(&self) -> &'static str {
        "switchover"
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let new_master = args
            .first()
            .ok_or_else(|| Error::new("switchover requires <new_master> as its first argument"))?;
        let current_master = args
            .get(1)
            .map(String::as_str)
            .or_else(|| self.nodelist.first().map(String::as_str))
            .ok_or_else(|| Error::new("switchover requires a current master, either as an argument or in nodelist"))?;

        let req = SwitchoverRequest {
            current_master,
            new_master,
            nodelist: self.nodelist.clone(),
            slavelist: self.slavelist.clone(),
            credentials: &self.credentials,
        };
        run_switchover(&self.cfg, &req, &self.runner)
    }
}
