use std::any::Any;
use std::time::Duration;

use super::command::{Arg, Command};
use super::context::ModuleContext;
use super::event::{Event, EventFilter};
use crate::opts::OptionField;

/// Trait that all modules must implement.
///
/// A module is owned by the agent and only ever called from the scheduler
/// thread. Handlers return `Err` only for unrecoverable conditions: the error
/// is logged and ends the agent loop.
pub trait Module: Send + 'static {
    /// Unique name of the module within the agent, also its wire prefix
    fn name(&self) -> &str;

    /// Version announced during module discovery
    fn version(&self) -> &str {
        "1.0"
    }

    /// Description of what this module does
    fn description(&self) -> &str {
        ""
    }

    /// Commands served under `<name> <command> ...`
    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Events this module wants to receive
    fn events(&self) -> Vec<EventFilter> {
        Vec::new()
    }

    /// Option fields owned by this module, persisted in its config section
    fn options(&self) -> Vec<OptionField> {
        Vec::new()
    }

    /// Interval between ticks; zero means never. Read once after `setup`.
    fn tick_interval(&self) -> Duration {
        Duration::ZERO
    }

    /// Called once after the options were bound to the config store
    fn setup(&mut self, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle one of the commands returned by `commands`
    fn on_command(
        &mut self,
        _command: &str,
        _sender: &str,
        _args: &[Arg],
        _ctx: &mut ModuleContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle an event that matches one of the filters returned by `events`
    fn on_event(&mut self, _event: &Event, _ctx: &mut ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Allow downcasting to the concrete module type for state access
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
