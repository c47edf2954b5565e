//! Module hosting: the agent loop, dispatch and the API modules are written
//! against.

pub mod agent;
pub mod command;
pub mod context;
pub mod discovery;
pub mod event;
pub mod module;
pub mod registry;
pub mod scheduler;

pub use agent::{Agent, AgentBuilder, AgentError, ExitReason, RegistrationError, RunSummary};
pub use command::{Arg, ArgType, Command, MatchOutcome};
pub use context::{ModuleContext, Outgoing, WorkerHandle, BOT_SCOPE};
pub use discovery::PeerDirectory;
pub use event::{Event, EventFilter, ModuleMap};
pub use module::Module;
pub use registry::{ModuleFactory, ModuleRegistry};
pub use scheduler::StatsSummary;
