//! Config file handling: the sectioned store backing module options and the
//! agent's own settings.
pub mod settings;
pub mod store;

pub use settings::{AgentSettings, AGENT_SECTION};
pub use store::{ConfigError, ConfigStore};
