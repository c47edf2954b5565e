//! Modules shipped with the `pifon-bot` host

pub mod echo;
pub mod pinger;
pub mod watch;

pub use echo::Echo;
pub use pinger::{PingState, Pinger};
pub use watch::Watch;

use crate::bot::ModuleRegistry;

/// Registry with every stock module
pub fn stock_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    crate::register_modules!(registry, Echo, Pinger, Watch);
    registry
}
