use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::module::Module;

/// Factory function type for creating module instances
pub type ModuleFactory = fn() -> Box<dyn Module>;

/// Registry of modules a host program can load by name
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a module factory
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        let name = name.into();
        debug!(target: "modules", "Registering module factory: {}", name);
        self.factories.insert(name, factory);
    }

    /// Instantiate the named modules. Unknown names are skipped with a warning.
    pub fn create(&self, names: &[String]) -> Vec<Box<dyn Module>> {
        let mut modules = Vec::with_capacity(names.len());
        for name in names {
            match self.factories.get(name) {
                Some(factory) => {
                    debug!(target: "modules", "Creating module instance: {}", name);
                    modules.push(factory());
                }
                None => {
                    warn!(target: "modules", "Unknown module: {}", name);
                }
            }
        }
        modules
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Names of all registered modules, sorted
    pub fn available(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register several `Default` modules under their own names
///
/// ```ignore
/// let mut registry = ModuleRegistry::new();
/// register_modules!(registry, Echo, Pinger);
/// ```
#[macro_export]
macro_rules! register_modules {
    ($registry:expr, $($module:ty),+ $(,)?) => {
        $(
            $registry.register(
                <$module as $crate::bot::Module>::name(&<$module>::default()),
                || Box::new(<$module>::default()),
            );
        )+
    };
}
