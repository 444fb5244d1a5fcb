//! Script-facing modules for quickbridge
//!
//! A [`ModuleRegistry`] maps logical module names (e.g. `"bridge/data"`)
//! to host object factories. The embedding application registers the
//! built-ins once, then creates fresh export tables per runtime:
//!
//! ```ignore
//! let mut registry = ModuleRegistry::new();
//! register_builtins(&mut registry);
//!
//! let data = registry.create(data::MODULE_NAME).unwrap();
//! runtime.bind("data", &data)?;
//! ```

#![warn(missing_docs)]

pub mod data;

use quickbridge::HostObject;
use rustc_hash::FxHashMap;

/// Builds one module's export table
pub type ModuleFactory = Box<dyn Fn() -> HostObject>;

/// Named module factories
#[derive(Default)]
pub struct ModuleRegistry {
    modules: FxHashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, factory: impl Fn() -> HostObject + 'static) {
        self.modules.insert(name.into(), Box::new(factory));
    }

    /// Build a fresh export table for `name`
    pub fn create(&self, name: &str) -> Option<HostObject> {
        self.modules.get(name).map(|factory| factory())
    }

    /// True when `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// All registered names, unordered
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

/// Register every built-in module
pub fn register_builtins(registry: &mut ModuleRegistry) {
    registry.register(data::MODULE_NAME, data::host_object);
}
