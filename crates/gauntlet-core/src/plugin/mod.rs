//! Hooks that run around every test.
//!
//! Plugins are kept in registration order. Both pre-test and post-test
//! actions walk the chain in that same order; disabled plugins are skipped.

pub mod memory_leak;
pub mod set_pointer;

use tracing::trace;

use crate::result::TestResult;
use crate::shell::TestCase;

pub use memory_leak::{MemoryLeakPlugin, MEMORY_LEAK_PLUGIN_NAME};
pub use set_pointer::{Overridable, SetPointerError, SetPointerPlugin, MAX_SET, SET_POINTER_PLUGIN_NAME};

/// A hook around each test.
pub trait TestPlugin {
    /// Name used to look the plugin up or remove it.
    fn name(&self) -> &str;

    fn pre_test_action(&mut self, _test: &TestCase, _result: &mut TestResult) {}

    fn post_test_action(&mut self, _test: &TestCase, _result: &mut TestResult) {}
}

struct InstalledPlugin {
    plugin: Box<dyn TestPlugin>,
    enabled: bool,
}

/// The ordered set of installed plugins.
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<InstalledPlugin>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin. It is enabled immediately.
    pub fn install(&mut self, plugin: Box<dyn TestPlugin>) {
        self.plugins.push(InstalledPlugin {
            plugin,
            enabled: true,
        });
    }

    /// Remove the first plugin called `name`.
    pub fn remove_by_name(&mut self, name: &str) -> Option<Box<dyn TestPlugin>> {
        let index = self.position(name)?;
        Some(self.plugins.remove(index).plugin)
    }

    pub fn get(&self, name: &str) -> Option<&dyn TestPlugin> {
        self.position(name).map(|i| self.plugins[i].plugin.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut dyn TestPlugin> {
        let index = self.position(name)?;
        Some(self.plugins[index].plugin.as_mut())
    }

    /// Enable or disable a plugin. Returns false when no plugin has that name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.position(name) {
            Some(index) => {
                self.plugins[index].enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.position(name)
            .map(|i| self.plugins[i].enabled)
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.plugin.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn clear(&mut self) {
        self.plugins.clear();
    }

    pub fn run_all_pre_test_actions(&mut self, test: &TestCase, result: &mut TestResult) {
        for installed in self.plugins.iter_mut().filter(|p| p.enabled) {
            trace!(plugin = installed.plugin.name(), "pre-test action");
            installed.plugin.pre_test_action(test, result);
        }
    }

    pub fn run_all_post_test_actions(&mut self, test: &TestCase, result: &mut TestResult) {
        for installed in self.plugins.iter_mut().filter(|p| p.enabled) {
            trace!(plugin = installed.plugin.name(), "post-test action");
            installed.plugin.post_test_action(test, result);
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.plugin.name() == name)
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
