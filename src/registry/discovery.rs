//! Link-time module discovery using inventory.
//!
//! Modules declared anywhere in the final binary with [`submit_module!`]
//! are collected and applied by [`RegistryBuilder::discover`], so an
//! application does not need to list its feature modules by hand.
//!
//! [`submit_module!`]: crate::submit_module

use super::RegistryBuilder;

/// A module registration collected via inventory.
#[derive(Debug)]
pub struct ModuleEntry {
    /// Module name (for logging)
    pub name: &'static str,
    /// Adds the module's consumers and middleware
    pub register: fn(RegistryBuilder) -> RegistryBuilder,
}

inventory::collect!(ModuleEntry);

impl ModuleEntry {
    pub const fn new(name: &'static str, register: fn(RegistryBuilder) -> RegistryBuilder) -> Self {
        Self { name, register }
    }
}

/// All modules linked into the binary.
pub fn modules() -> impl Iterator<Item = &'static ModuleEntry> {
    inventory::iter::<ModuleEntry>.into_iter()
}

impl RegistryBuilder {
    /// Apply every module submitted with [`submit_module!`](crate::submit_module).
    pub fn discover(self) -> Self {
        modules().fold(self, |builder, entry| {
            tracing::debug!(module = entry.name, "messaging_module_discovered");
            (entry.register)(builder)
        })
    }
}

/// Submit a module for discovery.
///
/// ```rust,ignore
/// fn register_orders(registry: RegistryBuilder) -> RegistryBuilder {
///     registry.consumer::<OrderPlaced, _, _>(|| OrderPlacedConsumer)
/// }
///
/// membus::submit_module!("orders", register_orders);
/// ```
#[macro_export]
macro_rules! submit_module {
    ($name:expr, $register:path) => {
        $crate::inventory::submit! {
            $crate::registry::discovery::ModuleEntry::new($name, $register)
        }
    };
}
