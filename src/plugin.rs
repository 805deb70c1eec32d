//! Plugin interface for supplying component types from outside the host.
//!
//! A plugin library exports three `extern "C"` symbols, generated by
//! [`declare_plugin!`]:
//! - `icsim_create_plugin`: returns an owned, opaque pointer to a boxed [`Plugin`]
//! - `icsim_destroy_plugin`: takes that pointer back and drops the instance
//! - `icsim_plugin_abi_version`: the [`PLUGIN_ABI_VERSION`] the library was built with
//!
//! The pointer carries a Rust trait object, so host and plugin must be built
//! with the same compiler and the same version of this crate.

use std::ffi::c_void;
use log::debug;
use serde::Serialize;

use crate::component::{Component, Parameters};

/// Bumped whenever the [`Plugin`] or [`Component`] vtables change shape
pub const PLUGIN_ABI_VERSION: u32 = 1;

pub const CREATE_SYMBOL: &[u8] = b"icsim_create_plugin\0";
pub const DESTROY_SYMBOL: &[u8] = b"icsim_destroy_plugin\0";
pub const ABI_VERSION_SYMBOL: &[u8] = b"icsim_plugin_abi_version\0";

pub type CreatePluginFn = unsafe extern "C" fn() -> *mut c_void;
pub type DestroyPluginFn = unsafe extern "C" fn(*mut c_void);
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Self-reported identity of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>, description: impl Into<String>) -> Self {
        PluginInfo {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Lifecycle of a plugin instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PluginState {
    /// Created, not yet initialized
    Loaded,
    Initialized,
    /// Initialization was attempted and did not succeed
    Failed,
    CleanedUp,
}

/// A named, versioned unit that manufactures components for a fixed set of type tags
pub trait Plugin: Send {
    fn info(&self) -> &PluginInfo;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn version(&self) -> &str {
        &self.info().version
    }

    fn description(&self) -> &str {
        &self.info().description
    }

    fn state(&self) -> PluginState;

    /// Bring the plugin up. Repeated calls return the first outcome without
    /// redoing the work.
    fn initialize(&mut self) -> bool;

    /// Tear the plugin down. No-op unless initialized.
    fn cleanup(&mut self);

    /// Build a component of `type_tag`, or `None` for an unsupported tag
    fn create_component(&self, type_tag: &str, parameters: &Parameters) -> Option<Box<dyn Component>>;

    fn supported_components(&self) -> Vec<String>;

    fn supports(&self, type_tag: &str) -> bool {
        self.supported_components().iter().any(|t| t == type_tag)
    }
}

/// The plugin-specific half of a [`BasePlugin`]
pub trait ComponentFactory: Send {
    fn supported_components(&self) -> Vec<String>;

    fn create_component(&self, type_tag: &str, parameters: &Parameters) -> Option<Box<dyn Component>>;

    fn on_initialize(&mut self) -> bool {
        true
    }

    fn on_cleanup(&mut self) {}
}

/// [`Plugin`] implementation that owns the lifecycle bookkeeping and
/// delegates component construction to a [`ComponentFactory`].
pub struct BasePlugin<F> {
    info: PluginInfo,
    state: PluginState,
    factory: F,
}

impl<F: ComponentFactory> BasePlugin<F> {
    pub fn new(info: PluginInfo, factory: F) -> Self {
        BasePlugin {
            info,
            state: PluginState::Loaded,
            factory,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: ComponentFactory> Plugin for BasePlugin<F> {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn state(&self) -> PluginState {
        self.state
    }

    fn initialize(&mut self) -> bool {
        if self.state == PluginState::Loaded {
            self.state = if self.factory.on_initialize() {
                PluginState::Initialized
            } else {
                PluginState::Failed
            };
            debug!("Plugin '{}' initialize -> {:?}", self.info.name, self.state);
        }
        self.state == PluginState::Initialized
    }

    fn cleanup(&mut self) {
        if self.state == PluginState::Initialized {
            self.factory.on_cleanup();
            self.state = PluginState::CleanedUp;
            debug!("Plugin '{}' cleaned up", self.info.name);
        }
    }

    fn create_component(&self, type_tag: &str, parameters: &Parameters) -> Option<Box<dyn Component>> {
        self.factory.create_component(type_tag, parameters)
    }

    fn supported_components(&self) -> Vec<String> {
        self.factory.supported_components()
    }
}

/// Export the plugin entry points from a `cdylib` crate.
///
/// Takes a zero-argument constructor returning a type that implements [`Plugin`]:
///
/// ```ignore
/// icsim::declare_plugin!(my_plugin);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($constructor:expr) => {
        #[no_mangle]
        pub extern "C" fn icsim_create_plugin() -> *mut ::std::ffi::c_void {
            let plugin: ::std::boxed::Box<dyn $crate::plugin::Plugin> =
                ::std::boxed::Box::new(($constructor)());
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(plugin)) as *mut ::std::ffi::c_void
        }

        /// # Safety
        /// `plugin` must come from `icsim_create_plugin` of this library and
        /// must not be used afterwards.
        #[no_mangle]
        pub unsafe extern "C" fn icsim_destroy_plugin(plugin: *mut ::std::ffi::c_void) {
            if !plugin.is_null() {
                drop(::std::boxed::Box::from_raw(
                    plugin as *mut ::std::boxed::Box<dyn $crate::plugin::Plugin>,
                ));
            }
        }

        #[no_mangle]
        pub extern "C" fn icsim_plugin_abi_version() -> u32 {
            $crate::plugin::PLUGIN_ABI_VERSION
        }
    };
}
