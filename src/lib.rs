pub mod accelerator;
pub mod circuit;
pub mod cli;
pub mod component;
pub mod description;
pub mod devices;
pub mod error;
pub mod node;
pub mod plugin;
pub mod plugin_manager;
pub mod trace;

// Re-export commonly used types
pub use accelerator::{Accelerator, CpuAccelerator};
pub use circuit::Circuit;
pub use component::{connect, Component, ComponentRef, Parameters};
pub use description::CircuitDescription;
pub use devices::{Capacitor, Resistor};
pub use error::PluginError;
pub use node::{Node, NodeRef};
pub use plugin::{BasePlugin, ComponentFactory, Plugin, PluginInfo, PluginState};
pub use plugin_manager::PluginManager;
pub use trace::SimulationTrace;

// Error types
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
