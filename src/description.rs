//! Structured circuit documents as exchanged with front ends.
//!
//! ```json
//! {
//!   "name": "RC",
//!   "nodes": [{ "id": "VIN", "voltage": 5.0 }, { "id": "GND" }],
//!   "components": [{ "type": "Resistor", "id": "R1", "parameters": { "resistance": 1000 } }],
//!   "connections": [
//!     { "id": "w1", "source": "R1", "destination": "VIN" },
//!     { "id": "w2", "source": "R1", "destination": "GND" }
//!   ]
//! }
//! ```
//!
//! A connection attaches the `source` component to the `destination` node.
//! Connections are applied in list order, which fixes terminal order.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::component::{connect, ComponentRef, Parameters};
use crate::devices::create_builtin;
use crate::node::{Node, NodeRef};
use crate::plugin_manager::PluginManager;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
    pub components: Vec<ComponentDescription>,
    #[serde(default)]
    pub connections: Vec<ConnectionDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: String,
    /// Fixed boundary voltage
    #[serde(default)]
    pub voltage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescription {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub id: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub id: String,
    pub source: String,
    pub destination: String,
}

impl CircuitDescription {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid circuit description")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read file '{}': {}", path.display(), e))?;
        Self::from_json(&content)
    }

    /// Instantiate the described circuit.
    ///
    /// Types resolve against the built-in devices first, then against the
    /// plugins registered in `plugins`.
    pub fn build(&self, plugins: &PluginManager) -> Result<Circuit> {
        let name = if self.name.is_empty() { "Untitled" } else { self.name.as_str() };
        let mut circuit = Circuit::new(name);
        let mut nodes: BTreeMap<&str, NodeRef> = BTreeMap::new();
        let mut components: BTreeMap<&str, ComponentRef> = BTreeMap::new();

        for description in &self.nodes {
            let node = Node::shared(description.id.as_str());
            node.borrow_mut().set_voltage(description.voltage);
            nodes.insert(description.id.as_str(), node);
        }

        for description in &self.components {
            let component = instantiate(description, plugins)?;
            components.insert(description.id.as_str(), component);
        }

        for connection in &self.connections {
            let component = components.get(connection.source.as_str()).ok_or_else(|| {
                anyhow!(
                    "Connection '{}' references unknown component '{}'",
                    connection.id,
                    connection.source
                )
            })?;
            let node = nodes
                .entry(connection.destination.as_str())
                .or_insert_with(|| {
                    debug!("Creating implicit node '{}'", connection.destination);
                    Node::shared(connection.destination.as_str())
                });
            connect(component, node);
        }

        for node in nodes.into_values() {
            circuit.add_node(node);
        }
        for component in components.into_values() {
            circuit.add_component(component);
        }
        Ok(circuit)
    }
}

fn instantiate(description: &ComponentDescription, plugins: &PluginManager) -> Result<ComponentRef> {
    let component = match create_builtin(&description.type_tag, &description.parameters) {
        Some(builtin) => crate::component::shared(builtin),
        None => plugins
            .create_component(&description.type_tag, &description.parameters)
            .ok_or_else(|| {
                anyhow!(
                    "Component '{}' has unknown type '{}'",
                    description.id,
                    description.type_tag
                )
            })?,
    };
    component.borrow_mut().set_id(description.id.clone());
    Ok(component)
}
