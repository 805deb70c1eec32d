//! Plugin supplying `Inductor` and `Diode` components.
//!
//! Built as a `cdylib`, the library is loadable by
//! [`PluginManager::load_plugin`](icsim::PluginManager::load_plugin). The
//! `rlib` target lets hosts register [`example_plugin`] in-process.

use icsim::component::{parameter, Terminals};
use icsim::{BasePlugin, Component, ComponentFactory, NodeRef, Parameters, PluginInfo};
use log::info;

pub const INDUCTOR: &str = "Inductor";
pub const DIODE: &str = "Diode";

pub const DEFAULT_INDUCTANCE: f64 = 1e-3;
pub const DEFAULT_FORWARD_VOLTAGE: f64 = 0.7;

/// Reverse-bias leakage and diode saturation current
const SATURATION_CURRENT: f64 = 1e-12;
/// Thermal voltage at room temperature
const THERMAL_VOLTAGE: f64 = 0.026;

/// Ideal inductor. Reports its current.
#[derive(Debug, Clone)]
pub struct Inductor {
    id: String,
    terminals: Terminals,
    inductance: f64,
    current: f64,
    voltage: f64,
}

impl Inductor {
    pub fn new(id: impl Into<String>, inductance: f64) -> Self {
        Inductor {
            id: id.into(),
            terminals: Terminals::new(),
            inductance,
            current: 0.0,
            voltage: 0.0,
        }
    }

    pub fn inductance(&self) -> f64 {
        self.inductance
    }

    /// Terminal voltage seen at the last step
    pub fn voltage(&self) -> f64 {
        self.voltage
    }
}

impl Component for Inductor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn advance(&mut self, timestep: f64) {
        if let Some(voltage_diff) = self.terminals.voltage_diff() {
            // L * di/dt = V
            self.current += voltage_diff * timestep / self.inductance;
            self.voltage = voltage_diff;
        }
    }

    fn current_value(&self) -> f64 {
        self.current
    }

    fn attach(&mut self, node: NodeRef) {
        self.terminals.push(node);
    }

    fn terminals(&self) -> &[NodeRef] {
        self.terminals.as_slice()
    }

    fn type_tag(&self) -> &str {
        INDUCTOR
    }
}

/// Exponential diode with a fixed leakage below the forward threshold
#[derive(Debug, Clone)]
pub struct Diode {
    id: String,
    terminals: Terminals,
    forward_voltage: f64,
    current: f64,
}

impl Diode {
    pub fn new(id: impl Into<String>, forward_voltage: f64) -> Self {
        Diode {
            id: id.into(),
            terminals: Terminals::new(),
            forward_voltage,
            current: 0.0,
        }
    }

    pub fn forward_voltage(&self) -> f64 {
        self.forward_voltage
    }
}

impl Component for Diode {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn advance(&mut self, _timestep: f64) {
        if let Some(voltage_diff) = self.terminals.voltage_diff() {
            self.current = if voltage_diff > self.forward_voltage {
                SATURATION_CURRENT * ((voltage_diff / THERMAL_VOLTAGE).exp() - 1.0)
            } else {
                -SATURATION_CURRENT
            };
        }
    }

    fn current_value(&self) -> f64 {
        self.current
    }

    fn attach(&mut self, node: NodeRef) {
        self.terminals.push(node);
    }

    fn terminals(&self) -> &[NodeRef] {
        self.terminals.as_slice()
    }

    fn type_tag(&self) -> &str {
        DIODE
    }
}

#[derive(Debug, Default)]
pub struct ExampleFactory;

impl ComponentFactory for ExampleFactory {
    fn supported_components(&self) -> Vec<String> {
        vec![INDUCTOR.to_string(), DIODE.to_string()]
    }

    fn create_component(&self, type_tag: &str, parameters: &Parameters) -> Option<Box<dyn Component>> {
        match type_tag {
            INDUCTOR => Some(Box::new(Inductor::new(
                "",
                parameter(parameters, "inductance", DEFAULT_INDUCTANCE),
            ))),
            DIODE => Some(Box::new(Diode::new(
                "",
                parameter(parameters, "forward_voltage", DEFAULT_FORWARD_VOLTAGE),
            ))),
            _ => None,
        }
    }

    fn on_initialize(&mut self) -> bool {
        info!("ExamplePlugin initialized with components: {}, {}", INDUCTOR, DIODE);
        true
    }

    fn on_cleanup(&mut self) {
        info!("ExamplePlugin cleaned up");
    }
}

pub fn example_plugin() -> BasePlugin<ExampleFactory> {
    BasePlugin::new(
        PluginInfo::new(
            "ExamplePlugin",
            "1.0.0",
            "Example plugin with inductor and diode components",
        ),
        ExampleFactory,
    )
}

icsim::declare_plugin!(example_plugin);

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use icsim::{component, connect, ComponentRef, Node, Plugin, PluginState};

    fn two_nodes(high: f64, low: f64) -> (NodeRef, NodeRef) {
        let a = Node::shared("A");
        let b = Node::shared("B");
        a.borrow_mut().set_voltage(high);
        b.borrow_mut().set_voltage(low);
        (a, b)
    }

    #[test]
    fn test_inductor_integrates_current() {
        let (a, b) = two_nodes(1.0, 0.0);
        let inductor = component::shared(Inductor::new("L1", 1e-3));
        connect(&inductor, &a);
        connect(&inductor, &b);

        inductor.borrow_mut().advance(1e-6);
        assert!((inductor.borrow().current_value() - 1e-3).abs() < 1e-15);
        inductor.borrow_mut().advance(1e-6);
        assert!((inductor.borrow().current_value() - 2e-3).abs() < 1e-15);
    }

    #[test]
    fn test_inductor_zero_timestep_keeps_current() {
        let (a, b) = two_nodes(1.0, 0.0);
        let inductor = Rc::new(RefCell::new(Inductor::new("L1", 1e-3)));
        let handle: ComponentRef = inductor.clone();
        connect(&handle, &a);
        connect(&handle, &b);

        inductor.borrow_mut().advance(0.0);
        assert_eq!(inductor.borrow().current_value(), 0.0);
        assert_eq!(inductor.borrow().voltage(), 1.0);
    }

    #[test]
    fn test_diode_regions() {
        let (a, b) = two_nodes(0.8, 0.0);
        let diode = component::shared(Diode::new("D1", 0.7));
        connect(&diode, &a);
        connect(&diode, &b);

        diode.borrow_mut().advance(1e-6);
        let expected = 1e-12 * ((0.8f64 / 0.026).exp() - 1.0);
        assert!((diode.borrow().current_value() - expected).abs() < expected * 1e-12);

        a.borrow_mut().set_voltage(0.5);
        diode.borrow_mut().advance(1e-6);
        assert_eq!(diode.borrow().current_value(), -1e-12);

        // The threshold itself is still reverse-biased
        a.borrow_mut().set_voltage(0.7);
        diode.borrow_mut().advance(1e-6);
        assert_eq!(diode.borrow().current_value(), -1e-12);
    }

    #[test]
    fn test_single_terminal_is_ignored() {
        let (a, _) = two_nodes(5.0, 0.0);
        let diode = component::shared(Diode::new("D1", 0.7));
        connect(&diode, &a);
        diode.borrow_mut().advance(1e-6);
        assert_eq!(diode.borrow().current_value(), 0.0);
        assert_eq!(a.borrow().attachment_count(), 1);
    }

    #[test]
    fn test_factory_parameters_and_defaults() {
        let plugin = example_plugin();
        assert_eq!(plugin.name(), "ExamplePlugin");
        assert_eq!(plugin.supported_components(), vec!["Inductor", "Diode"]);

        let mut parameters = Parameters::new();
        parameters.insert("inductance".to_string(), 2e-3);
        let inductor = plugin.create_component(INDUCTOR, &parameters).unwrap();
        assert_eq!(inductor.type_tag(), INDUCTOR);
        assert_eq!(inductor.id(), "");

        let diode = plugin.create_component(DIODE, &Parameters::new()).unwrap();
        assert_eq!(diode.type_tag(), DIODE);

        assert!(plugin.create_component("Resistor", &Parameters::new()).is_none());
        assert_eq!(
            ExampleFactory
                .create_component(INDUCTOR, &Parameters::new())
                .map(|c| c.current_value()),
            Some(0.0)
        );
    }

    #[test]
    fn test_lifecycle() {
        let mut plugin = example_plugin();
        assert!(plugin.initialize());
        assert_eq!(plugin.state(), PluginState::Initialized);
        plugin.cleanup();
        assert_eq!(plugin.state(), PluginState::CleanedUp);
    }
}
