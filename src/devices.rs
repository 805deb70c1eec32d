use crate::component::{parameter, Component, Parameters, Terminals};
use crate::node::NodeRef;

pub const RESISTOR: &str = "Resistor";
pub const CAPACITOR: &str = "Capacitor";

/// Type tags the host can build without any plugin
pub const BUILTIN_TYPES: [&str; 2] = [CAPACITOR, RESISTOR];

pub const DEFAULT_RESISTANCE: f64 = 1e3;
pub const DEFAULT_CAPACITANCE: f64 = 1e-6;

/// Ohmic resistor. Reports its current.
#[derive(Debug, Clone)]
pub struct Resistor {
    id: String,
    terminals: Terminals,
    resistance: f64,
    current: f64,
}

impl Resistor {
    pub fn new(id: impl Into<String>, resistance: f64) -> Self {
        Resistor {
            id: id.into(),
            terminals: Terminals::new(),
            resistance,
            current: 0.0,
        }
    }

    pub fn resistance(&self) -> f64 {
        self.resistance
    }
}

impl Component for Resistor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn advance(&mut self, _timestep: f64) {
        if let Some(voltage_diff) = self.terminals.voltage_diff() {
            // I = V/R, zero resistance is not guarded
            self.current = voltage_diff / self.resistance;
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
        RESISTOR
    }
}

/// Charge-storing capacitor. Reports its stored voltage, not a current.
#[derive(Debug, Clone)]
pub struct Capacitor {
    id: String,
    terminals: Terminals,
    capacitance: f64,
    charge: f64,
    voltage: f64,
}

impl Capacitor {
    pub fn new(id: impl Into<String>, capacitance: f64) -> Self {
        Capacitor {
            id: id.into(),
            terminals: Terminals::new(),
            capacitance,
            charge: 0.0,
            voltage: 0.0,
        }
    }

    pub fn capacitance(&self) -> f64 {
        self.capacitance
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }
}

impl Component for Capacitor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn advance(&mut self, timestep: f64) {
        if let Some(new_voltage) = self.terminals.voltage_diff() {
            // I = C * dV/dt
            let current = self.capacitance * (new_voltage - self.voltage) / timestep;
            self.charge += current * timestep;
            self.voltage = new_voltage;
        }
    }

    fn current_value(&self) -> f64 {
        self.voltage
    }

    fn attach(&mut self, node: NodeRef) {
        self.terminals.push(node);
    }

    fn terminals(&self) -> &[NodeRef] {
        self.terminals.as_slice()
    }

    fn type_tag(&self) -> &str {
        CAPACITOR
    }
}

/// Build a built-in component by type tag. The id is left empty.
///
/// Recognised parameters: `resistance` for resistors and `capacitance` for
/// capacitors, defaulting to [`DEFAULT_RESISTANCE`] and [`DEFAULT_CAPACITANCE`].
pub fn create_builtin(type_tag: &str, parameters: &Parameters) -> Option<Box<dyn Component>> {
    match type_tag {
        RESISTOR => Some(Box::new(Resistor::new(
            "",
            parameter(parameters, "resistance", DEFAULT_RESISTANCE),
        ))),
        CAPACITOR => Some(Box::new(Capacitor::new(
            "",
            parameter(parameters, "capacitance", DEFAULT_CAPACITANCE),
        ))),
        _ => None,
    }
}
