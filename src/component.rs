use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::node::NodeRef;

/// Named numeric parameters handed to component factories
pub type Parameters = BTreeMap<String, f64>;

/// Shared handle to a component
pub type ComponentRef = Rc<RefCell<dyn Component>>;

/// Non-owning handle stored on nodes
pub type WeakComponentRef = Weak<RefCell<dyn Component>>;

/// A device with terminals that computes its own response from node voltages.
///
/// Terminal order encodes polarity: for two-terminal devices the voltage
/// difference is `terminal[0] - terminal[1]`. Implementations only read node
/// voltages; they never write back to a node.
pub trait Component {
    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Advance internal state by one timestep. No-op with fewer than two terminals.
    fn advance(&mut self, timestep: f64);

    /// The characteristic reading of this device type
    fn current_value(&self) -> f64;

    /// Append `node` as the next terminal, on the component side only.
    ///
    /// The node does not learn about the component; wiring code goes through
    /// [`connect`], which calls this and registers the back-reference.
    fn attach(&mut self, node: NodeRef);

    fn terminals(&self) -> &[NodeRef];

    fn type_tag(&self) -> &str;
}

impl<C: Component + ?Sized> Component for Box<C> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn set_id(&mut self, id: String) {
        (**self).set_id(id)
    }

    fn advance(&mut self, timestep: f64) {
        (**self).advance(timestep)
    }

    fn current_value(&self) -> f64 {
        (**self).current_value()
    }

    fn attach(&mut self, node: NodeRef) {
        (**self).attach(node)
    }

    fn terminals(&self) -> &[NodeRef] {
        (**self).terminals()
    }

    fn type_tag(&self) -> &str {
        (**self).type_tag()
    }
}

/// Wrap a component in a shared handle
pub fn shared<C: Component + 'static>(component: C) -> ComponentRef {
    Rc::new(RefCell::new(component))
}

/// Attach `node` as the next terminal of `component` and register the
/// component as a back-reference on the node.
pub fn connect(component: &ComponentRef, node: &NodeRef) {
    component.borrow_mut().attach(Rc::clone(node));
    node.borrow_mut().add_component(Rc::downgrade(component));
}

/// Look up a parameter, falling back to `default` when absent
pub fn parameter(parameters: &Parameters, key: &str, default: f64) -> f64 {
    parameters.get(key).copied().unwrap_or(default)
}

/// Ordered terminal list shared by the device implementations
#[derive(Debug, Clone, Default)]
pub struct Terminals {
    nodes: Vec<NodeRef>,
}

impl Terminals {
    pub fn new() -> Self {
        Terminals { nodes: Vec::new() }
    }

    pub fn push(&mut self, node: NodeRef) {
        self.nodes.push(node);
    }

    pub fn as_slice(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `v[0] - v[1]`, or `None` while fewer than two terminals are attached.
    /// Extra terminals are ignored.
    pub fn voltage_diff(&self) -> Option<f64> {
        match self.nodes.as_slice() {
            [first, second, ..] => Some(first.borrow().voltage() - second.borrow().voltage()),
            _ => None,
        }
    }
}
