use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::component::{ComponentRef, WeakComponentRef};

/// Shared handle to a node. The circuit owns nodes; components hold clones.
pub type NodeRef = Rc<RefCell<Node>>;

/// A named connection point holding a scalar voltage
pub struct Node {
    id: String,
    voltage: f64,
    components: Vec<WeakComponentRef>,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            voltage: 0.0,
            components: Vec::new(),
        }
    }

    /// Create a node already wrapped in a shared handle
    pub fn shared(id: impl Into<String>) -> NodeRef {
        Rc::new(RefCell::new(Node::new(id)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Overwrite the node voltage (boundary condition)
    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }

    /// Record a back-reference to an attached component. Duplicates are kept.
    pub fn add_component(&mut self, component: WeakComponentRef) {
        self.components.push(component);
    }

    /// Number of recorded back-references, including ones whose component is gone
    pub fn attachment_count(&self) -> usize {
        self.components.len()
    }

    /// Components still alive that were attached to this node
    pub fn attached_components(&self) -> Vec<ComponentRef> {
        self.components.iter().filter_map(Weak::upgrade).collect()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("voltage", &self.voltage)
            .field("attachments", &self.components.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{connect, shared};
    use crate::devices::Resistor;

    #[test]
    fn test_node_voltage() {
        let mut node = Node::new("N1");
        assert_eq!(node.id(), "N1");
        assert_eq!(node.voltage(), 0.0);

        node.set_voltage(5.0);
        assert_eq!(node.voltage(), 5.0);
    }

    #[test]
    fn test_back_references_do_not_own() {
        let node = Node::shared("N1");
        {
            let resistor = shared(Resistor::new("R1", 1000.0));
            connect(&resistor, &node);
            connect(&resistor, &node);
            assert_eq!(node.borrow().attachment_count(), 2);
            assert_eq!(node.borrow().attached_components().len(), 2);
        }
        // The resistor held the only strong reference to itself
        assert_eq!(node.borrow().attachment_count(), 2);
        assert!(node.borrow().attached_components().is_empty());
    }
}
