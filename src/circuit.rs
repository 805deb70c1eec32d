use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use log::{debug, info, warn};

use crate::component::ComponentRef;
use crate::node::NodeRef;
use crate::trace::SimulationTrace;

/// Owning container and simulation driver for nodes and components.
///
/// Both collections are keyed by id and iterate in ascending id order, which
/// fixes the order components are advanced in within a step.
pub struct Circuit {
    name: String,
    nodes: BTreeMap<String, NodeRef>,
    components: BTreeMap<String, ComponentRef>,
}

impl Circuit {
    pub fn new(name: impl Into<String>) -> Self {
        Circuit {
            name: name.into(),
            nodes: BTreeMap::new(),
            components: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a node. A node with an empty id is ignored; an existing id is replaced.
    pub fn add_node(&mut self, node: NodeRef) {
        let id = node.borrow().id().to_string();
        if id.is_empty() {
            debug!("Ignoring node with empty id in circuit '{}'", self.name);
            return;
        }
        self.nodes.insert(id, node);
    }

    /// Add a component. A component with an empty id is ignored; an existing id is replaced.
    pub fn add_component(&mut self, component: ComponentRef) {
        let id = component.borrow().id().to_string();
        if id.is_empty() {
            debug!("Ignoring component with empty id in circuit '{}'", self.name);
            return;
        }
        self.components.insert(id, component);
    }

    pub fn get_node(&self, id: &str) -> Option<NodeRef> {
        self.nodes.get(id).map(Rc::clone)
    }

    pub fn get_component(&self, id: &str) -> Option<ComponentRef> {
        self.components.get(id).map(Rc::clone)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes.values()
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentRef> {
        self.components.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Step every component from t = 0 until t >= `duration`.
    ///
    /// Time accumulates by repeated addition, so drift over many steps is not
    /// compensated. Returns the number of steps taken.
    pub fn simulate(&mut self, duration: f64, timestep: f64) -> usize {
        info!(
            "Simulating circuit '{}' for {}s with timestep {}s",
            self.name, duration, timestep
        );
        let steps = self.run(duration, timestep, |_, _, _| {});
        info!("Simulation of '{}' completed after {} steps", self.name, steps);
        steps
    }

    /// Same stepping loop as [`Circuit::simulate`], sampling every component's
    /// reading and every node voltage at t = 0, every `every` steps and at the
    /// final step.
    pub fn simulate_traced(&mut self, duration: f64, timestep: f64, every: usize) -> SimulationTrace {
        let every = every.max(1);
        let mut trace = SimulationTrace::new(&self.name, timestep);
        trace.record(0.0, self);

        let mut last_time = 0.0;
        let steps = self.run(duration, timestep, |step, time, circuit| {
            last_time = time;
            if step % every == 0 {
                trace.record(time, circuit);
            }
        });
        if steps % every != 0 {
            trace.record(last_time, self);
        }

        info!(
            "Traced simulation of '{}' completed: {} steps, {} samples",
            self.name,
            steps,
            trace.len()
        );
        trace
    }

    fn run<F>(&mut self, duration: f64, timestep: f64, mut observe: F) -> usize
    where
        F: FnMut(usize, f64, &Circuit),
    {
        if !(timestep > 0.0) {
            warn!(
                "Refusing to simulate '{}' with non-positive timestep {}",
                self.name, timestep
            );
            return 0;
        }

        let mut time = 0.0;
        let mut steps = 0;
        while time < duration {
            for component in self.components.values() {
                component.borrow_mut().advance(timestep);
            }
            time += timestep;
            steps += 1;
            observe(steps, time, self);
        }
        steps
    }

    /// Zero every node voltage. Component state is left untouched.
    pub fn reset(&mut self) {
        for node in self.nodes.values() {
            node.borrow_mut().set_voltage(0.0);
        }
        info!("Circuit '{}' reset", self.name);
    }

    /// Component count per type tag
    pub fn type_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for component in self.components.values() {
            *counts
                .entry(component.borrow().type_tag().to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    /// Log a circuit summary
    pub fn print_summary(&self) {
        info!("Circuit: {}", self.name);
        info!("Nodes: {}", self.nodes.len());
        info!("Components: {}", self.components.len());

        let mut counts: Vec<_> = self.type_counts().into_iter().collect();
        counts.sort();
        for (type_tag, count) in counts {
            info!("  {}: {}", type_tag, count);
        }
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("name", &self.name)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}
