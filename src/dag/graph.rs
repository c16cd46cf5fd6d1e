// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};

use crate::processor::{Processor, ProcessorSpec};

/// Anything that can be placed in the processor dependency graph.
pub trait DependencyNode {
    /// Proctype of the node; `None` when it cannot be derived.
    fn node_name(&self) -> Option<&str>;

    /// Proctypes whose output this node consumes.
    fn consumes(&self) -> Vec<String>;
}

impl DependencyNode for Processor {
    fn node_name(&self) -> Option<&str> {
        Some(self.proctype())
    }

    fn consumes(&self) -> Vec<String> {
        self.definition().assessor_inputs()
    }
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct GraphNode {
    /// Known proctypes this node consumes.
    deps: BTreeSet<String>,
    /// Proctypes that consume this node, kept sorted.
    dependents: BTreeSet<String>,
    /// Consumes something no loaded processor produces.
    unresolved: bool,
}

/// Dependency graph keyed by proctype.
///
/// Edge direction for the ordering is producer -> consumer: if `B` consumes
/// the output of `A`, `A` is a dependency of `B` and `B` a dependent of `A`.
#[derive(Debug, Clone, Default)]
pub struct ProcessorGraph {
    nodes: HashMap<String, GraphNode>,
    /// Node names in first-seen order.
    discovery: Vec<String>,
}

impl ProcessorGraph {
    pub fn from_nodes<T: DependencyNode>(nodes: &[T]) -> Self {
        let mut graph = ProcessorGraph::default();

        // First pass: every named node.
        for node in nodes {
            if let Some(name) = node.node_name() {
                if !graph.nodes.contains_key(name) {
                    graph.discovery.push(name.to_string());
                    graph.nodes.insert(name.to_string(), GraphNode::default());
                }
            }
        }

        // Second pass: dependencies, now that every name is known.
        for node in nodes {
            let Some(name) = node.node_name() else {
                continue;
            };
            for dep in node.consumes() {
                if graph.nodes.contains_key(&dep) {
                    if let Some(entry) = graph.nodes.get_mut(name) {
                        entry.deps.insert(dep.clone());
                    }
                    if let Some(dep_node) = graph.nodes.get_mut(&dep) {
                        dep_node.dependents.insert(name.to_string());
                    }
                } else if let Some(entry) = graph.nodes.get_mut(name) {
                    entry.unresolved = true;
                }
            }
        }

        graph
    }

    /// Node names in discovery order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.discovery.iter().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|n| n.deps.iter().map(|s| s.as_str()))
    }

    /// Immediate dependents, sorted by name.
    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|n| n.dependents.iter().map(|s| s.as_str()))
    }

    pub fn is_unresolved(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.unresolved)
    }

    /// All (producer, consumer) edges.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.discovery.iter().flat_map(move |name| {
            self.dependencies_of(name).map(move |dep| (dep, name.as_str()))
        })
    }
}
