// src/dag/order.rs

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::dag::cycles::find_cycles;
use crate::dag::graph::{DependencyNode, ProcessorGraph};

/// Best-effort topological order plus an explicit cycle report.
#[derive(Debug)]
pub struct ProcessorOrder<T> {
    /// Every input node exactly once: first the ordered part, then leftovers.
    pub ordered: Vec<T>,
    /// Index in `ordered` where the unordered leftovers begin.
    pub leftovers_start: usize,
    /// Strongly connected components with more than one member (or a
    /// self-dependency), each sorted by name.
    pub cycles: Vec<Vec<String>>,
}

impl<T> ProcessorOrder<T> {
    pub fn leftovers(&self) -> &[T] {
        &self.ordered[self.leftovers_start..]
    }

    pub fn is_complete(&self) -> bool {
        self.leftovers_start == self.ordered.len()
    }
}

/// Order nodes so that a consumer comes after every producer it consumes.
///
/// Kahn's algorithm in discovery order over the resolvable part of the graph.
/// Nodes that are never freed (cycles, unknown inputs, or anything downstream
/// of those) follow sorted by name, then nameless nodes in input order. Never
/// fails; cycles are reported and logged.
pub fn order<T: DependencyNode>(nodes: Vec<T>) -> ProcessorOrder<T> {
    let graph = ProcessorGraph::from_nodes(&nodes);

    // Unresolved nodes get one extra in-degree that is never released.
    let mut in_degree: HashMap<&str, usize> = graph
        .names()
        .map(|name| {
            let deps = graph.dependencies_of(name).count();
            (name, deps + usize::from(graph.is_unresolved(name)))
        })
        .collect();

    let mut queue: VecDeque<&str> = graph
        .names()
        .filter(|name| in_degree.get(name).copied() == Some(0))
        .collect();

    let mut sorted_names: Vec<String> = Vec::new();
    while let Some(name) = queue.pop_front() {
        sorted_names.push(name.to_string());
        for dependent in graph.dependents_of(name) {
            if let Some(deg) = in_degree.get_mut(dependent) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    let mut leftover_names: Vec<String> = in_degree
        .iter()
        .filter(|(_, deg)| **deg > 0)
        .map(|(name, _)| name.to_string())
        .collect();
    leftover_names.sort();

    // Group input positions by name; duplicates keep input order.
    let mut slots: Vec<Option<T>> = nodes.into_iter().map(Some).collect();
    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    let mut nameless: Vec<usize> = Vec::new();
    for (idx, node) in slots.iter().enumerate() {
        match node.as_ref().and_then(|n| n.node_name()) {
            Some(name) => by_name.entry(name.to_string()).or_default().push(idx),
            None => nameless.push(idx),
        }
    }

    let mut ordered = Vec::with_capacity(slots.len());
    let mut take = |idx: usize, ordered: &mut Vec<T>| {
        if let Some(node) = slots.get_mut(idx).and_then(Option::take) {
            ordered.push(node);
        }
    };
    for name in sorted_names.iter() {
        for &idx in by_name.get(name).into_iter().flatten() {
            take(idx, &mut ordered);
        }
    }
    let leftovers_start = ordered.len();
    for name in leftover_names.iter() {
        for &idx in by_name.get(name).into_iter().flatten() {
            take(idx, &mut ordered);
        }
    }
    for idx in nameless.iter().copied() {
        take(idx, &mut ordered);
    }

    let cycles = if leftovers_start < ordered.len() {
        let cycles = find_cycles(&graph);
        for cycle in cycles.iter() {
            warn!(members = ?cycle, "dependency cycle between processors; ordering them by name");
        }
        if !nameless.is_empty() {
            warn!(count = nameless.len(), "processors without a derivable proctype left unordered");
        }
        for name in leftover_names.iter().filter(|n| graph.is_unresolved(n)) {
            warn!(proctype = %name, "processor consumes an unknown proctype; left unordered");
        }
        cycles
    } else {
        Vec::new()
    };

    debug!(
        ordered = leftovers_start,
        leftovers = ordered.len() - leftovers_start,
        "processor order computed"
    );

    ProcessorOrder {
        ordered,
        leftovers_start,
        cycles,
    }
}
