// src/dag/cycles.rs

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::dag::graph::ProcessorGraph;

/// Strongly connected components that form a cycle.
///
/// Purely diagnostic: runs on the same edge set the ordering uses and
/// reports components of size > 1 plus self-dependencies. Members of each
/// cycle are sorted by name, and cycles by their first member.
pub fn find_cycles(graph: &ProcessorGraph) -> Vec<Vec<String>> {
    // Edge direction: producer -> consumer.
    let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in graph.names() {
        g.add_node(name);
    }
    for (producer, consumer) in graph.edges() {
        g.add_edge(producer, consumer, ());
    }

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.first().is_some_and(|n| g.contains_edge(*n, *n)))
        .map(|scc| {
            let mut members: Vec<String> = scc.into_iter().map(|s| s.to_string()).collect();
            members.sort();
            members
        })
        .collect();
    cycles.sort();
    cycles
}
