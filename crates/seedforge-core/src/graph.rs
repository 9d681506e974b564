use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::schema::TableDefinition;

/// Node in the foreign-key dependency graph.
///
/// An edge `A -> B` exists iff some non-self fk-carrying field in A's
/// definition references B. Self-references are deliberately excluded so a
/// table depending on itself cannot deadlock the ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyNode {
    pub name: String,
    /// Tables this table's foreign keys point at.
    pub depends_on: BTreeSet<String>,
    /// Tables whose foreign keys point at this table.
    pub dependents: BTreeSet<String>,
}

/// Foreign-key dependency graph preserving schema declaration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: BTreeMap<String, usize>,
}

impl DependencyGraph {
    pub fn node(&self, name: &str) -> Option<&DependencyNode> {
        self.index.get(name).map(|idx| &self.nodes[*idx])
    }

    /// Nodes in schema declaration order.
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.depends_on.len()).sum()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// Ordering result: a total order over all tables plus any detected cycles.
///
/// The order is dependency-consistent wherever no cycle exists. Tables inside
/// a reported cycle are appended best-effort; callers must treat every entry
/// of `cycles` as an integrity risk for generation targeting those tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopoOrder {
    pub order: Vec<String>,
    pub cycles: Vec<Vec<String>>,
}

impl TopoOrder {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// Build the dependency graph for a set of table definitions.
///
/// Relations pointing at tables absent from the input are dropped silently;
/// this is a permissive default, not a validation pass.
pub fn build_graph(tables: &[TableDefinition]) -> DependencyGraph {
    let mut graph = DependencyGraph::default();

    for table in tables {
        if graph.index.contains_key(&table.name) {
            continue;
        }
        graph.index.insert(table.name.clone(), graph.nodes.len());
        graph.nodes.push(DependencyNode {
            name: table.name.clone(),
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
        });
    }

    for table in tables {
        for field in table.fk_fields() {
            let Some(relation) = field.relation.as_ref() else {
                continue;
            };
            let related = relation.related_table.as_str();
            if related == table.name || !graph.index.contains_key(related) {
                continue;
            }
            let table_idx = graph.index[&table.name];
            let related_idx = graph.index[related];
            graph.nodes[table_idx].depends_on.insert(related.to_string());
            graph.nodes[related_idx]
                .dependents
                .insert(table.name.clone());
        }
    }

    graph
}

/// Kahn's algorithm over the dependency graph.
///
/// The ready queue is FIFO and seeded in declaration order, so ties follow
/// queue insertion order rather than table names. Residual nodes (positive
/// remaining in-degree once the queue drains) belong to at least one cycle:
/// they are reported via DFS extraction and still appended to the order,
/// least-entangled first, so the result always contains every input table
/// exactly once.
pub fn topological_sort(graph: &DependencyGraph) -> TopoOrder {
    let mut indegree: BTreeMap<&str, usize> = graph
        .nodes()
        .iter()
        .map(|node| (node.name.as_str(), node.depends_on.len()))
        .collect();

    let mut queue: VecDeque<&str> = graph
        .nodes()
        .iter()
        .filter(|node| node.depends_on.is_empty())
        .map(|node| node.name.as_str())
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());

        let Some(node) = graph.node(name) else {
            continue;
        };
        let mut dependents: Vec<&str> = node
            .dependents
            .iter()
            .map(|dependent| dependent.as_str())
            .collect();
        dependents.sort_by_key(|dependent| graph.position(dependent));

        for dependent in dependents {
            if let Some(count) = indegree.get_mut(dependent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if order.len() == graph.len() {
        return TopoOrder {
            order,
            cycles: Vec::new(),
        };
    }

    let residual: BTreeSet<&str> = indegree
        .iter()
        .filter_map(|(name, count)| (*count > 0).then_some(*name))
        .collect();

    let cycles = extract_cycles(graph, &residual);

    // Best-effort tail: least-entangled tables first, declaration order on
    // ties. Correctness inside a cycle is not guaranteed and is reported.
    let mut tail: Vec<&str> = graph
        .nodes()
        .iter()
        .filter(|node| residual.contains(node.name.as_str()))
        .map(|node| node.name.as_str())
        .collect();
    tail.sort_by_key(|name| indegree.get(name).copied().unwrap_or(0));
    order.extend(tail.into_iter().map(|name| name.to_string()));

    TopoOrder { order, cycles }
}

fn extract_cycles(graph: &DependencyGraph, residual: &BTreeSet<&str>) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut visited: BTreeSet<&str> = BTreeSet::new();

    for node in graph.nodes() {
        let name = node.name.as_str();
        if residual.contains(name) && visited.insert(name) {
            let mut path = Vec::new();
            let mut on_path = BTreeSet::new();
            walk_cycle(
                graph,
                residual,
                name,
                &mut visited,
                &mut path,
                &mut on_path,
                &mut cycles,
            );
        }
    }

    cycles
}

fn walk_cycle<'graph>(
    graph: &'graph DependencyGraph,
    residual: &BTreeSet<&str>,
    name: &'graph str,
    visited: &mut BTreeSet<&'graph str>,
    path: &mut Vec<&'graph str>,
    on_path: &mut BTreeSet<&'graph str>,
    cycles: &mut Vec<Vec<String>>,
) {
    path.push(name);
    on_path.insert(name);

    if let Some(node) = graph.node(name) {
        for dep in &node.depends_on {
            let dep = dep.as_str();
            if !residual.contains(dep) {
                continue;
            }
            if on_path.contains(dep) {
                if let Some(start) = path.iter().position(|entry| *entry == dep) {
                    cycles.push(path[start..].iter().map(|entry| entry.to_string()).collect());
                }
            } else if visited.insert(dep) {
                walk_cycle(graph, residual, dep, visited, path, on_path, cycles);
            }
        }
    }

    path.pop();
    on_path.remove(name);
}

/// Partition tables into generation levels.
///
/// Level `k` holds every table whose non-self dependencies all sit in levels
/// `0..k`. When an iteration places nothing while tables remain, the
/// remaining tables are mutually dependent; they are collapsed into one
/// final level together so leveling always terminates. Foreign keys between
/// siblings of that final level cannot be resolved from earlier levels --
/// this is the documented mutual-reference limitation, not silent handling.
pub fn group_by_level(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut placed: BTreeSet<&str> = BTreeSet::new();
    let mut remaining: Vec<&DependencyNode> = graph.nodes().iter().collect();

    while !remaining.is_empty() {
        let (ready, rest): (Vec<&DependencyNode>, Vec<&DependencyNode>) =
            remaining.into_iter().partition(|node| {
                node.depends_on
                    .iter()
                    .all(|dep| placed.contains(dep.as_str()))
            });

        if ready.is_empty() {
            // Cycle among the remainder: collapse into one final level.
            levels.push(rest.into_iter().map(|node| node.name.clone()).collect());
            break;
        }

        for node in &ready {
            placed.insert(node.name.as_str());
        }
        levels.push(ready.into_iter().map(|node| node.name.clone()).collect());
        remaining = rest;
    }

    levels
}
