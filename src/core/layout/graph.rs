//! Dependency and adjacency graphs derived from a table list
//!
//! Node `i` in both graphs is table `i` of the input slice, so the table list
//! keeps its insertion order while lookups by name go through the key index.

use crate::core::schema::{Table, table_key};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Graph view of a schema
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    index: HashMap<String, NodeIndex>,
    /// child -> parent edges
    dependencies: DiGraph<String, ()>,
    /// undirected "is connected to" edges, used only for ordering
    adjacency: UnGraph<String, ()>,
}

impl SchemaGraph {
    /// Build both graphs from the table list.
    ///
    /// Foreign-key columns add a dependency edge and an adjacency edge.
    /// `MANY_TO_ONE` relationships add a dependency edge; every relationship
    /// adds an adjacency edge. References to tables that are not in the list
    /// are ignored, as are self references.
    pub fn build(tables: &[Table]) -> Self {
        let mut dependencies = DiGraph::with_capacity(tables.len(), 0);
        let mut adjacency = UnGraph::new_undirected();
        let mut index = HashMap::with_capacity(tables.len());

        for table in tables {
            let key = table.key();
            let node = dependencies.add_node(key.clone());
            adjacency.add_node(key.clone());
            // Duplicate names resolve to the first table carrying them
            index.entry(key).or_insert(node);
        }

        for (i, table) in tables.iter().enumerate() {
            let node = NodeIndex::new(i);

            for column in &table.columns {
                let Some(referenced) = column.references_table() else {
                    continue;
                };
                if let Some(parent) = resolve_in(&index, referenced).filter(|p| *p != node) {
                    dependencies.update_edge(node, parent, ());
                    adjacency.update_edge(node, parent, ());
                }
            }

            for relationship in &table.relationships {
                let Some(target) = resolve_in(&index, &relationship.target_table)
                    .filter(|t| *t != node)
                else {
                    continue;
                };
                if relationship.kind.establishes_dependency() {
                    dependencies.update_edge(node, target, ());
                }
                adjacency.update_edge(node, target, ());
            }
        }

        Self {
            index,
            dependencies,
            adjacency,
        }
    }

    pub fn node_count(&self) -> usize {
        self.dependencies.node_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.dependencies.node_indices()
    }

    pub fn key(&self, node: NodeIndex) -> &str {
        &self.dependencies[node]
    }

    /// Find the node for a table name, compared case-insensitively
    pub fn resolve(&self, name: &str) -> Option<NodeIndex> {
        resolve_in(&self.index, name)
    }

    /// Tables that `node` depends on
    pub fn parents(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.dependencies
            .neighbors_directed(node, Direction::Outgoing)
    }

    pub fn neighbors(&self, node: NodeIndex) -> HashSet<NodeIndex> {
        self.adjacency.neighbors(node).collect()
    }

    /// Number of distinct adjacent tables
    pub fn degree(&self, node: NodeIndex) -> usize {
        self.adjacency.neighbors(node).count()
    }

    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.dependencies)
    }

    /// Dependency graph as `key -> parent keys`
    pub fn parents_by_key(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.nodes()
            .map(|node| {
                let parents = self.parents(node).map(|p| self.key(p).to_string()).collect();
                (self.key(node).to_string(), parents)
            })
            .collect()
    }

    /// Adjacency graph as `key -> neighbor keys`
    pub fn adjacency_by_key(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.nodes()
            .map(|node| {
                let neighbors = self
                    .adjacency
                    .neighbors(node)
                    .map(|n| self.key(n).to_string())
                    .collect();
                (self.key(node).to_string(), neighbors)
            })
            .collect()
    }
}

fn resolve_in(index: &HashMap<String, NodeIndex>, name: &str) -> Option<NodeIndex> {
    index.get(&table_key(name)).copied()
}
