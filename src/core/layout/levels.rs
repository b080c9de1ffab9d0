//! Layer assignment by iterative peeling

use super::graph::SchemaGraph;
use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;

/// Layer index of every node, indexed like the table list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelAssignment {
    levels: Vec<usize>,
}

impl LevelAssignment {
    pub fn level_of(&self, node: NodeIndex) -> usize {
        self.levels[node.index()]
    }

    pub fn max_level(&self) -> Option<usize> {
        self.levels.iter().copied().max()
    }

    /// Nodes grouped per layer, each group in insertion order
    pub fn layers(&self) -> Vec<Vec<NodeIndex>> {
        let Some(max) = self.max_level() else {
            return Vec::new();
        };
        let mut layers = vec![Vec::new(); max + 1];
        for (i, level) in self.levels.iter().enumerate() {
            layers[*level].push(NodeIndex::new(i));
        }
        layers
    }

    /// `key -> layer`. When names repeat, the first table's layer wins.
    pub fn as_map(&self, graph: &SchemaGraph) -> BTreeMap<String, usize> {
        let mut map = BTreeMap::new();
        for node in graph.nodes() {
            map.entry(graph.key(node).to_string())
                .or_insert(self.level_of(node));
        }
        map
    }
}

/// Assign every table a layer so parents sit strictly above their children.
///
/// Each round assigns all tables whose parents are already placed. A round
/// that places nothing means the rest is held up by a cycle; all remaining
/// tables then land on that round's layer.
pub fn assign_levels(graph: &SchemaGraph) -> LevelAssignment {
    let count = graph.node_count();
    let mut levels: Vec<Option<usize>> = vec![None; count];
    let mut remaining: Vec<NodeIndex> = graph.nodes().collect();
    let mut round = 0;

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<NodeIndex>, Vec<NodeIndex>) = std::mem::take(&mut remaining)
            .into_iter()
            .partition(|node| {
                graph
                    .parents(*node)
                    .all(|parent| levels[parent.index()].is_some())
            });

        if ready.is_empty() {
            tracing::debug!(
                remaining = blocked.len(),
                level = round,
                "dependency cycle detected, forcing remaining tables onto one level"
            );
            for node in blocked {
                levels[node.index()] = Some(round);
            }
            break;
        }

        for node in &ready {
            levels[node.index()] = Some(round);
        }
        remaining = blocked;
        round += 1;
    }

    LevelAssignment {
        levels: levels.into_iter().map(|l| l.unwrap_or(0)).collect(),
    }
}
