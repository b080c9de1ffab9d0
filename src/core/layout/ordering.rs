//! Barycenter ordering inside layers
//!
//! A bounded number of sweeps, not an exact crossing minimizer. The result is
//! deterministic for identical input.

use super::graph::SchemaGraph;
use petgraph::graph::NodeIndex;
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Ranked {
    node: NodeIndex,
    /// Mean position of neighbors in the reference layer; `None` when there are none
    barycenter: Option<f64>,
    degree: usize,
}

fn compare_ranked(a: &Ranked, b: &Ranked) -> Ordering {
    match (a.barycenter, b.barycenter) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| b.degree.cmp(&a.degree)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Reorder each layer to reduce crossings between neighboring layers.
///
/// Layers start sorted by descending degree, then every pass sweeps top-down
/// (ranking against the layer above) and bottom-up (against the layer below).
pub fn order_layers(
    graph: &SchemaGraph,
    mut layers: Vec<Vec<NodeIndex>>,
    passes: usize,
) -> Vec<Vec<NodeIndex>> {
    for layer in &mut layers {
        layer.sort_by_key(|node| Reverse(graph.degree(*node)));
    }

    if layers.len() < 2 {
        return layers;
    }

    for _ in 0..passes {
        for level in 1..layers.len() {
            let reordered = reorder(graph, &layers[level], &layers[level - 1]);
            layers[level] = reordered;
        }
        for level in (0..layers.len() - 1).rev() {
            let reordered = reorder(graph, &layers[level], &layers[level + 1]);
            layers[level] = reordered;
        }
    }

    layers
}

fn reorder(graph: &SchemaGraph, layer: &[NodeIndex], reference: &[NodeIndex]) -> Vec<NodeIndex> {
    let position: HashMap<NodeIndex, usize> = reference
        .iter()
        .enumerate()
        .map(|(i, node)| (*node, i))
        .collect();

    let mut ranked: Vec<Ranked> = layer
        .iter()
        .map(|&node| {
            let indices: Vec<usize> = graph
                .neighbors(node)
                .iter()
                .filter_map(|n| position.get(n).copied())
                .collect();
            let barycenter = if indices.is_empty() {
                None
            } else {
                Some(indices.iter().sum::<usize>() as f64 / indices.len() as f64)
            };
            Ranked {
                node,
                barycenter,
                degree: graph.degree(node),
            }
        })
        .collect();

    // Stable, so nodes without neighbors keep their relative order at the end
    ranked.sort_by(compare_ranked);
    ranked.into_iter().map(|r| r.node).collect()
}

/// Count edge crossings between consecutive layers
pub fn count_crossings(graph: &SchemaGraph, layers: &[Vec<NodeIndex>]) -> usize {
    layers
        .windows(2)
        .map(|pair| {
            let lower: HashMap<NodeIndex, usize> = pair[1]
                .iter()
                .enumerate()
                .map(|(i, node)| (*node, i))
                .collect();

            let mut edges = Vec::new();
            for (upper_pos, node) in pair[0].iter().enumerate() {
                for neighbor in graph.neighbors(*node) {
                    if let Some(lower_pos) = lower.get(&neighbor) {
                        edges.push((upper_pos, *lower_pos));
                    }
                }
            }

            let mut crossings = 0;
            for (i, (a1, b1)) in edges.iter().enumerate() {
                for (a2, b2) in &edges[i + 1..] {
                    if (a1 < a2 && b1 > b2) || (a1 > a2 && b1 < b2) {
                        crossings += 1;
                    }
                }
            }
            crossings
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout::levels::assign_levels;
    use crate::core::schema::{Column, Table};

    fn fk(table: &str) -> Column {
        Column::new(format!("{table}_id"), "BIGINT").references(table, "id")
    }

    fn crossed_schema() -> Vec<Table> {
        vec![
            Table::new("a"),
            Table::new("b"),
            Table::new("x").add_column(fk("b")),
            Table::new("y").add_column(fk("a")),
        ]
    }

    fn keys(graph: &SchemaGraph, layer: &[NodeIndex]) -> Vec<String> {
        layer.iter().map(|n| graph.key(*n).to_string()).collect()
    }

    #[test]
    fn test_removes_simple_crossing() {
        let graph = SchemaGraph::build(&crossed_schema());
        let layers = assign_levels(&graph).layers();
        assert_eq!(count_crossings(&graph, &layers), 1);

        let ordered = order_layers(&graph, layers, 3);
        assert_eq!(count_crossings(&graph, &ordered), 0);
        assert_eq!(keys(&graph, &ordered[0]), vec!["a", "b"]);
        assert_eq!(keys(&graph, &ordered[1]), vec!["y", "x"]);
    }

    #[test]
    fn test_initial_order_by_degree() {
        let tables = vec![
            Table::new("lonely"),
            Table::new("hub"),
            Table::new("c1").add_column(fk("hub")),
            Table::new("c2").add_column(fk("hub")),
        ];
        let graph = SchemaGraph::build(&tables);
        let layers = assign_levels(&graph).layers();
        let ordered = order_layers(&graph, layers, 0);

        assert_eq!(keys(&graph, &ordered[0]), vec!["hub", "lonely"]);
    }

    #[test]
    fn test_nodes_without_neighbors_sort_last_in_order() {
        let tables = vec![
            Table::new("root"),
            Table::new("iso1"),
            Table::new("iso2"),
            Table::new("child").add_column(fk("root")),
        ];
        let graph = SchemaGraph::build(&tables);
        let layers = assign_levels(&graph).layers();
        let ordered = order_layers(&graph, layers, 3);

        assert_eq!(keys(&graph, &ordered[0]), vec!["root", "iso1", "iso2"]);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let tables = vec![
            Table::new("users"),
            Table::new("tags"),
            Table::new("posts").add_column(fk("users")),
            Table::new("post_tags").add_column(fk("posts")).add_column(fk("tags")),
            Table::new("comments").add_column(fk("posts")).add_column(fk("users")),
        ];
        let first = {
            let graph = SchemaGraph::build(&tables);
            order_layers(&graph, assign_levels(&graph).layers(), 3)
        };
        let second = {
            let graph = SchemaGraph::build(&tables);
            order_layers(&graph, assign_levels(&graph).layers(), 3)
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_layer_untouched_by_passes() {
        let tables = vec![Table::new("a"), Table::new("b")];
        let graph = SchemaGraph::build(&tables);
        let ordered = order_layers(&graph, assign_levels(&graph).layers(), 3);
        assert_eq!(keys(&graph, &ordered[0]), vec!["a", "b"]);
    }
}
