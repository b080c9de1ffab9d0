//! Edge list handed to the rendering layer

use crate::core::layout::SchemaGraph;
use crate::core::schema::{RelationshipType, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where an edge comes from
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EdgeOrigin {
    #[serde(rename_all = "camelCase")]
    Relationship { relationship_type: RelationshipType },
    /// Raw foreign-key column with no matching relationship
    ForeignKey { column: String },
}

/// Edge between two table nodes, addressed by table id
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub origin: EdgeOrigin,
    pub source_label: String,
    pub target_label: String,
    pub dashed: bool,
}

impl SchemaEdge {
    pub fn label(&self) -> String {
        format!("{}..{}", self.source_label, self.target_label)
    }
}

fn cardinality_labels(kind: RelationshipType) -> (&'static str, &'static str) {
    match kind {
        RelationshipType::OneToOne => ("1", "1"),
        RelationshipType::ManyToMany => ("N", "N"),
        RelationshipType::OneToMany | RelationshipType::ManyToOne => ("1", "N"),
    }
}

/// Derive the edges to draw for the current tables.
///
/// Every relationship whose target exists yields one edge; `MANY_TO_ONE`
/// points from the referenced table to the owner. A relationship and its
/// mirror on the other table (same field name) are drawn once. A foreign-key
/// column adds an edge only when nothing connects that pair of tables yet.
pub fn derive_edges(tables: &[Table]) -> Vec<SchemaEdge> {
    let graph = SchemaGraph::build(tables);
    let mut edges = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut connected: HashSet<(usize, usize)> = HashSet::new();

    let pair = |a: usize, b: usize| (a.min(b), a.max(b));

    for (owner_idx, table) in tables.iter().enumerate() {
        for relationship in &table.relationships {
            let Some(target_node) = graph.resolve(&relationship.target_table) else {
                continue;
            };
            let target_idx = target_node.index();
            let target = &tables[target_idx];

            let forward = format!("{}-{}-{}", table.id, target.id, relationship.field_name);
            let reverse = format!("{}-{}-{}", target.id, table.id, relationship.field_name);
            if seen_ids.contains(&forward) || seen_ids.contains(&reverse) {
                continue;
            }

            let (source, target) = if relationship.kind == RelationshipType::ManyToOne {
                (target, table)
            } else {
                (table, target)
            };
            let (source_label, target_label) = cardinality_labels(relationship.kind);
            let id = format!("{}-{}-{}", source.id, target.id, relationship.field_name);

            seen_ids.insert(id.clone());
            connected.insert(pair(owner_idx, target_idx));
            edges.push(SchemaEdge {
                id,
                source: source.id.clone(),
                target: target.id.clone(),
                origin: EdgeOrigin::Relationship {
                    relationship_type: relationship.kind,
                },
                source_label: source_label.to_string(),
                target_label: target_label.to_string(),
                dashed: relationship.kind == RelationshipType::ManyToMany,
            });
        }
    }

    for (owner_idx, table) in tables.iter().enumerate() {
        for column in &table.columns {
            let Some(referenced_node) = column.references_table().and_then(|n| graph.resolve(n))
            else {
                continue;
            };
            let referenced_idx = referenced_node.index();
            let referenced = &tables[referenced_idx];

            // Relationship edges registered their pairs above, both ways
            if !connected.insert(pair(owner_idx, referenced_idx)) {
                continue;
            }

            edges.push(SchemaEdge {
                id: format!("fk-{}-{}-{}", referenced.id, table.id, column.name),
                source: referenced.id.clone(),
                target: table.id.clone(),
                origin: EdgeOrigin::ForeignKey {
                    column: column.name.clone(),
                },
                source_label: "1".to_string(),
                target_label: "N".to_string(),
                dashed: false,
            });
        }
    }

    edges
}
