//! Hierarchical auto-layout for schema tables
//!
//! Tables are arranged in horizontal layers following their dependencies:
//! referenced tables sit above the tables that point at them.
//!
//! The pipeline:
//! 1. [`SchemaGraph::build`] derives the dependency and adjacency graphs
//! 2. [`assign_levels`] peels the dependency graph into layers
//! 3. [`order_layers`] reorders each layer with the barycenter heuristic
//! 4. Each layer becomes a row centered on the horizontal origin

pub mod graph;
pub mod levels;
pub mod ordering;

pub use graph::SchemaGraph;
pub use levels::{LevelAssignment, assign_levels};
pub use ordering::{count_crossings, order_layers};

use crate::core::schema::{Position, Table};
use petgraph::graph::NodeIndex;

/// Layout configuration
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Horizontal center of every row
    pub origin_x: f64,
    /// Y coordinate of the first layer
    pub origin_y: f64,
    /// Vertical distance between layers
    pub level_gap: f64,
    /// Horizontal distance between tables in one layer
    pub table_gap: f64,
    /// Barycenter sweep passes
    pub passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin_x: 200.0,
            origin_y: 100.0,
            level_gap: 500.0,
            table_gap: 650.0,
            passes: 3,
        }
    }
}

/// Result of auto-layout calculation
#[derive(Debug, Clone)]
pub struct LayoutResult {
    /// Position of each table, indexed like the input slice
    pub positions: Vec<Position>,
    pub levels: LevelAssignment,
    /// Final left-to-right order of every layer
    pub layers: Vec<Vec<NodeIndex>>,
}

/// Compute positions for every table without touching the tables
pub fn calculate_hierarchical_layout(tables: &[Table], config: &LayoutConfig) -> LayoutResult {
    let graph = SchemaGraph::build(tables);
    let levels = assign_levels(&graph);
    let layers = order_layers(&graph, levels.layers(), config.passes);

    let mut positions = vec![Position::ORIGIN; tables.len()];
    for (level, layer) in layers.iter().enumerate() {
        for (node, position) in layer.iter().zip(row_positions(level, layer.len(), config)) {
            positions[node.index()] = position;
        }
    }

    tracing::debug!(
        tables = tables.len(),
        layers = layers.len(),
        crossings = count_crossings(&graph, &layers),
        cyclic = graph.has_cycle(),
        "calculated hierarchical layout"
    );

    LayoutResult {
        positions,
        levels,
        layers,
    }
}

/// Coordinates for a row of `count` tables on `level`, centered on the origin
pub fn row_positions(level: usize, count: usize, config: &LayoutConfig) -> Vec<Position> {
    if count == 0 {
        return Vec::new();
    }
    let total_width = (count - 1) as f64 * config.table_gap;
    let start_x = config.origin_x - total_width / 2.0;
    let y = config.origin_y + level as f64 * config.level_gap;

    (0..count)
        .map(|idx| Position::new(start_x + idx as f64 * config.table_gap, y))
        .collect()
}

/// Apply computed positions to the tables
pub fn apply_layout(tables: &mut [Table], result: &LayoutResult) {
    for (table, position) in tables.iter_mut().zip(&result.positions) {
        table.position = Some(*position);
    }
}

/// Lay out all tables with the default configuration
pub fn auto_layout(tables: &mut [Table]) {
    auto_layout_with_config(tables, &LayoutConfig::default());
}

/// Lay out all tables, overwriting existing positions
pub fn auto_layout_with_config(tables: &mut [Table], config: &LayoutConfig) {
    let result = calculate_hierarchical_layout(tables, config);
    apply_layout(tables, &result);
}

/// Give a computed position only to tables that have none
pub fn place_unpositioned(tables: &mut [Table], config: &LayoutConfig) {
    if tables.iter().all(|t| t.position.is_some()) {
        return;
    }
    let result = calculate_hierarchical_layout(tables, config);
    for (table, position) in tables.iter_mut().zip(&result.positions) {
        if table.position.is_none() {
            table.position = Some(*position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, create_demo_schema};

    #[test]
    fn test_empty_graph() {
        let result = calculate_hierarchical_layout(&[], &LayoutConfig::default());
        assert!(result.positions.is_empty());
        assert!(result.layers.is_empty());
    }

    #[test]
    fn test_layout_config_default() {
        let config = LayoutConfig::default();
        assert_eq!(config.origin_x, 200.0);
        assert_eq!(config.origin_y, 100.0);
        assert_eq!(config.level_gap, 500.0);
        assert_eq!(config.table_gap, 650.0);
        assert_eq!(config.passes, 3);
    }

    #[test]
    fn test_row_is_centered() {
        let config = LayoutConfig::default();
        let row = row_positions(1, 3, &config);

        assert_eq!(row[0], Position::new(-450.0, 600.0));
        assert_eq!(row[1], Position::new(200.0, 600.0));
        assert_eq!(row[2], Position::new(850.0, 600.0));
        assert!(row_positions(0, 0, &config).is_empty());
    }

    #[test]
    fn test_demo_schema_positions() {
        let mut tables = create_demo_schema();
        auto_layout(&mut tables);

        assert_eq!(tables[0].position, Some(Position::new(200.0, 100.0)));
        assert_eq!(tables[1].position, Some(Position::new(200.0, 600.0)));
        assert_eq!(tables[2].position, Some(Position::new(200.0, 1100.0)));
        // Table order is untouched by layout
        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[2].name, "comments");
    }

    #[test]
    fn test_single_table_sits_on_origin() {
        let mut tables = vec![Table::new("solo")];
        auto_layout(&mut tables);
        assert_eq!(tables[0].position, Some(Position::new(200.0, 100.0)));
    }

    #[test]
    fn test_place_unpositioned_keeps_existing() {
        let mut tables = vec![
            Table::new("users").with_position(999.0, 999.0),
            Table::new("posts").add_column(Column::new("user_id", "BIGINT").references("users", "id")),
        ];
        place_unpositioned(&mut tables, &LayoutConfig::default());

        assert_eq!(tables[0].position, Some(Position::new(999.0, 999.0)));
        assert_eq!(tables[1].position, Some(Position::new(200.0, 600.0)));
    }

    #[test]
    fn test_custom_config() {
        let config = LayoutConfig {
            origin_x: 0.0,
            origin_y: 0.0,
            level_gap: 100.0,
            table_gap: 50.0,
            passes: 1,
        };
        let mut tables = vec![Table::new("a"), Table::new("b")];
        auto_layout_with_config(&mut tables, &config);

        assert_eq!(tables[0].position, Some(Position::new(-25.0, 0.0)));
        assert_eq!(tables[1].position, Some(Position::new(25.0, 0.0)));
    }
}
