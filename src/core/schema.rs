use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Canvas position of a table node
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Key used to address a table in graph computations (lowercased name)
pub fn table_key(name: &str) -> String {
    name.to_lowercase()
}

/// Generate a fresh, immutable table id
pub fn new_table_id() -> String {
    format!("table-{}", Uuid::new_v4())
}

/// `order_items` -> `OrderItems`
pub fn to_pascal_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `created_at` -> `createdAt`
pub fn to_camel_case(name: &str) -> String {
    let pascal = to_pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Database table
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Stable identity, never reassigned once set
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub is_join_table: bool,
    /// Canvas position; `None` until the layout places the table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: new_table_id(),
            class_name: to_pascal_case(&name),
            name,
            columns: Vec::new(),
            relationships: Vec::new(),
            is_join_table: false,
            position: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn add_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn key(&self) -> String {
        table_key(&self.name)
    }
}

/// Table column
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// SQL type as written in the source schema
    #[serde(rename = "type", default)]
    pub sql_type: String,
    #[serde(default)]
    pub field_name: String,
    /// Type in the generated code's language
    #[serde(rename = "javaType", default)]
    pub target_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            field_name: to_camel_case(&name),
            name,
            sql_type: sql_type.into(),
            target_type: String::new(),
            primary_key: false,
            auto_increment: false,
            nullable: true,
            unique: false,
            foreign_key: false,
            referenced_table: None,
            referenced_column: None,
            length: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = true;
        self.referenced_table = Some(table.into());
        self.referenced_column = Some(column.into());
        self
    }

    /// Table referenced by this column, if it is a usable foreign key
    pub fn references_table(&self) -> Option<&str> {
        if !self.foreign_key {
            return None;
        }
        self.referenced_table
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

/// Relationship record stored on the owning table
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    #[serde(rename = "type", deserialize_with = "deserialize_relationship_type")]
    pub kind: RelationshipType,
    #[serde(default)]
    pub source_table: String,
    pub target_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_by: Option<String>,
    /// Field name used to label the relationship
    #[serde(default)]
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_class_name: Option<String>,
}

impl Relationship {
    pub fn new(
        kind: RelationshipType,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Self {
        let target_table = target_table.into();
        Self {
            kind,
            source_table: source_table.into(),
            field_name: to_camel_case(&target_table),
            target_table,
            source_column: None,
            target_column: None,
            join_table: None,
            mapped_by: None,
            target_class_name: None,
        }
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }
}

/// Relationship cardinality
#[derive(
    Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    #[display("1:1")]
    #[serde(alias = "OneToOne", alias = "one_to_one")]
    OneToOne,
    #[display("1:N")]
    #[serde(alias = "OneToMany", alias = "one_to_many")]
    OneToMany,
    /// The owning table depends on the target table
    #[display("N:1")]
    #[serde(alias = "ManyToOne", alias = "many_to_one")]
    ManyToOne,
    #[display("N:M")]
    #[serde(alias = "ManyToMany", alias = "many_to_many")]
    ManyToMany,
}

impl RelationshipType {
    /// Whether this relationship forces the owner below its target when layering
    pub fn establishes_dependency(&self) -> bool {
        matches!(self, RelationshipType::ManyToOne)
    }
}

/// Relationship type as it arrives on the wire: a bare string or `{ "type": ... }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RelationshipTypeRepr {
    Bare(RelationshipType),
    Wrapped {
        #[serde(rename = "type")]
        kind: RelationshipType,
    },
}

fn deserialize_relationship_type<'de, D>(deserializer: D) -> Result<RelationshipType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RelationshipTypeRepr::deserialize(deserializer)? {
        RelationshipTypeRepr::Bare(kind) | RelationshipTypeRepr::Wrapped { kind } => kind,
    })
}

/// Table payload proposed by an external actor. Only `name` is required.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<Column>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Relationship>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_join_table: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl TableDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_relationships(mut self, relationships: Vec<Relationship>) -> Self {
        self.relationships = Some(relationships);
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    /// Turn the draft into a full table, filling every omitted field.
    /// The position stays `None` when the draft carries none.
    pub fn into_table(self) -> Table {
        let class_name = self
            .class_name
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| to_pascal_case(&self.name));
        Table {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_table_id),
            class_name,
            name: self.name,
            columns: self.columns.unwrap_or_default(),
            relationships: self.relationships.unwrap_or_default(),
            is_join_table: self.is_join_table.unwrap_or(false),
            position: self.position,
        }
    }

    /// Overlay the fields present in the draft on top of `existing`.
    /// The existing id always survives.
    pub fn merge_over(self, existing: &Table) -> Table {
        Table {
            id: existing.id.clone(),
            name: self.name,
            class_name: self
                .class_name
                .unwrap_or_else(|| existing.class_name.clone()),
            columns: self.columns.unwrap_or_else(|| existing.columns.clone()),
            relationships: self
                .relationships
                .unwrap_or_else(|| existing.relationships.clone()),
            is_join_table: self.is_join_table.unwrap_or(existing.is_join_table),
            position: self.position.or(existing.position),
        }
    }
}

impl From<Table> for TableDraft {
    fn from(table: Table) -> Self {
        Self {
            id: Some(table.id),
            name: table.name,
            class_name: Some(table.class_name),
            columns: Some(table.columns),
            relationships: Some(table.relationships),
            is_join_table: Some(table.is_join_table),
            position: table.position,
        }
    }
}

/// Demo schema: users <- posts <- comments
pub fn create_demo_schema() -> Vec<Table> {
    let users = Table::new("users")
        .add_column(Column::new("id", "BIGINT").primary_key().auto_increment())
        .add_column(Column::new("username", "VARCHAR(255)").not_null().unique())
        .add_column(Column::new("email", "VARCHAR(255)").not_null().unique());

    let posts = Table::new("posts")
        .add_column(Column::new("id", "BIGINT").primary_key().auto_increment())
        .add_column(
            Column::new("user_id", "BIGINT")
                .not_null()
                .references("users", "id"),
        )
        .add_column(Column::new("title", "VARCHAR(255)").not_null())
        .add_column(Column::new("content", "TEXT"));

    let comments = Table::new("comments")
        .add_column(Column::new("id", "BIGINT").primary_key().auto_increment())
        .add_column(
            Column::new("post_id", "BIGINT")
                .not_null()
                .references("posts", "id"),
        )
        .add_column(
            Column::new("user_id", "BIGINT")
                .not_null()
                .references("users", "id"),
        )
        .add_column(Column::new("content", "TEXT").not_null());

    vec![users, posts, comments]
}
