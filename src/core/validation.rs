//! Validation of identifiers and incoming table drafts
//!
//! Only a blank table name is fatal for a draft. Everything else is reported
//! as a warning and the draft is still applied.

use crate::core::schema::{Table, TableDraft, table_key};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum length for identifiers (MySQL standard)
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// SQL keywords that need quoting when used as identifiers
static RESERVED_KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN",
        "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP",
        "ELSE", "EXISTS", "FALSE", "FOR", "FOREIGN", "FROM", "FULL", "GRANT", "GROUP",
        "HAVING", "IN", "INDEX", "INNER", "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT",
        "LIKE", "LIMIT", "NOT", "NULL", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES",
        "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO", "TRUE", "UNION", "UNIQUE", "UPDATE",
        "USING", "VALUES", "WHEN", "WHERE", "WITH",
    ]
    .into_iter()
    .collect()
});

/// Validation error types
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum ValidationError {
    #[display("Name cannot be empty")]
    Empty,
    #[display("Name is too long ({actual} chars, max {max})")]
    TooLong { max: usize, actual: usize },
    #[display(
        "Name contains invalid characters: '{}'. Only letters, numbers, and underscores are allowed",
        invalid.iter().collect::<String>()
    )]
    InvalidCharacters { invalid: Vec<char> },
    #[display("Name cannot start with a digit")]
    StartsWithDigit,
    #[display("'{keyword}' is a reserved SQL keyword")]
    ReservedKeyword { keyword: String },
    #[display("Column '{column}': {reason}")]
    InvalidColumn {
        column: String,
        reason: Box<ValidationError>,
    },
    #[display("Column '{column}' is declared more than once")]
    DuplicateColumn { column: String },
    #[display("Column '{column}' is a foreign key without a referenced table")]
    DanglingForeignKey { column: String },
    #[display("Column '{column}' references unknown table '{table}'")]
    UnknownReferencedTable { column: String, table: String },
}

impl std::error::Error for ValidationError {}

/// Validation strictness level
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ValidationLevel {
    /// Shape checks only
    Minimal,
    /// Shape checks plus reserved keywords
    #[default]
    Standard,
}

/// Validation result containing errors and warnings
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Problems that prevent the draft from being applied
    pub errors: Vec<ValidationError>,
    /// Problems worth reporting but not blocking
    pub warnings: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Convert to Result, returning first error if any
    pub fn to_result(&self) -> Result<(), ValidationError> {
        match self.errors.first() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    pub fn all_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("Error: {e}"))
            .chain(self.warnings.iter().map(|w| format!("Warning: {w}")))
            .collect()
    }
}

/// Check a table or column name against common RDBMS naming rules
pub fn validate_identifier(name: &str, level: ValidationLevel) -> ValidationResult {
    let mut result = ValidationResult::new();

    let trimmed = name.trim();
    if trimmed.is_empty() {
        result.errors.push(ValidationError::Empty);
        return result;
    }

    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        result.errors.push(ValidationError::TooLong {
            max: MAX_IDENTIFIER_LENGTH,
            actual: trimmed.len(),
        });
    }

    let invalid: Vec<char> = trimmed
        .chars()
        .filter(|c| !c.is_ascii_alphanumeric() && *c != '_')
        .collect();
    if !invalid.is_empty() {
        result.errors.push(ValidationError::InvalidCharacters { invalid });
    }

    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        result.errors.push(ValidationError::StartsWithDigit);
    }

    if level == ValidationLevel::Standard && is_reserved_keyword(trimmed) {
        result.errors.push(ValidationError::ReservedKeyword {
            keyword: trimmed.to_string(),
        });
    }

    result
}

pub fn is_reserved_keyword(name: &str) -> bool {
    RESERVED_KEYWORDS.contains(name.to_uppercase().as_str())
}

/// Validate a proposed table before it enters the schema.
///
/// A blank name is the only error. Naming problems, blank or repeated
/// column names and foreign keys without a target are warnings.
pub fn validate_draft(draft: &TableDraft) -> ValidationResult {
    let mut result = ValidationResult::new();

    if draft.name.trim().is_empty() {
        result.errors.push(ValidationError::Empty);
        return result;
    }
    result
        .warnings
        .extend(validate_identifier(&draft.name, ValidationLevel::Standard).errors);

    let mut seen = HashSet::new();
    for column in draft.columns.iter().flatten() {
        if let Err(reason) = validate_identifier(&column.name, ValidationLevel::Minimal).to_result() {
            result.warnings.push(ValidationError::InvalidColumn {
                column: column.name.clone(),
                reason: Box::new(reason),
            });
        }
        if !seen.insert(column.name.to_lowercase()) {
            result.warnings.push(ValidationError::DuplicateColumn {
                column: column.name.clone(),
            });
        }
        if column.foreign_key && column.references_table().is_none() {
            result.warnings.push(ValidationError::DanglingForeignKey {
                column: column.name.clone(),
            });
        }
    }

    result
}

/// Foreign keys of `table` that point at none of the `known` table keys.
///
/// `known` holds lowercase keys of the tables already in the schema and of
/// those arriving in the same batch. A table may always reference itself.
pub fn unknown_references(table: &Table, known: &HashSet<String>) -> Vec<ValidationError> {
    let own = table.key();
    table
        .columns
        .iter()
        .filter_map(|column| {
            let target = column.references_table()?;
            let key = table_key(target);
            (key != own && !known.contains(&key)).then(|| {
                ValidationError::UnknownReferencedTable {
                    column: column.name.clone(),
                    table: target.to_string(),
                }
            })
        })
        .collect()
}
