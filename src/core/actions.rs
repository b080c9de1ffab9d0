//! Mutation proposals from external actors
//!
//! Actions are parsed one element at a time so a malformed entry only drops
//! itself, never the whole proposal.

use crate::core::schema::TableDraft;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    #[display("create")]
    Create,
    #[display("edit")]
    Edit,
    #[display("delete")]
    Delete,
    #[display("replace")]
    Replace,
}

impl ActionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(ActionType::Create),
            "edit" => Some(ActionType::Edit),
            "delete" => Some(ActionType::Delete),
            "replace" => Some(ActionType::Replace),
            _ => None,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, ActionType::Delete | ActionType::Replace)
    }
}

/// A validated mutation action
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MutationAction {
    Create {
        tables: Vec<TableDraft>,
    },
    Edit {
        tables: Vec<TableDraft>,
    },
    Delete {
        #[serde(rename = "tableNames")]
        table_names: Vec<String>,
    },
    Replace {
        #[serde(rename = "newSchema")]
        new_schema: Vec<TableDraft>,
    },
}

impl MutationAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            MutationAction::Create { .. } => ActionType::Create,
            MutationAction::Edit { .. } => ActionType::Edit,
            MutationAction::Delete { .. } => ActionType::Delete,
            MutationAction::Replace { .. } => ActionType::Replace,
        }
    }
}

/// An action, or part of one, that was not applied
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedAction {
    /// Position of the action in the proposal
    pub index: usize,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActionType>,
    pub reason: String,
}

impl SkippedAction {
    pub fn new(index: usize, kind: Option<ActionType>, reason: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            reason: reason.into(),
        }
    }
}

/// Response of a mutation source
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MutationProposal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Raw actions, validated by [`MutationProposal::parse_actions`]
    #[serde(default)]
    pub actions: Vec<Value>,
}

/// Actions that passed validation plus everything that was dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedActions {
    pub actions: Vec<(usize, MutationAction)>,
    pub skipped: Vec<SkippedAction>,
}

impl MutationProposal {
    pub fn new(actions: &[MutationAction]) -> Self {
        Self {
            session_id: None,
            explanation: None,
            actions: actions
                .iter()
                .filter_map(|action| serde_json::to_value(action).ok())
                .collect(),
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn parse_actions(&self) -> ParsedActions {
        let mut parsed = ParsedActions::default();
        for (index, value) in self.actions.iter().enumerate() {
            match parse_action(index, value, &mut parsed.skipped) {
                Ok(action) => parsed.actions.push((index, action)),
                Err(skipped) => {
                    tracing::warn!(index, reason = %skipped.reason, "skipping malformed action");
                    parsed.skipped.push(skipped);
                }
            }
        }
        parsed
    }
}

fn parse_action(
    index: usize,
    value: &Value,
    dropped: &mut Vec<SkippedAction>,
) -> Result<MutationAction, SkippedAction> {
    let object = value
        .as_object()
        .ok_or_else(|| SkippedAction::new(index, None, "action is not an object"))?;

    let kind = match object.get("type") {
        Some(Value::String(name)) => ActionType::parse(name).ok_or_else(|| {
            SkippedAction::new(index, None, format!("unknown action type '{name}'"))
        })?,
        Some(Value::Null) | None => {
            return Err(SkippedAction::new(index, None, "missing action type"));
        }
        Some(_) => {
            return Err(SkippedAction::new(index, None, "action type must be a string"));
        }
    };
    let skip = |reason: String| SkippedAction::new(index, Some(kind), reason);

    match kind {
        ActionType::Create | ActionType::Edit => {
            let items = array_field(object, "tables").map_err(skip)?;
            let tables = parse_drafts(index, kind, items, dropped);
            if tables.is_empty() {
                return Err(skip("no valid tables in action".to_string()));
            }
            Ok(if kind == ActionType::Create {
                MutationAction::Create { tables }
            } else {
                MutationAction::Edit { tables }
            })
        }
        ActionType::Delete => {
            let items = array_field(object, "tableNames").map_err(skip)?;
            let mut table_names = Vec::with_capacity(items.len());
            for (position, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(name) => table_names.push(name.to_string()),
                    None => dropped.push(skip(format!("table name #{position} is not a string"))),
                }
            }
            if table_names.is_empty() {
                return Err(skip("no table names in action".to_string()));
            }
            Ok(MutationAction::Delete { table_names })
        }
        // An empty replacement is a valid way to clear the schema
        ActionType::Replace => {
            let items = array_field(object, "newSchema").map_err(skip)?;
            Ok(MutationAction::Replace {
                new_schema: parse_drafts(index, kind, items, dropped),
            })
        }
    }
}

fn array_field<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a Vec<Value>, String> {
    match object.get(field) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Err(format!("missing '{field}'")),
        Some(_) => Err(format!("'{field}' must be an array")),
    }
}

fn parse_drafts(
    index: usize,
    kind: ActionType,
    items: &[Value],
    dropped: &mut Vec<SkippedAction>,
) -> Vec<TableDraft> {
    items
        .iter()
        .enumerate()
        .filter_map(|(position, item)| match TableDraft::deserialize(item) {
            Ok(draft) => Some(draft),
            Err(e) => {
                tracing::warn!(index, position, error = %e, "dropping malformed table");
                dropped.push(SkippedAction::new(
                    index,
                    Some(kind),
                    format!("table #{position}: {e}"),
                ));
                None
            }
        })
        .collect()
}
