//! Applies batches of mutation actions to a table list
//!
//! The reconciler is pure: it takes the current tables and returns the new
//! list together with a summary. History and shared state belong to the caller.

use crate::core::actions::{ActionType, MutationAction, MutationProposal, SkippedAction};
use crate::core::layout::{LayoutConfig, auto_layout_with_config};
use crate::core::schema::{Position, Table, TableDraft, table_key};
use crate::core::validation::{unknown_references, validate_draft};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default maximum number of tables in a schema
pub const DEFAULT_MAX_TABLES: usize = 50;

/// Capacity and safety settings supplied by the caller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePolicy {
    pub max_tables: usize,
    /// Whether delete and replace actions may be applied
    pub allow_destructive: bool,
}

impl ReconcilePolicy {
    pub fn permits(&self, kind: ActionType) -> bool {
        self.allow_destructive || !kind.is_destructive()
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            max_tables: DEFAULT_MAX_TABLES,
            allow_destructive: false,
        }
    }
}

/// Human-readable record of what a batch did
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    /// One short line per applied action
    pub actions_taken: Vec<String>,
    /// Per-table detail lines, including rejections
    pub details: Vec<String>,
    pub skipped: Vec<SkippedAction>,
}

impl ChangeSummary {
    /// Record a rejected action (or part of one) in both the details and the skip list
    pub fn skip(&mut self, index: usize, kind: ActionType, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(index, action = %kind, %reason, "action skipped");
        self.details.push(reason.clone());
        self.skipped.push(SkippedAction::new(index, Some(kind), reason));
    }

    pub fn is_empty(&self) -> bool {
        self.actions_taken.is_empty() && self.details.is_empty()
    }

    pub fn message(&self) -> String {
        if self.details.is_empty() {
            if self.actions_taken.is_empty() {
                return "No changes made".to_string();
            }
            return self.actions_taken.join(", ");
        }
        let lines: Vec<String> = self.details.iter().map(|d| format!("- {d}")).collect();
        format!("AI applied:\n{}", lines.join("\n"))
    }
}

/// Result of reconciling a batch
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileOutcome {
    pub tables: Vec<Table>,
    pub summary: ChangeSummary,
    /// Whether `tables` differs from the input
    pub changed: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Reconciler {
    pub policy: ReconcilePolicy,
    pub layout: LayoutConfig,
}

impl Reconciler {
    pub fn new(policy: ReconcilePolicy, layout: LayoutConfig) -> Self {
        Self { policy, layout }
    }

    /// Apply actions in order. Each action sees the result of the previous ones.
    pub fn reconcile(&self, current: &[Table], actions: &[MutationAction]) -> ReconcileOutcome {
        let indexed: Vec<(usize, MutationAction)> = actions.iter().cloned().enumerate().collect();
        self.run(current, &indexed, ChangeSummary::default())
    }

    /// Validate the proposal's raw actions, then apply the ones that parsed
    pub fn reconcile_proposal(
        &self,
        current: &[Table],
        proposal: &MutationProposal,
    ) -> ReconcileOutcome {
        let parsed = proposal.parse_actions();
        let summary = ChangeSummary {
            skipped: parsed.skipped,
            ..Default::default()
        };
        self.run(current, &parsed.actions, summary)
    }

    fn run(
        &self,
        current: &[Table],
        actions: &[(usize, MutationAction)],
        mut summary: ChangeSummary,
    ) -> ReconcileOutcome {
        let mut tables = current.to_vec();

        for (index, action) in actions {
            tracing::debug!(index, action = %action.action_type(), "applying action");
            match action {
                MutationAction::Create { tables: drafts } => {
                    self.apply_create(&mut tables, *index, drafts, &mut summary)
                }
                MutationAction::Edit { tables: drafts } => {
                    self.apply_edit(&mut tables, *index, drafts, &mut summary)
                }
                MutationAction::Delete { table_names } => {
                    self.apply_delete(&mut tables, *index, table_names, &mut summary)
                }
                MutationAction::Replace { new_schema } => {
                    self.apply_replace(&mut tables, *index, new_schema, &mut summary)
                }
            }
        }

        let changed = tables.as_slice() != current;
        tracing::info!(
            actions = actions.len(),
            skipped = summary.skipped.len(),
            tables = tables.len(),
            changed,
            "reconciled mutation batch"
        );

        ReconcileOutcome {
            tables,
            summary,
            changed,
        }
    }

    /// Turn a draft into a table with an id, an empty relationship list when
    /// omitted and a placeholder position. Blank names are rejected.
    pub fn normalize(&self, draft: &TableDraft) -> Option<Table> {
        let validation = validate_draft(draft);
        if !validation.is_valid() {
            return None;
        }
        if validation.has_warnings() {
            tracing::warn!(
                table = %draft.name,
                warnings = ?validation.all_messages(),
                "accepted table with warnings"
            );
        }
        let mut table = draft.clone().into_table();
        table.position.get_or_insert(Position::ORIGIN);
        Some(table)
    }

    fn normalize_all(
        &self,
        drafts: &[TableDraft],
        index: usize,
        kind: ActionType,
        summary: &mut ChangeSummary,
    ) -> Vec<Table> {
        drafts
            .iter()
            .enumerate()
            .filter_map(|(position, draft)| {
                let table = self.normalize(draft);
                if table.is_none() {
                    summary.skip(index, kind, format!("Dropped table #{position}: name cannot be empty"));
                }
                table
            })
            .collect()
    }

    /// Detail lines for foreign keys of `table` that point outside `known`
    fn reference_warnings(&self, table: &Table, known: &HashSet<String>) -> Vec<String> {
        unknown_references(table, known)
            .into_iter()
            .map(|problem| {
                tracing::warn!(table = %table.name, %problem, "foreign key to unknown table");
                format!("Table {}: {problem}", table.name)
            })
            .collect()
    }

    fn relayout(&self, tables: &mut [Table]) {
        auto_layout_with_config(tables, &self.layout);
    }

    pub fn apply_create(
        &self,
        tables: &mut Vec<Table>,
        index: usize,
        drafts: &[TableDraft],
        summary: &mut ChangeSummary,
    ) {
        let max = self.policy.max_tables;
        if tables.len() + drafts.len() > max {
            summary.skip(
                index,
                ActionType::Create,
                format!(
                    "Cannot create {} tables: maximum {max} tables exceeded",
                    drafts.len()
                ),
            );
            return;
        }

        let known = known_keys(tables, drafts);
        let normalized = self.normalize_all(drafts, index, ActionType::Create, summary);
        let candidates = normalized.len();
        let mut created = Vec::new();
        let mut warnings = Vec::new();
        for table in normalized {
            if tables.iter().any(|existing| existing.name == table.name) {
                tracing::debug!(table = %table.name, "skipping duplicate table");
                continue;
            }
            warnings.extend(self.reference_warnings(&table, &known));
            created.push(table.name.clone());
            tables.push(table);
        }

        if !created.is_empty() {
            self.relayout(tables);
        }
        summary
            .actions_taken
            .push(format!("Created {} table(s)", created.len()));
        summary
            .details
            .extend(created.iter().map(|name| format!("Created table: {name}")));
        if created.len() < candidates {
            summary.details.push(format!(
                "Skipped {} duplicate table(s)",
                candidates - created.len()
            ));
        }
        summary.details.extend(warnings);
    }

    pub fn apply_edit(
        &self,
        tables: &mut Vec<Table>,
        index: usize,
        drafts: &[TableDraft],
        summary: &mut ChangeSummary,
    ) {
        let known = known_keys(tables, drafts);
        let mut applied = 0;
        let mut warnings = Vec::new();

        for draft in drafts {
            if draft.name.trim().is_empty() {
                summary.skip(index, ActionType::Edit, "Dropped table: name cannot be empty");
                continue;
            }
            let position = tables
                .iter()
                .position(|t| t.name == draft.name)
                .or_else(|| {
                    let key = table_key(&draft.name);
                    tables.iter().position(|t| t.key() == key)
                });

            match position {
                Some(i) => {
                    tables[i] = draft.clone().merge_over(&tables[i]);
                    warnings.extend(self.reference_warnings(&tables[i], &known));
                    summary.details.push(format!("Edited table: {}", draft.name));
                    applied += 1;
                }
                None => {
                    if tables.len() >= self.policy.max_tables {
                        summary.skip(
                            index,
                            ActionType::Edit,
                            format!(
                                "Cannot create fallback table {}: maximum {} tables exceeded",
                                draft.name, self.policy.max_tables
                            ),
                        );
                        continue;
                    }
                    let Some(table) = self.normalize(draft) else {
                        continue;
                    };
                    tracing::debug!(table = %table.name, "edit target missing, creating it");
                    warnings.extend(self.reference_warnings(&table, &known));
                    summary
                        .details
                        .push(format!("Created fallback table: {}", table.name));
                    tables.push(table);
                    applied += 1;
                }
            }
        }

        if applied > 0 {
            self.relayout(tables);
            summary
                .actions_taken
                .push(format!("Edited {applied} table(s)"));
        }
        summary.details.extend(warnings);
    }

    /// Remove tables by exact name. Remaining tables keep their positions.
    pub fn apply_delete(
        &self,
        tables: &mut Vec<Table>,
        index: usize,
        names: &[String],
        summary: &mut ChangeSummary,
    ) {
        if !self.policy.permits(ActionType::Delete) {
            summary.skip(
                index,
                ActionType::Delete,
                format!(
                    "Skipped deletion ({} tables) - destructive actions disabled",
                    names.len()
                ),
            );
            return;
        }

        let mut deleted: Vec<String> = Vec::new();
        tables.retain(|t| {
            let remove = names.contains(&t.name);
            if remove {
                deleted.push(t.name.clone());
            }
            !remove
        });

        summary
            .actions_taken
            .push(format!("Deleted {} table(s)", deleted.len()));
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                continue;
            }
            if deleted.contains(name) {
                summary.details.push(format!("Deleted table: {name}"));
            } else {
                summary.skip(index, ActionType::Delete, format!("Table not found: {name}"));
            }
        }
    }

    pub fn apply_replace(
        &self,
        tables: &mut Vec<Table>,
        index: usize,
        drafts: &[TableDraft],
        summary: &mut ChangeSummary,
    ) {
        if !self.policy.permits(ActionType::Replace) {
            summary.skip(
                index,
                ActionType::Replace,
                "Skipped schema replacement - destructive actions disabled",
            );
            return;
        }
        if drafts.len() > self.policy.max_tables {
            summary.skip(
                index,
                ActionType::Replace,
                format!(
                    "Cannot replace schema with {} tables: maximum {} tables exceeded",
                    drafts.len(),
                    self.policy.max_tables
                ),
            );
            return;
        }

        let known = known_keys(&[], drafts);
        let mut replacement: Vec<Table> = Vec::with_capacity(drafts.len());
        for table in self.normalize_all(drafts, index, ActionType::Replace, summary) {
            if replacement.iter().any(|t| t.name == table.name) {
                summary.skip(
                    index,
                    ActionType::Replace,
                    format!("Skipped duplicate table: {}", table.name),
                );
                continue;
            }
            replacement.push(table);
        }

        self.relayout(&mut replacement);
        summary.actions_taken.push(format!(
            "Replaced entire schema with {} table(s)",
            replacement.len()
        ));
        summary.details.push("Replaced entire schema".to_string());
        for table in &replacement {
            let warnings = self.reference_warnings(table, &known);
            summary.details.extend(warnings);
        }
        *tables = replacement;
    }
}

/// Keys of the tables in the schema plus those named in the incoming batch
fn known_keys(tables: &[Table], drafts: &[TableDraft]) -> HashSet<String> {
    tables
        .iter()
        .map(Table::key)
        .chain(drafts.iter().map(|draft| table_key(&draft.name)))
        .collect()
}
