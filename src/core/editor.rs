//! Shared schema state and the operations that mutate it
//!
//! All mutation goes through [`SchemaEditor`]. Every change records the
//! previous table list in the history first, then schedules a backup.
//! Only one mutation batch may wait on the external source at a time.

use crate::core::actions::MutationProposal;
use crate::core::backup::{BackupError, BackupWriter};
use crate::core::config::Config;
use crate::core::edges::{SchemaEdge, derive_edges};
use crate::core::history::{DEFAULT_MAX_HISTORY, HistoryManager};
use crate::core::layout::{LayoutConfig, auto_layout_with_config, place_unpositioned};
use crate::core::mutation_source::{MutationSource, ProposalRequest, SourceError};
use crate::core::reconciler::{ChangeSummary, ReconcilePolicy, Reconciler};
use crate::core::schema::{Position, Table, TableDraft, table_key};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Moves this small (in both axes) are treated as accidental
pub const MIN_MOVE_DISTANCE: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("Another schema update is already in progress")]
    Busy,
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("A table named '{0}' already exists")]
    DuplicateName(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Maximum of {max} tables reached")]
    Capacity { max: usize },
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
    #[error("No backup available")]
    NoBackup,
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Settings the editor passes down to the reconciler and history
#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub policy: ReconcilePolicy,
    pub layout: LayoutConfig,
    pub max_history: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            policy: ReconcilePolicy::default(),
            layout: LayoutConfig::default(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl EditorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.reconcile_policy(),
            layout: LayoutConfig::default(),
            max_history: config.max_history,
        }
    }
}

/// Read-only view handed to renderers
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaView {
    pub tables: Vec<Table>,
    pub edges: Vec<SchemaEdge>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub session_id: Option<String>,
}

/// Outcome of a mutation batch
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Explanation from the source when it gave one, otherwise the summary text
    pub message: String,
    pub summary: ChangeSummary,
    pub changed: bool,
}

#[derive(Debug)]
struct SchemaState {
    tables: Vec<Table>,
    history: HistoryManager,
    /// Bumped on every change to `tables`
    revision: u64,
    session_id: Option<String>,
}

impl SchemaState {
    fn commit(&mut self, tables: Vec<Table>) {
        self.history.record(&self.tables);
        self.tables = tables;
        self.revision += 1;
    }

    fn replace_without_history(&mut self, tables: Vec<Table>) {
        self.tables = tables;
        self.revision += 1;
    }

    fn view(&self) -> SchemaView {
        SchemaView {
            tables: self.tables.clone(),
            edges: derive_edges(&self.tables),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            session_id: self.session_id.clone(),
        }
    }

    fn find(&self, id: &str) -> Result<usize, EditorError> {
        self.tables
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| EditorError::TableNotFound(id.to_string()))
    }

    fn name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        let key = table_key(name);
        self.tables
            .iter()
            .any(|t| t.key() == key && Some(t.id.as_str()) != except_id)
    }
}

/// Clears the in-flight flag when dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, EditorError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EditorError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SchemaEditor<S> {
    state: RwLock<SchemaState>,
    source: S,
    config: EditorConfig,
    in_flight: AtomicBool,
    backup: Option<BackupWriter>,
}

impl<S: MutationSource> SchemaEditor<S> {
    pub fn new(source: S, config: EditorConfig) -> Self {
        Self {
            state: RwLock::new(SchemaState {
                tables: Vec::new(),
                history: HistoryManager::new(config.max_history),
                revision: 0,
                session_id: None,
            }),
            source,
            config,
            in_flight: AtomicBool::new(false),
            backup: None,
        }
    }

    pub fn with_backup(mut self, backup: BackupWriter) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Start from an existing table list, without a history entry
    pub fn with_tables(mut self, mut tables: Vec<Table>) -> Self {
        place_unpositioned(&mut tables, &self.config.layout);
        self.state.get_mut().tables = tables;
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> SchemaView {
        self.state.read().await.view()
    }

    pub async fn tables(&self) -> Vec<Table> {
        self.state.read().await.tables.clone()
    }

    fn schedule_backup(&self, tables: &[Table]) {
        if let Some(backup) = &self.backup {
            backup.schedule(tables.to_vec());
        }
    }

    fn commit(&self, state: &mut SchemaState, tables: Vec<Table>) {
        state.commit(tables);
        self.schedule_backup(&state.tables);
    }

    fn reconciler(&self, allow_destructive: Option<bool>) -> Reconciler {
        let mut policy = self.config.policy.clone();
        if let Some(allow) = allow_destructive {
            policy.allow_destructive = allow;
        }
        Reconciler::new(policy, self.config.layout.clone())
    }

    // ========================================================================
    // Direct user edits
    // ========================================================================

    /// Add one table. Without a position it gets its computed layout slot.
    pub async fn add_table(&self, draft: TableDraft) -> Result<Table, EditorError> {
        if draft.name.trim().is_empty() {
            return Err(EditorError::InvalidInput("Table name cannot be empty".into()));
        }

        let mut state = self.state.write().await;
        if state.name_taken(&draft.name, None) {
            return Err(EditorError::DuplicateName(draft.name));
        }
        let max = self.config.policy.max_tables;
        if state.tables.len() >= max {
            return Err(EditorError::Capacity { max });
        }

        let mut tables = state.tables.clone();
        tables.push(draft.into_table());
        place_unpositioned(&mut tables, &self.config.layout);
        let added = tables[tables.len() - 1].clone();

        tracing::info!(table = %added.name, id = %added.id, "table added");
        self.commit(&mut state, tables);
        Ok(added)
    }

    /// Merge `draft` over the table with `id`; the id never changes
    pub async fn update_table(&self, id: &str, draft: TableDraft) -> Result<Table, EditorError> {
        if draft.name.trim().is_empty() {
            return Err(EditorError::InvalidInput("Table name cannot be empty".into()));
        }

        let mut state = self.state.write().await;
        let index = state.find(id)?;
        if state.name_taken(&draft.name, Some(id)) {
            return Err(EditorError::DuplicateName(draft.name));
        }

        let mut tables = state.tables.clone();
        tables[index] = draft.merge_over(&tables[index]);
        place_unpositioned(&mut tables, &self.config.layout);
        let updated = tables[index].clone();

        tracing::debug!(table = %updated.name, id, "table updated");
        self.commit(&mut state, tables);
        Ok(updated)
    }

    pub async fn delete_table(&self, id: &str) -> Result<Table, EditorError> {
        let mut state = self.state.write().await;
        let index = state.find(id)?;

        let mut tables = state.tables.clone();
        let removed = tables.remove(index);

        tracing::info!(table = %removed.name, id, "table deleted");
        self.commit(&mut state, tables);
        Ok(removed)
    }

    /// Drag a table. Returns `false` when the move is too small to count.
    pub async fn move_table(&self, id: &str, position: Position) -> Result<bool, EditorError> {
        let mut state = self.state.write().await;
        let index = state.find(id)?;

        if let Some(current) = state.tables[index].position
            && (current.x - position.x).abs() <= MIN_MOVE_DISTANCE
            && (current.y - position.y).abs() <= MIN_MOVE_DISTANCE
        {
            return Ok(false);
        }

        let mut tables = state.tables.clone();
        tables[index].position = Some(position);
        self.commit(&mut state, tables);
        Ok(true)
    }

    /// Replace the whole table list (user action, not subject to the destructive flag)
    pub async fn set_tables(&self, mut tables: Vec<Table>) -> Result<SchemaView, EditorError> {
        let max = self.config.policy.max_tables;
        if tables.len() > max {
            return Err(EditorError::Capacity { max });
        }
        for (i, table) in tables.iter().enumerate() {
            if table.name.trim().is_empty() {
                return Err(EditorError::InvalidInput("Table name cannot be empty".into()));
            }
            if tables[..i].iter().any(|t| t.key() == table.key()) {
                return Err(EditorError::DuplicateName(table.name.clone()));
            }
        }
        place_unpositioned(&mut tables, &self.config.layout);

        let mut state = self.state.write().await;
        self.commit(&mut state, tables);
        Ok(state.view())
    }

    pub async fn clear(&self) -> SchemaView {
        let mut state = self.state.write().await;
        if !state.tables.is_empty() {
            self.commit(&mut state, Vec::new());
        }
        state.view()
    }

    /// Recompute every position, discarding manual placement
    pub async fn auto_layout(&self) -> SchemaView {
        let mut state = self.state.write().await;
        let mut tables = state.tables.clone();
        auto_layout_with_config(&mut tables, &self.config.layout);
        if tables != state.tables {
            self.commit(&mut state, tables);
        }
        state.view()
    }

    pub async fn undo(&self) -> Result<SchemaView, EditorError> {
        let mut state = self.state.write().await;
        let current = state.tables.clone();
        let previous = state.history.undo(&current).ok_or(EditorError::NothingToUndo)?;
        state.replace_without_history(previous);
        self.schedule_backup(&state.tables);
        Ok(state.view())
    }

    pub async fn redo(&self) -> Result<SchemaView, EditorError> {
        let mut state = self.state.write().await;
        let next = state.history.redo().ok_or(EditorError::NothingToRedo)?;
        state.replace_without_history(next);
        self.schedule_backup(&state.tables);
        Ok(state.view())
    }

    // ========================================================================
    // Mutation batches
    // ========================================================================

    /// Reconcile a proposal that is already at hand
    pub async fn apply_proposal(
        &self,
        proposal: &MutationProposal,
    ) -> Result<BatchReport, EditorError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let mut state = self.state.write().await;

        let outcome = self.reconciler(None).reconcile_proposal(&state.tables, proposal);
        if let Some(session_id) = &proposal.session_id {
            state.session_id = Some(session_id.clone());
        }
        if outcome.changed {
            self.commit(&mut state, outcome.tables);
        }

        Ok(report(proposal, outcome.summary, outcome.changed))
    }

    /// Ask the mutation source for a proposal and apply it.
    ///
    /// The pre-batch table list is kept aside while the call is out and only
    /// enters the history once the batch commits. A failed or dropped call
    /// therefore leaves both the schema and the history untouched.
    pub async fn generate(
        &self,
        prompt: &str,
        allow_destructive: Option<bool>,
    ) -> Result<BatchReport, EditorError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EditorError::InvalidInput("Please enter a description".into()));
        }
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let allow = allow_destructive.unwrap_or(self.config.policy.allow_destructive);

        let (request, checkpoint) = {
            let state = self.state.read().await;
            let request = ProposalRequest::new(
                prompt,
                state.tables.clone(),
                state.session_id.clone(),
                allow,
            );
            (request, state.revision)
        };

        let proposal = match self.source.propose(&request).await {
            Ok(proposal) => proposal,
            Err(e) => {
                tracing::error!(error = %e, "mutation source failed, schema left unchanged");
                return Err(e.into());
            }
        };

        let mut state = self.state.write().await;
        if state.revision != checkpoint {
            tracing::debug!("schema changed during request, applying proposal to current state");
        }
        if let Some(session_id) = &proposal.session_id {
            state.session_id = Some(session_id.clone());
        }
        let outcome = self
            .reconciler(Some(allow))
            .reconcile_proposal(&state.tables, &proposal);
        if outcome.changed {
            self.commit(&mut state, outcome.tables);
        }

        Ok(report(&proposal, outcome.summary, outcome.changed))
    }

    /// Write the pending backup now, e.g. before the process exits
    pub async fn flush_backup(&self) {
        if let Some(backup) = &self.backup {
            backup.flush().await;
        }
    }

    /// Restore the schema from the backup store
    pub async fn load_from_backup(&self) -> Result<SchemaView, EditorError> {
        let backup = self.backup.as_ref().ok_or(EditorError::NoBackup)?;
        let envelope = backup.load()?.ok_or(EditorError::NoBackup)?;
        tracing::info!(
            tables = envelope.tables.len(),
            saved_at = %envelope.saved_at,
            "restoring schema from backup"
        );

        let mut tables = envelope.tables;
        place_unpositioned(&mut tables, &self.config.layout);
        let mut state = self.state.write().await;
        state.commit(tables);
        Ok(state.view())
    }
}

fn report(proposal: &MutationProposal, summary: ChangeSummary, changed: bool) -> BatchReport {
    let message = proposal
        .explanation
        .clone()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| summary.message());
    BatchReport {
        message,
        summary,
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actions::MutationAction;
    use crate::core::backup::{BACKUP_KEY, BackupStore, MemoryBackupStore, read_backup, write_backup};
    use crate::core::schema::{Column, create_demo_schema};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Scripted mutation source
    struct StubSource {
        reply: Result<MutationProposal, u16>,
        gate: Option<Arc<Notify>>,
        requests: Mutex<Vec<ProposalRequest>>,
    }

    impl StubSource {
        fn replying(proposal: MutationProposal) -> Self {
            Self {
                reply: Ok(proposal),
                gate: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                gate: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    impl MutationSource for StubSource {
        async fn propose(&self, request: &ProposalRequest) -> Result<MutationProposal, SourceError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.reply {
                Ok(proposal) => Ok(proposal.clone()),
                Err(status) => Err(SourceError::Status {
                    status: *status,
                    message: "backend unavailable".into(),
                }),
            }
        }
    }

    fn create(names: &[&str]) -> MutationProposal {
        MutationProposal::new(&[MutationAction::Create {
            tables: names.iter().map(|n| TableDraft::new(*n)).collect(),
        }])
    }

    fn editor(source: StubSource) -> SchemaEditor<StubSource> {
        SchemaEditor::new(source, EditorConfig {
            max_history: 10,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_add_table_gets_layout_position() {
        let editor = editor(StubSource::failing(500)).with_tables(create_demo_schema());
        let draft = TableDraft::new("likes")
            .with_columns(vec![Column::new("post_id", "BIGINT").references("posts", "id")]);
        let added = editor.add_table(draft).await.unwrap();

        assert!(added.id.starts_with("table-"));
        assert_eq!(added.position.map(|p| p.y), Some(1100.0));
        let view = editor.snapshot().await;
        assert_eq!(view.tables.len(), 4);
        assert!(view.can_undo);
        assert_eq!(view.edges.len(), 4);
    }

    #[tokio::test]
    async fn test_add_table_rejects_duplicates_and_blank_names() {
        let editor = editor(StubSource::failing(500)).with_tables(create_demo_schema());

        assert!(matches!(
            editor.add_table(TableDraft::new("USERS")).await,
            Err(EditorError::DuplicateName(_))
        ));
        assert!(matches!(
            editor.add_table(TableDraft::new("  ")).await,
            Err(EditorError::InvalidInput(_))
        ));
        assert!(!editor.snapshot().await.can_undo);
    }

    #[tokio::test]
    async fn test_add_table_respects_capacity() {
        let editor = SchemaEditor::new(StubSource::failing(500), EditorConfig {
            policy: ReconcilePolicy {
                max_tables: 3,
                allow_destructive: false,
            },
            ..Default::default()
        })
        .with_tables(create_demo_schema());

        assert!(matches!(
            editor.add_table(TableDraft::new("tags")).await,
            Err(EditorError::Capacity { max: 3 })
        ));
    }

    #[tokio::test]
    async fn test_update_preserves_id_and_checks_names() {
        let editor = editor(StubSource::failing(500)).with_tables(create_demo_schema());
        let posts_id = editor.tables().await[1].id.clone();

        let updated = editor
            .update_table(&posts_id, TableDraft::new("articles"))
            .await
            .unwrap();
        assert_eq!(updated.id, posts_id);
        assert_eq!(updated.name, "articles");
        assert_eq!(updated.columns.len(), 4);

        assert!(matches!(
            editor.update_table(&posts_id, TableDraft::new("users")).await,
            Err(EditorError::DuplicateName(_))
        ));
        assert!(matches!(
            editor.update_table("nope", TableDraft::new("x")).await,
            Err(EditorError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_small_moves_are_ignored() {
        let editor = editor(StubSource::failing(500)).with_tables(create_demo_schema());
        let users = editor.tables().await[0].clone();
        let origin = users.position.unwrap();

        let moved = editor
            .move_table(&users.id, Position::new(origin.x + 0.5, origin.y - 1.0))
            .await
            .unwrap();
        assert!(!moved);
        assert!(!editor.snapshot().await.can_undo);

        let moved = editor
            .move_table(&users.id, Position::new(origin.x + 40.0, origin.y))
            .await
            .unwrap();
        assert!(moved);
        assert_eq!(
            editor.tables().await[0].position,
            Some(Position::new(origin.x + 40.0, origin.y))
        );
    }

    #[tokio::test]
    async fn test_undo_restores_previous_state() {
        let editor = editor(StubSource::failing(500)).with_tables(create_demo_schema());
        let before = editor.tables().await;
        let comments_id = before[2].id.clone();

        editor.delete_table(&comments_id).await.unwrap();
        assert_eq!(editor.tables().await.len(), 2);

        let view = editor.undo().await.unwrap();
        assert_eq!(view.tables, before);
        assert!(view.can_redo);

        let view = editor.redo().await.unwrap();
        assert_eq!(view.tables.len(), 2);
        assert!(matches!(editor.redo().await, Err(EditorError::NothingToRedo)));
    }

    #[tokio::test]
    async fn test_nothing_to_undo() {
        let editor = editor(StubSource::failing(500));
        assert!(matches!(editor.undo().await, Err(EditorError::NothingToUndo)));
    }

    #[tokio::test]
    async fn test_set_tables_clear_and_auto_layout() {
        let editor = editor(StubSource::failing(500));

        let duplicate = vec![Table::new("a"), Table::new("A")];
        assert!(matches!(
            editor.set_tables(duplicate).await,
            Err(EditorError::DuplicateName(_))
        ));

        let view = editor.set_tables(create_demo_schema()).await.unwrap();
        assert!(view.tables.iter().all(|t| t.position.is_some()));

        let users_id = view.tables[0].id.clone();
        editor
            .move_table(&users_id, Position::new(5000.0, 5000.0))
            .await
            .unwrap();
        let view = editor.auto_layout().await;
        assert_eq!(view.tables[0].position, Some(Position::new(200.0, 100.0)));

        let view = editor.clear().await;
        assert!(view.tables.is_empty());
        assert_eq!(editor.undo().await.unwrap().tables.len(), 3);
    }

    #[tokio::test]
    async fn test_generate_applies_proposal() {
        let proposal = create(&["tags"])
            .with_session("s-42")
            .with_explanation("Added a tags table");
        let editor = editor(StubSource::replying(proposal)).with_tables(create_demo_schema());
        let before = editor.tables().await;

        let report = editor.generate("add tags", None).await.unwrap();
        assert!(report.changed);
        assert_eq!(report.message, "Added a tags table");

        let view = editor.snapshot().await;
        assert_eq!(view.tables.len(), 4);
        assert_eq!(view.session_id.as_deref(), Some("s-42"));

        assert_eq!(editor.undo().await.unwrap().tables, before);
    }

    #[tokio::test]
    async fn test_generate_sends_session_and_flag() {
        let editor = editor(StubSource::replying(create(&["tags"]).with_session("s-1")));
        editor.generate("first", None).await.unwrap();
        editor.generate("second", Some(true)).await.unwrap();

        let requests = editor.source.requests.lock().unwrap();
        assert_eq!(requests[0].session_id, None);
        assert!(!requests[0].allow_destructive);
        assert_eq!(requests[1].session_id.as_deref(), Some("s-1"));
        assert!(requests[1].allow_destructive);
        assert_eq!(requests[1].current_tables.len(), 1);
    }

    #[tokio::test]
    async fn test_generate_without_changes_leaves_no_history() {
        let editor = editor(StubSource::replying(MutationProposal::default()));
        let report = editor.generate("do nothing", None).await.unwrap();

        assert!(!report.changed);
        assert_eq!(report.message, "No changes made");
        assert!(!editor.snapshot().await.can_undo);
    }

    #[tokio::test]
    async fn test_failed_generate_reverts() {
        let editor = editor(StubSource::failing(503)).with_tables(create_demo_schema());
        let before = editor.tables().await;

        let result = editor.generate("add tags", None).await;
        match result {
            Err(EditorError::Source(SourceError::Status { status, .. })) => assert_eq!(status, 503),
            other => panic!("unexpected result {other:?}"),
        }

        let view = editor.snapshot().await;
        assert_eq!(view.tables, before);
        assert!(!view.can_undo);
        assert!(!editor.is_busy());
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let editor = editor(StubSource::replying(create(&["x"])));
        assert!(matches!(
            editor.generate("   ", None).await,
            Err(EditorError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_batches_are_rejected() {
        let gate = Arc::new(Notify::new());
        let editor = Arc::new(editor(
            StubSource::replying(create(&["tags"])).gated(gate.clone()),
        ));

        let task = tokio::spawn({
            let editor = editor.clone();
            async move { editor.generate("add tags", None).await }
        });
        while !editor.is_busy() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            editor.apply_proposal(&create(&["other"])).await,
            Err(EditorError::Busy)
        ));

        gate.notify_one();
        let report = task.await.unwrap().unwrap();
        assert!(report.changed);
        assert!(!editor.is_busy());
        assert_eq!(editor.tables().await.len(), 1);
    }

    #[tokio::test]
    async fn test_user_edit_during_generate_is_kept() {
        let gate = Arc::new(Notify::new());
        let editor = Arc::new(editor(
            StubSource::replying(create(&["tags"])).gated(gate.clone()),
        ));

        let task = tokio::spawn({
            let editor = editor.clone();
            async move { editor.generate("add tags", None).await }
        });
        while !editor.is_busy() {
            tokio::task::yield_now().await;
        }
        editor.add_table(TableDraft::new("manual")).await.unwrap();
        gate.notify_one();
        task.await.unwrap().unwrap();

        let names: Vec<String> = editor.tables().await.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["manual", "tags"]);

        let view = editor.undo().await.unwrap();
        assert_eq!(view.tables.len(), 1);
        assert_eq!(view.tables[0].name, "manual");
    }

    #[tokio::test]
    async fn test_user_edit_during_generate_leaves_one_entry_per_change() {
        let gate = Arc::new(Notify::new());
        let editor = Arc::new(editor(
            StubSource::replying(create(&["tags"])).gated(gate.clone()),
        ));

        let task = tokio::spawn({
            let editor = editor.clone();
            async move { editor.generate("add tags", None).await }
        });
        while !editor.is_busy() {
            tokio::task::yield_now().await;
        }
        editor.add_table(TableDraft::new("manual")).await.unwrap();
        gate.notify_one();
        task.await.unwrap().unwrap();

        let mut steps = Vec::new();
        while let Ok(view) = editor.undo().await {
            steps.push(view.tables.into_iter().map(|t| t.name).collect::<Vec<_>>());
        }
        assert_eq!(steps, vec![vec!["manual".to_string()], vec![]]);
    }

    #[tokio::test]
    async fn test_aborted_generate_leaves_no_history() {
        let gate = Arc::new(Notify::new());
        let editor = Arc::new(editor(
            StubSource::replying(create(&["tags"])).gated(gate.clone()),
        ));

        let task = tokio::spawn({
            let editor = editor.clone();
            async move { editor.generate("add tags", None).await }
        });
        while editor.source.requests.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let view = editor.snapshot().await;
        assert!(view.tables.is_empty());
        assert!(!view.can_undo);
        assert!(!editor.is_busy());
    }

    #[tokio::test]
    async fn test_failed_generate_after_user_edit_keeps_edit() {
        let gate = Arc::new(Notify::new());
        let editor = Arc::new(editor(StubSource::failing(500).gated(gate.clone())));

        let task = tokio::spawn({
            let editor = editor.clone();
            async move { editor.generate("add tags", None).await }
        });
        while !editor.is_busy() {
            tokio::task::yield_now().await;
        }
        editor.add_table(TableDraft::new("manual")).await.unwrap();
        gate.notify_one();
        assert!(task.await.unwrap().is_err());

        assert_eq!(editor.tables().await[0].name, "manual");
        assert!(editor.undo().await.unwrap().tables.is_empty());
        assert!(matches!(editor.undo().await, Err(EditorError::NothingToUndo)));
    }

    #[tokio::test]
    async fn test_apply_proposal_respects_destructive_flag() {
        let editor = editor(StubSource::failing(500)).with_tables(create_demo_schema());
        let proposal = MutationProposal::new(&[MutationAction::Delete {
            table_names: vec!["comments".into()],
        }]);

        let report = editor.apply_proposal(&proposal).await.unwrap();
        assert!(!report.changed);
        assert_eq!(report.summary.skipped.len(), 1);
        assert_eq!(editor.tables().await.len(), 3);
    }

    #[tokio::test]
    async fn test_backup_restore() {
        let store: Arc<dyn BackupStore> = Arc::new(MemoryBackupStore::new());
        write_backup(store.as_ref(), create_demo_schema()).unwrap();

        let editor = editor(StubSource::failing(500))
            .with_backup(BackupWriter::spawn(store.clone(), Duration::from_secs(60)));
        let view = editor.load_from_backup().await.unwrap();

        assert_eq!(view.tables.len(), 3);
        assert!(view.tables.iter().all(|t| t.position.is_some()));
        assert!(view.can_undo);
    }

    #[tokio::test]
    async fn test_restore_without_backup() {
        let editor = editor(StubSource::failing(500));
        assert!(matches!(
            editor.load_from_backup().await,
            Err(EditorError::NoBackup)
        ));

        let store: Arc<dyn BackupStore> = Arc::new(MemoryBackupStore::new());
        let editor = editor_with_store(store);
        assert!(matches!(
            editor.load_from_backup().await,
            Err(EditorError::NoBackup)
        ));
    }

    fn editor_with_store(store: Arc<dyn BackupStore>) -> SchemaEditor<StubSource> {
        editor(StubSource::failing(500)).with_backup(BackupWriter::spawn(store, Duration::from_millis(5)))
    }

    #[tokio::test]
    async fn test_edits_schedule_backup() {
        let store: Arc<dyn BackupStore> = Arc::new(MemoryBackupStore::new());
        let editor = editor_with_store(store.clone());
        editor.add_table(TableDraft::new("users")).await.unwrap();

        for _ in 0..100 {
            if store.load(BACKUP_KEY).unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let envelope = read_backup(store.as_ref()).unwrap().unwrap();
        assert_eq!(envelope.tables[0].name, "users");
    }

    #[tokio::test]
    async fn test_flush_backup_writes_latest_edit() {
        let store: Arc<dyn BackupStore> = Arc::new(MemoryBackupStore::new());
        let editor = editor(StubSource::failing(500))
            .with_backup(BackupWriter::spawn(store.clone(), Duration::from_secs(60)));

        editor.add_table(TableDraft::new("users")).await.unwrap();
        editor.add_table(TableDraft::new("posts")).await.unwrap();
        editor.flush_backup().await;

        let envelope = read_backup(store.as_ref()).unwrap().unwrap();
        assert_eq!(envelope.tables.len(), 2);
    }
}
