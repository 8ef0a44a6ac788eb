#![allow(dead_code)]

use std::io;
use std::sync::Mutex;

use oxide_sync::prelude::*;

/// A DDL call as seen by the driver: operation, table, and the names of the
/// affected entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlCall {
    CreateTable(String),
    AddColumns(String, Vec<String>),
    DropColumns(String, Vec<String>),
    ChangeColumns(String, Vec<String>),
    UpdatePrimaryKeys(String, Vec<String>),
    CreateForeignKeys(String, Vec<String>),
    DropForeignKeys(String, Vec<String>),
    CreateIndex(String, String),
    DropIndex(String, String),
}

/// Session-level events, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Load(Vec<String>),
    Begin,
    Commit,
    Rollback,
    Release,
}

#[derive(Default)]
struct State {
    live: Vec<TableSnapshot>,
    working: Option<Vec<TableSnapshot>>,
    calls: Vec<DdlCall>,
    created: Vec<TableSnapshot>,
    events: Vec<Event>,
    fail_on: Option<usize>,
    fail_commit: bool,
    fail_release: bool,
}

/// An in-memory database that records every driver call.
///
/// DDL is applied to a working copy of the tables that becomes the live
/// schema on commit and is discarded on rollback.
#[derive(Default)]
pub struct RecordingDriver {
    state: Mutex<State>,
}

fn injected(what: &str) -> SyncError {
    SyncError::driver(io::Error::other(format!("injected {what} failure")))
}

fn names<T: Named>(items: &[T]) -> Vec<String> {
    items.iter().map(|i| i.name().to_string()).collect()
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `tables` already in the database.
    pub fn with_tables(tables: Vec<TableSnapshot>) -> Self {
        let driver = Self::new();
        driver.state.lock().unwrap().live = tables;
        driver
    }

    /// Fails the `n`th DDL call (1-based) of the next runs.
    pub fn fail_on_call(&self, n: usize) {
        self.state.lock().unwrap().fail_on = Some(n);
    }

    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn fail_release(&self) {
        self.state.lock().unwrap().fail_release = true;
    }

    pub fn calls(&self) -> Vec<DdlCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Snapshots passed to `create_table`, in call order.
    pub fn created_tables(&self) -> Vec<TableSnapshot> {
        self.state.lock().unwrap().created.clone()
    }

    /// The committed tables.
    pub fn live(&self) -> Vec<TableSnapshot> {
        self.state.lock().unwrap().live.clone()
    }

    /// A committed table by name.
    pub fn table(&self, name: &str) -> Option<TableSnapshot> {
        self.live().into_iter().find(|t| t.name == name)
    }

    /// Forgets recorded calls and events.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.clear();
        state.created.clear();
        state.events.clear();
    }

    fn apply(&self, call: DdlCall, table: &TableSnapshot) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.fail_on == Some(state.calls.len()) {
            return Err(injected("DDL"));
        }

        let working = state
            .working
            .as_mut()
            .ok_or_else(|| SyncError::driver(io::Error::other("DDL outside a transaction")))?;
        let mut table = table.clone();
        table.just_created = false;
        match working.iter_mut().find(|t| t.name == table.name) {
            Some(slot) => *slot = table,
            None => working.push(table),
        }
        Ok(())
    }
}

impl SchemaDriver for RecordingDriver {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn load_table_snapshots(&self, table_names: &[String]) -> Result<Vec<TableSnapshot>> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Load(table_names.to_vec()));
        Ok(state
            .live
            .iter()
            .filter(|t| table_names.contains(&t.name))
            .cloned()
            .collect())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Begin);
        state.working = Some(state.live.clone());
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Commit);
        if state.fail_commit {
            return Err(injected("commit"));
        }
        if let Some(working) = state.working.take() {
            state.live = working;
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Rollback);
        state.working = None;
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Release);
        if state.fail_release {
            return Err(injected("release"));
        }
        Ok(())
    }

    async fn create_table(&self, table: &TableSnapshot) -> Result<()> {
        self.state.lock().unwrap().created.push(table.clone());
        self.apply(DdlCall::CreateTable(table.name.clone()), table)
    }

    async fn add_columns(&self, table: &TableSnapshot, columns: &[ColumnSnapshot]) -> Result<()> {
        self.apply(DdlCall::AddColumns(table.name.clone(), names(columns)), table)
    }

    async fn drop_columns(&self, table: &TableSnapshot, columns: &[ColumnSnapshot]) -> Result<()> {
        self.apply(DdlCall::DropColumns(table.name.clone(), names(columns)), table)
    }

    async fn change_columns(&self, table: &TableSnapshot, changes: &[ColumnChange]) -> Result<()> {
        let changed = changes.iter().map(|c| c.new.name.clone()).collect();
        self.apply(DdlCall::ChangeColumns(table.name.clone(), changed), table)
    }

    async fn update_primary_keys(&self, table: &TableSnapshot) -> Result<()> {
        self.apply(
            DdlCall::UpdatePrimaryKeys(table.name.clone(), names(&table.primary_keys)),
            table,
        )
    }

    async fn create_foreign_keys(
        &self,
        table: &TableSnapshot,
        foreign_keys: &[ForeignKeySnapshot],
    ) -> Result<()> {
        self.apply(
            DdlCall::CreateForeignKeys(table.name.clone(), names(foreign_keys)),
            table,
        )
    }

    async fn drop_foreign_keys(
        &self,
        table: &TableSnapshot,
        foreign_keys: &[ForeignKeySnapshot],
    ) -> Result<()> {
        self.apply(
            DdlCall::DropForeignKeys(table.name.clone(), names(foreign_keys)),
            table,
        )
    }

    async fn create_index(&self, table: &TableSnapshot, index: &IndexSnapshot) -> Result<()> {
        self.apply(
            DdlCall::CreateIndex(table.name.clone(), index.name.clone()),
            table,
        )
    }

    async fn drop_index(&self, table: &TableSnapshot, index: &IndexSnapshot) -> Result<()> {
        self.apply(DdlCall::DropIndex(table.name.clone(), index.name.clone()), table)
    }

    fn normalize_type(&self, column: &ColumnMetadata) -> String {
        column.sql_type.to_string()
    }
}

/// Collects narration lines.
#[derive(Default)]
pub struct CollectingLogger {
    messages: Mutex<Vec<String>>,
}

impl CollectingLogger {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl SchemaLogger for CollectingLogger {
    fn log_schema_build(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub fn id_column() -> ColumnMetadata {
    ColumnMetadata::new("id", SqlType::Integer).primary().generated()
}

/// `post(id primary generated, title)`.
pub fn post() -> EntityMetadata {
    EntityMetadata::new("post")
        .column(id_column())
        .column(ColumnMetadata::new("title", SqlType::Text))
}

/// `user(id primary generated, name)`.
pub fn user() -> EntityMetadata {
    EntityMetadata::new("user")
        .column(id_column())
        .column(ColumnMetadata::new("name", SqlType::Varchar(100)).not_null())
}

/// Runs a synchronization and forgets what it recorded.
pub async fn seed(driver: &RecordingDriver, entities: &[EntityMetadata]) {
    SchemaBuilder::new(driver, entities)
        .with_logger(&NoopLogger)
        .build()
        .await
        .unwrap_or_else(|e| panic!("Failed to seed schema: {e}"));
    driver.clear();
}
