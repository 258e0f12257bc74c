//! Table catalogue: the tables known to a session, which stage produced which table and the
//! table the user looked at last.
//!
//! Every mutation goes through a method of [`Catalogue`] and bumps its version, so readers can
//! cheaply tell whether anything changed since they last looked.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use miette::Diagnostic;
use serde::Serialize;
use sluice_schemas::{Column, Row};
use tracing::debug;

/// Process local identity of a table, independent of its SQL name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TableId(u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A table known to the session with a bounded preview of its rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub id: TableId,

    /// Name of the table inside the analytical engine
    pub name: String,

    pub columns: Vec<Column>,

    /// Preview only, the engine holds the full data
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
pub enum CatalogueError {
    #[error("Unknown table {0}")]
    #[diagnostic(code(sluice::catalogue::unknown_table))]
    UnknownTable(TableId),
}

/// Outcome of recording the result of a stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageCommit {
    pub table: Table,

    /// The stage already had a table that was updated in place
    pub mapping_updated: bool,
}

#[derive(Debug, Default)]
pub struct Catalogue {
    tables: IndexMap<TableId, Table>,
    stage_tables: HashMap<String, TableId>,
    active: Option<TableId>,
    next_id: u64,
    version: u64,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremented on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Table> {
        self.tables.values().find(|table| table.name == name)
    }

    /// Tables in order of creation
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn first(&self) -> Option<&Table> {
        self.tables.values().next()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn active(&self) -> Option<&Table> {
        self.active.and_then(|id| self.tables.get(&id))
    }

    pub fn table_id_for_stage(&self, stage_id: &str) -> Option<TableId> {
        self.stage_tables.get(stage_id).copied()
    }

    pub fn table_for_stage(&self, stage_id: &str) -> Option<&Table> {
        self.table_id_for_stage(stage_id)
            .and_then(|id| self.tables.get(&id))
    }

    pub fn set_active(&mut self, id: TableId) -> Result<(), CatalogueError> {
        if !self.tables.contains_key(&id) {
            return Err(CatalogueError::UnknownTable(id));
        }

        self.active = Some(id);
        self.bump();

        Ok(())
    }

    /// Insert a raw table, a table already registered under `name` is replaced in place
    pub fn import(&mut self, name: &str, columns: Vec<Column>, rows: Vec<Row>) -> TableId {
        let id = match self.by_name(name) {
            Some(existing) => existing.id,
            None => self.mint(),
        };

        self.tables.insert(
            id,
            Table {
                id,
                name: name.to_string(),
                columns,
                rows,
            },
        );
        self.bump();

        debug!("Imported table '{name}' as {id}");
        id
    }

    /// Record the table produced by `stage_id`
    ///
    /// A stage that already owns a table keeps its table id; name, columns and rows are
    /// replaced. Any other table registered under `name` is dropped, since the engine now
    /// holds the new result under that name.
    pub fn commit_stage(
        &mut self,
        stage_id: &str,
        name: String,
        columns: Vec<Column>,
        rows: Vec<Row>,
    ) -> StageCommit {
        let existing = self
            .table_id_for_stage(stage_id)
            .filter(|id| self.tables.contains_key(id));

        let (id, mapping_updated) = match existing {
            Some(id) => (id, true),
            None => (self.mint(), false),
        };

        self.drop_shadowed(&name, id);

        let table = Table {
            id,
            name,
            columns,
            rows,
        };
        self.tables.insert(id, table.clone());
        self.stage_tables.insert(stage_id.to_string(), id);
        self.bump();

        StageCommit {
            table,
            mapping_updated,
        }
    }

    /// Map a stage onto an existing table without touching the table itself
    pub fn map_stage(&mut self, stage_id: &str, id: TableId) -> Result<bool, CatalogueError> {
        if !self.tables.contains_key(&id) {
            return Err(CatalogueError::UnknownTable(id));
        }

        let previous = self.stage_tables.insert(stage_id.to_string(), id);
        self.bump();

        Ok(previous.is_some())
    }

    /// Forget which table `stage_id` produced; the table itself stays available
    pub fn unmap_stage(&mut self, stage_id: &str) -> Option<TableId> {
        let removed = self.stage_tables.remove(stage_id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    // names are unique: older entries of `name` and their stage mappings go
    fn drop_shadowed(&mut self, name: &str, keep: TableId) {
        let shadowed = self
            .tables
            .values()
            .filter(|table| table.id != keep && table.name == name)
            .map(|table| table.id)
            .collect::<Vec<_>>();
        if shadowed.is_empty() {
            return;
        }

        debug!("Table '{name}' replaces {shadowed:?}");
        self.tables.retain(|id, _| !shadowed.contains(id));
        self.stage_tables.retain(|_, id| !shadowed.contains(id));
        if self.active.is_some_and(|id| shadowed.contains(&id)) {
            self.active = Some(keep);
        }
    }

    fn mint(&mut self) -> TableId {
        self.next_id += 1;
        TableId(self.next_id)
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}
