//! In-memory model of the live database schema.
//!
//! A [`TableSnapshot`] is loaded once per run by the driver's introspection,
//! then mutated in lockstep with every DDL call the builder issues, so each
//! reconciliation phase sees the effects of the phases before it.

use serde::{Deserialize, Serialize};

use crate::diff::Named;
use crate::schema::ForeignKeyAction;

/// A column as it exists (or will exist) in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Column name.
    pub name: String,
    /// Normalized SQL type, as the driver spells it.
    pub sql_type: String,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value as a raw SQL expression.
    pub default: Option<String>,
    /// Whether the database generates the value (auto-increment).
    pub generated: bool,
    /// Whether the column carries a UNIQUE constraint.
    pub unique: bool,
}

impl ColumnSnapshot {
    /// Creates a nullable, non-unique column with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
            generated: false,
            unique: false,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default expression.
    #[must_use]
    pub fn default(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    /// Marks the column as generated.
    #[must_use]
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Marks the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A foreign key constraint owned by a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeySnapshot {
    /// Constraint name.
    pub name: String,
    /// Column(s) in the owning table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub referenced_table: String,
    /// Referenced column(s).
    pub referenced_columns: Vec<String>,
    /// Action on delete.
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    pub on_update: ForeignKeyAction,
}

/// An index on a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index name.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
}

/// One column of a table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKeySnapshot {
    /// Constraint name. Empty where the database does not name keys.
    pub name: String,
    /// Column that is part of the key.
    pub column_name: String,
}

impl PrimaryKeySnapshot {
    /// Creates a primary key entry.
    #[must_use]
    pub fn new(name: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_name: column_name.into(),
        }
    }
}

/// A column whose definition is being replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChange {
    /// Definition currently in the database.
    pub old: ColumnSnapshot,
    /// Definition to converge to.
    pub new: ColumnSnapshot,
}

/// One physical table as currently observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Table name.
    pub name: String,
    /// Columns, in table order.
    pub columns: Vec<ColumnSnapshot>,
    /// Foreign keys owned by this table.
    pub foreign_keys: Vec<ForeignKeySnapshot>,
    /// Indices on this table.
    pub indices: Vec<IndexSnapshot>,
    /// Primary key entries, one per key column.
    pub primary_keys: Vec<PrimaryKeySnapshot>,
    /// Set when the table was created during the current run.
    #[serde(skip)]
    pub just_created: bool,
}

impl TableSnapshot {
    /// Creates an empty table snapshot.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indices: Vec::new(),
            primary_keys: Vec::new(),
            just_created: false,
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSnapshot) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, foreign_key: ForeignKeySnapshot) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexSnapshot) -> Self {
        self.indices.push(index);
        self
    }

    /// Adds a primary key entry.
    #[must_use]
    pub fn primary_key(mut self, key: PrimaryKeySnapshot) -> Self {
        self.primary_keys.push(key);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns whether `column` is part of the primary key.
    #[must_use]
    pub fn is_primary(&self, column: &str) -> bool {
        self.primary_keys.iter().any(|pk| pk.column_name == column)
    }

    /// Removes the named columns, and any primary key entries on them.
    pub fn remove_columns(&mut self, names: &[&str]) {
        self.columns.retain(|c| !names.contains(&c.name.as_str()));
        self.primary_keys
            .retain(|pk| !names.contains(&pk.column_name.as_str()));
    }

    /// Replaces the definition of a same-named column in place.
    pub fn replace_column(&mut self, column: ColumnSnapshot) {
        if let Some(slot) = self.columns.iter_mut().find(|c| c.name == column.name) {
            *slot = column;
        }
    }

    /// Removes foreign keys by name.
    pub fn remove_foreign_keys(&mut self, keys: &[ForeignKeySnapshot]) {
        self.foreign_keys
            .retain(|fk| !keys.iter().any(|k| k.name == fk.name));
    }

    /// Removes indices by name.
    pub fn remove_indices(&mut self, indices: &[IndexSnapshot]) {
        self.indices
            .retain(|idx| !indices.iter().any(|i| i.name == idx.name));
    }

    /// Removes primary key entries by column name.
    pub fn remove_primary_keys(&mut self, keys: &[PrimaryKeySnapshot]) {
        self.primary_keys
            .retain(|pk| !keys.iter().any(|k| k.column_name == pk.column_name));
    }
}

impl Named for ColumnSnapshot {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ForeignKeySnapshot {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for IndexSnapshot {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Primary key entries are keyed by column, since one constraint name spans
/// every column of a composite key.
impl Named for PrimaryKeySnapshot {
    fn name(&self) -> &str {
        &self.column_name
    }
}
