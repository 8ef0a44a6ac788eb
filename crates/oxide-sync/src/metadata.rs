//! Declarative entity metadata.
//!
//! This is the desired shape of each table, already resolved from whatever
//! declaration mechanism the application uses. The synchronization engine
//! only reads it.
//!
//! Metadata can be built in code:
//!
//! ```rust
//! use oxide_sync::metadata::{ColumnMetadata, EntityMetadata};
//! use oxide_sync::schema::SqlType;
//!
//! let post = EntityMetadata::new("post")
//!     .column(ColumnMetadata::new("id", SqlType::Integer).primary().generated())
//!     .column(ColumnMetadata::new("title", SqlType::Varchar(255)).not_null())
//!     .index_on(&["title"], false);
//!
//! assert_eq!(post.indices[0].name, "idx_post_title");
//! ```
//!
//! or read from JSON with [`from_json`] / [`load_from_file`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::schema::{ForeignKeyAction, SqlType};

const fn default_true() -> bool {
    true
}

/// Name given to a foreign key that was not named explicitly.
#[must_use]
pub fn foreign_key_name(table: &str, columns: &[String]) -> String {
    format!("fk_{}_{}", table, columns.join("_"))
}

/// Name given to an index that was not named explicitly.
#[must_use]
pub fn index_name(table: &str, columns: &[String]) -> String {
    format!("idx_{}_{}", table, columns.join("_"))
}

/// Desired definition of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,
    /// Declared SQL type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL values.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default value as a raw SQL expression.
    #[serde(default)]
    pub default: Option<String>,
    /// Whether this column is part of the primary key.
    #[serde(default)]
    pub primary: bool,
    /// Whether the database generates the value (auto-increment).
    #[serde(default)]
    pub generated: bool,
    /// Whether this column has a UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
}

impl ColumnMetadata {
    /// Creates a nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            primary: false,
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

    /// Sets the column as part of the primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Marks the column as database-generated.
    #[must_use]
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A value object stored inline in its owner's table.
///
/// Its columns are flattened into the owning table with `prefix` prepended
/// to each column name. Nested embeddeds accumulate prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedMetadata {
    /// Prefix prepended verbatim to every column name.
    pub prefix: String,
    /// Columns of the embedded object.
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    /// Embedded objects nested inside this one.
    #[serde(default)]
    pub embeddeds: Vec<EmbeddedMetadata>,
}

impl EmbeddedMetadata {
    /// Creates an empty embedded with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            columns: Vec::new(),
            embeddeds: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// Nests another embedded.
    #[must_use]
    pub fn embedded(mut self, embedded: EmbeddedMetadata) -> Self {
        self.embeddeds.push(embedded);
        self
    }

    fn flatten_into(&self, outer_prefix: &str, out: &mut Vec<ColumnMetadata>) {
        let prefix = format!("{}{}", outer_prefix, self.prefix);
        for column in &self.columns {
            let mut column = column.clone();
            column.name = format!("{}{}", prefix, column.name);
            out.push(column);
        }
        for nested in &self.embeddeds {
            nested.flatten_into(&prefix, out);
        }
    }
}

/// A join column of a relation: local column and the column it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumn {
    /// Column in the owning table.
    pub name: String,
    /// Column in the target table.
    pub referenced_column: String,
}

/// A relation to another entity.
///
/// A relation owning join columns contributes a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMetadata {
    /// Property holding the related entity.
    pub property_name: String,
    /// Table of the related entity.
    pub target_table: String,
    /// Join columns. Empty on the inverse side of a relation.
    #[serde(default)]
    pub join_columns: Vec<JoinColumn>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl RelationMetadata {
    /// Creates a many-to-one relation through `join_column`.
    #[must_use]
    pub fn many_to_one(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        join_column: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            target_table: target_table.into(),
            join_columns: vec![JoinColumn {
                name: join_column.into(),
                referenced_column: referenced_column.into(),
            }],
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Sets the action on delete.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// Desired index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Index name.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
}

/// Desired foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyMetadata {
    /// Constraint name.
    pub name: String,
    /// Column(s) in the owning table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub referenced_table: String,
    /// Referenced column(s).
    pub referenced_columns: Vec<String>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

/// Desired shape of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Table name.
    pub table_name: String,
    /// Own columns, in order.
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    /// Embedded objects, flattened after the own columns.
    #[serde(default)]
    pub embeddeds: Vec<EmbeddedMetadata>,
    /// Relations to other entities.
    #[serde(default)]
    pub relations: Vec<RelationMetadata>,
    /// Indices.
    #[serde(default)]
    pub indices: Vec<IndexMetadata>,
    /// Explicitly declared foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyMetadata>,
    /// Excludes the table from synchronization entirely.
    #[serde(default)]
    pub skip_sync: bool,
}

impl EntityMetadata {
    /// Creates metadata for a table with no columns.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            embeddeds: Vec::new(),
            relations: Vec::new(),
            indices: Vec::new(),
            foreign_keys: Vec::new(),
            skip_sync: false,
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an embedded object.
    #[must_use]
    pub fn embedded(mut self, embedded: EmbeddedMetadata) -> Self {
        self.embeddeds.push(embedded);
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationMetadata) -> Self {
        self.relations.push(relation);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexMetadata) -> Self {
        self.indices.push(index);
        self
    }

    /// Adds an index on `columns`, named after the table and columns.
    #[must_use]
    pub fn index_on(self, columns: &[&str], unique: bool) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        let name = index_name(&self.table_name, &columns);
        self.index(IndexMetadata {
            name,
            columns,
            unique,
        })
    }

    /// Adds an explicit foreign key.
    #[must_use]
    pub fn foreign_key(mut self, foreign_key: ForeignKeyMetadata) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Excludes the table from synchronization.
    #[must_use]
    pub fn skip_sync(mut self) -> Self {
        self.skip_sync = true;
        self
    }

    /// All columns of the table: own columns, then embedded columns.
    #[must_use]
    pub fn all_columns(&self) -> Vec<ColumnMetadata> {
        let mut columns = self.columns.clone();
        for embedded in &self.embeddeds {
            embedded.flatten_into("", &mut columns);
        }
        columns
    }

    /// All foreign keys: explicit ones, then those contributed by relations.
    #[must_use]
    pub fn all_foreign_keys(&self) -> Vec<ForeignKeyMetadata> {
        let mut keys = self.foreign_keys.clone();
        for relation in self.relations.iter().filter(|r| !r.join_columns.is_empty()) {
            let columns: Vec<String> = relation
                .join_columns
                .iter()
                .map(|jc| jc.name.clone())
                .collect();
            keys.push(ForeignKeyMetadata {
                name: foreign_key_name(&self.table_name, &columns),
                referenced_columns: relation
                    .join_columns
                    .iter()
                    .map(|jc| jc.referenced_column.clone())
                    .collect(),
                columns,
                referenced_table: relation.target_table.clone(),
                on_delete: relation.on_delete,
                on_update: relation.on_update,
            });
        }
        keys
    }

    /// Checks the table's metadata for internal consistency.
    pub fn validate(&self) -> Result<()> {
        let columns = self.all_columns();
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SyncError::InvalidMetadata(format!(
                    "Column '{}' is declared more than once in table '{}'",
                    column.name, self.table_name
                )));
            }
        }

        for index in &self.indices {
            self.check_columns_exist(&seen, "Index", &index.name, &index.columns)?;
        }
        for fk in self.all_foreign_keys() {
            self.check_columns_exist(&seen, "Foreign key", &fk.name, &fk.columns)?;
            if fk.columns.len() != fk.referenced_columns.len() {
                return Err(SyncError::InvalidMetadata(format!(
                    "Foreign key '{}' on table '{}' has {} column(s) but references {}",
                    fk.name,
                    self.table_name,
                    fk.columns.len(),
                    fk.referenced_columns.len()
                )));
            }
        }
        Ok(())
    }

    fn check_columns_exist(
        &self,
        known: &HashSet<&str>,
        kind: &str,
        name: &str,
        columns: &[String],
    ) -> Result<()> {
        match columns.iter().find(|c| !known.contains(c.as_str())) {
            Some(missing) => Err(SyncError::InvalidMetadata(format!(
                "{} '{}' on table '{}' references unknown column '{}'",
                kind, name, self.table_name, missing
            ))),
            None => Ok(()),
        }
    }
}

/// Validates a set of entities: each entity, unique table names, and
/// foreign keys targeting a table of the set.
///
/// A foreign key may reference a table outside the set. Its columns are
/// then not checked.
pub fn validate_all<'a>(entities: impl IntoIterator<Item = &'a EntityMetadata>) -> Result<()> {
    let entities: Vec<&EntityMetadata> = entities.into_iter().collect();
    let mut seen = HashSet::new();
    for entity in &entities {
        if !seen.insert(entity.table_name.as_str()) {
            return Err(SyncError::InvalidMetadata(format!(
                "Table '{}' is declared more than once",
                entity.table_name
            )));
        }
        entity.validate()?;
    }

    for entity in &entities {
        for fk in entity.all_foreign_keys() {
            let Some(target) = entities.iter().find(|e| e.table_name == fk.referenced_table) else {
                continue;
            };
            let columns = target.all_columns();
            if let Some(missing) = fk
                .referenced_columns
                .iter()
                .find(|r| !columns.iter().any(|c| &c.name == *r))
            {
                return Err(SyncError::InvalidMetadata(format!(
                    "Foreign key '{}' on table '{}' references unknown column '{}.{}'",
                    fk.name, entity.table_name, fk.referenced_table, missing
                )));
            }
        }
    }
    Ok(())
}

/// Parses a JSON array of entity metadata.
pub fn from_json(json: &str) -> Result<Vec<EntityMetadata>> {
    Ok(serde_json::from_str(json)?)
}

/// Reads a JSON array of entity metadata from a file.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<EntityMetadata>> {
    let contents = std::fs::read_to_string(path)?;
    from_json(&contents)
}
