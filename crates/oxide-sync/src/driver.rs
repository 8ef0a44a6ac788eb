//! The database driver seam.
//!
//! The engine decides *what* changes; a [`SchemaDriver`] knows *how* to read
//! the live schema and how to express each change as DDL for its database.
//! Driver crates (oxide-sync-sqlite, etc.) implement this trait so the
//! engine stays database-agnostic.
//!
//! Every DDL method receives the owning table's snapshot *after* the change
//! has been applied in memory, together with the delta. Drivers that can
//! alter in place use the delta; drivers that must rebuild the table use the
//! full snapshot.

use std::future::Future;

use crate::error::Result;
use crate::metadata::ColumnMetadata;
use crate::snapshot::{
    ColumnChange, ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, TableSnapshot,
};

/// A database session capable of introspection, DDL and transactions.
///
/// Methods take `&self` so that independent operations (the index changes of
/// one table) can be in flight at the same time; implementations serialize
/// access to their connection internally.
pub trait SchemaDriver: Send + Sync {
    /// Returns the driver name.
    fn name(&self) -> &'static str;

    /// Loads snapshots of the named tables. Tables that do not exist are
    /// absent from the result.
    fn load_table_snapshots(
        &self,
        table_names: &[String],
    ) -> impl Future<Output = Result<Vec<TableSnapshot>>> + Send;

    /// Opens the transaction that the whole run executes in.
    fn begin_transaction(&self) -> impl Future<Output = Result<()>> + Send;

    /// Commits the open transaction.
    fn commit_transaction(&self) -> impl Future<Output = Result<()>> + Send;

    /// Rolls back the open transaction.
    fn rollback_transaction(&self) -> impl Future<Output = Result<()>> + Send;

    /// Releases the underlying session.
    fn release(&self) -> impl Future<Output = Result<()>> + Send;

    /// Creates `table` with its columns. Foreign keys are never part of the
    /// snapshot at this point; primary keys only for generated columns.
    fn create_table(&self, table: &TableSnapshot) -> impl Future<Output = Result<()>> + Send;

    /// Adds `columns` to `table`.
    fn add_columns(
        &self,
        table: &TableSnapshot,
        columns: &[ColumnSnapshot],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Drops `columns` from `table`.
    fn drop_columns(
        &self,
        table: &TableSnapshot,
        columns: &[ColumnSnapshot],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Alters column definitions of `table`, as one atomic operation.
    fn change_columns(
        &self,
        table: &TableSnapshot,
        changes: &[ColumnChange],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replaces the primary key of `table` with `table.primary_keys`.
    fn update_primary_keys(&self, table: &TableSnapshot) -> impl Future<Output = Result<()>> + Send;

    /// Creates foreign keys on `table`.
    fn create_foreign_keys(
        &self,
        table: &TableSnapshot,
        foreign_keys: &[ForeignKeySnapshot],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Drops foreign keys from `table`.
    fn drop_foreign_keys(
        &self,
        table: &TableSnapshot,
        foreign_keys: &[ForeignKeySnapshot],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Creates an index on `table`.
    fn create_index(
        &self,
        table: &TableSnapshot,
        index: &IndexSnapshot,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Drops an index from `table`.
    fn drop_index(
        &self,
        table: &TableSnapshot,
        index: &IndexSnapshot,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Spells the declared type of `column` the way this database reports
    /// it, so that equivalent declarations compare equal.
    fn normalize_type(&self, column: &ColumnMetadata) -> String;

    /// Returns true if the live column already matches the desired one.
    fn columns_equal(&self, live: &ColumnSnapshot, desired: &ColumnSnapshot) -> bool {
        live.sql_type == desired.sql_type
            && live.nullable == desired.nullable
            && live.default == desired.default
            && live.generated == desired.generated
            && live.unique == desired.unique
    }

    /// Converts a metadata column into the snapshot the database would hold.
    fn column_snapshot(&self, column: &ColumnMetadata) -> ColumnSnapshot {
        ColumnSnapshot {
            name: column.name.clone(),
            sql_type: self.normalize_type(column),
            nullable: column.nullable && !column.primary,
            default: column.default.clone(),
            generated: column.generated,
            unique: column.unique,
        }
    }
}
