//! Change planning for each reconciliation phase.
//!
//! Every function here is pure: it reads the current snapshot and the
//! desired table and returns the change-set for one phase. The builder
//! applies the change-set to the snapshot and issues the DDL.

use crate::diff::{diff_by_name, diff_names};
use crate::driver::SchemaDriver;
use crate::error::{Result, SyncError};
use crate::metadata::EntityMetadata;
use crate::snapshot::{
    ColumnChange, ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, PrimaryKeySnapshot,
    TableSnapshot,
};

/// An entity's metadata resolved into snapshot form for one driver.
///
/// Column types are normalized once here, so every later comparison and the
/// create-table call see the driver's spelling.
#[derive(Debug, Clone)]
pub struct DesiredTable {
    /// Table name.
    pub name: String,
    /// Columns, embedded columns flattened, types normalized.
    pub columns: Vec<ColumnSnapshot>,
    /// Primary, generated columns. Their key is declared at creation.
    pub generated_primary_columns: Vec<String>,
    /// Primary, non-generated columns. Managed by the primary-key phase.
    pub primary_columns: Vec<String>,
    /// Explicit and relation-derived foreign keys.
    pub foreign_keys: Vec<ForeignKeySnapshot>,
    /// Indices.
    pub indices: Vec<IndexSnapshot>,
}

impl DesiredTable {
    /// Resolves `entity` using the driver's type normalization.
    pub fn resolve<D: SchemaDriver>(entity: &EntityMetadata, driver: &D) -> Self {
        let all_columns = entity.all_columns();
        Self {
            name: entity.table_name.clone(),
            columns: all_columns
                .iter()
                .map(|c| driver.column_snapshot(c))
                .collect(),
            generated_primary_columns: all_columns
                .iter()
                .filter(|c| c.primary && c.generated)
                .map(|c| c.name.clone())
                .collect(),
            primary_columns: all_columns
                .iter()
                .filter(|c| c.primary && !c.generated)
                .map(|c| c.name.clone())
                .collect(),
            foreign_keys: entity
                .all_foreign_keys()
                .into_iter()
                .map(|fk| ForeignKeySnapshot {
                    name: fk.name,
                    columns: fk.columns,
                    referenced_table: fk.referenced_table,
                    referenced_columns: fk.referenced_columns,
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                })
                .collect(),
            indices: entity
                .indices
                .iter()
                .map(|idx| IndexSnapshot {
                    name: idx.name.clone(),
                    columns: idx.columns.clone(),
                    unique: idx.unique,
                })
                .collect(),
        }
    }
}

/// Primary key entries to add and to drop for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryKeyChanges {
    /// Entries to add.
    pub added: Vec<PrimaryKeySnapshot>,
    /// Entries to drop.
    pub dropped: Vec<PrimaryKeySnapshot>,
}

/// Indices to drop and to create for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexChanges {
    /// Live indices no longer declared.
    pub dropped: Vec<IndexSnapshot>,
    /// Declared indices not yet live.
    pub created: Vec<IndexSnapshot>,
}

impl IndexChanges {
    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.created.is_empty()
    }
}

/// Live foreign keys absent from the metadata.
#[must_use]
pub fn stale_foreign_keys(live: &TableSnapshot, desired: &DesiredTable) -> Vec<ForeignKeySnapshot> {
    diff_names(&live.foreign_keys, &desired.foreign_keys)
        .removed
        .into_iter()
        .cloned()
        .collect()
}

/// Snapshot of a table about to be created: all columns, no foreign keys,
/// and only the keys of generated primary columns.
#[must_use]
pub fn new_table(desired: &DesiredTable) -> TableSnapshot {
    TableSnapshot {
        name: desired.name.clone(),
        columns: desired.columns.clone(),
        foreign_keys: Vec::new(),
        indices: Vec::new(),
        primary_keys: desired
            .generated_primary_columns
            .iter()
            .map(|column| PrimaryKeySnapshot::new("", column.clone()))
            .collect(),
        just_created: true,
    }
}

/// Live columns absent from the metadata.
#[must_use]
pub fn dropped_columns(live: &TableSnapshot, desired: &DesiredTable) -> Vec<ColumnSnapshot> {
    diff_names(&live.columns, &desired.columns)
        .removed
        .into_iter()
        .cloned()
        .collect()
}

/// Declared columns absent from the live table.
#[must_use]
pub fn added_columns(live: &TableSnapshot, desired: &DesiredTable) -> Vec<ColumnSnapshot> {
    diff_names(&live.columns, &desired.columns)
        .added
        .into_iter()
        .cloned()
        .collect()
}

/// Same-named columns whose definitions differ according to `equal`.
///
/// Fails with [`SyncError::UnsupportedOperation`] if a changed column is
/// part of the live primary key.
pub fn changed_columns<F>(
    live: &TableSnapshot,
    desired: &DesiredTable,
    mut equal: F,
) -> Result<Vec<ColumnChange>>
where
    F: FnMut(&ColumnSnapshot, &ColumnSnapshot) -> bool,
{
    let diff = diff_by_name(&live.columns, &desired.columns, |l, d| equal(l, d));

    let mut changes = Vec::with_capacity(diff.changed.len());
    for (old, new) in diff.changed {
        if live.is_primary(&old.name) {
            return Err(SyncError::UnsupportedOperation {
                table: live.name.clone(),
                column: old.name.clone(),
                reason: "altering a column that is part of the primary key is not supported"
                    .to_string(),
            });
        }
        changes.push(ColumnChange {
            old: old.clone(),
            new: new.clone(),
        });
    }
    Ok(changes)
}

/// Primary key delta, or `None` if the key already matches.
///
/// Columns the metadata declares generated are left out on both sides,
/// whatever the live column reports. A table created during this run only
/// receives additions.
#[must_use]
pub fn primary_key_changes(live: &TableSnapshot, desired: &DesiredTable) -> Option<PrimaryKeyChanges> {
    let constraint_name = live
        .primary_keys
        .first()
        .map(|pk| pk.name.clone())
        .unwrap_or_default();

    let current: Vec<PrimaryKeySnapshot> = live
        .primary_keys
        .iter()
        .filter(|pk| !desired.generated_primary_columns.contains(&pk.column_name))
        .cloned()
        .collect();
    let wanted: Vec<PrimaryKeySnapshot> = desired
        .primary_columns
        .iter()
        .map(|column| PrimaryKeySnapshot::new(constraint_name.clone(), column.clone()))
        .collect();

    let diff = diff_names(&current, &wanted);
    let changes = PrimaryKeyChanges {
        added: diff.added.into_iter().cloned().collect(),
        dropped: if live.just_created {
            Vec::new()
        } else {
            diff.removed.into_iter().cloned().collect()
        },
    };

    if changes.added.is_empty() && changes.dropped.is_empty() {
        None
    } else {
        Some(changes)
    }
}

/// Declared foreign keys absent from the live table.
#[must_use]
pub fn new_foreign_keys(live: &TableSnapshot, desired: &DesiredTable) -> Vec<ForeignKeySnapshot> {
    diff_names(&live.foreign_keys, &desired.foreign_keys)
        .added
        .into_iter()
        .cloned()
        .collect()
}

/// Index delta for one table.
#[must_use]
pub fn index_changes(live: &TableSnapshot, desired: &DesiredTable) -> IndexChanges {
    let diff = diff_names(&live.indices, &desired.indices);
    IndexChanges {
        dropped: diff.removed.into_iter().cloned().collect(),
        created: diff.added.into_iter().cloned().collect(),
    }
}

/// Foreign keys, across all tables, that involve column `table.column`.
///
/// A key qualifies if it is owned by `table` and lists the column among its
/// own columns, or references `table` and lists the column among its
/// referenced columns. Results are grouped by owning table as
/// `(index into tables, keys)`, in table order.
#[must_use]
pub fn referencing_foreign_keys(
    tables: &[TableSnapshot],
    table: &str,
    column: &str,
) -> Vec<(usize, Vec<ForeignKeySnapshot>)> {
    tables
        .iter()
        .enumerate()
        .filter_map(|(position, owner)| {
            let keys: Vec<ForeignKeySnapshot> = owner
                .foreign_keys
                .iter()
                .filter(|fk| {
                    let owned = owner.name == table && fk.columns.iter().any(|c| c == column);
                    let referenced = fk.referenced_table == table
                        && fk.referenced_columns.iter().any(|c| c == column);
                    owned || referenced
                })
                .cloned()
                .collect();
            (!keys.is_empty()).then_some((position, keys))
        })
        .collect()
}

/// Indices of `table` that include `column`.
#[must_use]
pub fn referencing_indices(table: &TableSnapshot, column: &str) -> Vec<IndexSnapshot> {
    table
        .indices
        .iter()
        .filter(|idx| idx.columns.iter().any(|c| c == column))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKeyAction;

    fn desired(name: &str) -> DesiredTable {
        DesiredTable {
            name: name.to_string(),
            columns: Vec::new(),
            generated_primary_columns: Vec::new(),
            primary_columns: Vec::new(),
            foreign_keys: Vec::new(),
            indices: Vec::new(),
        }
    }

    fn fk(name: &str, columns: &[&str], table: &str, referenced: &[&str]) -> ForeignKeySnapshot {
        ForeignKeySnapshot {
            name: name.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            referenced_table: table.to_string(),
            referenced_columns: referenced.iter().map(|c| (*c).to_string()).collect(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    fn index(name: &str, columns: &[&str]) -> IndexSnapshot {
        IndexSnapshot {
            name: name.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            unique: false,
        }
    }

    #[test]
    fn test_new_table_has_no_foreign_or_manual_primary_keys() {
        let mut post = desired("post");
        post.columns = vec![
            ColumnSnapshot::new("id", "INTEGER").not_null().generated(),
            ColumnSnapshot::new("tenant", "INTEGER").not_null(),
        ];
        post.generated_primary_columns = vec!["id".to_string()];
        post.primary_columns = vec!["tenant".to_string()];
        post.foreign_keys = vec![fk("fk_post_tenant", &["tenant"], "tenant", &["id"])];

        let table = new_table(&post);
        assert!(table.just_created);
        assert_eq!(table.columns.len(), 2);
        assert!(table.foreign_keys.is_empty());
        assert_eq!(table.primary_keys, vec![PrimaryKeySnapshot::new("", "id")]);

        // The manual key is added by the primary-key phase instead.
        let changes = primary_key_changes(&table, &post).unwrap();
        assert_eq!(changes.added, vec![PrimaryKeySnapshot::new("", "tenant")]);
        assert!(changes.dropped.is_empty());
    }

    #[test]
    fn test_primary_key_changes_ignores_generated_keys() {
        let live = TableSnapshot::new("post")
            .column(ColumnSnapshot::new("id", "INTEGER").not_null().generated())
            .primary_key(PrimaryKeySnapshot::new("", "id"));
        let mut post = desired("post");
        post.generated_primary_columns = vec!["id".to_string()];

        assert!(primary_key_changes(&live, &post).is_none());
    }

    #[test]
    fn test_primary_key_changes_takes_generation_from_metadata() {
        // Databases may not report generation for every key type.
        let live = TableSnapshot::new("doc")
            .column(ColumnSnapshot::new("id", "TEXT").not_null())
            .primary_key(PrimaryKeySnapshot::new("", "id"));
        let mut doc = desired("doc");
        doc.generated_primary_columns = vec!["id".to_string()];

        assert!(primary_key_changes(&live, &doc).is_none());
    }

    #[test]
    fn test_primary_key_changes_on_existing_table() {
        let live = TableSnapshot::new("post_tag")
            .column(ColumnSnapshot::new("post_id", "INTEGER").not_null())
            .column(ColumnSnapshot::new("tag_id", "INTEGER").not_null())
            .column(ColumnSnapshot::new("legacy", "INTEGER").not_null())
            .primary_key(PrimaryKeySnapshot::new("pk_post_tag", "post_id"))
            .primary_key(PrimaryKeySnapshot::new("pk_post_tag", "legacy"));
        let mut wanted = desired("post_tag");
        wanted.primary_columns = vec!["post_id".to_string(), "tag_id".to_string()];

        let changes = primary_key_changes(&live, &wanted).unwrap();
        assert_eq!(changes.added, vec![PrimaryKeySnapshot::new("pk_post_tag", "tag_id")]);
        assert_eq!(changes.dropped, vec![PrimaryKeySnapshot::new("pk_post_tag", "legacy")]);
    }

    #[test]
    fn test_just_created_table_never_drops_keys() {
        let mut live = TableSnapshot::new("t")
            .column(ColumnSnapshot::new("a", "INTEGER"))
            .primary_key(PrimaryKeySnapshot::new("", "a"));
        live.just_created = true;

        assert!(primary_key_changes(&live, &desired("t")).is_none());
    }

    #[test]
    fn test_changed_columns_refuses_primary_key_columns() {
        let live = TableSnapshot::new("post")
            .column(ColumnSnapshot::new("code", "TEXT").not_null())
            .primary_key(PrimaryKeySnapshot::new("", "code"));
        let mut post = desired("post");
        post.columns = vec![ColumnSnapshot::new("code", "INTEGER").not_null()];

        let err = changed_columns(&live, &post, |l, d| l == d).unwrap_err();
        match err {
            SyncError::UnsupportedOperation { table, column, .. } => {
                assert_eq!(table, "post");
                assert_eq!(column, "code");
            }
            other => panic!("Expected UnsupportedOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_changed_columns_detects_attribute_changes() {
        let live = TableSnapshot::new("post")
            .column(ColumnSnapshot::new("title", "TEXT"))
            .column(ColumnSnapshot::new("body", "TEXT"));
        let mut post = desired("post");
        post.columns = vec![
            ColumnSnapshot::new("title", "TEXT").not_null(),
            ColumnSnapshot::new("body", "TEXT"),
        ];

        let changes = changed_columns(&live, &post, |l, d| l == d).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old.name, "title");
        assert!(changes[0].old.nullable);
        assert!(!changes[0].new.nullable);
    }

    #[test]
    fn test_referencing_foreign_keys_checks_both_sides() {
        let tables = vec![
            TableSnapshot::new("user").column(ColumnSnapshot::new("id", "INTEGER")),
            TableSnapshot::new("post")
                .column(ColumnSnapshot::new("author_id", "INTEGER"))
                .foreign_key(fk("fk_post_author_id", &["author_id"], "user", &["id"])),
            TableSnapshot::new("comment")
                .column(ColumnSnapshot::new("user_id", "INTEGER"))
                .foreign_key(fk("fk_comment_user_id", &["user_id"], "user", &["id"]))
                .foreign_key(fk("fk_comment_post", &["post_id"], "post", &["id"])),
        ];

        let by_referenced = referencing_foreign_keys(&tables, "user", "id");
        assert_eq!(by_referenced.len(), 2);
        assert_eq!(by_referenced[0].0, 1);
        assert_eq!(by_referenced[0].1[0].name, "fk_post_author_id");
        assert_eq!(by_referenced[1].0, 2);
        assert_eq!(by_referenced[1].1.len(), 1);
        assert_eq!(by_referenced[1].1[0].name, "fk_comment_user_id");

        let by_owner = referencing_foreign_keys(&tables, "post", "author_id");
        assert_eq!(by_owner.len(), 1);
        assert_eq!(by_owner[0].1[0].name, "fk_post_author_id");

        assert!(referencing_foreign_keys(&tables, "post", "title").is_empty());
    }

    #[test]
    fn test_referencing_indices() {
        let table = TableSnapshot::new("post")
            .index(index("idx_a", &["a"]))
            .index(index("idx_ab", &["a", "b"]))
            .index(index("idx_c", &["c"]));

        let names: Vec<String> = referencing_indices(&table, "a")
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["idx_a", "idx_ab"]);
    }

    #[test]
    fn test_index_changes_by_name_only() {
        let live = TableSnapshot::new("post")
            .index(index("idx_keep", &["a"]))
            .index(index("idx_old", &["b"]));
        let mut post = desired("post");
        // Same name, different columns: not a change.
        post.indices = vec![index("idx_keep", &["a", "b"]), index("idx_new", &["c"])];

        let changes = index_changes(&live, &post);
        assert_eq!(changes.dropped, vec![index("idx_old", &["b"])]);
        assert_eq!(changes.created, vec![index("idx_new", &["c"])]);
    }

    #[test]
    fn test_stale_and_new_foreign_keys() {
        let live = TableSnapshot::new("post")
            .foreign_key(fk("fk_keep", &["a"], "x", &["id"]))
            .foreign_key(fk("fk_stale", &["b"], "y", &["id"]));
        let mut post = desired("post");
        post.foreign_keys = vec![
            fk("fk_keep", &["a"], "x", &["id"]),
            fk("fk_new", &["c"], "z", &["id"]),
        ];

        let stale: Vec<String> = stale_foreign_keys(&live, &post).into_iter().map(|k| k.name).collect();
        let new: Vec<String> = new_foreign_keys(&live, &post).into_iter().map(|k| k.name).collect();
        assert_eq!(stale, vec!["fk_stale"]);
        assert_eq!(new, vec!["fk_new"]);
    }
}
