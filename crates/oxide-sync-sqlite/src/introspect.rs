//! Reading table snapshots from a SQLite database.
//!
//! Structure comes from the `pragma_*` table-valued functions. SQLite does
//! not report foreign key names or AUTOINCREMENT through pragmas, so both
//! are recovered from the table's CREATE statement in `sqlite_master`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use sqlx::sqlite::SqlitePool;

use oxide_sync::metadata::foreign_key_name;
use oxide_sync::schema::ForeignKeyAction;
use oxide_sync::snapshot::{
    ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, PrimaryKeySnapshot, TableSnapshot,
};

use crate::dialect::affinity;

static FOREIGN_KEY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)CONSTRAINT\s+"((?:[^"]|"")+)"\s+FOREIGN\s+KEY\s*\(([^)]*)\)"#)
        .unwrap_or_else(|e| panic!("invalid foreign key pattern: {e}"))
});

static AUTOINCREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bAUTOINCREMENT\b").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

type ColumnRow = (String, String, i64, Option<String>, i64);
type IndexRow = (String, i64, String);
type ForeignKeyRow = (i64, i64, String, String, Option<String>, String, String);

/// Loads the snapshot of `table`, or `None` if it does not exist.
pub async fn load_table(pool: &SqlitePool, table: &str) -> Result<Option<TableSnapshot>, sqlx::Error> {
    let definition: Option<(Option<String>,)> =
        sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    let Some((definition,)) = definition else {
        return Ok(None);
    };
    let definition = definition.unwrap_or_default();

    let mut snapshot = TableSnapshot::new(table);
    load_columns(pool, &mut snapshot, &definition).await?;
    load_indices(pool, &mut snapshot).await?;
    load_foreign_keys(pool, &mut snapshot, &definition).await?;
    Ok(Some(snapshot))
}

async fn load_columns(
    pool: &SqlitePool,
    snapshot: &mut TableSnapshot,
    definition: &str,
) -> Result<(), sqlx::Error> {
    let rows: Vec<ColumnRow> = sqlx::query_as(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )
    .bind(&snapshot.name)
    .fetch_all(pool)
    .await?;

    let mut keys: Vec<(i64, String)> = rows
        .iter()
        .filter(|row| row.4 > 0)
        .map(|row| (row.4, row.0.clone()))
        .collect();
    keys.sort();

    // Only a sole INTEGER PRIMARY KEY can carry AUTOINCREMENT.
    let generated = match keys.as_slice() {
        [(_, name)] if AUTOINCREMENT.is_match(definition) => Some(name.clone()),
        _ => None,
    };

    snapshot.columns = rows
        .into_iter()
        .map(|(name, declared, not_null, default, pk)| ColumnSnapshot {
            generated: generated.as_deref() == Some(name.as_str()),
            name,
            sql_type: affinity(&declared).to_string(),
            // Key columns are reported NOT NULL, as a rowid alias is.
            nullable: not_null == 0 && pk == 0,
            default,
            unique: false,
        })
        .collect();
    snapshot.primary_keys = keys
        .into_iter()
        .map(|(_, column)| PrimaryKeySnapshot::new("", column))
        .collect();
    Ok(())
}

async fn load_indices(pool: &SqlitePool, snapshot: &mut TableSnapshot) -> Result<(), sqlx::Error> {
    let rows: Vec<IndexRow> =
        sqlx::query_as("SELECT name, \"unique\", origin FROM pragma_index_list(?1)")
            .bind(&snapshot.name)
            .fetch_all(pool)
            .await?;

    for (name, unique, origin) in rows {
        let columns: Vec<(Option<String>,)> =
            sqlx::query_as("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
                .bind(&name)
                .fetch_all(pool)
                .await?;
        let columns: Vec<String> = columns.into_iter().filter_map(|(c,)| c).collect();

        match origin.as_str() {
            "c" => snapshot.indices.push(IndexSnapshot {
                name,
                columns,
                unique: unique != 0,
            }),
            // Automatic index behind a UNIQUE column constraint.
            "u" => {
                if let [column] = columns.as_slice() {
                    if let Some(slot) = snapshot.columns.iter_mut().find(|c| &c.name == column) {
                        slot.unique = true;
                    }
                }
            }
            _ => {}
        }
    }

    snapshot.indices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(())
}

async fn load_foreign_keys(
    pool: &SqlitePool,
    snapshot: &mut TableSnapshot,
    definition: &str,
) -> Result<(), sqlx::Error> {
    let rows: Vec<ForeignKeyRow> = sqlx::query_as(
        "SELECT id, seq, \"table\", \"from\", \"to\", on_update, on_delete \
         FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )
    .bind(&snapshot.name)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<i64, ForeignKeySnapshot> = BTreeMap::new();
    for (id, _, referenced_table, from, to, on_update, on_delete) in rows {
        let key = grouped.entry(id).or_insert_with(|| ForeignKeySnapshot {
            name: String::new(),
            columns: Vec::new(),
            referenced_table,
            referenced_columns: Vec::new(),
            on_delete: ForeignKeyAction::from_sql(&on_delete),
            on_update: ForeignKeyAction::from_sql(&on_update),
        });
        key.columns.push(from);
        key.referenced_columns.push(to.unwrap_or_default());
    }

    let names = constraint_names(definition);
    let mut keys: Vec<ForeignKeySnapshot> = grouped.into_values().collect();
    for key in &mut keys {
        key.name = names
            .iter()
            .find(|(columns, _)| columns == &key.columns)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| foreign_key_name(&snapshot.name, &key.columns));
    }
    keys.sort_by(|a, b| a.name.cmp(&b.name));
    snapshot.foreign_keys = keys;
    Ok(())
}

/// Named foreign key constraints of a CREATE TABLE statement, as
/// `(columns, name)`.
fn constraint_names(definition: &str) -> Vec<(Vec<String>, String)> {
    FOREIGN_KEY_NAME
        .captures_iter(definition)
        .map(|captures| {
            let name = unquote(&captures[1]);
            let columns = captures[2].split(',').map(unquote).collect();
            (columns, name)
        })
        .collect()
}

fn unquote(identifier: &str) -> String {
    let identifier = identifier.trim();
    let inner = identifier
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(identifier);
    inner.replace("\"\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_names() {
        let sql = "CREATE TABLE \"post\" (\n  \"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,\n  \
                   \"a\" INTEGER,\n  \"b\" INTEGER,\n  \
                   CONSTRAINT \"fk_post_a_b\" FOREIGN KEY (\"a\", \"b\") REFERENCES \"x\" (\"id\", \"k\") \
                   ON DELETE NO ACTION ON UPDATE NO ACTION,\n  \
                   constraint \"odd\"\"name\" foreign key (\"a\") REFERENCES \"y\" (\"id\")\n)";

        let names = constraint_names(sql);
        assert_eq!(
            names,
            vec![
                (vec!["a".to_string(), "b".to_string()], "fk_post_a_b".to_string()),
                (vec!["a".to_string()], "odd\"name".to_string()),
            ]
        );
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(" \"title\" "), "title");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("\"a\"\"b\""), "a\"b");
    }

    #[test]
    fn test_autoincrement_marker() {
        assert!(AUTOINCREMENT.is_match("\"id\" INTEGER NOT NULL PRIMARY KEY autoincrement"));
        assert!(!AUTOINCREMENT.is_match("\"id\" INTEGER PRIMARY KEY"));
    }
}
