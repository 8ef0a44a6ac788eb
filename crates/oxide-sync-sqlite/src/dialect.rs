//! SQLite DDL rendering.
//!
//! SQLite has limited ALTER TABLE support: it can add a plain column, and
//! create or drop an index, but it cannot add or drop constraints or alter a
//! column. Everything else uses the "table rebuild" strategy: create a
//! replacement table, copy the rows, drop the original, rename the
//! replacement and recreate the indices.

use oxide_sync::schema::SqlType;
use oxide_sync::snapshot::{ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, TableSnapshot};

/// Prefix of the temporary table used while rebuilding.
pub const REBUILD_PREFIX: &str = "__oxide_sync_";

/// SQLite DDL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Returns the SQLite spelling of a type: its storage affinity.
    #[must_use]
    pub fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Boolean => "INTEGER".to_string(),
            SqlType::Text | SqlType::Varchar(_) | SqlType::Char(_) => "TEXT".to_string(),
            SqlType::DateTime | SqlType::Timestamp | SqlType::Date | SqlType::Time => {
                "TEXT".to_string()
            }
            SqlType::Json | SqlType::Uuid => "TEXT".to_string(),
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal(_, _) | SqlType::Numeric(_, _) => "NUMERIC".to_string(),
            SqlType::Blob | SqlType::Binary(_) | SqlType::VarBinary(_) => "BLOB".to_string(),
            SqlType::Custom(name) => affinity(name).to_string(),
        }
    }

    /// Column definition. `primary_key` renders the key inline, with
    /// AUTOINCREMENT for generated integer columns.
    #[must_use]
    pub fn column_definition(&self, column: &ColumnSnapshot, primary_key: bool) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(&column.name), column.sql_type);
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if primary_key {
            sql.push_str(" PRIMARY KEY");
            if column.generated && column.sql_type == "INTEGER" {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    /// Foreign key table constraint.
    #[must_use]
    pub fn foreign_key_clause(&self, foreign_key: &ForeignKeySnapshot) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(&foreign_key.name),
            self.quote_list(&foreign_key.columns),
            self.quote_identifier(&foreign_key.referenced_table),
            self.quote_list(&foreign_key.referenced_columns),
            foreign_key.on_delete.to_sql(),
            foreign_key.on_update.to_sql()
        )
    }

    /// CREATE TABLE for the full snapshot: columns, primary key and foreign
    /// keys. Indices are separate statements.
    #[must_use]
    pub fn create_table_sql(&self, table: &TableSnapshot) -> String {
        self.create_table_as(&table.name, table)
    }

    fn create_table_as(&self, name: &str, table: &TableSnapshot) -> String {
        let inline_key = match table.primary_keys.as_slice() {
            [key] => table
                .get_column(&key.column_name)
                .filter(|c| c.generated)
                .map(|c| c.name.as_str()),
            _ => None,
        };

        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c, inline_key == Some(c.name.as_str())))
            .collect();

        if inline_key.is_none() && !table.primary_keys.is_empty() {
            let columns: Vec<String> = table
                .primary_keys
                .iter()
                .map(|pk| pk.column_name.clone())
                .collect();
            definitions.push(format!("PRIMARY KEY ({})", self.quote_list(&columns)));
        }

        definitions.extend(table.foreign_keys.iter().map(|fk| self.foreign_key_clause(fk)));

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(name),
            definitions.join(",\n  ")
        )
    }

    /// ALTER TABLE .. ADD COLUMN.
    #[must_use]
    pub fn add_column_sql(&self, table: &str, column: &ColumnSnapshot) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column, false)
        )
    }

    /// Returns whether SQLite can add `column` in place. A unique column, or
    /// a NOT NULL column without a default, needs a rebuild.
    #[must_use]
    pub fn can_add_in_place(&self, column: &ColumnSnapshot) -> bool {
        !column.unique && (column.nullable || column.default.is_some())
    }

    /// CREATE [UNIQUE] INDEX.
    #[must_use]
    pub fn create_index_sql(&self, table: &str, index: &IndexSnapshot) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            self.quote_list(&index.columns)
        )
    }

    /// DROP INDEX.
    #[must_use]
    pub fn drop_index_sql(&self, index: &IndexSnapshot) -> String {
        format!("DROP INDEX {}", self.quote_identifier(&index.name))
    }

    /// Statements that rebuild `table` into its snapshot, copying `copied`
    /// columns from the existing rows.
    #[must_use]
    pub fn rebuild_table_sql(&self, table: &TableSnapshot, copied: &[&str]) -> Vec<String> {
        let temporary = format!("{}{}", REBUILD_PREFIX, table.name);
        let quoted_table = self.quote_identifier(&table.name);
        let quoted_temporary = self.quote_identifier(&temporary);

        let mut statements = vec![self.create_table_as(&temporary, table)];
        if !copied.is_empty() {
            let columns = copied
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            statements.push(format!(
                "INSERT INTO {quoted_temporary} ({columns}) SELECT {columns} FROM {quoted_table}"
            ));
        }
        statements.push(format!("DROP TABLE {quoted_table}"));
        statements.push(format!(
            "ALTER TABLE {quoted_temporary} RENAME TO {quoted_table}"
        ));
        statements.extend(
            table
                .indices
                .iter()
                .map(|index| self.create_index_sql(&table.name, index)),
        );
        statements
    }

    fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Storage affinity of a declared type, following SQLite's column affinity
/// rules.
#[must_use]
pub fn affinity(declared: &str) -> &'static str {
    let declared = declared.to_ascii_uppercase();
    if declared.contains("INT") {
        "INTEGER"
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| declared.contains(t)) {
        "TEXT"
    } else if declared.contains("BLOB") || declared.trim().is_empty() {
        "BLOB"
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| declared.contains(t)) {
        "REAL"
    } else {
        "NUMERIC"
    }
}
