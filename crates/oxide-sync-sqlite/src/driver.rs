//! [`SchemaDriver`] implementation for SQLite.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use oxide_sync::driver::SchemaDriver;
use oxide_sync::error::{Result, SyncError};
use oxide_sync::metadata::ColumnMetadata;
use oxide_sync::snapshot::{
    ColumnChange, ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, TableSnapshot,
};

use crate::dialect::SqliteDialect;
use crate::introspect;

#[derive(Default)]
struct Session {
    conn: Option<PoolConnection<Sqlite>>,
    statements: Vec<String>,
}

impl Session {
    async fn connection(&mut self, pool: &SqlitePool) -> Result<&mut SqliteConnection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => pool.acquire().await.map_err(SyncError::driver)?,
        };
        Ok(&mut **self.conn.insert(conn))
    }
}

/// Synchronizes a SQLite database.
///
/// A run holds one pooled connection from `begin_transaction` until
/// `release`. Statements issued concurrently are serialized on it.
pub struct SqliteDriver {
    pool: SqlitePool,
    dialect: SqliteDialect,
    session: Mutex<Session>,
}

impl SqliteDriver {
    /// Creates a driver over `pool`.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            dialect: SqliteDialect::new(),
            session: Mutex::new(Session::default()),
        }
    }

    /// Statements executed since this driver was created, in order. Session
    /// control statements are excluded.
    pub async fn executed_statements(&self) -> Vec<String> {
        self.session.lock().await.statements.clone()
    }

    async fn run(&self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        let mut session = self.session.lock().await;
        let conn = session.connection(&self.pool).await?;
        sqlx::query(sql)
            .execute(conn)
            .await
            .map_err(SyncError::driver)?;
        Ok(())
    }

    async fn execute(&self, statements: Vec<String>) -> Result<()> {
        let mut session = self.session.lock().await;
        for sql in statements {
            debug!(sql = %sql, "Executing SQL");
            let conn = session.connection(&self.pool).await?;
            sqlx::query(&sql)
                .execute(conn)
                .await
                .map_err(SyncError::driver)?;
            session.statements.push(sql);
        }
        Ok(())
    }

    /// Rebuilds `table` into its snapshot, copying every column of the
    /// snapshot except `fresh` ones.
    async fn rebuild(&self, table: &TableSnapshot, fresh: &[&str]) -> Result<()> {
        let copied: Vec<&str> = table
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| !fresh.contains(name))
            .collect();
        debug!(table = %table.name, "Rebuilding table");
        self.execute(self.dialect.rebuild_table_sql(table, &copied))
            .await
    }
}

impl SchemaDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load_table_snapshots(&self, table_names: &[String]) -> Result<Vec<TableSnapshot>> {
        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            if let Some(table) = introspect::load_table(&self.pool, name)
                .await
                .map_err(SyncError::driver)?
            {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    async fn begin_transaction(&self) -> Result<()> {
        // Has no effect inside a transaction, so it goes first.
        self.run("PRAGMA foreign_keys = OFF").await?;
        if let Err(err) = self.run("BEGIN").await {
            self.run("PRAGMA foreign_keys = ON").await?;
            return Err(err);
        }
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.run("COMMIT").await?;
        self.run("PRAGMA foreign_keys = ON").await
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let rolled_back = self.run("ROLLBACK").await;
        self.run("PRAGMA foreign_keys = ON").await?;
        rolled_back
    }

    async fn release(&self) -> Result<()> {
        let Some(mut conn) = self.session.lock().await.conn.take() else {
            return Ok(());
        };
        // The connection goes back to the pool with enforcement on.
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await
            .map_err(SyncError::driver)?;
        Ok(())
    }

    async fn create_table(&self, table: &TableSnapshot) -> Result<()> {
        self.execute(vec![self.dialect.create_table_sql(table)])
            .await
    }

    async fn add_columns(&self, table: &TableSnapshot, columns: &[ColumnSnapshot]) -> Result<()> {
        if columns.iter().all(|c| self.dialect.can_add_in_place(c)) {
            let statements = columns
                .iter()
                .map(|c| self.dialect.add_column_sql(&table.name, c))
                .collect();
            return self.execute(statements).await;
        }
        let fresh: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        self.rebuild(table, &fresh).await
    }

    async fn drop_columns(&self, table: &TableSnapshot, _columns: &[ColumnSnapshot]) -> Result<()> {
        self.rebuild(table, &[]).await
    }

    async fn change_columns(&self, table: &TableSnapshot, _changes: &[ColumnChange]) -> Result<()> {
        self.rebuild(table, &[]).await
    }

    async fn update_primary_keys(&self, table: &TableSnapshot) -> Result<()> {
        self.rebuild(table, &[]).await
    }

    async fn create_foreign_keys(
        &self,
        table: &TableSnapshot,
        _foreign_keys: &[ForeignKeySnapshot],
    ) -> Result<()> {
        self.rebuild(table, &[]).await
    }

    async fn drop_foreign_keys(
        &self,
        table: &TableSnapshot,
        _foreign_keys: &[ForeignKeySnapshot],
    ) -> Result<()> {
        self.rebuild(table, &[]).await
    }

    async fn create_index(&self, table: &TableSnapshot, index: &IndexSnapshot) -> Result<()> {
        self.execute(vec![self.dialect.create_index_sql(&table.name, index)])
            .await
    }

    async fn drop_index(&self, _table: &TableSnapshot, index: &IndexSnapshot) -> Result<()> {
        self.execute(vec![self.dialect.drop_index_sql(index)]).await
    }

    fn normalize_type(&self, column: &ColumnMetadata) -> String {
        self.dialect.type_name(&column.sql_type)
    }

    // Generation is part of the primary key definition in SQLite.
    fn columns_equal(&self, live: &ColumnSnapshot, desired: &ColumnSnapshot) -> bool {
        live.sql_type == desired.sql_type
            && live.nullable == desired.nullable
            && live.default == desired.default
            && live.unique == desired.unique
    }
}
