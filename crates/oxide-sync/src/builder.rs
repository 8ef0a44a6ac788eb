//! Schema synchronization.
//!
//! [`SchemaBuilder`] converges a live database on a set of entity metadata.
//! It loads the current tables, then runs eight phases inside one
//! transaction. Each phase visits every table in metadata order before the
//! next phase starts:
//!
//! 1. drop foreign keys that are no longer declared
//! 2. create missing tables (no foreign keys, only generated primary keys)
//! 3. drop removed columns, with the constraints that reference them
//! 4. add new columns
//! 5. alter changed columns, with the constraints that reference them
//! 6. reconcile primary keys
//! 7. create missing foreign keys
//! 8. reconcile indices
//!
//! Before every DDL call the in-memory snapshot is updated to the state the
//! call produces, so later phases plan against the schema as it will be.

use futures::future::{try_join, try_join_all};
use tracing::{debug, info, warn};

use crate::driver::SchemaDriver;
use crate::error::Result;
use crate::logger::{join_names, SchemaLogger, TracingLogger};
use crate::metadata::{validate_all, EntityMetadata};
use crate::plan::{self, DesiredTable};
use crate::snapshot::TableSnapshot;

/// Options for a synchronization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Run every phase, then roll back instead of committing.
    pub dry_run: bool,
}

impl SyncOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Converges the schema of a database on entity metadata.
///
/// # Example
///
/// ```rust,ignore
/// use oxide_sync::prelude::*;
///
/// let entities = vec![EntityMetadata::new("post")
///     .column(ColumnMetadata::new("id", SqlType::Integer).primary().generated())
///     .column(ColumnMetadata::new("title", SqlType::Text))];
///
/// SchemaBuilder::new(&driver, &entities).build().await?;
/// ```
pub struct SchemaBuilder<'a, D: SchemaDriver> {
    driver: &'a D,
    entities: &'a [EntityMetadata],
    logger: &'a dyn SchemaLogger,
    options: SyncOptions,
}

impl<'a, D: SchemaDriver> SchemaBuilder<'a, D> {
    /// Creates a builder that narrates through `tracing`.
    #[must_use]
    pub fn new(driver: &'a D, entities: &'a [EntityMetadata]) -> Self {
        Self {
            driver,
            entities,
            logger: &TracingLogger,
            options: SyncOptions::default(),
        }
    }

    /// Replaces the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: &'a dyn SchemaLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the synchronization.
    ///
    /// All changes are applied in one transaction, which is rolled back if
    /// any change fails. The driver session is released on every path; when
    /// the run itself failed, a release failure is logged and the run's
    /// error is returned.
    pub async fn build(&self) -> Result<()> {
        let outcome = self.synchronize().await;
        let released = self.driver.release().await;

        match (outcome, released) {
            (Ok(()), released) => released,
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(error = %release_err, "Failed to release the database session");
                Err(err)
            }
        }
    }

    async fn synchronize(&self) -> Result<()> {
        let entities: Vec<&EntityMetadata> =
            self.entities.iter().filter(|e| !e.skip_sync).collect();
        validate_all(entities.iter().copied())?;

        let desired: Vec<DesiredTable> = entities
            .iter()
            .map(|entity| DesiredTable::resolve(entity, self.driver))
            .collect();
        let names: Vec<String> = desired.iter().map(|t| t.name.clone()).collect();

        info!(
            driver = self.driver.name(),
            tables = desired.len(),
            dry_run = self.options.dry_run,
            "Synchronizing schema"
        );

        let mut tables = self.driver.load_table_snapshots(&names).await?;
        debug!(existing = tables.len(), "Loaded table snapshots");

        self.driver.begin_transaction().await?;

        if let Err(err) = self.converge(&desired, &mut tables).await {
            self.rollback_after_error().await;
            return Err(err);
        }

        if self.options.dry_run {
            info!("Dry run complete, rolling back");
            return self.driver.rollback_transaction().await;
        }

        if let Err(err) = self.driver.commit_transaction().await {
            self.rollback_after_error().await;
            return Err(err);
        }

        info!("Schema synchronized");
        Ok(())
    }

    async fn rollback_after_error(&self) {
        if let Err(err) = self.driver.rollback_transaction().await {
            warn!(error = %err, "Failed to roll back the transaction");
        }
    }

    async fn converge(&self, desired: &[DesiredTable], tables: &mut Vec<TableSnapshot>) -> Result<()> {
        self.drop_old_foreign_keys(desired, tables).await?;
        self.create_new_tables(desired, tables).await?;
        self.drop_removed_columns(desired, tables).await?;
        self.add_new_columns(desired, tables).await?;
        self.update_existing_columns(desired, tables).await?;
        self.update_primary_keys(desired, tables).await?;
        self.create_foreign_keys(desired, tables).await?;
        self.create_indices(desired, tables).await
    }

    async fn drop_old_foreign_keys(
        &self,
        desired: &[DesiredTable],
        tables: &mut [TableSnapshot],
    ) -> Result<()> {
        for wanted in desired {
            let Some(table) = tables.iter_mut().find(|t| t.name == wanted.name) else {
                continue;
            };
            let stale = plan::stale_foreign_keys(table, wanted);
            if stale.is_empty() {
                continue;
            }

            self.logger.log_schema_build(&format!(
                "dropping old foreign keys of {}: {}",
                table.name,
                join_names(stale.iter().map(|fk| fk.name.as_str()))
            ));
            table.remove_foreign_keys(&stale);
            self.driver.drop_foreign_keys(table, &stale).await?;
        }
        Ok(())
    }

    async fn create_new_tables(
        &self,
        desired: &[DesiredTable],
        tables: &mut Vec<TableSnapshot>,
    ) -> Result<()> {
        for wanted in desired {
            if tables.iter().any(|t| t.name == wanted.name) {
                continue;
            }

            self.logger
                .log_schema_build(&format!("creating a new table: {}", wanted.name));
            let table = plan::new_table(wanted);
            self.driver.create_table(&table).await?;
            tables.push(table);
        }
        Ok(())
    }

    async fn drop_removed_columns(
        &self,
        desired: &[DesiredTable],
        tables: &mut [TableSnapshot],
    ) -> Result<()> {
        for wanted in desired {
            let Some(position) = tables.iter().position(|t| t.name == wanted.name) else {
                continue;
            };
            let dropped = plan::dropped_columns(&tables[position], wanted);
            if dropped.is_empty() {
                continue;
            }

            for column in &dropped {
                self.drop_referencing_constraints(tables, position, &column.name)
                    .await?;
            }

            let table = &mut tables[position];
            let names: Vec<&str> = dropped.iter().map(|c| c.name.as_str()).collect();
            self.logger.log_schema_build(&format!(
                "columns dropped in {}: {}",
                table.name,
                names.join(", ")
            ));
            table.remove_columns(&names);
            self.driver.drop_columns(table, &dropped).await?;
        }
        Ok(())
    }

    async fn add_new_columns(
        &self,
        desired: &[DesiredTable],
        tables: &mut [TableSnapshot],
    ) -> Result<()> {
        for wanted in desired {
            let Some(table) = tables.iter_mut().find(|t| t.name == wanted.name) else {
                continue;
            };
            let added = plan::added_columns(table, wanted);
            if added.is_empty() {
                continue;
            }

            self.logger.log_schema_build(&format!(
                "new columns added to {}: {}",
                table.name,
                join_names(added.iter().map(|c| c.name.as_str()))
            ));
            table.columns.extend(added.iter().cloned());
            self.driver.add_columns(table, &added).await?;
        }
        Ok(())
    }

    async fn update_existing_columns(
        &self,
        desired: &[DesiredTable],
        tables: &mut [TableSnapshot],
    ) -> Result<()> {
        for wanted in desired {
            let Some(position) = tables.iter().position(|t| t.name == wanted.name) else {
                continue;
            };
            let changes = plan::changed_columns(&tables[position], wanted, |live, new| {
                self.driver.columns_equal(live, new)
            })?;
            if changes.is_empty() {
                continue;
            }

            for change in &changes {
                self.drop_referencing_constraints(tables, position, &change.old.name)
                    .await?;
            }

            let table = &mut tables[position];
            self.logger.log_schema_build(&format!(
                "columns changed in {}: {}",
                table.name,
                join_names(changes.iter().map(|c| c.old.name.as_str()))
            ));
            for change in &changes {
                table.replace_column(change.new.clone());
            }
            self.driver.change_columns(table, &changes).await?;
        }
        Ok(())
    }

    async fn update_primary_keys(
        &self,
        desired: &[DesiredTable],
        tables: &mut [TableSnapshot],
    ) -> Result<()> {
        for wanted in desired {
            let Some(table) = tables.iter_mut().find(|t| t.name == wanted.name) else {
                continue;
            };
            let Some(changes) = plan::primary_key_changes(table, wanted) else {
                continue;
            };

            self.logger.log_schema_build(&format!(
                "primary keys of {} has changed: dropped - {}; added - {}",
                table.name,
                join_names(changes.dropped.iter().map(|pk| pk.column_name.as_str())),
                join_names(changes.added.iter().map(|pk| pk.column_name.as_str()))
            ));
            table.remove_primary_keys(&changes.dropped);
            table.primary_keys.extend(changes.added);
            self.driver.update_primary_keys(table).await?;
        }
        Ok(())
    }

    async fn create_foreign_keys(
        &self,
        desired: &[DesiredTable],
        tables: &mut [TableSnapshot],
    ) -> Result<()> {
        for wanted in desired {
            let Some(table) = tables.iter_mut().find(|t| t.name == wanted.name) else {
                continue;
            };
            let new = plan::new_foreign_keys(table, wanted);
            if new.is_empty() {
                continue;
            }

            self.logger.log_schema_build(&format!(
                "creating foreign keys: {} on {}",
                join_names(new.iter().map(|fk| fk.name.as_str())),
                table.name
            ));
            table.foreign_keys.extend(new.iter().cloned());
            self.driver.create_foreign_keys(table, &new).await?;
        }
        Ok(())
    }

    async fn create_indices(
        &self,
        desired: &[DesiredTable],
        tables: &mut [TableSnapshot],
    ) -> Result<()> {
        for wanted in desired {
            let Some(table) = tables.iter_mut().find(|t| t.name == wanted.name) else {
                continue;
            };
            let changes = plan::index_changes(table, wanted);
            if changes.is_empty() {
                continue;
            }

            if !changes.dropped.is_empty() {
                self.logger.log_schema_build(&format!(
                    "dropping old indices of {}: {}",
                    table.name,
                    join_names(changes.dropped.iter().map(|i| i.name.as_str()))
                ));
            }
            if !changes.created.is_empty() {
                self.logger.log_schema_build(&format!(
                    "adding new indices {} in table {}",
                    join_names(changes.created.iter().map(|i| i.name.as_str())),
                    table.name
                ));
            }

            table.remove_indices(&changes.dropped);
            table.indices.extend(changes.created.iter().cloned());

            let table: &TableSnapshot = table;
            let drops = changes
                .dropped
                .iter()
                .map(|index| self.driver.drop_index(table, index));
            let creates = changes
                .created
                .iter()
                .map(|index| self.driver.create_index(table, index));
            try_join(try_join_all(drops), try_join_all(creates)).await?;
        }
        Ok(())
    }

    /// Drops every foreign key and index involving `tables[position].column`,
    /// updating the owning snapshots first.
    async fn drop_referencing_constraints(
        &self,
        tables: &mut [TableSnapshot],
        position: usize,
        column: &str,
    ) -> Result<()> {
        let table_name = tables[position].name.clone();

        let foreign_keys = plan::referencing_foreign_keys(tables, &table_name, column);
        if !foreign_keys.is_empty() {
            self.logger.log_schema_build(&format!(
                "dropping related foreign keys of {}#{}: {}",
                table_name,
                column,
                join_names(
                    foreign_keys
                        .iter()
                        .flat_map(|(_, keys)| keys.iter().map(|fk| fk.name.as_str()))
                )
            ));
            for (owner, keys) in &foreign_keys {
                let owner = &mut tables[*owner];
                owner.remove_foreign_keys(keys);
                self.driver.drop_foreign_keys(owner, keys).await?;
            }
        }

        let indices = plan::referencing_indices(&tables[position], column);
        if !indices.is_empty() {
            self.logger.log_schema_build(&format!(
                "dropping related indices of {}#{}: {}",
                table_name,
                column,
                join_names(indices.iter().map(|i| i.name.as_str()))
            ));
            let table = &mut tables[position];
            table.remove_indices(&indices);
            for index in &indices {
                self.driver.drop_index(table, index).await?;
            }
        }
        Ok(())
    }
}
