//! Declarative schema synchronization for Rust.
//!
//! `oxide-sync` converges a live relational schema on a set of entity
//! definitions. Rather than replaying a migration history, it looks at what
//! the database has right now and issues the smallest sequence of DDL that
//! makes it match, inside a single transaction:
//! - Tables, columns, primary keys, foreign keys and indices are compared by
//!   name
//! - Columns are only dropped when they are no longer declared
//! - Any failure rolls back every change of the run
//!
//! # Architecture
//!
//! - **Metadata** - The desired tables (`EntityMetadata`), from code or JSON
//! - **Snapshots** - The live tables as a driver reports them
//! - **Plan** - Pure per-phase change planning over snapshots and metadata
//! - **Builder** - `SchemaBuilder`, which applies the plan phase by phase
//! - **Driver** - The `SchemaDriver` trait implemented per database
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_sync::prelude::*;
//!
//! let entities = vec![
//!     EntityMetadata::new("user")
//!         .column(ColumnMetadata::new("id", SqlType::Integer).primary().generated())
//!         .column(ColumnMetadata::new("name", SqlType::Varchar(100)).not_null()),
//!     EntityMetadata::new("post")
//!         .column(ColumnMetadata::new("id", SqlType::Integer).primary().generated())
//!         .column(ColumnMetadata::new("title", SqlType::Text).not_null())
//!         .column(ColumnMetadata::new("author_id", SqlType::Integer))
//!         .relation(RelationMetadata::many_to_one("author", "user", "author_id", "id"))
//!         .index_on(&["title"], false),
//! ];
//!
//! SchemaBuilder::new(&driver, &entities).build().await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Converge the database on entities.json
//! oxide-sync --database sqlite:app.db sync
//!
//! # Print the DDL without keeping it
//! oxide-sync sync --dry-run
//!
//! # Show the live tables as JSON
//! oxide-sync inspect
//! ```

pub mod builder;
pub mod diff;
pub mod driver;
pub mod error;
pub mod logger;
pub mod metadata;
pub mod plan;
pub mod schema;
pub mod snapshot;

pub use builder::{SchemaBuilder, SyncOptions};
pub use driver::SchemaDriver;
pub use error::{Result, SyncError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::builder::{SchemaBuilder, SyncOptions};
    pub use crate::diff::{diff_by_name, Named};
    pub use crate::driver::SchemaDriver;
    pub use crate::error::{Result, SyncError};
    pub use crate::logger::{NoopLogger, SchemaLogger, TracingLogger};
    pub use crate::metadata::{
        ColumnMetadata, EmbeddedMetadata, EntityMetadata, ForeignKeyMetadata, IndexMetadata,
        JoinColumn, RelationMetadata,
    };
    pub use crate::schema::{ForeignKeyAction, SqlType};
    pub use crate::snapshot::{
        ColumnChange, ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, PrimaryKeySnapshot,
        TableSnapshot,
    };
}
