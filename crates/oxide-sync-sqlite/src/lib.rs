//! SQLite driver for `oxide-sync`.
//!
//! ```rust,ignore
//! use oxide_sync::prelude::*;
//! use oxide_sync_sqlite::SqliteDriver;
//! use sqlx::sqlite::SqlitePoolOptions;
//!
//! let pool = SqlitePoolOptions::new().connect("sqlite:app.db").await?;
//! let driver = SqliteDriver::new(pool);
//! SchemaBuilder::new(&driver, &entities).build().await?;
//! ```

pub mod dialect;
pub mod driver;
pub mod introspect;

pub use dialect::SqliteDialect;
pub use driver::SqliteDriver;
