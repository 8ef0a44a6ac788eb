//! Column types and referential actions.
//!
//! These are shared by the metadata layer (what the code declares) and the
//! snapshot layer (what the database holds). Rendering a type for a concrete
//! database is a driver concern, see [`SchemaDriver::normalize_type`].
//!
//! [`SchemaDriver::normalize_type`]: crate::driver::SchemaDriver::normalize_type

use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL data types a column can be declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Small integer (16-bit).
    SmallInt,
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean.
    Boolean,
    /// Date and time.
    DateTime,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp.
    Timestamp,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Numeric with precision and scale.
    Numeric(u8, u8),
    /// Binary large object.
    Blob,
    /// Binary data with max length.
    Binary(usize),
    /// Variable-length binary data.
    VarBinary(usize),
    /// JSON data.
    Json,
    /// UUID.
    Uuid,
    /// A vendor-specific type, passed through verbatim.
    Custom(String),
}

impl fmt::Display for SqlType {
    /// Renders the portable (ANSI-flavoured) spelling of the type.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("INTEGER"),
            Self::BigInt => f.write_str("BIGINT"),
            Self::SmallInt => f.write_str("SMALLINT"),
            Self::Text => f.write_str("TEXT"),
            Self::Varchar(len) => write!(f, "VARCHAR({len})"),
            Self::Char(len) => write!(f, "CHAR({len})"),
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::DateTime | Self::Timestamp => f.write_str("TIMESTAMP"),
            Self::Date => f.write_str("DATE"),
            Self::Time => f.write_str("TIME"),
            Self::Real => f.write_str("REAL"),
            Self::Double => f.write_str("DOUBLE PRECISION"),
            Self::Decimal(p, s) => write!(f, "DECIMAL({p}, {s})"),
            Self::Numeric(p, s) => write!(f, "NUMERIC({p}, {s})"),
            Self::Blob => f.write_str("BLOB"),
            Self::Binary(len) => write!(f, "BINARY({len})"),
            Self::VarBinary(len) => write!(f, "VARBINARY({len})"),
            Self::Json => f.write_str("JSON"),
            Self::Uuid => f.write_str("UUID"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses the SQL spelling reported by database catalogs.
    ///
    /// Unknown spellings map to [`ForeignKeyAction::NoAction`].
    #[must_use]
    pub fn from_sql(action: &str) -> Self {
        match action.trim().to_ascii_uppercase().as_str() {
            "RESTRICT" => Self::Restrict,
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }
}
