//! Database Engine Types and Dispatch
//!
//! This module defines the shared vocabulary both engines normalize into
//! (table schemas, column types, query results) plus the tagged
//! `EngineSession` the gateway dispatches through.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent: `engine::mysql`
//! and `engine::postgres` share no SQL text. Adding an engine means adding
//! a `DriverKind`/`EngineSession` variant, not branching on driver strings
//! at call sites.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::settings::ConnectionProfile;

pub mod mysql;
pub mod postgres;

/// Supported database engines
///
/// The closed set of drivers a Drupal settings file can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// MySQL / MariaDB (`driver => 'mysql'`)
    Mysql,
    /// PostgreSQL (`driver => 'pgsql'`)
    Pgsql,
}

impl DriverKind {
    /// Parse the driver string as it appears in settings.php
    #[must_use]
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "mysql" => Some(Self::Mysql),
            "pgsql" => Some(Self::Pgsql),
            _ => None,
        }
    }

    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Pgsql => "pgsql",
        }
    }

    /// Engine default port, used when settings.php omits one
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Pgsql => 5432,
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engine-independent column type vocabulary
///
/// Raw engine type names map through a fixed lookup table; anything
/// unrecognized becomes `Other` rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizedType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Text,
    Binary,
    Other,
}

impl NormalizedType {
    /// Map a MySQL `information_schema` data type
    #[must_use]
    pub fn from_mysql(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "char" | "varchar" | "enum" | "set" => Self::String,
            "tinyint" | "smallint" | "mediumint" | "int" | "bigint" | "year" => Self::Integer,
            "decimal" | "numeric" | "float" | "double" => Self::Float,
            "bit" | "bool" | "boolean" => Self::Boolean,
            "date" | "datetime" | "timestamp" | "time" => Self::Datetime,
            "tinytext" | "text" | "mediumtext" | "longtext" | "json" => Self::Text,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                Self::Binary
            }
            _ => Self::Other,
        }
    }

    /// Map a PostgreSQL `information_schema` data type
    #[must_use]
    pub fn from_pg(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "character varying" | "character" | "varchar" | "char" | "name" | "uuid" => {
                Self::String
            }
            "smallint" | "integer" | "bigint" | "smallserial" | "serial" | "bigserial" => {
                Self::Integer
            }
            "numeric" | "decimal" | "real" | "double precision" => Self::Float,
            "boolean" => Self::Boolean,
            "date" | "time without time zone" | "time with time zone"
            | "timestamp without time zone" | "timestamp with time zone" => Self::Datetime,
            "text" | "json" | "jsonb" | "xml" => Self::Text,
            "bytea" => Self::Binary,
            _ => Self::Other,
        }
    }
}

/// One column of an introspected table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Engine-independent type
    pub normalized_type: NormalizedType,

    /// Raw engine type string, for callers that need the detail
    pub raw_type: String,

    /// Whether column allows NULL values
    pub nullable: bool,

    /// Whether column is part of the primary key
    pub is_key: bool,
}

/// Introspected table schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Prefixed table name as it exists in the database
    pub name: String,

    /// Columns in ordinal order
    pub columns: Vec<ColumnInfo>,
}

/// Query execution result
///
/// Rows are positional, matching `columns`; order is engine result order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result set
    pub columns: Vec<String>,

    /// Result rows (positional values, JSON-safe)
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    /// Number of rows in the result
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A value bound into a parameterized query
///
/// The composer and the `execute_sql` action only ever bind integers and
/// text; values never travel inside the SQL string.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl SqlParam {
    /// Coerce a JSON argument into a bindable parameter
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Self::Int),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Int(i64::from(*b))),
            _ => None,
        }
    }
}

/// One live engine connection
///
/// The gateway holds at most one session at a time; a session that fails or
/// times out is discarded, and the next call opens a fresh one.
pub enum EngineSession {
    Mysql(mysql::MysqlSession),
    Pgsql(postgres::PgSession),
}

impl EngineSession {
    /// Open a connection for the profile's engine
    ///
    /// A single attempt; failures surface as `ConnectionFailed` and are not
    /// retried here.
    pub async fn open(profile: &ConnectionProfile) -> Result<Self> {
        match profile.driver {
            DriverKind::Mysql => Ok(Self::Mysql(mysql::MysqlSession::open(profile).await?)),
            DriverKind::Pgsql => Ok(Self::Pgsql(postgres::PgSession::open(profile).await?)),
        }
    }

    /// List base table names in the connected database
    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        match self {
            Self::Mysql(s) => s.list_tables().await,
            Self::Pgsql(s) => s.list_tables().await,
        }
    }

    /// Introspect one table (already-prefixed name)
    ///
    /// Returns an empty column list when the table does not exist; the
    /// gateway maps that to `NotFound`.
    pub async fn table_schema(&mut self, table: &str) -> Result<TableSchema> {
        match self {
            Self::Mysql(s) => s.table_schema(table).await,
            Self::Pgsql(s) => s.table_schema(table).await,
        }
    }

    /// Execute a parameterized statement
    ///
    /// `sql` uses `?` placeholders; the postgres session rewrites them to
    /// `$n` form internally.
    pub async fn run(&mut self, sql: &str, params: &[SqlParam]) -> Result<QueryResult> {
        match self {
            Self::Mysql(s) => s.run(sql, params).await,
            Self::Pgsql(s) => s.run(sql, params).await,
        }
    }
}
