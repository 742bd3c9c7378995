//! Drupalgate - Read-Only MCP Gateway for Drupal Databases
//!
//! Drupalgate gives AI agents read-only access to a Drupal site's database.
//! It recovers connection details from the site's own `settings.php`, speaks
//! to MySQL/MariaDB or PostgreSQL behind one schema/query surface, and
//! reassembles Drupal's piecewise entity storage (nodes, terms, users,
//! paragraphs) into flat records.
//!
//! # Core Principles
//! - Read-only by construction: every statement passes a SELECT-only guard
//! - No PHP evaluation: settings.php is scanned as text, never executed
//! - Explicit over implicit: one profile, resolved once at startup
//! - Values bind as parameters; SQL text never carries caller data
//!
//! # Module Organization
//! - [`error`] - Error taxonomy and stable error codes
//! - [`settings`] - settings.php extraction into a connection profile
//! - [`engine`] - Shared schema/result types and the two engine sessions
//! - [`gateway`] - The session-owning facade with prefixing and timeouts
//! - [`guard`] - Read-only SQL validation and `{table}` expansion
//! - [`entity`] - Fixed join templates for Drupal entity shapes
//! - [`mcp`] - JSON-RPC 2.0 stdio server exposing the tool actions

pub mod engine;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod mcp;
pub mod settings;

// Re-export commonly used types for convenience
pub use engine::{
    ColumnInfo, DriverKind, NormalizedType, QueryResult, SqlParam, TableSchema,
};
pub use entity::{EntityComposer, EntityRecord};
pub use error::{ConfigParseReason, GatewayError, Result, ValidationReason};
pub use gateway::DatabaseGateway;
pub use guard::validate;
pub use mcp::ServerContext;
pub use settings::{extract_profile, load_profile, ConnectionProfile, TablePrefix};
