//! `PostgreSQL` Engine Session
//!
//! Implements the engine primitives for `PostgreSQL` databases.
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Table listing via `pg_catalog.pg_tables`, columns via
//!   `information_schema`
//! - Statements arrive with `?` placeholders and are rewritten to the
//!   driver's `$1..$n` form (string literals are left untouched)
//! - BYTEA data is Base64-encoded for JSON safety
//! - Timestamps convert to ISO 8601 strings

use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::engine::{ColumnInfo, NormalizedType, QueryResult, SqlParam, TableSchema};
use crate::error::{GatewayError, Result};
use crate::settings::ConnectionProfile;

/// One live `PostgreSQL` connection
pub struct PgSession {
    client: Client,
}

impl PgSession {
    /// Open a connection from the profile
    pub async fn open(profile: &ConnectionProfile) -> Result<Self> {
        let mut pg_config = Config::new();
        pg_config
            .host(&profile.host)
            .port(profile.port)
            .user(&profile.username)
            .password(&profile.password)
            .dbname(&profile.database);

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            GatewayError::connection_failed(format!("failed to connect to PostgreSQL: {e}"))
        })?;

        // Drive the connection in the background; errors surface on the
        // client side of the next call.
        tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(Self { client })
    }

    /// List base tables in the public schema
    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT tablename FROM pg_catalog.pg_tables
                 WHERE schemaname = 'public'
                 ORDER BY tablename",
                &[],
            )
            .await
            .map_err(|e| GatewayError::database("pgsql", format!("failed to list tables: {e}")))?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    /// Introspect one table's columns
    ///
    /// Returns a schema with zero columns when the table does not exist.
    pub async fn table_schema(&mut self, table: &str) -> Result<TableSchema> {
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type, is_nullable
                 FROM information_schema.columns
                 WHERE table_schema = 'public' AND table_name = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(|e| {
                GatewayError::database("pgsql", format!("failed to introspect {table}: {e}"))
            })?;

        let pk_columns = self.primary_key_columns(table).await?;

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let raw_type: String = row.get(1);
                let is_nullable: String = row.get(2);
                ColumnInfo {
                    is_key: pk_columns.contains(&name),
                    normalized_type: NormalizedType::from_pg(&raw_type),
                    nullable: is_nullable == "YES",
                    name,
                    raw_type,
                }
            })
            .collect();

        Ok(TableSchema { name: table.to_string(), columns })
    }

    /// Primary key column names for a table
    async fn primary_key_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT kcu.column_name
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                 WHERE tc.table_schema = 'public'
                   AND tc.table_name = $1
                   AND tc.constraint_type = 'PRIMARY KEY'
                 ORDER BY kcu.ordinal_position",
                &[&table],
            )
            .await
            .map_err(|e| {
                GatewayError::database("pgsql", format!("failed to read primary key: {e}"))
            })?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    /// Execute a parameterized statement
    pub async fn run(&mut self, sql: &str, params: &[SqlParam]) -> Result<QueryResult> {
        let sql = number_placeholders(sql);

        let stmt = self
            .client
            .prepare(&sql)
            .await
            .map_err(|e| GatewayError::database("pgsql", format!("failed to prepare: {e}")))?;

        let boxed: Vec<Box<dyn ToSql + Sync + Send>> = params
            .iter()
            .map(|p| match p {
                SqlParam::Int(i) => Box::new(*i) as Box<dyn ToSql + Sync + Send>,
                SqlParam::Text(s) => Box::new(s.clone()) as Box<dyn ToSql + Sync + Send>,
            })
            .collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            boxed.iter().map(|b| &**b as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client
            .query(&stmt, &refs)
            .await
            .map_err(|e| GatewayError::database("pgsql", format!("query failed: {e}")))?;

        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();

        let mut rows_data = Vec::with_capacity(rows.len());
        for row in &rows {
            rows_data.push(row_to_values(row)?);
        }

        Ok(QueryResult { columns, rows: rows_data })
    }
}

/// Rewrite `?` placeholders to `$1..$n`, skipping string literals
///
/// The shared statement templates use the MySQL placeholder style; this is
/// the only translation step between the two engines.
#[must_use]
pub fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut chars = sql.chars().peekable();
    let mut in_quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match in_quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    // Doubled quote is an escaped quote, stay in the literal.
                    if chars.peek() == Some(&q) {
                        out.push(chars.next().unwrap());
                    } else {
                        in_quote = None;
                    }
                }
            }
            None => match c {
                '\'' | '"' => {
                    in_quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(c),
            },
        }
    }

    out
}

/// Convert a `PostgreSQL` row to positional JSON-safe values
fn row_to_values(row: &Row) -> Result<Vec<serde_json::Value>> {
    let mut values = Vec::with_capacity(row.columns().len());
    for idx in 0..row.columns().len() {
        values.push(pg_value_to_json(row, idx)?);
    }
    Ok(values)
}

/// Convert a `PostgreSQL` value to a JSON value
fn pg_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    use tokio_postgres::types::Type;

    let col_type = row.columns()[idx].type_();

    macro_rules! take {
        ($t:ty, $map:expr) => {{
            let v: Option<$t> = row.try_get(idx).map_err(|e| {
                GatewayError::database(
                    "pgsql",
                    format!("failed to read {} column: {e}", col_type.name()),
                )
            })?;
            Ok(v.map_or(serde_json::Value::Null, $map))
        }};
    }

    match *col_type {
        Type::BOOL => take!(bool, serde_json::Value::Bool),

        Type::INT2 => take!(i16, |v| serde_json::Value::Number(v.into())),
        Type::INT4 => take!(i32, |v| serde_json::Value::Number(v.into())),
        Type::INT8 => take!(i64, |v| serde_json::Value::Number(v.into())),

        Type::FLOAT4 => take!(f32, |v| serde_json::Number::from_f64(f64::from(v))
            .map_or(serde_json::Value::Null, serde_json::Value::Number)),
        Type::FLOAT8 => take!(f64, |v| serde_json::Number::from_f64(v)
            .map_or(serde_json::Value::Null, serde_json::Value::Number)),

        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            take!(String, serde_json::Value::String)
        }

        Type::JSON | Type::JSONB => take!(serde_json::Value, |v| v),

        Type::BYTEA => take!(Vec<u8>, |v| {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(v))
        }),

        Type::TIMESTAMP => take!(chrono::NaiveDateTime, |v| serde_json::Value::String(
            v.format("%Y-%m-%dT%H:%M:%S").to_string()
        )),
        Type::TIMESTAMPTZ => take!(chrono::DateTime<chrono::Utc>, |v| serde_json::Value::String(
            v.to_rfc3339()
        )),
        Type::DATE => take!(chrono::NaiveDate, |v| serde_json::Value::String(
            v.format("%Y-%m-%d").to_string()
        )),
        Type::TIME => take!(chrono::NaiveTime, |v| serde_json::Value::String(
            v.format("%H:%M:%S").to_string()
        )),

        Type::UUID => take!(uuid::Uuid, |v| serde_json::Value::String(v.to_string())),

        // Anything else: fall back to text representation.
        _ => take!(String, serde_json::Value::String),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_number_placeholders_basic() {
        assert_eq!(
            number_placeholders("SELECT * FROM t WHERE a = ? AND b = ?"),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn test_number_placeholders_skips_string_literals() {
        assert_eq!(
            number_placeholders("SELECT 'what?' AS q, c FROM t WHERE id = ?"),
            "SELECT 'what?' AS q, c FROM t WHERE id = $1"
        );
    }

    #[test]
    fn test_number_placeholders_escaped_quote() {
        assert_eq!(
            number_placeholders("SELECT 'it''s?' FROM t WHERE id = ?"),
            "SELECT 'it''s?' FROM t WHERE id = $1"
        );
    }

    #[test]
    fn test_number_placeholders_none() {
        assert_eq!(number_placeholders("SELECT 1"), "SELECT 1");
    }
}
