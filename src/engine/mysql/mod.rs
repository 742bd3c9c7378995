//! MySQL Engine Session
//!
//! Implements the engine primitives for MySQL databases (including MariaDB).
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Schema introspection via `information_schema`
//! - `?` placeholders bind positionally, native to the driver
//! - ENUM and SET types surface as strings
//! - BLOB data is Base64-encoded for JSON safety when not valid UTF-8

use mysql_async::{prelude::*, Conn, OptsBuilder, Params, Row, Value};

use crate::engine::{ColumnInfo, NormalizedType, QueryResult, SqlParam, TableSchema};
use crate::error::{GatewayError, Result};
use crate::settings::ConnectionProfile;

/// One live MySQL connection plus the database name introspection needs
pub struct MysqlSession {
    conn: Conn,
    database: String,
}

impl MysqlSession {
    /// Open a connection from the profile
    pub async fn open(profile: &ConnectionProfile) -> Result<Self> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(profile.host.clone())
            .tcp_port(profile.port)
            .user(Some(profile.username.clone()))
            .pass(Some(profile.password.clone()))
            .db_name(Some(profile.database.clone()));

        let conn = Conn::new(opts).await.map_err(|e| {
            GatewayError::connection_failed(format!("failed to connect to MySQL: {e}"))
        })?;

        Ok(Self { conn, database: profile.database.clone() })
    }

    /// List base tables in the connected database
    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        let query = "SELECT table_name
                     FROM information_schema.tables
                     WHERE table_schema = ?
                     AND table_type = 'BASE TABLE'
                     ORDER BY table_name";

        let rows: Vec<Row> = self
            .conn
            .exec(query, (self.database.as_str(),))
            .await
            .map_err(|e| GatewayError::database("mysql", format!("failed to list tables: {e}")))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0).ok_or_else(|| {
                GatewayError::database("mysql", "failed to extract table name".to_string())
            })?;
            tables.push(name);
        }
        Ok(tables)
    }

    /// Introspect one table's columns
    ///
    /// Returns a schema with zero columns when the table does not exist.
    pub async fn table_schema(&mut self, table: &str) -> Result<TableSchema> {
        let query = "SELECT column_name, data_type, is_nullable, column_key
                     FROM information_schema.columns
                     WHERE table_schema = ? AND table_name = ?
                     ORDER BY ordinal_position";

        let rows: Vec<Row> = self
            .conn
            .exec(query, (self.database.as_str(), table))
            .await
            .map_err(|e| {
                GatewayError::database("mysql", format!("failed to introspect {table}: {e}"))
            })?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0).ok_or_else(|| {
                GatewayError::database("mysql", "failed to extract column name".to_string())
            })?;
            let raw_type: String = row.get(1).ok_or_else(|| {
                GatewayError::database("mysql", "failed to extract data type".to_string())
            })?;
            let is_nullable: String = row.get(2).ok_or_else(|| {
                GatewayError::database("mysql", "failed to extract nullable flag".to_string())
            })?;
            let column_key: String = row.get(3).unwrap_or_default();

            columns.push(ColumnInfo {
                name,
                normalized_type: NormalizedType::from_mysql(&raw_type),
                nullable: is_nullable == "YES",
                is_key: column_key == "PRI",
                raw_type,
            });
        }

        Ok(TableSchema { name: table.to_string(), columns })
    }

    /// Execute a parameterized statement
    pub async fn run(&mut self, sql: &str, params: &[SqlParam]) -> Result<QueryResult> {
        let bound = if params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(params.iter().map(param_to_value).collect())
        };

        let mut result = self
            .conn
            .exec_iter(sql, bound)
            .await
            .map_err(|e| GatewayError::database("mysql", format!("query failed: {e}")))?;

        // Column metadata is available even for empty result sets.
        let columns: Vec<String> = result
            .columns()
            .map(|cols| cols.iter().map(|c| c.name_str().to_string()).collect())
            .unwrap_or_default();

        let raw_rows: Vec<Row> = result
            .collect()
            .await
            .map_err(|e| GatewayError::database("mysql", format!("failed to read rows: {e}")))?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for row in &raw_rows {
            rows.push(row_to_values(row)?);
        }

        Ok(QueryResult { columns, rows })
    }
}

/// Convert a bound parameter to the driver's value type
fn param_to_value(param: &SqlParam) -> Value {
    match param {
        SqlParam::Int(i) => Value::Int(*i),
        SqlParam::Text(s) => Value::Bytes(s.clone().into_bytes()),
    }
}

/// Convert a MySQL row to positional JSON-safe values
fn row_to_values(row: &Row) -> Result<Vec<serde_json::Value>> {
    let mut values = Vec::with_capacity(row.columns_ref().len());
    for idx in 0..row.columns_ref().len() {
        values.push(mysql_value_to_json(row, idx)?);
    }
    Ok(values)
}

/// Convert a MySQL value to a JSON value
fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row.as_ref(idx).ok_or_else(|| {
        GatewayError::database("mysql", format!("failed to get value at index {idx}"))
    })?;

    let json_value = match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => {
            // Try UTF-8 first; binary data is Base64-encoded.
            if let Ok(s) = std::str::from_utf8(bytes) {
                serde_json::Value::String(s.to_string())
            } else {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                serde_json::Value::String(encoded)
            }
        }

        Value::Int(i) => serde_json::Value::Number((*i).into()),

        Value::UInt(u) => serde_json::json!(*u),

        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Date(year, month, day, hour, minute, second, micro) => {
            serde_json::Value::String(format!(
                "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"
            ))
        }

        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    };

    Ok(json_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conversion() {
        assert_eq!(param_to_value(&SqlParam::Int(7)), Value::Int(7));
        assert_eq!(
            param_to_value(&SqlParam::Text("abc".to_string())),
            Value::Bytes(b"abc".to_vec())
        );
    }

    // Connection-level behavior needs a running MySQL instance and is
    // covered by the gateway integration tests run with --ignored.
}
