//! Database Gateway
//!
//! Facade over one engine session, selected once at construction from the
//! profile's driver. The gateway is the only shared mutable resource in the
//! process: the session lives behind an async mutex so concurrent tool
//! calls are safe, and it is opened lazily - one attempt per call chain,
//! re-established on the next call after a failure.
//!
//! # Prefixing
//! Schema operations are internal and always prefixed: `get_table_schema`
//! applies the configured prefix to its argument exactly once. Caller SQL
//! through `execute` is never prefixed or rewritten; only the composed
//! queries built inside this crate go through `{table}` expansion.

use std::time::Duration;

use tokio::sync::Mutex;

use crate::engine::{DriverKind, EngineSession, QueryResult, SqlParam, TableSchema};
use crate::error::{GatewayError, Result};
use crate::guard;
use crate::settings::ConnectionProfile;

/// Gateway over one connection profile
pub struct DatabaseGateway {
    profile: ConnectionProfile,
    session: Mutex<Option<EngineSession>>,
}

impl DatabaseGateway {
    /// Create a gateway; no connection is opened until the first call
    #[must_use]
    pub fn new(profile: ConnectionProfile) -> Self {
        Self { profile, session: Mutex::new(None) }
    }

    /// The profile this gateway serves
    #[must_use]
    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Engine variant in use
    #[must_use]
    pub fn driver(&self) -> DriverKind {
        self.profile.driver
    }

    /// List base table names (physical names, as stored in the database)
    pub async fn list_tables(&self, timeout: Option<Duration>) -> Result<Vec<String>> {
        let mut guard = self.session.lock().await;
        let session = ensure_session(&mut *guard, &self.profile).await?;

        let out = bound(timeout, session.list_tables()).await;
        if out.is_err() {
            *guard = None;
        }
        out
    }

    /// Introspect a table by its unprefixed base name
    ///
    /// The configured prefix is applied exactly once before dispatch. A
    /// table with zero introspected columns yields `NotFound`.
    pub async fn get_table_schema(
        &self,
        table: &str,
        timeout: Option<Duration>,
    ) -> Result<TableSchema> {
        let physical = self.profile.prefix.apply(table);

        let mut guard = self.session.lock().await;
        let session = ensure_session(&mut *guard, &self.profile).await?;

        let out = bound(timeout, session.table_schema(&physical)).await;
        match out {
            Ok(schema) if schema.columns.is_empty() => {
                Err(GatewayError::not_found(format!("table '{physical}' does not exist")))
            }
            Ok(schema) => Ok(schema),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    /// True when the prefixed form of `table` exists
    pub async fn table_exists(&self, table: &str, timeout: Option<Duration>) -> Result<bool> {
        match self.get_table_schema(table, timeout).await {
            Ok(_) => Ok(true),
            Err(GatewayError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Execute caller-supplied SQL
    ///
    /// The statement passes through the read-only guard; no prefix
    /// substitution happens - `{}` tokens stay literal.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
        timeout: Option<Duration>,
    ) -> Result<QueryResult> {
        let sql = guard::validate(sql)?;
        self.run(&sql, params, timeout).await
    }

    /// Execute an internally composed template
    ///
    /// `{table}` tokens expand through the configured prefix before
    /// execution. Only this crate's fixed templates take this path.
    pub(crate) async fn execute_composed(
        &self,
        template: &str,
        params: &[SqlParam],
        timeout: Option<Duration>,
    ) -> Result<QueryResult> {
        let sql = guard::expand_table_tokens(template, &self.profile.prefix);
        self.run(&sql, params, timeout).await
    }

    async fn run(
        &self,
        sql: &str,
        params: &[SqlParam],
        timeout: Option<Duration>,
    ) -> Result<QueryResult> {
        let mut guard = self.session.lock().await;
        let session = ensure_session(&mut *guard, &self.profile).await?;

        let out = bound(timeout, session.run(sql, params)).await;
        if out.is_err() {
            // A failed or timed-out session is never reused; the next call
            // opens a fresh one.
            *guard = None;
        }
        out
    }
}

/// Open the session lazily under the lock
async fn ensure_session<'a>(
    slot: &'a mut Option<EngineSession>,
    profile: &ConnectionProfile,
) -> Result<&'a mut EngineSession> {
    if slot.is_none() {
        tracing::debug!(driver = %profile.driver, host = %profile.host, "opening database session");
        *slot = Some(EngineSession::open(profile).await?);
    }
    match slot.as_mut() {
        Some(s) => Ok(s),
        None => Err(GatewayError::connection_failed("session unavailable")),
    }
}

/// Apply an optional timeout to an engine future
async fn bound<T>(
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(r) => r,
            Err(_) => Err(GatewayError::Timeout(d.as_millis() as u64)),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TablePrefix;
    use std::collections::BTreeMap;

    fn test_profile() -> ConnectionProfile {
        ConnectionProfile {
            driver: DriverKind::Mysql,
            host: "localhost".to_string(),
            port: 3306,
            database: "drupal".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            prefix: TablePrefix::Single("drp_".to_string()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_gateway_holds_profile() {
        let gw = DatabaseGateway::new(test_profile());
        assert_eq!(gw.driver(), DriverKind::Mysql);
        assert_eq!(gw.profile().database, "drupal");
    }

    #[tokio::test]
    async fn test_execute_rejects_non_select_before_connecting() {
        // The guard runs before any session is opened, so this fails with a
        // validation error even with no database around.
        let gw = DatabaseGateway::new(test_profile());
        let err = gw.execute("DROP TABLE x", &[], None).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_timeout_bound_fires() {
        let fut = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let err = bound(Some(Duration::from_millis(10)), fut).await.unwrap_err();
        assert_eq!(err.error_code(), "TIMEOUT");
    }

    #[tokio::test]
    async fn test_no_timeout_passes_through() {
        let fut = async { Ok(42) };
        assert_eq!(bound(None, fut).await.unwrap(), 42);
    }
}
