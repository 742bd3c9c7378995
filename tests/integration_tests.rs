//! Cross-Component Integration Tests
//!
//! These tests exercise the path from a settings.php file on disk through
//! profile resolution, gateway construction, and the read-only guard. They
//! run without a database; tests that need a live MySQL/PostgreSQL instance
//! are marked `#[ignore]` and run with:
//! `cargo test -- --ignored`

use std::io::Write;

use pretty_assertions::assert_eq;

use drupalgate::{
    load_profile, validate, ConnectionProfile, DatabaseGateway, DriverKind, TablePrefix,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Write a settings.php fixture into its own temp directory
fn write_settings(content: &str) -> (tempdir::TempDirGuard, std::path::PathBuf) {
    let dir = tempdir::unique_dir("drupalgate_it");
    let path = dir.path().join("settings.php");
    let mut f = std::fs::File::create(&path).expect("failed to create fixture");
    f.write_all(content.as_bytes()).expect("failed to write fixture");
    (dir, path)
}

/// Minimal temp-dir helper; std-only so tests carry no extra dependency
mod tempdir {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    pub struct TempDirGuard(PathBuf);

    impl TempDirGuard {
        pub fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    pub fn unique_dir(tag: &str) -> TempDirGuard {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let thread_id = std::thread::current().id();
        let dir = std::env::temp_dir().join(format!("{tag}_{thread_id:?}_{id}"));
        std::fs::create_dir_all(&dir).expect("failed to create temp dir");
        TempDirGuard(dir)
    }
}

// ============================================================================
// Settings File to Profile
// ============================================================================

#[test]
fn test_load_profile_from_file() {
    let (_dir, path) = write_settings(
        r#"<?php
$databases['default']['default'] = array(
  'driver' => 'mysql',
  'database' => 'drupal9',
  'username' => 'dbuser',
  'password' => 'dbpass',
  'host' => 'localhost',
  'port' => '3306',
  'prefix' => 'drp_',
);
"#,
    );

    let profile = load_profile(&path, "default").expect("profile should resolve");
    assert_eq!(profile.driver, DriverKind::Mysql);
    assert_eq!(profile.database, "drupal9");
    assert_eq!(profile.username, "dbuser");
    assert_eq!(profile.prefix, TablePrefix::Single("drp_".to_string()));
}

#[test]
fn test_load_profile_missing_file_is_config_parse() {
    let err = load_profile(std::path::Path::new("/nonexistent/settings.php"), "default")
        .expect_err("missing file should fail");
    assert_eq!(err.error_code(), "CONFIG_PARSE");
    assert!(err.message().contains("unreadable_file"));
}

#[test]
fn test_ddev_sibling_overrides_host_and_port_only() {
    let (dir, path) = write_settings(
        r#"<?php
$databases['default']['default'] = array(
  'driver' => 'mysql',
  'database' => 'prod_db',
  'username' => 'prod_user',
  'password' => 'prod_pass',
  'host' => 'db.prod.internal',
  'port' => '3306',
);
"#,
    );

    // DDEV drops a sibling file with its container's host/port.
    std::fs::write(
        dir.path().join("settings.ddev.php"),
        r#"<?php
$databases['default']['default'] = array(
  'driver' => 'mysql',
  'database' => 'db',
  'username' => 'db',
  'password' => 'db',
  'host' => 'ddev-db',
  'port' => '33060',
);
"#,
    )
    .expect("failed to write ddev sibling");

    let profile = load_profile(&path, "default").expect("profile should resolve");

    // host/port come from the sibling; identity fields never change.
    assert_eq!(profile.host, "ddev-db");
    assert_eq!(profile.port, 33060);
    assert_eq!(profile.database, "prod_db");
    assert_eq!(profile.username, "prod_user");
    assert_eq!(profile.password, "prod_pass");
    assert_eq!(profile.driver, DriverKind::Mysql);
}

#[test]
fn test_profile_independent_of_surrounding_noise() {
    let noisy = r#"<?php
// Lots of unrelated settings first.
$settings['update_free_access'] = FALSE;
$settings['container_yamls'][] = $app_root . '/' . $site_path . '/services.yml';
/**
 * Database configuration:
 */
$databases['default']['default'] = [
  'database' => 'site',
  'username' => 'svc',
  'password' => 'pw',
  'host' => 'db',
  'driver' => 'pgsql',
];
$config['system.logging']['error_level'] = 'hide';
"#;
    let clean = r#"<?php
$databases['default']['default'] = [
  'database' => 'site',
  'username' => 'svc',
  'password' => 'pw',
  'host' => 'db',
  'driver' => 'pgsql',
];
"#;

    let (_d1, p1) = write_settings(noisy);
    let (_d2, p2) = write_settings(clean);
    let a = load_profile(&p1, "default").unwrap();
    let b = load_profile(&p2, "default").unwrap();

    assert_eq!(a.database, b.database);
    assert_eq!(a.username, b.username);
    assert_eq!(a.host, b.host);
    assert_eq!(a.port, b.port);
    assert_eq!(a.driver, b.driver);
}

// ============================================================================
// Guard Contract
// ============================================================================

#[test]
fn test_caller_sql_accepted_unchanged() {
    let sql = "SELECT * FROM {node_field_data} LIMIT 10";
    assert_eq!(validate(sql).unwrap(), sql);
}

#[test]
fn test_guard_rejection_reasons() {
    let cases = [
        ("SELECT 1; DROP TABLE x;", "multiple_statements"),
        ("DROP TABLE x", "not_select"),
        ("UPDATE x SET y=1", "not_select"),
        ("SELECT 1 WHERE 0 IN (INSERT INTO t VALUES (1))", "forbidden_keyword"),
    ];
    for (sql, reason) in cases {
        let err = validate(sql).expect_err(sql);
        assert!(
            err.message().contains(reason),
            "expected {reason} for {sql:?}, got {}",
            err.message()
        );
    }
}

// ============================================================================
// Gateway Behavior Without a Database
// ============================================================================

fn offline_profile(driver: DriverKind) -> ConnectionProfile {
    ConnectionProfile {
        driver,
        // Reserved TEST-NET address: connections fail fast, nothing listens.
        host: "192.0.2.1".to_string(),
        port: driver.default_port(),
        database: "drupal".to_string(),
        username: "u".to_string(),
        password: "p".to_string(),
        prefix: TablePrefix::Single("drp_".to_string()),
        extra: Default::default(),
    }
}

#[tokio::test]
async fn test_execute_guard_runs_before_connection() {
    let gateway = DatabaseGateway::new(offline_profile(DriverKind::Mysql));
    let err = gateway.execute("DELETE FROM x", &[], None).await.unwrap_err();
    // Guard rejection, not a connection error: validation happens first.
    assert_eq!(err.error_code(), "VALIDATION");
}

#[tokio::test]
async fn test_unreachable_host_is_connection_or_timeout() {
    let gateway = DatabaseGateway::new(offline_profile(DriverKind::Mysql));
    let err = gateway
        .list_tables(Some(std::time::Duration::from_millis(300)))
        .await
        .unwrap_err();
    // Either the TCP connect fails fast or the timeout bound fires; both
    // are acceptable and distinguishable from a validation error.
    assert!(
        matches!(err.error_code(), "CONNECTION_FAILED" | "TIMEOUT"),
        "got: {}",
        err.error_code()
    );
}

// ============================================================================
// Live-Database Tests (ignored unless infrastructure is present)
// ============================================================================

/// Environment-driven live test against MySQL.
/// Set DRUPALGATE_TEST_SETTINGS to a settings.php pointing at a test site.
#[tokio::test]
#[ignore] // Requires a running Drupal MySQL database
async fn test_live_list_tables_and_schema() {
    let settings = std::env::var("DRUPALGATE_TEST_SETTINGS")
        .expect("set DRUPALGATE_TEST_SETTINGS to run live tests");
    let profile = load_profile(std::path::Path::new(&settings), "default").unwrap();
    let gateway = DatabaseGateway::new(profile);

    let tables = gateway.list_tables(None).await.expect("list_tables should succeed");
    assert!(!tables.is_empty(), "a Drupal database has tables");

    let schema = gateway.get_table_schema("node_field_data", None).await.unwrap();
    assert!(schema.columns.iter().any(|c| c.name == "nid"));
    assert!(schema.columns.iter().any(|c| c.name == "title"));

    let missing = gateway.get_table_schema("definitely_not_a_table", None).await.unwrap_err();
    assert_eq!(missing.error_code(), "NOT_FOUND");
}

/// Cross-engine equivalence: the composed list queries return identical
/// record sets from two engines holding the same logical schema.
#[tokio::test]
#[ignore] // Requires both engines loaded with the same fixture data
async fn test_cross_engine_content_type_records_match() {
    use drupalgate::EntityComposer;

    let mysql_settings = std::env::var("DRUPALGATE_TEST_SETTINGS")
        .expect("set DRUPALGATE_TEST_SETTINGS to run live tests");
    let pgsql_settings = std::env::var("DRUPALGATE_TEST_SETTINGS_PG")
        .expect("set DRUPALGATE_TEST_SETTINGS_PG to run live tests");

    let mysql_gw = DatabaseGateway::new(
        load_profile(std::path::Path::new(&mysql_settings), "default").unwrap(),
    );
    let pgsql_gw = DatabaseGateway::new(
        load_profile(std::path::Path::new(&pgsql_settings), "default").unwrap(),
    );

    let a = EntityComposer::new(&mysql_gw, None).list_content_types().await.unwrap();
    let b = EntityComposer::new(&pgsql_gw, None).list_content_types().await.unwrap();
    assert_eq!(a, b);

    let a = EntityComposer::new(&mysql_gw, None).list_vocabularies().await.unwrap();
    let b = EntityComposer::new(&pgsql_gw, None).list_vocabularies().await.unwrap();
    assert_eq!(a, b);
}
