//! Edge-Case Tests
//!
//! Awkward-but-real inputs for the settings scanner and the query guard:
//! odd quoting, comments in strange places, nested literals, and SQL that
//! tries to look innocent.

use pretty_assertions::assert_eq;

use drupalgate::{extract_profile, validate, DriverKind, TablePrefix};

// ============================================================================
// Settings Scanner
// ============================================================================

#[test]
fn test_whitespace_inside_subscripts() {
    let content = r#"<?php
$databases [ 'default' ] [ 'default' ] = array (
  'driver' => 'mysql', 'database' => 'd', 'username' => 'u',
);
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.database, "d");
}

#[test]
fn test_double_quoted_keys_and_values() {
    let content = r#"<?php
$databases["default"]["default"] = array(
  "driver" => "pgsql",
  "database" => "d9",
  "username" => "svc",
);
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.driver, DriverKind::Pgsql);
}

#[test]
fn test_comment_between_pairs() {
    let content = r#"<?php
$databases['default']['default'] = array(
  'driver' => 'mysql',
  // credentials from vault
  'database' => 'd',
  # old-style comment
  'username' => 'u',
  /* block
     comment */
  'password' => 'p',
);
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.password, "p");
}

#[test]
fn test_password_with_special_characters() {
    let content = r#"<?php
$databases['default']['default'] = array(
  'driver' => 'mysql',
  'database' => 'd',
  'username' => 'u',
  'password' => 'p@ss,word => with /* tricky */ bits',
);
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.password, "p@ss,word => with /* tricky */ bits");
}

#[test]
fn test_nested_prefix_does_not_break_outer_scan() {
    // The nested array must not terminate the outer literal early.
    let content = r#"<?php
$databases['default']['default'] = array(
  'driver' => 'mysql',
  'prefix' => array('default' => 'a_', 'node' => 'b_'),
  'database' => 'd',
  'username' => 'u',
);
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.database, "d");
    let TablePrefix::PerTable(map) = &p.prefix else { panic!("expected map") };
    assert_eq!(map.len(), 2);
}

#[test]
fn test_first_full_assignment_wins() {
    let content = r#"<?php
$databases['default']['default'] = ['driver' => 'mysql', 'database' => 'one', 'username' => 'u'];
$databases['default']['default'] = ['driver' => 'mysql', 'database' => 'two', 'username' => 'u'];
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.database, "one");
}

#[test]
fn test_other_targets_do_not_leak() {
    let content = r#"<?php
$databases['migrate']['default'] = ['driver' => 'pgsql', 'database' => 'legacy', 'username' => 'm'];
$databases['default']['default'] = ['driver' => 'mysql', 'database' => 'main', 'username' => 'u'];
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.driver, DriverKind::Mysql);
    assert_eq!(p.database, "main");
}

#[test]
fn test_integer_port_literal() {
    let content = r#"<?php
$databases['default']['default'] = ['driver' => 'mysql', 'database' => 'd', 'username' => 'u', 'port' => 3307];
"#;
    let p = extract_profile(content, "default", "default").unwrap();
    assert_eq!(p.port, 3307);
}

#[test]
fn test_empty_file_reports_not_found() {
    let err = extract_profile("", "default", "default").unwrap_err();
    assert!(err.message().contains("assignment_not_found"));
}

#[test]
fn test_databases_mentioned_in_comment_only() {
    let content = r#"<?php
// Configure $databases['default']['default'] below when deploying.
"#;
    let err = extract_profile(content, "default", "default").unwrap_err();
    assert!(err.message().contains("assignment_not_found"));
}

#[test]
fn test_unclosed_nested_array_is_unbalanced() {
    let content = r#"<?php
$databases['default']['default'] = array(
  'driver' => 'mysql',
  'prefix' => array('default' => 'a_',
  'database' => 'd',
  'username' => 'u',
"#;
    let err = extract_profile(content, "default", "default").unwrap_err();
    assert!(err.message().contains("unbalanced_literal"));
}

// ============================================================================
// Query Guard
// ============================================================================

#[test]
fn test_guard_cte_is_rejected() {
    // Stricter than general SQL tools on purpose: the first token must be
    // SELECT, so WITH-prefixed statements are turned away.
    let err = validate("WITH x AS (SELECT 1) SELECT * FROM x").unwrap_err();
    assert!(err.message().contains("not_select"));
}

#[test]
fn test_guard_comment_hidden_statement() {
    let err = validate("/* x */ DELETE FROM t").unwrap_err();
    assert!(err.message().contains("not_select"));
}

#[test]
fn test_guard_semicolon_then_comment_still_rejected() {
    let err = validate("SELECT 1; -- tail comment").unwrap_err();
    assert!(err.message().contains("multiple_statements"));
}

#[test]
fn test_guard_newlines_and_tabs() {
    let sql = "SELECT\n\tnid,\n\ttitle\nFROM {node_field_data}\nWHERE status = 1";
    assert_eq!(validate(sql).unwrap(), sql);
}

#[test]
fn test_guard_quoted_forbidden_words_pass() {
    let sql = "SELECT * FROM audit WHERE action IN ('INSERT', 'UPDATE', 'DELETE')";
    assert!(validate(sql).is_ok());
}

#[test]
fn test_guard_replace_function_over_rejected() {
    // REPLACE is on the denylist even though it is also a string function;
    // the guard over-rejects by design.
    let err = validate("SELECT REPLACE(name, 'a', 'b') FROM t").unwrap_err();
    assert!(err.message().contains("forbidden_keyword"));
}

#[test]
fn test_guard_case_mixing() {
    assert!(validate("SeLeCt * FROM t").is_ok());
    let err = validate("dRoP TABLE t").unwrap_err();
    assert!(err.message().contains("not_select"));
}
