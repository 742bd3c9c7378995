//! Read-Only Query Validation
//!
//! This module enforces the read-only contract on caller-supplied SQL and
//! expands `{table}` placeholder tokens for the gateway's own composed
//! queries.
//!
//! # Validation Strategy
//! - Conservative pattern checks, not a SQL grammar
//! - Only SELECT statements pass; everything else is rejected
//! - A mutating-keyword denylist backstops the first-token check; it
//!   over-rejects ambiguous input rather than under-rejecting
//! - Values never pass through here; they bind as parameters downstream

use crate::error::{GatewayError, Result, ValidationReason};
use crate::settings::TablePrefix;

/// Keywords rejected anywhere outside a string literal
const FORBIDDEN: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REPLACE",
];

/// Validate caller-supplied SQL, returning the cleaned statement
///
/// Policy, in order: strip leading comments and whitespace; first token
/// must be SELECT; no statement separators outside string literals (one
/// trailing `;` is tolerated and stripped); no mutating keywords outside
/// string literals. `{}` tokens in caller SQL are left literal - callers
/// prefix their own table references.
pub fn validate(sql: &str) -> Result<String> {
    let sql = strip_leading_comments(sql).trim();

    if sql.is_empty() {
        return Err(GatewayError::validation(ValidationReason::InvalidInput, "query is empty"));
    }

    // Tolerate exactly one trailing statement terminator.
    let sql = sql.strip_suffix(';').map_or(sql, str::trim_end);

    let first = first_token(sql);
    if !first.eq_ignore_ascii_case("SELECT") {
        return Err(GatewayError::validation(
            ValidationReason::NotSelect,
            format!("only SELECT statements are allowed, got '{first}'"),
        ));
    }

    if has_bare_semicolon(sql) {
        return Err(GatewayError::validation(
            ValidationReason::MultipleStatements,
            "statement separator found before end of input",
        ));
    }

    if let Some(word) = find_forbidden_keyword(sql) {
        return Err(GatewayError::validation(
            ValidationReason::ForbiddenKeyword,
            format!("mutating keyword '{word}' is not allowed"),
        ));
    }

    Ok(sql.to_string())
}

/// Expand `{identifier}` tokens to prefixed table names
///
/// Only the gateway's internal composed queries go through this; arbitrary
/// caller SQL never does. Tokens inside string literals are left alone.
#[must_use]
pub fn expand_table_tokens(sql: &str, prefix: &TablePrefix) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        match in_quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    in_quote = Some(c);
                    out.push(c);
                }
                '{' => {
                    let start = i + 1;
                    let mut end = start;
                    while let Some(&(j, n)) = chars.peek() {
                        if n.is_ascii_alphanumeric() || n == '_' {
                            end = j + n.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if end > start && chars.peek().map(|&(_, n)| n) == Some('}') {
                        chars.next();
                        out.push_str(&prefix.apply(&sql[start..end]));
                    } else {
                        out.push('{');
                        out.push_str(&sql[start..end]);
                    }
                }
                _ => out.push(c),
            },
        }
    }

    out
}

/// Strip leading `--`, `#`, and `/* */` comments plus surrounding whitespace
fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--").or_else(|| rest.strip_prefix('#')) {
            rest = after.find('\n').map_or("", |n| &after[n + 1..]).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |n| &after[n + 2..]).trim_start();
        } else {
            return rest;
        }
    }
}

/// First whitespace-delimited token
fn first_token(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("")
}

/// True when a `;` occurs outside a string literal
///
/// The trailing terminator is already stripped by the time this runs, so
/// any hit means multiple statements.
fn has_bare_semicolon(sql: &str) -> bool {
    scan_outside_strings(sql, |c| c == ';')
}

/// Find the first denylisted keyword outside string literals
///
/// Word-boundary aware: `created` does not match CREATE, `{node_type}`
/// does not match anything.
fn find_forbidden_keyword(sql: &str) -> Option<&'static str> {
    let mut word = String::new();
    let mut found = None;

    let mut check = |word: &mut String| {
        if found.is_none() {
            if let Some(hit) = FORBIDDEN.iter().find(|k| word.eq_ignore_ascii_case(k)) {
                found = Some(*hit);
            }
        }
        word.clear();
    };

    let mut in_quote: Option<char> = None;
    for c in sql.chars() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    check(&mut word);
                    in_quote = Some(c);
                } else if c.is_ascii_alphanumeric() || c == '_' {
                    word.push(c);
                } else {
                    check(&mut word);
                }
            }
        }
    }
    check(&mut word);

    found
}

/// Run a character predicate over the statement, skipping string literals
fn scan_outside_strings(sql: &str, pred: impl Fn(char) -> bool) -> bool {
    let mut in_quote: Option<char> = None;
    for c in sql.chars() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    in_quote = Some(c);
                } else if pred(c) {
                    return true;
                }
            }
        }
    }
    false
}
