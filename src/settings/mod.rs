//! Drupal settings.php Extraction
//!
//! This module recovers database connection parameters from a Drupal
//! `settings.php` file without evaluating any PHP. The file is treated as
//! text and scanned with a small bracket-depth state machine; there is no
//! interpreter and no sandbox.
//!
//! # Recognized forms
//! - Full array assignment:
//!   `$databases['default']['default'] = array('driver' => 'mysql', ...);`
//!   (both `array()` and `[]` syntax, spanning any number of lines)
//! - Individual key assignments:
//!   `$databases['default']['default']['driver'] = 'mysql';`
//! - Simple scalar variables (`$host = "db";`) referenced from either form
//! - A nested `prefix` array, preserved as a per-table mapping
//!
//! # Named rules
//! Every heuristic branch is a named, independently testable rule:
//! `var-subst`, `array-literal`, `individual-assign`, `prefix-map`,
//! `scalar-coerce`, `port-default`, `dev-override`. See the unit tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::DriverKind;
use crate::error::{ConfigParseReason, GatewayError, Result};

/// Environment variable that overrides the parsed host (`dev-override` rule)
pub const HOST_OVERRIDE_ENV: &str = "DRUPAL_DB_HOST";

/// Environment variable that overrides the parsed port (`dev-override` rule)
pub const PORT_OVERRIDE_ENV: &str = "DRUPAL_DB_PORT";

/// Sibling file whose presence marks a DDEV-style local environment
const DDEV_SIBLING: &str = "settings.ddev.php";

/// Immutable description of one database target
///
/// Created once at startup from the settings file; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Database engine
    pub driver: DriverKind,

    /// Hostname
    pub host: String,

    /// Port number
    pub port: u16,

    /// Database name
    pub database: String,

    /// Username
    pub username: String,

    /// Password
    /// WARNING: Sensitive data, do not log or include in error messages
    pub password: String,

    /// Table prefix configuration
    pub prefix: TablePrefix,

    /// Recognized scalar keys beyond the core set (namespace, collation, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Table prefix: absent, one uniform string, or a per-table mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TablePrefix {
    /// No prefix configured
    None,
    /// One prefix applied to every table
    Single(String),
    /// Per-table prefixes; the `default` entry covers unlisted tables
    PerTable(BTreeMap<String, String>),
}

impl TablePrefix {
    /// Prepend the configured prefix to a base table name
    ///
    /// Per-table mappings resolve `table key -> default key -> empty`.
    #[must_use]
    pub fn apply(&self, table: &str) -> String {
        match self {
            Self::None => table.to_string(),
            Self::Single(p) => format!("{p}{table}"),
            Self::PerTable(map) => {
                let p = map
                    .get(table)
                    .or_else(|| map.get("default"))
                    .map_or("", String::as_str);
                format!("{p}{table}")
            }
        }
    }
}

/// Scalar or nested value recovered from the PHP array literal
#[derive(Debug, Clone, PartialEq)]
enum PhpValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
    Map(BTreeMap<String, PhpValue>),
}

impl PhpValue {
    fn as_text(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Null | Self::Map(_) => None,
        }
    }
}

/// Load a profile from a settings file and apply dev overrides
///
/// The replica key is always `default`; the target key is caller-selected
/// (normally also `default`).
pub fn load_profile(path: &Path, target: &str) -> Result<ConnectionProfile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::config_parse(
            ConfigParseReason::UnreadableFile,
            format!("could not read {}: {e}", path.display()),
        )
    })?;

    let mut profile = extract_profile(&content, target, "default")?;
    apply_dev_overrides(&mut profile, path);
    Ok(profile)
}

/// Extract a connection profile for the given target/replica pair
///
/// Fails with a `ConfigParse` error carrying a reason code when the
/// assignment is absent, unterminated, or incomplete.
pub fn extract_profile(content: &str, target: &str, replica: &str) -> Result<ConnectionProfile> {
    let entries = collect_entries(content, target, replica)?;
    if entries.is_empty() {
        return Err(GatewayError::config_parse(
            ConfigParseReason::AssignmentNotFound,
            format!("no $databases['{target}']['{replica}'] assignment found"),
        ));
    }
    build_profile(&entries)
}

/// Collect raw key/value entries for one target/replica pair
///
/// Tries the full array-literal form first (`array-literal` rule); when no
/// full assignment exists, falls back to individual key assignments
/// (`individual-assign` rule). Simple scalar variables are substituted in
/// both forms (`var-subst` rule).
fn collect_entries(
    content: &str,
    target: &str,
    replica: &str,
) -> Result<BTreeMap<String, PhpValue>> {
    let vars = collect_variables(content);
    let mut entries = BTreeMap::new();

    let mut search_from = 0;
    while let Some(rel) = content[search_from..].find("$databases") {
        let at = search_from + rel;
        let after = at + "$databases".len();
        search_from = after;

        let mut cur = Cursor::new(content, after);
        let Some(subs) = cur.read_subscripts() else { continue };

        if subs.len() < 2 || subs[0] != target || subs[1] != replica {
            continue;
        }

        cur.skip_ws_and_comments();
        if !cur.eat('=') {
            continue;
        }
        cur.skip_ws_and_comments();

        if subs.len() == 2 {
            // Full array literal wins outright; stop scanning.
            let map = cur.read_array_literal(&vars)?;
            return Ok(map);
        }

        if subs.len() == 3 {
            // Individual assignment: value runs to the statement terminator.
            let raw = cur.read_until_semicolon()?;
            entries.insert(subs[2].clone(), parse_scalar(raw.trim(), &vars));
        }
    }

    Ok(entries)
}

/// `var-subst` rule: collect simple `$name = <scalar>;` assignments
///
/// Only single-line string or integer literals are accepted; anything more
/// complex is skipped, matching the deliberately narrow contract.
fn collect_variables(content: &str) -> BTreeMap<String, PhpValue> {
    let mut vars = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix('$') else { continue };
        if rest.starts_with("databases") {
            continue;
        }

        let name_len = rest.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').count();
        if name_len == 0 {
            continue;
        }
        let (name, tail) = rest.split_at(name_len);

        let tail = tail.trim_start();
        let Some(tail) = tail.strip_prefix('=') else { continue };
        let Some(end) = tail.find(';') else { continue };
        let raw = tail[..end].trim();

        match parse_scalar(raw, &BTreeMap::new()) {
            v @ (PhpValue::Str(_) | PhpValue::Int(_)) => {
                // Unquoted non-numeric text is a complex expression; skip it.
                let is_literal = raw.starts_with('\'')
                    || raw.starts_with('"')
                    || raw.chars().all(|c| c.is_ascii_digit());
                if is_literal {
                    vars.insert(name.to_string(), v);
                }
            }
            _ => {}
        }
    }

    vars
}

/// `scalar-coerce` rule: quoted string, integer, TRUE/FALSE/NULL, or a
/// `$variable` reference; unrecognized text survives as a raw string
fn parse_scalar(raw: &str, vars: &BTreeMap<String, PhpValue>) -> PhpValue {
    let raw = raw.trim();

    if raw.len() >= 2 {
        let first = raw.chars().next().unwrap();
        if (first == '\'' || first == '"') && raw.ends_with(first) {
            return PhpValue::Str(unescape(&raw[1..raw.len() - 1], first));
        }
    }

    if let Some(name) = raw.strip_prefix('$') {
        if let Some(v) = vars.get(name) {
            return v.clone();
        }
        return PhpValue::Str(raw.to_string());
    }

    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(i) = raw.parse::<i64>() {
            return PhpValue::Int(i);
        }
    }

    match raw.to_ascii_lowercase().as_str() {
        "true" => PhpValue::Bool(true),
        "false" => PhpValue::Bool(false),
        "null" => PhpValue::Null,
        _ => PhpValue::Str(raw.to_string()),
    }
}

/// Resolve backslash escapes inside a quoted PHP string
fn unescape(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n) if n == quote || n == '\\' => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Character cursor over the settings text
///
/// Tracks position only; string/comment skipping is explicit at each call
/// site so the scan stays auditable.
struct Cursor<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self { text, bytes: text.as_bytes(), pos }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c as u8) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Case-insensitive check for a keyword at the current position
    fn at_keyword(&self, word: &str) -> bool {
        self.bytes
            .get(self.pos..self.pos + word.len())
            .is_some_and(|s| s.eq_ignore_ascii_case(word.as_bytes()))
    }

    /// Skip whitespace plus `//`, `#`, and `/* */` comments
    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            match (self.peek(), self.bytes.get(self.pos + 1).copied()) {
                (Some(b'/'), Some(b'/')) | (Some(b'#'), _) => {
                    while let Some(b) = self.peek() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() {
                        if self.bytes[self.pos] == b'*'
                            && self.bytes.get(self.pos + 1) == Some(&b'/')
                        {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    /// Read consecutive `['key']` subscripts; None if the first is absent
    fn read_subscripts(&mut self) -> Option<Vec<String>> {
        let mut subs = Vec::new();
        loop {
            let save = self.pos;
            self.skip_ws_and_comments();
            if !self.eat('[') {
                self.pos = save;
                break;
            }
            self.skip_ws_and_comments();
            let quote = match self.peek() {
                Some(q @ (b'\'' | b'"')) => q,
                _ => {
                    // Not a quoted subscript (e.g. a numeric index); bail.
                    return None;
                }
            };
            self.pos += 1;
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b == quote {
                    break;
                }
                self.pos += 1;
            }
            let key = self.text[start..self.pos].to_string();
            if !self.eat(quote as char) {
                return None;
            }
            self.skip_ws_and_comments();
            if !self.eat(']') {
                return None;
            }
            subs.push(key);
        }
        if subs.is_empty() { None } else { Some(subs) }
    }

    /// `array-literal` rule: read a full `array(...)` or `[...]` literal
    /// into a key/value map, tracking nesting depth
    fn read_array_literal(&mut self, vars: &BTreeMap<String, PhpValue>) -> Result<BTreeMap<String, PhpValue>> {
        self.skip_ws_and_comments();

        let close = if self.at_keyword("array") {
            self.pos += "array".len();
            self.skip_ws_and_comments();
            if !self.eat('(') {
                return Err(unbalanced("expected '(' after 'array'"));
            }
            b')'
        } else if self.eat('[') {
            b']'
        } else {
            return Err(unbalanced("expected 'array(' or '['"));
        };

        let mut map = BTreeMap::new();
        loop {
            self.skip_ws_and_comments();
            match self.peek() {
                Some(b) if b == close => {
                    self.pos += 1;
                    return Ok(map);
                }
                None => return Err(unbalanced("array literal not closed before end of input")),
                _ => {}
            }

            // Key must be a quoted string.
            let quote = match self.peek() {
                Some(q @ (b'\'' | b'"')) => q as char,
                _ => return Err(unbalanced("expected quoted array key")),
            };
            let key = self.read_quoted(quote)?;

            self.skip_ws_and_comments();
            if !(self.eat('=') && self.eat('>')) {
                return Err(unbalanced(format!("expected '=>' after key '{key}'")));
            }
            self.skip_ws_and_comments();

            // Value: nested array or scalar token.
            let value = if self.peek() == Some(b'[') || self.at_keyword("array") {
                PhpValue::Map(self.read_array_literal(vars)?)
            } else {
                let raw = self.read_value_token(close)?;
                parse_scalar(&raw, vars)
            };
            map.insert(key, value);

            self.skip_ws_and_comments();
            // Trailing comma is optional before the closing delimiter.
            self.eat(',');
        }
    }

    /// Read a quoted string, honoring escaped quotes
    fn read_quoted(&mut self, quote: char) -> Result<String> {
        self.pos += 1; // opening quote
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'\\' {
                self.pos += 2;
                continue;
            }
            if b == quote as u8 {
                let raw = &self.text[start..self.pos];
                self.pos += 1;
                return Ok(unescape(raw, quote));
            }
            self.pos += 1;
        }
        Err(unbalanced("unterminated string literal"))
    }

    /// Read a scalar value's raw text up to the enclosing comma/closer,
    /// copying quoted spans verbatim and dropping interleaved comments
    fn read_value_token(&mut self, close: u8) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(unbalanced("value not terminated before end of input")),
                Some(b',') => return Ok(out),
                Some(b) if b == close => return Ok(out),
                Some(q @ (b'\'' | b'"')) => {
                    let inner = self.read_quoted(q as char)?;
                    // Re-wrap so parse_scalar sees a quoted literal; escapes
                    // are already resolved so single quotes are safe inside.
                    out.push(q as char);
                    out.push_str(&inner);
                    out.push(q as char);
                }
                Some(b'/') | Some(b'#') => {
                    let before = self.pos;
                    self.skip_ws_and_comments();
                    if self.pos == before {
                        // A bare '/' that is not a comment.
                        out.push('/');
                        self.pos += 1;
                    }
                }
                Some(b) => {
                    out.push(b as char);
                    self.pos += 1;
                }
            }
        }
    }

    /// Read raw text up to the statement terminator, skipping strings
    fn read_until_semicolon(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(unbalanced("assignment not terminated before end of input")),
                Some(b';') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(q @ (b'\'' | b'"')) => {
                    let inner = self.read_quoted(q as char)?;
                    out.push(q as char);
                    out.push_str(&inner);
                    out.push(q as char);
                }
                Some(b) => {
                    out.push(b as char);
                    self.pos += 1;
                }
            }
        }
    }
}

fn unbalanced(detail: impl Into<String>) -> GatewayError {
    GatewayError::config_parse(ConfigParseReason::UnbalancedLiteral, detail)
}

/// Build the profile from recovered entries, applying mandatory-key and
/// `port-default` rules
fn build_profile(entries: &BTreeMap<String, PhpValue>) -> Result<ConnectionProfile> {
    let required = |key: &str| -> Result<String> {
        entries
            .get(key)
            .and_then(PhpValue::as_text)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                GatewayError::config_parse(
                    ConfigParseReason::MissingKey,
                    format!("required key '{key}' is missing or empty"),
                )
            })
    };

    let driver_str = required("driver")?;
    let driver = DriverKind::from_config_str(&driver_str).ok_or_else(|| {
        GatewayError::config_parse(
            ConfigParseReason::UnknownDriver,
            format!("unsupported driver '{driver_str}' (expected 'mysql' or 'pgsql')"),
        )
    })?;

    let database = required("database")?;
    let username = required("username")?;
    let password = entries.get("password").and_then(PhpValue::as_text).unwrap_or_default();
    let host = entries
        .get("host")
        .and_then(PhpValue::as_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string());

    // port-default rule
    let port = match entries.get("port") {
        Some(PhpValue::Int(i)) => u16::try_from(*i).map_err(|_| invalid_port(&i.to_string()))?,
        Some(PhpValue::Str(s)) if !s.is_empty() => {
            s.parse::<u16>().map_err(|_| invalid_port(s))?
        }
        _ => driver.default_port(),
    };

    // prefix-map rule
    let prefix = match entries.get("prefix") {
        Some(PhpValue::Map(map)) => {
            let table_map: BTreeMap<String, String> = map
                .iter()
                .filter_map(|(k, v)| v.as_text().map(|t| (k.clone(), t)))
                .collect();
            TablePrefix::PerTable(table_map)
        }
        Some(v) => match v.as_text() {
            Some(p) if !p.is_empty() => TablePrefix::Single(p),
            _ => TablePrefix::None,
        },
        None => TablePrefix::None,
    };

    let core_keys =
        ["driver", "database", "username", "password", "host", "port", "prefix"];
    let extra: BTreeMap<String, String> = entries
        .iter()
        .filter(|(k, _)| !core_keys.contains(&k.as_str()))
        .filter_map(|(k, v)| v.as_text().map(|t| (k.clone(), t)))
        .collect();

    Ok(ConnectionProfile { driver, host, port, database, username, password, prefix, extra })
}

fn invalid_port(raw: &str) -> GatewayError {
    GatewayError::config_parse(
        ConfigParseReason::InvalidPort,
        format!("port '{raw}' is not a valid port number"),
    )
}

/// `dev-override` rule: environment variables or a DDEV sibling file
/// override host/port after parsing
///
/// Never touches driver, database, username, or password.
pub fn apply_dev_overrides(profile: &mut ConnectionProfile, settings_path: &Path) {
    if let Ok(host) = std::env::var(HOST_OVERRIDE_ENV) {
        if !host.is_empty() {
            tracing::info!(host, "overriding database host from {HOST_OVERRIDE_ENV}");
            profile.host = host;
        }
    }
    if let Ok(port) = std::env::var(PORT_OVERRIDE_ENV) {
        match port.parse::<u16>() {
            Ok(p) => {
                tracing::info!(port = p, "overriding database port from {PORT_OVERRIDE_ENV}");
                profile.port = p;
            }
            Err(_) => {
                tracing::warn!(port, "ignoring non-numeric {PORT_OVERRIDE_ENV}");
            }
        }
    }

    // DDEV drops a sibling settings.ddev.php defining its own host/port.
    let Some(dir) = settings_path.parent() else { return };
    let sibling = dir.join(DDEV_SIBLING);
    if !sibling.is_file() {
        return;
    }
    let Ok(content) = std::fs::read_to_string(&sibling) else { return };

    if let Ok(entries) = collect_entries(&content, "default", "default") {
        if let Some(host) = entries.get("host").and_then(PhpValue::as_text) {
            if !host.is_empty() && std::env::var(HOST_OVERRIDE_ENV).is_err() {
                tracing::info!(host, "overriding database host from {DDEV_SIBLING}");
                profile.host = host;
            }
        }
        if let Some(port) = entries.get("port").and_then(PhpValue::as_text) {
            if let Ok(p) = port.parse::<u16>() {
                if std::env::var(PORT_OVERRIDE_ENV).is_err() {
                    tracing::info!(port = p, "overriding database port from {DDEV_SIBLING}");
                    profile.port = p;
                }
            }
        }
    }
}
