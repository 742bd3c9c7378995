//! Drupal Entity Composition
//!
//! Drupal stores one logical entity across a base table, a "field data"
//! table, and per-field tables named by entity type and field machine name.
//! This module owns the fixed join templates that reassemble those pieces
//! into flat records for each supported entity shape.
//!
//! Table names in the templates are `{table}` tokens, expanded through the
//! configured prefix on the gateway's composed-query path. Identifiers
//! (nid, tid, uid) always bind as parameters; the only interpolated text is
//! the paragraph field machine name, and only after a strict charset check.

use std::time::Duration;

use crate::engine::{DriverKind, QueryResult, SqlParam};
use crate::error::{GatewayError, Result, ValidationReason};
use crate::gateway::DatabaseGateway;

/// One reassembled entity, flat enough to serialize directly
pub type EntityRecord = serde_json::Map<String, serde_json::Value>;

/// Composes and runs the fixed entity queries against one gateway
pub struct EntityComposer<'g> {
    gateway: &'g DatabaseGateway,
    timeout: Option<Duration>,
}

impl<'g> EntityComposer<'g> {
    #[must_use]
    pub fn new(gateway: &'g DatabaseGateway, timeout: Option<Duration>) -> Self {
        Self { gateway, timeout }
    }

    /// List all content types (node types)
    pub async fn list_content_types(&self) -> Result<Vec<EntityRecord>> {
        let result =
            self.gateway.execute_composed(CONTENT_TYPES_QUERY, &[], self.timeout).await?;
        Ok(to_records(result))
    }

    /// Fetch one node with author name and body (current or revision)
    pub async fn node_by_id(&self, nid: i64) -> Result<EntityRecord> {
        let result = self
            .gateway
            .execute_composed(NODE_QUERY, &[SqlParam::Int(nid)], self.timeout)
            .await?;
        single(result, || format!("node {nid} does not exist"))
    }

    /// List all taxonomy vocabularies
    pub async fn list_vocabularies(&self) -> Result<Vec<EntityRecord>> {
        let result =
            self.gateway.execute_composed(VOCABULARIES_QUERY, &[], self.timeout).await?;
        Ok(to_records(result))
    }

    /// Fetch one taxonomy term with its vocabulary name
    pub async fn term_by_id(&self, tid: i64) -> Result<EntityRecord> {
        let result = self
            .gateway
            .execute_composed(TERM_QUERY, &[SqlParam::Int(tid)], self.timeout)
            .await?;
        single(result, || format!("taxonomy term {tid} does not exist"))
    }

    /// Fetch one user with an aggregated role list
    pub async fn user_by_id(&self, uid: i64) -> Result<EntityRecord> {
        let sql = user_query(self.gateway.driver());
        let result = self
            .gateway
            .execute_composed(&sql, &[SqlParam::Int(uid)], self.timeout)
            .await?;
        single(result, || format!("user {uid} does not exist"))
    }

    /// List paragraph items referenced from a node through one field
    ///
    /// Heuristic by design: assumes the `node__<field>` reference table and
    /// the shared `paragraphs_item_field_data` table. When the reference
    /// table is absent the failure is reported up front, not as an opaque
    /// engine error.
    pub async fn paragraphs_by_node(
        &self,
        nid: i64,
        field: &str,
    ) -> Result<Vec<EntityRecord>> {
        validate_field_name(field)?;

        let reference_table = format!("node__{field}");
        if !self.gateway.table_exists(&reference_table, self.timeout).await? {
            return Err(GatewayError::not_found(format!(
                "no field table '{reference_table}' for paragraph field '{field}'"
            )));
        }

        let sql = paragraphs_query(field);
        let result = self
            .gateway
            .execute_composed(&sql, &[SqlParam::Int(nid)], self.timeout)
            .await?;
        Ok(to_records(result))
    }
}

/// Paragraph field machine names: lowercase alphanumerics and underscores
///
/// This is the one identifier that gets interpolated into SQL text, so the
/// charset check is strict rather than permissive.
fn validate_field_name(field: &str) -> Result<()> {
    let ok = !field.is_empty()
        && field.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(GatewayError::validation(
            ValidationReason::ParagraphField,
            format!("'{field}' is not a valid field machine name (expected [a-z0-9_]+)"),
        ))
    }
}

const CONTENT_TYPES_QUERY: &str = "SELECT type, name, description FROM {node_type}";

const VOCABULARIES_QUERY: &str = "SELECT vid, name, description FROM {taxonomy_vocabulary}";

const NODE_QUERY: &str = "\
SELECT
    nfd.nid, nfd.vid, nfd.type, nfd.langcode, nfd.status, nfd.uid,
    nfd.title, nfd.created, nfd.changed,
    ufd.name AS author_name,
    COALESCE(nb.body_value, nrb.body_value) AS body_value,
    COALESCE(nb.body_summary, nrb.body_summary) AS body_summary,
    COALESCE(nb.body_format, nrb.body_format) AS body_format
FROM {node_field_data} nfd
LEFT JOIN {users_field_data} ufd ON nfd.uid = ufd.uid
LEFT JOIN {node__body} nb ON nfd.nid = nb.entity_id AND nfd.vid = nb.revision_id
    AND nb.deleted = 0 AND nb.langcode = nfd.langcode
LEFT JOIN {node_revision__body} nrb ON nfd.vid = nrb.revision_id
    AND nrb.deleted = 0 AND nrb.langcode = nfd.langcode
WHERE nfd.nid = ?";

const TERM_QUERY: &str = "\
SELECT
    tfd.tid, tfd.vid, tfd.name, tfd.description, tfd.langcode,
    tv.name AS vocabulary_name
FROM {taxonomy_term_field_data} tfd
LEFT JOIN {taxonomy_vocabulary} tv ON tfd.vid = tv.vid
WHERE tfd.tid = ?";

/// User query with engine-specific role aggregation
///
/// The two renditions differ only in the aggregate function; everything
/// else is shared so both engines produce identical record shapes.
fn user_query(driver: DriverKind) -> String {
    let roles = match driver {
        DriverKind::Mysql => "GROUP_CONCAT(DISTINCT ur.roles_target_id)",
        DriverKind::Pgsql => "STRING_AGG(DISTINCT ur.roles_target_id, ',')",
    };
    format!(
        "\
SELECT
    ufd.uid, ufd.name, ufd.mail, ufd.status, ufd.created, ufd.changed, ufd.langcode,
    {roles} AS roles
FROM {{users_field_data}} ufd
LEFT JOIN {{user__roles}} ur ON ufd.uid = ur.entity_id
WHERE ufd.uid = ?
GROUP BY
    ufd.uid, ufd.name, ufd.mail, ufd.status, ufd.created, ufd.changed, ufd.langcode"
    )
}

/// Paragraph query over the convention-named per-field reference table
///
/// `field` is validated before this runs; it lands in both the table token
/// and the reference column names.
fn paragraphs_query(field: &str) -> String {
    format!(
        "\
SELECT
    p_ref.{field}_target_id AS paragraph_id,
    p_ref.{field}_target_revision_id AS paragraph_revision_id,
    pfd.id AS paragraph_item_id,
    pfd.type AS paragraph_type,
    pfd.langcode AS paragraph_langcode,
    pfd.status AS paragraph_status
FROM {{node__{field}}} p_ref
JOIN {{paragraphs_item_field_data}} pfd
    ON p_ref.{field}_target_id = pfd.id
    AND p_ref.{field}_target_revision_id = pfd.revision_id
WHERE p_ref.entity_id = ? AND p_ref.deleted = 0
ORDER BY p_ref.delta ASC"
    )
}

/// Zip a positional query result into field-name keyed records
fn to_records(result: QueryResult) -> Vec<EntityRecord> {
    result
        .rows
        .into_iter()
        .map(|row| result.columns.iter().cloned().zip(row).collect())
        .collect()
}

/// First record, or `NotFound` when the lookup matched nothing
fn single(result: QueryResult, missing: impl FnOnce() -> String) -> Result<EntityRecord> {
    to_records(result)
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::not_found(missing()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::expand_table_tokens;
    use crate::settings::TablePrefix;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_name_validation() {
        assert!(validate_field_name("field_content_paragraphs").is_ok());
        assert!(validate_field_name("field_a1").is_ok());
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name("field-name").is_err());
        assert!(validate_field_name("Field_Name").is_err());
        assert!(validate_field_name("f; DROP TABLE x").is_err());
    }

    #[test]
    fn test_node_query_shape() {
        assert!(NODE_QUERY.contains("{node_field_data} nfd"));
        assert!(NODE_QUERY.contains("LEFT JOIN {users_field_data} ufd"));
        assert!(NODE_QUERY.contains("COALESCE(nb.body_value, nrb.body_value)"));
        assert!(NODE_QUERY.contains("WHERE nfd.nid = ?"));
        // Identifier binds as a parameter, never interpolated.
        assert_eq!(NODE_QUERY.matches('?').count(), 1);
    }

    #[test]
    fn test_user_query_differs_only_in_aggregation() {
        let mysql = user_query(DriverKind::Mysql);
        let pgsql = user_query(DriverKind::Pgsql);

        assert!(mysql.contains("GROUP_CONCAT(DISTINCT ur.roles_target_id)"));
        assert!(pgsql.contains("STRING_AGG(DISTINCT ur.roles_target_id, ',')"));

        let normalize = |s: &str| {
            s.replace("GROUP_CONCAT(DISTINCT ur.roles_target_id)", "AGG")
                .replace("STRING_AGG(DISTINCT ur.roles_target_id, ',')", "AGG")
        };
        assert_eq!(normalize(&mysql), normalize(&pgsql));
    }

    #[test]
    fn test_paragraphs_query_uses_convention_tables() {
        let sql = paragraphs_query("field_sections");
        assert!(sql.contains("{node__field_sections} p_ref"));
        assert!(sql.contains("{paragraphs_item_field_data} pfd"));
        assert!(sql.contains("p_ref.field_sections_target_id = pfd.id"));
        assert!(sql.contains("ORDER BY p_ref.delta ASC"));
        assert_eq!(sql.matches('?').count(), 1);
    }

    #[test]
    fn test_templates_expand_cleanly() {
        let prefix = TablePrefix::Single("drp_".to_string());
        for template in [
            CONTENT_TYPES_QUERY.to_string(),
            VOCABULARIES_QUERY.to_string(),
            NODE_QUERY.to_string(),
            TERM_QUERY.to_string(),
            user_query(DriverKind::Mysql),
            user_query(DriverKind::Pgsql),
            paragraphs_query("field_x"),
        ] {
            let expanded = expand_table_tokens(&template, &prefix);
            assert!(!expanded.contains('{'), "unexpanded token in: {expanded}");
            assert!(!expanded.contains('}'), "unexpanded token in: {expanded}");
        }
    }

    #[test]
    fn test_expansion_applies_prefix_to_every_table() {
        let prefix = TablePrefix::Single("drp_".to_string());
        let expanded = expand_table_tokens(NODE_QUERY, &prefix);
        assert!(expanded.contains("FROM drp_node_field_data nfd"));
        assert!(expanded.contains("LEFT JOIN drp_users_field_data ufd"));
        assert!(expanded.contains("LEFT JOIN drp_node__body nb"));
        assert!(expanded.contains("LEFT JOIN drp_node_revision__body nrb"));
    }

    #[test]
    fn test_to_records_zips_columns() {
        let result = QueryResult {
            columns: vec!["nid".to_string(), "title".to_string()],
            rows: vec![
                vec![serde_json::json!(1), serde_json::json!("First")],
                vec![serde_json::json!(2), serde_json::json!("Second")],
            ],
        };
        let records = to_records(result);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["nid"], serde_json::json!(1));
        assert_eq!(records[1]["title"], serde_json::json!("Second"));
    }

    #[test]
    fn test_single_not_found_on_empty() {
        let result = QueryResult { columns: vec!["nid".to_string()], rows: vec![] };
        let err = single(result, || "node 99 does not exist".to_string()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(err.message().contains("node 99"));
    }
}
