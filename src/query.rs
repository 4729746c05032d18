//! Derives the `SELECT` issued by the read pipeline from a dataset
//! definition plus the since/limit bounds of one request.

use crate::config::{DatasetDefinition, SINCE_COLUMN, TABLE_NAME};
use crate::entity::Continuation;
use crate::error::{LayerError, LayerResult};

/// Formats a literal for interpolation into a `WHERE` clause: bare if it
/// parses as an integer, single-quoted otherwise.
pub fn format_literal(value: &str) -> String {
    if value.parse::<i64>().is_ok() {
        value.to_string()
    } else {
        format!("'{value}'")
    }
}

fn table_name(def: &DatasetDefinition) -> LayerResult<String> {
    def.source_config
        .get(TABLE_NAME)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| LayerError::configuration(format!("{TABLE_NAME} not found in source config")))
}

fn since_column(def: &DatasetDefinition) -> Option<String> {
    def.source_config
        .get(SINCE_COLUMN)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Comma-joined select list: `*` for `map_all`, else the configured
/// outgoing property names (which double as column names).
fn column_list(def: &DatasetDefinition) -> LayerResult<String> {
    let outgoing = def.outgoing_mapping_config.as_ref().ok_or_else(|| {
        LayerError::configuration("outgoing mapping config is required to build a read query")
    })?;
    if outgoing.map_all {
        return Ok("*".to_string());
    }
    if outgoing.property_mappings.is_empty() {
        return Err(LayerError::configuration(
            "outgoing mapping config has no property mappings and map_all is false",
        ));
    }
    Ok(outgoing
        .property_mappings
        .iter()
        .map(|m| m.property.as_str())
        .collect::<Vec<_>>()
        .join(", "))
}

/// Builds the `SELECT` for one read request.
///
/// `since` is the opaque continuation token from the request (empty if the
/// caller did not supply one); `max_since` is the textual `MAX(since_column)`
/// snapshot taken at the start of this same request.
pub fn build_query(
    def: &DatasetDefinition,
    since: &str,
    max_since: &str,
    limit: i64,
) -> LayerResult<String> {
    let columns = column_list(def)?;
    let table = table_name(def)?;
    let mut query = format!("SELECT {columns} FROM {table} t");

    if let Some(sc) = since_column(def) {
        if since.is_empty() {
            query.push_str(&format!(" WHERE t.{sc} <= {}", format_literal(max_since)));
        } else {
            let since_val = Continuation {
                token: since.to_string(),
            }
            .decode()
            .map_err(|e| LayerError::configuration(format!("malformed since token: {e}")))?;
            query.push_str(&format!(
                " WHERE t.{sc} > {} AND t.{sc} <= {}",
                format_literal(&since_val),
                format_literal(max_since)
            ));
        }
    }

    if limit > 0 {
        query.push_str(&format!(" FETCH FIRST {limit} ROWS ONLY"));
    }

    Ok(query)
}

/// Builds the `SELECT MAX(since_column) FROM table` snapshot query used to
/// anchor a read before it starts streaming rows.
pub fn build_max_since_query(def: &DatasetDefinition, since_column_name: &str) -> LayerResult<String> {
    let table = table_name(def)?;
    Ok(format!("SELECT MAX({since_column_name}) FROM {table}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutgoingMappingConfig, OutgoingPropertyMapping};
    use serde_json::json;

    fn def_with(map_all: bool, since_col: Option<&str>) -> DatasetDefinition {
        let mut source_config = crate::config::SourceConfig::new();
        source_config.insert(TABLE_NAME.to_string(), json!("sample"));
        if let Some(sc) = since_col {
            source_config.insert(SINCE_COLUMN.to_string(), json!(sc));
        }
        DatasetDefinition {
            dataset_name: "sample".to_string(),
            source_config,
            incoming_mapping_config: None,
            outgoing_mapping_config: Some(OutgoingMappingConfig {
                base_uri: "http://test/".to_string(),
                map_all,
                property_mappings: if map_all {
                    vec![]
                } else {
                    vec![OutgoingPropertyMapping {
                        property: "NAME".to_string(),
                        ..Default::default()
                    }]
                },
            }),
        }
    }

    #[test]
    fn map_all_selects_star() {
        let def = def_with(true, None);
        let q = build_query(&def, "", "", 0).unwrap();
        assert_eq!(q, "SELECT * FROM sample t");
    }

    #[test]
    fn explicit_columns_join_property_names() {
        let def = def_with(false, None);
        let q = build_query(&def, "", "", 0).unwrap();
        assert_eq!(q, "SELECT NAME FROM sample t");
    }

    #[test]
    fn limit_appends_fetch_first() {
        let def = def_with(true, None);
        let q = build_query(&def, "", "", 3).unwrap();
        assert_eq!(q, "SELECT * FROM sample t FETCH FIRST 3 ROWS ONLY");
    }

    #[test]
    fn since_column_with_empty_since_bounds_by_max_only() {
        let def = def_with(true, Some("recorded"));
        let q = build_query(&def, "", "164565974", 0).unwrap();
        assert_eq!(q, "SELECT * FROM sample t WHERE t.recorded <= 164565974");
    }

    #[test]
    fn since_column_with_token_bounds_both_sides() {
        let def = def_with(true, Some("recorded"));
        let token = Continuation::encode("164565566").token;
        let q = build_query(&def, &token, "164565974", 0).unwrap();
        assert_eq!(
            q,
            "SELECT * FROM sample t WHERE t.recorded > 164565566 AND t.recorded <= 164565974"
        );
    }

    #[test]
    fn non_integer_literal_is_quoted() {
        assert_eq!(format_literal("abc"), "'abc'");
        assert_eq!(format_literal("42"), "42");
    }

    #[test]
    fn since_ignored_without_since_column() {
        let def = def_with(true, None);
        let q = build_query(&def, "anything", "", 0).unwrap();
        assert_eq!(q, "SELECT * FROM sample t");
    }

    #[test]
    fn malformed_since_token_is_an_error() {
        let def = def_with(true, Some("recorded"));
        let err = build_query(&def, "not-base64!!", "1", 0).unwrap_err();
        assert!(matches!(err, LayerError::Configuration(_)));
    }

    #[test]
    fn missing_outgoing_mapping_is_an_error() {
        let mut def = def_with(true, None);
        def.outgoing_mapping_config = None;
        assert!(build_query(&def, "", "", 0).is_err());
    }
}
