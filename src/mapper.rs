//! Row↔entity mapper façade.
//!
//! A host framework can supply this translation as an external capability;
//! this crate implements it directly instead, bridging row items and
//! entities according to the dataset's incoming/outgoing mapping config.

use serde_json::Value;

use crate::config::{IncomingMappingConfig, OutgoingMappingConfig, OutgoingPropertyMapping};
use crate::entity::{Entity, RowItem};
use crate::error::{LayerError, LayerResult};

/// Owns cloned copies of the mapping config rather than borrowing them, so a
/// [`Dataset`](crate::dataset::Dataset) can hand out a `Mapper` per request
/// without keeping its definition's read-lock guard alive for the lifetime of
/// the request (the iterator/session it feeds outlives any single lock
/// acquisition).
pub struct Mapper {
    incoming: Option<IncomingMappingConfig>,
    outgoing: Option<OutgoingMappingConfig>,
}

impl Mapper {
    pub fn new(incoming: Option<IncomingMappingConfig>, outgoing: Option<OutgoingMappingConfig>) -> Self {
        Mapper { incoming, outgoing }
    }

    /// Builds an entity from a scanned row item.
    pub fn map_item_to_entity(&self, item: &RowItem) -> LayerResult<Entity> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or_else(|| LayerError::configuration("outgoing mapping config is required to read"))?;

        let mut entity = Entity::default();
        entity.deleted = item.deleted;

        if outgoing.map_all {
            for column in &item.columns {
                let value = item.map.get(column).cloned().unwrap_or(Value::Null);
                let property_uri = format!("{}{}", outgoing.base_uri, column.to_uppercase());
                if !value.is_null() {
                    entity.properties.insert(property_uri, value);
                }
            }
            return Ok(entity);
        }

        for pm in &outgoing.property_mappings {
            let column = pm.property.to_uppercase();
            let Some(value) = item.map.get(&column) else {
                continue;
            };

            if pm.is_identity {
                let raw = value_to_string(value);
                entity.id = apply_pattern(pm.uri_value_pattern.as_deref(), &raw);
                continue;
            }

            if value.is_null() {
                continue;
            }

            let property_uri = format!("{}{}", outgoing.base_uri, column);
            if pm.is_reference {
                let raw = value_to_string(value);
                entity
                    .references
                    .insert(property_uri, apply_pattern(pm.uri_value_pattern.as_deref(), &raw));
            } else {
                entity.properties.insert(property_uri, value.clone());
            }
        }

        if entity.id.is_empty() {
            return Err(LayerError::scan("row produced no identity value for entity id"));
        }

        Ok(entity)
    }

    /// Builds a row item from an entity, ready for the write pipeline.
    pub fn map_entity_to_item(&self, entity: &Entity) -> LayerResult<RowItem> {
        let incoming = self
            .incoming
            .as_ref()
            .ok_or_else(|| LayerError::configuration("incoming mapping config is required to write"))?;

        let mut item = RowItem::new();
        item.deleted = entity.deleted;

        let mut saw_identity = false;
        for pm in &incoming.property_mappings {
            let column = pm.column.to_uppercase();
            let value = if pm.is_identity {
                saw_identity = true;
                Value::String(entity.id.clone())
            } else {
                match entity.properties.get(&pm.property) {
                    Some(v) => v.clone(),
                    None => Value::Null,
                }
            };
            item.set_value(column, value);
        }

        if !saw_identity {
            return Err(LayerError::configuration(
                "incoming mapping config has no identity mapping",
            ));
        }

        Ok(item)
    }
}

/// Finds the column name backing the identity mapping, falling back to
/// `"id"` when no mapping is flagged `is_identity`.
pub fn identity_column(incoming: Option<&IncomingMappingConfig>) -> String {
    incoming
        .and_then(|cfg| cfg.property_mappings.iter().find(|m| m.is_identity))
        .map(|m| m.column.to_uppercase())
        .unwrap_or_else(|| "ID".to_string())
}

fn apply_pattern(pattern: Option<&str>, raw: &str) -> String {
    match pattern {
        Some(p) if p.contains("%s") => p.replacen("%s", raw, 1),
        Some(p) if p.contains("{}") => p.replacen("{}", raw, 1),
        _ => raw.to_string(),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Upper-cases every outgoing property-mapping `property` field in place,
/// called by the catalog on each reconcile so mappings match the upper-cased
/// identifiers Oracle returns.
pub fn uppercase_outgoing_properties(config: &mut OutgoingMappingConfig) {
    for pm in &mut config.property_mappings {
        pm.property = pm.property.to_uppercase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IncomingPropertyMapping, OutgoingPropertyMapping};
    use serde_json::json;

    fn outgoing_explicit() -> OutgoingMappingConfig {
        OutgoingMappingConfig {
            base_uri: "http://test/".to_string(),
            map_all: false,
            property_mappings: vec![
                OutgoingPropertyMapping {
                    property: "ID".to_string(),
                    is_identity: true,
                    ..Default::default()
                },
                OutgoingPropertyMapping {
                    property: "NAME".to_string(),
                    ..Default::default()
                },
            ],
        }
    }

    fn incoming_basic() -> IncomingMappingConfig {
        IncomingMappingConfig {
            property_mappings: vec![
                IncomingPropertyMapping {
                    property: String::new(),
                    column: "ID".to_string(),
                    is_identity: true,
                    datatype: None,
                },
                IncomingPropertyMapping {
                    property: "http://test/NAME".to_string(),
                    column: "NAME".to_string(),
                    is_identity: false,
                    datatype: None,
                },
            ],
        }
    }

    #[test]
    fn map_all_prefixes_every_column_with_base_uri() {
        let outgoing = OutgoingMappingConfig {
            base_uri: "http://test/".to_string(),
            map_all: true,
            property_mappings: vec![],
        };
        let mapper = Mapper::new(None, Some(outgoing));
        let mut item = RowItem::new();
        item.set_value("ID", json!("http://test/1"));
        item.set_value("NAME", json!("one"));
        let entity = mapper.map_item_to_entity(&item).unwrap();
        assert_eq!(entity.properties.get("http://test/ID").unwrap(), "http://test/1");
        assert_eq!(entity.properties.get("http://test/NAME").unwrap(), "one");
    }

    #[test]
    fn explicit_mapping_builds_id_and_property() {
        let outgoing = outgoing_explicit();
        let mapper = Mapper::new(None, Some(outgoing));
        let mut item = RowItem::new();
        item.set_value("ID", json!("http://test/1"));
        item.set_value("NAME", json!("one"));
        let entity = mapper.map_item_to_entity(&item).unwrap();
        assert_eq!(entity.id, "http://test/1");
        assert_eq!(entity.properties.get("http://test/NAME").unwrap(), "one");
        assert!(!entity.properties.contains_key("http://test/ID"));
    }

    #[test]
    fn null_property_is_absent_not_null() {
        let outgoing = outgoing_explicit();
        let mapper = Mapper::new(None, Some(outgoing));
        let mut item = RowItem::new();
        item.set_value("ID", json!("http://test/1"));
        item.set_value("NAME", Value::Null);
        let entity = mapper.map_item_to_entity(&item).unwrap();
        assert!(!entity.properties.contains_key("http://test/NAME"));
    }

    #[test]
    fn missing_identity_value_is_an_error() {
        let outgoing = outgoing_explicit();
        let mapper = Mapper::new(None, Some(outgoing));
        let item = RowItem::new();
        assert!(mapper.map_item_to_entity(&item).is_err());
    }

    #[test]
    fn entity_to_item_round_trips_through_incoming_mapping() {
        let incoming = incoming_basic();
        let mapper = Mapper::new(Some(incoming), None);
        let mut entity = Entity::new("http://test/1");
        entity
            .properties
            .insert("http://test/NAME".to_string(), json!("one"));
        let item = mapper.map_entity_to_item(&entity).unwrap();
        assert_eq!(item.get_value("ID").unwrap(), "http://test/1");
        assert_eq!(item.get_value("NAME").unwrap(), "one");
    }

    #[test]
    fn deleted_flag_carries_over() {
        let incoming = incoming_basic();
        let mapper = Mapper::new(Some(incoming), None);
        let mut entity = Entity::new("http://test/1");
        entity.deleted = true;
        let item = mapper.map_entity_to_item(&entity).unwrap();
        assert!(item.deleted);
    }

    #[test]
    fn identity_column_falls_back_to_id() {
        assert_eq!(identity_column(None), "ID");
    }

    #[test]
    fn identity_column_uses_configured_mapping() {
        let incoming = incoming_basic();
        assert_eq!(identity_column(Some(&incoming)), "ID");
    }

    #[test]
    fn uppercase_outgoing_properties_mutates_in_place() {
        let mut outgoing = OutgoingMappingConfig {
            base_uri: "http://test/".to_string(),
            map_all: false,
            property_mappings: vec![OutgoingPropertyMapping {
                property: "name".to_string(),
                ..Default::default()
            }],
        };
        uppercase_outgoing_properties(&mut outgoing);
        assert_eq!(outgoing.property_mappings[0].property, "NAME");
    }
}
