//! Shape validation and normalization of extraction batches.
//!
//! Extraction output is model-generated and loosely shaped, so every record is
//! parsed individually with lenient field aliases. Anything that cannot be
//! interpreted is reported back to the caller rather than failing the batch.

use serde_json::Value;

use crate::types::Category;

mod raw {
    use serde::Deserialize;
    use serde_json::Value;

    #[derive(Debug, Deserialize)]
    pub struct RawEntity {
        pub id: Option<Value>,
        #[serde(alias = "type", alias = "entity_type", alias = "entityType", alias = "category")]
        pub kind: Option<String>,
        pub name: Option<String>,
        #[serde(alias = "key sentence", alias = "keySentence")]
        pub key_sentence: Option<Value>,
        pub attributes: Option<Value>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RawRelationship {
        #[serde(alias = "from")]
        pub source: Option<Value>,
        #[serde(alias = "to")]
        pub target: Option<Value>,
        #[serde(alias = "type", alias = "relationship", alias = "label")]
        pub relation: Option<String>,
    }
}

/// One extraction group after shape validation. Records are still raw.
#[derive(Debug, Clone, Default)]
pub struct RawGroup {
    pub entities: Vec<Value>,
    pub relationships: Vec<Value>,
}

/// An entity record ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInput {
    pub local_id: String,
    pub category: Category,
    pub name: String,
    /// Normalized, non-empty attributes in input order.
    pub attributes: Vec<(String, String)>,
}

/// A relationship record before reference resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInput {
    pub source: String,
    pub relation: String,
    pub target: String,
}

/// Validate one group. `Err` carries the reason it was diverted.
pub fn parse_group(value: &Value) -> Result<RawGroup, String> {
    let Value::Object(map) = value else {
        return Err("group is not an object".to_string());
    };
    let list = |key: &str| -> Result<Vec<Value>, String> {
        match map.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(format!("'{}' is not a list", key)),
        }
    };
    Ok(RawGroup {
        entities: list("entities")?,
        relationships: list("relationships")?,
    })
}

/// Interpret one entity record. `Err` carries the rejection reason.
pub fn parse_entity(value: &Value) -> Result<EntityInput, String> {
    let raw: raw::RawEntity =
        serde_json::from_value(value.clone()).map_err(|e| format!("entity is not an object: {}", e))?;

    let local_id = raw
        .id
        .as_ref()
        .and_then(scalar_to_string)
        .ok_or_else(|| "entity has no id".to_string())?;

    let name = raw.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(format!("entity '{}' has no name", local_id));
    }

    let kind = raw.kind.as_deref().unwrap_or_default();
    let category =
        Category::from_str_flexible(kind).ok_or_else(|| format!("entity '{}' has unknown type '{}'", local_id, kind))?;

    let mut attributes = Vec::new();
    if let Some(sentence) = raw.key_sentence.as_ref().and_then(normalize_value) {
        attributes.push(("key_sentence".to_string(), sentence));
    }
    match raw.attributes {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                if let Some(value) = normalize_value(&value) {
                    attributes.push((key.to_string(), value));
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            tracing::warn!(entity = %local_id, attributes = %other, "Ignoring non-object attributes");
        }
    }

    Ok(EntityInput {
        local_id,
        category,
        name: name.to_string(),
        attributes,
    })
}

/// Interpret one relationship record. `Err` carries the rejection reason.
pub fn parse_relationship(value: &Value) -> Result<RelationshipInput, String> {
    let raw: raw::RawRelationship =
        serde_json::from_value(value.clone()).map_err(|e| format!("relationship is not an object: {}", e))?;

    let source = raw.source.as_ref().and_then(scalar_to_string);
    let target = raw.target.as_ref().and_then(scalar_to_string);
    let relation = raw.relation.as_deref().map(str::trim).unwrap_or_default();

    match (source, target) {
        (Some(source), Some(target)) if !relation.is_empty() => Ok(RelationshipInput {
            source,
            relation: relation.to_string(),
            target,
        }),
        (Some(_), Some(_)) => Err("relationship has no relation label".to_string()),
        _ => Err("relationship is missing source or target".to_string()),
    }
}

/// Render an attribute value as a stored scalar.
///
/// Null and empty values yield `None`. Lists are joined with `,` after
/// dropping empty elements; nested objects become compact JSON.
pub fn normalize_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(normalize_value).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        Value::Object(map) => (!map.is_empty()).then(|| value.to_string()),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
