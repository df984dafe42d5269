//! JSON-Schema subset used to describe and validate tool arguments (spec.md §3, §4.4).
//!
//! `properties` is an ordered map: insertion order must round-trip byte-identically so
//! that a schema a provider has cached server-side doesn't get bumped to a "new" schema
//! just because a map rehashed it. We use [`PropertyMap`], a thin ordered `Vec<(String,
//! ValueSchema)>` wrapper, rather than a `HashMap` — this mirrors the teacher's house rule
//! of never introducing an unordered map where wire order matters (see
//! `tool_protocol.rs`'s `ToolParameter`, which this module generalizes into a real JSON
//! Schema subset).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// An insertion-ordered string-keyed map of [`ValueSchema`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap(Vec<(String, ValueSchema)>);

impl PropertyMap {
    pub fn new() -> Self {
        PropertyMap(Vec::new())
    }

    /// Insert or replace a property, preserving first-seen position on replace.
    pub fn insert(&mut self, name: impl Into<String>, schema: ValueSchema) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = schema;
        } else {
            self.0.push((name, schema));
        }
    }

    pub fn get(&self, name: &str) -> Option<&ValueSchema> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValueSchema)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // serde_json::Map preserves insertion order under the `preserve_order` feature,
        // which this crate enables — this is the only place order-sensitive JSON leaves
        // PropertyMap's control, so we build the map by hand instead of going through a
        // HashMap-backed serializer.
        let mut map = serde_json::Map::new();
        for (k, v) in &self.0 {
            map.insert(k.clone(), serde_json::to_value(v).map_err(serde::ser::Error::custom)?);
        }
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PropertyMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::deserialize(deserializer)?;
        let mut props = PropertyMap::new();
        for (k, v) in map {
            let schema: ValueSchema = serde_json::from_value(v).map_err(serde::de::Error::custom)?;
            props.insert(k, schema);
        }
        Ok(props)
    }
}

/// The JSON primitive/structural type a [`ValueSchema`] node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

/// Whether (and how) an object schema accepts properties beyond those it names.
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<ValueSchema>),
}

impl Default for AdditionalProperties {
    fn default() -> Self {
        AdditionalProperties::Allowed(false)
    }
}

impl Serialize for AdditionalProperties {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AdditionalProperties::Allowed(b) => serializer.serialize_bool(*b),
            AdditionalProperties::Schema(s) => s.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AdditionalProperties {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        match value {
            JsonValue::Bool(b) => Ok(AdditionalProperties::Allowed(b)),
            other => {
                let schema: ValueSchema = serde_json::from_value(other).map_err(serde::de::Error::custom)?;
                Ok(AdditionalProperties::Schema(Box::new(schema)))
            }
        }
    }
}

/// A JSON-Schema subset node (spec.md §3's `ValueSchema`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<JsonValue>>,
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub properties: PropertyMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ValueSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(rename = "anyOf", default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<ValueSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
}

impl ValueSchema {
    pub fn string() -> Self {
        ValueSchema {
            schema_type: Some(SchemaType::String),
            ..Default::default()
        }
    }

    pub fn number() -> Self {
        ValueSchema {
            schema_type: Some(SchemaType::Number),
            ..Default::default()
        }
    }

    pub fn integer() -> Self {
        ValueSchema {
            schema_type: Some(SchemaType::Integer),
            ..Default::default()
        }
    }

    pub fn boolean() -> Self {
        ValueSchema {
            schema_type: Some(SchemaType::Boolean),
            ..Default::default()
        }
    }

    pub fn array(items: ValueSchema) -> Self {
        ValueSchema {
            schema_type: Some(SchemaType::Array),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    /// A struct-shaped object schema with `additionalProperties: false` by default, per
    /// spec.md §4.4 ("Struct-generated object schemas have `additionalProperties = false`
    /// by default").
    pub fn object() -> Self {
        ValueSchema {
            schema_type: Some(SchemaType::Object),
            additional_properties: Some(AdditionalProperties::Allowed(false)),
            ..Default::default()
        }
    }

    /// A map-like object schema (string-keyed, value schema `v`), per spec.md §4.4 "Maps
    /// keyed by string → object with `additionalProperties` = value schema".
    pub fn map_of(value: ValueSchema) -> Self {
        ValueSchema {
            schema_type: Some(SchemaType::Object),
            additional_properties: Some(AdditionalProperties::Schema(Box::new(value))),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: ValueSchema, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Deep-copy this schema forcing `additionalProperties = false` on every object node,
    /// preserving property order and every other constraint — spec.md §4.4's strict-mode
    /// normalization for providers that reject relaxed `additionalProperties`.
    pub fn normalized_for_strict_mode(&self) -> ValueSchema {
        let mut copy = self.clone();
        if copy.schema_type == Some(SchemaType::Object) {
            copy.additional_properties = Some(AdditionalProperties::Allowed(false));
        }
        let mut normalized_props = PropertyMap::new();
        for (name, schema) in self.properties.iter() {
            normalized_props.insert(name.clone(), schema.normalized_for_strict_mode());
        }
        copy.properties = normalized_props;
        if let Some(items) = &self.items {
            copy.items = Some(Box::new(items.normalized_for_strict_mode()));
        }
        if let Some(any_of) = &self.any_of {
            copy.any_of = Some(any_of.iter().map(|s| s.normalized_for_strict_mode()).collect());
        }
        copy
    }
}

/// A named, described function signature offered to the model as a tool (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: ValueSchema,
}

impl FunctionSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: ValueSchema) -> Self {
        FunctionSchema {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Why a JSON value failed to validate against a [`ValueSchema`] (spec.md §4.4, §7).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path, self.reason)
    }
}

/// Validate `value` against `schema`, recursively, per spec.md §4.4.
pub fn validate(schema: &ValueSchema, value: &JsonValue) -> Result<(), ValidationError> {
    validate_at(schema, value, "$")
}

fn validate_at(schema: &ValueSchema, value: &JsonValue, path: &str) -> Result<(), ValidationError> {
    if let Some(alternatives) = &schema.any_of {
        if alternatives.iter().any(|alt| validate_at(alt, value, path).is_ok()) {
            return Ok(());
        }
        return Err(ValidationError {
            path: path.to_string(),
            reason: "value did not match any alternative in anyOf".to_string(),
        });
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.contains(value) {
            return Err(ValidationError {
                path: path.to_string(),
                reason: format!("value {value} is not one of the allowed enum values"),
            });
        }
    }

    match schema.schema_type {
        Some(SchemaType::Object) => validate_object(schema, value, path),
        Some(SchemaType::Array) => validate_array(schema, value, path),
        Some(SchemaType::String) => {
            let s = value.as_str().ok_or_else(|| type_error(path, "string"))?;
            if let Some(min_len) = schema.min_length {
                if s.len() < min_len {
                    return Err(ValidationError {
                        path: path.to_string(),
                        reason: format!("string shorter than minLength {min_len}"),
                    });
                }
            }
            if let Some(pattern) = &schema.pattern {
                if !simple_pattern_matches(pattern, s) {
                    return Err(ValidationError {
                        path: path.to_string(),
                        reason: format!("string does not match pattern {pattern}"),
                    });
                }
            }
            Ok(())
        }
        Some(SchemaType::Number) => {
            let n = value.as_f64().ok_or_else(|| type_error(path, "number"))?;
            check_bounds(schema, n, path)
        }
        Some(SchemaType::Integer) => {
            if !value.is_i64() && !value.is_u64() {
                return Err(type_error(path, "integer"));
            }
            let n = value.as_f64().unwrap_or_default();
            check_bounds(schema, n, path)
        }
        Some(SchemaType::Boolean) => {
            if value.as_bool().is_none() {
                return Err(type_error(path, "boolean"));
            }
            Ok(())
        }
        Some(SchemaType::Null) => {
            if !value.is_null() {
                return Err(type_error(path, "null"));
            }
            Ok(())
        }
        None => Ok(()),
    }
}

fn check_bounds(schema: &ValueSchema, n: f64, path: &str) -> Result<(), ValidationError> {
    if let Some(min) = schema.minimum {
        if n < min {
            return Err(ValidationError {
                path: path.to_string(),
                reason: format!("{n} is less than minimum {min}"),
            });
        }
    }
    if let Some(max) = schema.maximum {
        if n > max {
            return Err(ValidationError {
                path: path.to_string(),
                reason: format!("{n} is greater than maximum {max}"),
            });
        }
    }
    Ok(())
}

fn validate_object(schema: &ValueSchema, value: &JsonValue, path: &str) -> Result<(), ValidationError> {
    let obj = value.as_object().ok_or_else(|| type_error(path, "object"))?;

    for required in &schema.required {
        if !obj.contains_key(required) {
            return Err(ValidationError {
                path: format!("{path}.{required}"),
                reason: "missing required property".to_string(),
            });
        }
    }

    for (key, val) in obj {
        let child_path = format!("{path}.{key}");
        if let Some(prop_schema) = schema.properties.get(key) {
            validate_at(prop_schema, val, &child_path)?;
        } else {
            match &schema.additional_properties {
                Some(AdditionalProperties::Allowed(true)) | None => {}
                Some(AdditionalProperties::Allowed(false)) => {
                    return Err(ValidationError {
                        path: child_path,
                        reason: format!("unexpected property \"{key}\""),
                    });
                }
                Some(AdditionalProperties::Schema(sub)) => {
                    validate_at(sub, val, &child_path)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_array(schema: &ValueSchema, value: &JsonValue, path: &str) -> Result<(), ValidationError> {
    let arr = value.as_array().ok_or_else(|| type_error(path, "array"))?;
    if let Some(items_schema) = &schema.items {
        for (i, item) in arr.iter().enumerate() {
            validate_at(items_schema, item, &format!("{path}[{i}]"))?;
        }
    }
    Ok(())
}

fn type_error(path: &str, expected: &str) -> ValidationError {
    ValidationError {
        path: path.to_string(),
        reason: format!("expected a value of type {expected}"),
    }
}

/// A deliberately small pattern matcher covering the anchored literal and single-`*`
/// wildcard forms tool authors actually write in parameter schemas. Full regex support is
/// left to callers who need it, via a custom `Tool` validating its own arguments.
fn simple_pattern_matches(pattern: &str, value: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix(".*") {
        return value.ends_with(suffix);
    }
    pattern == value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> ValueSchema {
        ValueSchema::object()
            .with_property("name", ValueSchema::string(), true)
            .with_property("age", ValueSchema::integer(), false)
    }

    #[test]
    fn validates_required_and_rejects_unknown_keys() {
        let schema = sample_schema();
        assert!(validate(&schema, &json!({"name": "Ada"})).is_ok());
        assert!(validate(&schema, &json!({"age": 3})).is_err());
        assert!(validate(&schema, &json!({"name": "Ada", "extra": 1})).is_err());
    }

    #[test]
    fn property_order_is_preserved_on_round_trip() {
        let schema = ValueSchema::object()
            .with_property("zeta", ValueSchema::string(), true)
            .with_property("alpha", ValueSchema::string(), true);
        let json = serde_json::to_string(&schema).unwrap();
        let back: ValueSchema = serde_json::from_str(&json).unwrap();
        let names: Vec<&String> = back.properties.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn normalized_for_strict_mode_forces_additional_properties_false() {
        let mut schema = sample_schema();
        schema.additional_properties = Some(AdditionalProperties::Allowed(true));
        let strict = schema.normalized_for_strict_mode();
        assert_eq!(strict.additional_properties, Some(AdditionalProperties::Allowed(false)));
        // Original untouched.
        assert_eq!(schema.additional_properties, Some(AdditionalProperties::Allowed(true)));
    }

    #[test]
    fn any_of_accepts_first_matching_alternative() {
        let schema = ValueSchema {
            any_of: Some(vec![ValueSchema::string(), ValueSchema::integer()]),
            ..Default::default()
        };
        assert!(validate(&schema, &json!("hi")).is_ok());
        assert!(validate(&schema, &json!(5)).is_ok());
        assert!(validate(&schema, &json!(true)).is_err());
    }
}
