//! Object and record validators

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{describe, string, DynValidator, Validator, ValidatorExt};
use crate::error::ValidationError;
use crate::record::Record;

/// How an object validator treats keys it does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeys {
    /// Undeclared keys fail validation
    #[default]
    Reject,
    /// Undeclared keys are passed through untouched
    Ignore,
}

struct FieldSpec {
    key: String,
    validator: DynValidator,
    required: bool,
}

/// Validates a JSON object key by key
pub struct ObjectValidator {
    fields: Vec<FieldSpec>,
    unknown_keys: UnknownKeys,
}

/// Start a strict object validator with no fields
pub fn object() -> ObjectValidator {
    ObjectValidator {
        fields: Vec::new(),
        unknown_keys: UnknownKeys::Reject,
    }
}

impl ObjectValidator {
    /// Declare a required key
    pub fn field<V>(self, key: &str, validator: V) -> Self
    where
        V: Validator + 'static,
        V::Output: Into<Value>,
    {
        self.push(key, validator.erased(), true)
    }

    /// Declare a key that may be absent but must validate when present
    pub fn optional_field<V>(self, key: &str, validator: V) -> Self
    where
        V: Validator + 'static,
        V::Output: Into<Value>,
    {
        self.push(key, validator.erased(), false)
    }

    pub fn unknown_keys(mut self, mode: UnknownKeys) -> Self {
        self.unknown_keys = mode;
        self
    }

    pub fn allow_unknown_keys(self) -> Self {
        self.unknown_keys(UnknownKeys::Ignore)
    }

    /// Declared keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    fn push(mut self, key: &str, validator: DynValidator, required: bool) -> Self {
        self.fields.push(FieldSpec {
            key: key.to_string(),
            validator,
            required,
        });
        self
    }

    /// Validate an already-unwrapped map (record props)
    pub fn validate_map(&self, map: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
        if self.unknown_keys == UnknownKeys::Reject {
            if let Some(key) = map.keys().find(|k| !self.fields.iter().any(|f| &f.key == *k)) {
                return Err(ValidationError::new(
                    "no undeclared property",
                    format!("unexpected property {:?}", key),
                )
                .at_key(key.clone()));
            }
        }

        let mut output = Map::new();
        for field in &self.fields {
            match map.get(&field.key) {
                Some(value) => {
                    let checked = field
                        .validator
                        .validate(value)
                        .map_err(|e| e.at_key(field.key.clone()))?;
                    output.insert(field.key.clone(), checked);
                }
                None if field.required => {
                    return Err(
                        ValidationError::new(field.validator.expectation(), "missing")
                            .at_key(field.key.clone()),
                    );
                }
                None => {}
            }
        }

        if self.unknown_keys == UnknownKeys::Ignore {
            for (key, value) in map {
                if !output.contains_key(key) && !self.fields.iter().any(|f| &f.key == key) {
                    output.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(output)
    }
}

impl Validator for ObjectValidator {
    type Output = Map<String, Value>;

    fn validate(&self, value: &Value) -> Result<Self::Output, ValidationError> {
        match value {
            Value::Object(map) => self.validate_map(map),
            other => Err(ValidationError::new(self.expectation(), describe(other))),
        }
    }

    fn expectation(&self) -> String {
        let keys: Vec<&str> = self.keys().collect();
        format!("an object with keys {{{}}}", keys.join(", "))
    }

    fn well_formed(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.key.as_str()) {
                return Err(format!("property {:?} declared twice", field.key));
            }
            field
                .validator
                .well_formed()
                .map_err(|e| format!("property {:?}: {}", field.key, e))?;
        }
        Ok(())
    }
}

/// Validates whole records of one type.
///
/// The `typeName` tag is checked before anything else so a record routed to
/// the wrong contract is reported as such rather than as a props mismatch.
pub struct RecordValidator {
    type_name: String,
    id_prefix: Option<String>,
    props: ObjectValidator,
}

impl RecordValidator {
    pub fn new(type_name: impl Into<String>, props: ObjectValidator) -> Self {
        Self {
            type_name: type_name.into(),
            id_prefix: None,
            props,
        }
    }

    /// Require ids of the form `<type_name>:<suffix>`
    pub fn require_id_prefix(mut self) -> Self {
        self.id_prefix = Some(format!("{}:", self.type_name));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn props(&self) -> &ObjectValidator {
        &self.props
    }

    /// Validate an in-memory record without round-tripping through JSON
    pub fn check(&self, record: &Record) -> Result<(), ValidationError> {
        self.check_type_name(&record.type_name)?;
        self.check_id(&record.id)?;
        self.props
            .validate_map(&record.props)
            .map(|_| ())
            .map_err(|e| e.at_key("props"))
    }

    fn check_type_name(&self, type_name: &str) -> Result<(), ValidationError> {
        if type_name == self.type_name {
            Ok(())
        } else {
            Err(ValidationError::new(
                format!("{:?}", self.type_name),
                describe(&Value::String(type_name.to_string())),
            )
            .at_key("typeName"))
        }
    }

    fn check_id(&self, id: &str) -> Result<(), ValidationError> {
        let value = Value::String(id.to_string());
        let result = match &self.id_prefix {
            Some(prefix) => string().prefixed(prefix).validate(&value),
            None => string().non_empty().validate(&value),
        };
        result.map(|_| ()).map_err(|e| e.at_key("id"))
    }
}

impl std::fmt::Debug for RecordValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordValidator")
            .field("type_name", &self.type_name)
            .field("id_prefix", &self.id_prefix)
            .field("props", &self.props.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Validator for RecordValidator {
    type Output = Record;

    fn validate(&self, value: &Value) -> Result<Record, ValidationError> {
        let map = value
            .as_object()
            .ok_or_else(|| ValidationError::new(self.expectation(), describe(value)))?;

        if let Some(key) = map
            .keys()
            .find(|k| !matches!(k.as_str(), "id" | "typeName" | "props"))
        {
            return Err(ValidationError::new(
                "no undeclared property",
                format!("unexpected property {:?}", key),
            )
            .at_key(key.clone()));
        }

        let type_name = string()
            .validate(map.get("typeName").unwrap_or(&Value::Null))
            .map_err(|e| e.at_key("typeName"))?;
        self.check_type_name(&type_name)?;

        let id = string()
            .validate(map.get("id").unwrap_or(&Value::Null))
            .map_err(|e| e.at_key("id"))?;
        self.check_id(&id)?;

        let props = self
            .props
            .validate(map.get("props").unwrap_or(&Value::Null))
            .map_err(|e| e.at_key("props"))?;

        // Keep the caller's values rather than the normalized validator output.
        let props = match map.get("props") {
            Some(Value::Object(original)) => original.clone(),
            _ => props,
        };

        Ok(Record {
            id,
            type_name,
            props,
        })
    }

    fn expectation(&self) -> String {
        format!("a {:?} record", self.type_name)
    }

    fn well_formed(&self) -> Result<(), String> {
        if self.type_name.is_empty() {
            return Err("record type name is empty".to_string());
        }
        self.props.well_formed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{nullable, number, positive_number};
    use serde_json::json;

    fn size() -> ObjectValidator {
        object()
            .field("w", positive_number())
            .field("h", positive_number())
    }

    #[test]
    fn test_strict_rejects_unknown_key() {
        let v = object().field("a", number());
        let err = v.validate(&json!({"a": 1, "b": 2})).unwrap_err();
        assert_eq!(err.path.to_string(), "$.b");
        assert_eq!(err.found, "unexpected property \"b\"");
    }

    #[test]
    fn test_ignore_mode_passes_unknown_keys_through() {
        let v = object().field("a", number()).allow_unknown_keys();
        let out = v.validate(&json!({"a": 1, "b": "x"})).unwrap();
        assert_eq!(out.get("b"), Some(&json!("x")));
    }

    #[test]
    fn test_missing_and_optional_fields() {
        let v = object()
            .field("w", number())
            .optional_field("label", string());
        assert!(v.validate(&json!({"w": 1})).is_ok());

        let err = v.validate(&json!({"label": "x"})).unwrap_err();
        assert_eq!(err.path.to_string(), "$.w");
        assert_eq!(err.found, "missing");

        let err = v.validate(&json!({"w": 1, "label": 3})).unwrap_err();
        assert_eq!(err.path.to_string(), "$.label");
    }

    #[test]
    fn test_nested_paths() {
        let v = object().field("crop", nullable(object().field("size", size())));
        let err = v
            .validate(&json!({"crop": {"size": {"w": 1, "h": 0}}}))
            .unwrap_err();
        assert_eq!(err.path.to_string(), "$.crop.size.h");
        assert_eq!(err.expected, "a number > 0");
    }

    #[test]
    fn test_duplicate_key_is_malformed() {
        let v = object().field("a", number()).field("a", string());
        assert!(v.well_formed().is_err());
    }

    #[test]
    fn test_record_validator_checks_type_tag_first() {
        let v = RecordValidator::new("video", size()).require_id_prefix();

        let ok = v
            .validate(&json!({"id": "video:1", "typeName": "video", "props": {"w": 1, "h": 2}}))
            .unwrap();
        assert_eq!(ok.id, "video:1");

        // Wrong type with bad props still reports the type tag.
        let err = v
            .validate(&json!({"id": "image:1", "typeName": "image", "props": {}}))
            .unwrap_err();
        assert_eq!(err.path.to_string(), "$.typeName");
        assert_eq!(err.expected, "\"video\"");
    }

    #[test]
    fn test_record_check_paths() {
        let v = RecordValidator::new("video", size()).require_id_prefix();

        let record = Record::new("video:1", "video", json!({"w": 1, "h": -1}));
        let err = v.check(&record).unwrap_err();
        assert_eq!(err.path.to_string(), "$.props.h");

        let record = Record::new("page:1", "video", json!({"w": 1, "h": 1}));
        let err = v.check(&record).unwrap_err();
        assert_eq!(err.path.to_string(), "$.id");
    }
}
