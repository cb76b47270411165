//! Per-call-site description of recognized settings keys.
//!
//! A [`Schema`] turns loosely typed JSON input into the normalized string
//! section the stores persist, and renders stored sections back to typed
//! JSON. Each feature (node settings, player instances...) declares one.
//!
//! ```ignore
//! let schema = Schema::builder()
//!     .field(Field::text("nodeName").max_len(40).trim().default("Media Node"))
//!     .field(Field::int("volume", 0, 150).default(50))
//!     .build();
//! ```

use serde_json::{Map, Number, Value};

use super::config_store::{ConfigValue, Section};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("unknown field '{0}'")]
    UnknownKey(String),
    #[error("missing required field '{0}'")]
    MissingKey(String),
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Value kind of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Bool,
    /// One of a fixed set of strings
    Choice(&'static [&'static str]),
    /// Space-separated subset of a fixed set of words
    Words(&'static [&'static str]),
}

#[derive(Debug, Clone)]
pub struct Field {
    key: &'static str,
    kind: FieldKind,
    default: Option<String>,
    required: bool,
    max_len: Option<usize>,
    trim: bool,
    empty_as_default: bool,
}

impl Field {
    fn new(key: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            kind,
            default: None,
            required: false,
            max_len: None,
            trim: false,
            empty_as_default: false,
        }
    }

    pub fn text(key: &'static str) -> Self {
        Self::new(key, FieldKind::Text)
    }

    pub fn int(key: &'static str, min: i64, max: i64) -> Self {
        Self::new(key, FieldKind::Int { min, max })
    }

    pub fn float(key: &'static str, min: f64, max: f64) -> Self {
        Self::new(key, FieldKind::Float { min, max })
    }

    pub fn boolean(key: &'static str) -> Self {
        Self::new(key, FieldKind::Bool)
    }

    pub fn choice(key: &'static str, options: &'static [&'static str]) -> Self {
        Self::new(key, FieldKind::Choice(options))
    }

    pub fn words(key: &'static str, options: &'static [&'static str]) -> Self {
        Self::new(key, FieldKind::Words(options))
    }

    pub fn default(mut self, value: impl ToString) -> Self {
        self.default = Some(value.to_string());
        self
    }

    /// Must be present when creating
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    /// An empty string input is replaced by the default
    pub fn empty_as_default(mut self) -> Self {
        self.empty_as_default = true;
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::InvalidValue {
            key: self.key.to_string(),
            reason: reason.into(),
        }
    }

    /// Normalize one JSON value to its stored string form
    fn normalize(&self, value: &Value) -> Result<String, SchemaError> {
        match &self.kind {
            FieldKind::Text => {
                let Value::String(s) = value else {
                    return Err(self.invalid("expected a string"));
                };
                let s = if self.trim { s.trim() } else { s.as_str() };
                if let Some(max) = self.max_len {
                    if s.chars().count() > max {
                        return Err(self.invalid(format!("longer than {} characters", max)));
                    }
                }
                if s.is_empty() && self.empty_as_default {
                    if let Some(default) = &self.default {
                        return Ok(default.clone());
                    }
                }
                Ok(s.to_string())
            }
            FieldKind::Int { min, max } => {
                let n = match value {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| self.invalid("expected an integer"))?;
                if n < *min || n > *max {
                    return Err(self.invalid(format!("must be between {} and {}", min, max)));
                }
                Ok(n.to_string())
            }
            FieldKind::Float { min, max } => {
                let f = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|f| f.is_finite())
                .ok_or_else(|| self.invalid("expected a number"))?;
                if f < *min || f > *max {
                    return Err(self.invalid(format!("must be between {} and {}", min, max)));
                }
                Ok(f.to_string())
            }
            FieldKind::Bool => match value {
                Value::Bool(b) => Ok(b.to_string()),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok("true".into()),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok("false".into()),
                _ => Err(self.invalid("expected a boolean")),
            },
            FieldKind::Choice(options) => match value {
                Value::String(s) if options.contains(&s.as_str()) => Ok(s.clone()),
                _ => Err(self.invalid(format!("expected one of: {}", options.join(", ")))),
            },
            FieldKind::Words(options) => {
                let Value::String(s) = value else {
                    return Err(self.invalid("expected a string"));
                };
                let words: Vec<&str> = s.split_whitespace().collect();
                if let Some(bad) = words.iter().find(|w| !options.contains(*w)) {
                    return Err(self.invalid(format!(
                        "'{}' is not one of: {}",
                        bad,
                        options.join(", ")
                    )));
                }
                Ok(words.join(" "))
            }
        }
    }

    /// Typed JSON for a stored string. Falls back to plain coercion for
    /// values that no longer match the kind (hand-edited files).
    fn render(&self, raw: &str) -> Value {
        let typed = match &self.kind {
            FieldKind::Int { .. } => raw.parse::<i64>().ok().map(Value::from),
            FieldKind::Float { .. } => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            FieldKind::Text | FieldKind::Choice(_) | FieldKind::Words(_) => {
                Some(Value::String(raw.to_string()))
            }
        };
        typed.unwrap_or_else(|| coerce_json(raw))
    }
}

fn coerce_json(raw: &str) -> Value {
    serde_json::to_value(ConfigValue::coerce(raw)).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// How [`Schema::validate`] treats absent keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Fill defaults and require required fields
    Create,
    /// Only the keys present in the input
    Patch,
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            fields: self.fields,
        }
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Default values of every field that has one, in declaration order
    pub fn defaults(&self) -> Section {
        self.fields
            .iter()
            .filter_map(|f| f.default.as_ref().map(|d| (f.key.to_string(), d.clone())))
            .collect()
    }

    /// Normalize `input` into a storable section (declaration order).
    /// JSON `null` counts as absent.
    pub fn validate(&self, input: &Value, mode: ValidationMode) -> Result<Section, SchemaError> {
        let Value::Object(map) = input else {
            return Err(SchemaError::NotAnObject);
        };
        if let Some(unknown) = map.keys().find(|k| self.field(k.as_str()).is_none()) {
            return Err(SchemaError::UnknownKey(unknown.clone()));
        }

        let mut section = Section::new();
        for field in &self.fields {
            match map.get(field.key).filter(|v| !v.is_null()) {
                Some(value) => {
                    section.insert(field.key.to_string(), field.normalize(value)?);
                }
                None if mode == ValidationMode::Create => {
                    if field.required {
                        return Err(SchemaError::MissingKey(field.key.to_string()));
                    }
                    if let Some(default) = &field.default {
                        section.insert(field.key.to_string(), default.clone());
                    }
                }
                None => {}
            }
        }
        Ok(section)
    }

    /// Typed JSON object for a stored section
    pub fn render(&self, section: &Section) -> Map<String, Value> {
        section
            .iter()
            .map(|(key, raw)| {
                let value = match self.field(key) {
                    Some(field) => field.render(raw),
                    None => coerce_json(raw),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLAYBACK: &[&str] = &["-L", "-R", "-Z"];

    fn schema() -> Schema {
        Schema::builder()
            .field(Field::text("name").required().max_len(10).trim())
            .field(Field::boolean("autostart").default(false))
            .field(Field::int("volume", 0, 150).default(50))
            .field(Field::float("imageDuration", 0.0, 86400.0).default(10))
            .field(Field::words("playback", PLAYBACK).default("-L"))
            .field(Field::choice("output", &["any", "gl"]).default("any"))
            .field(Field::text("webPage").default("about:blank").empty_as_default())
            .build()
    }

    #[test]
    fn test_create_fills_defaults_in_order() {
        let section = schema()
            .validate(&json!({"volume": 20, "name": " Hall "}), ValidationMode::Create)
            .unwrap();
        let keys: Vec<_> = section.keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["name", "autostart", "volume", "imageDuration", "playback", "output", "webPage"]
        );
        assert_eq!(section["name"], "Hall");
        assert_eq!(section["volume"], "20");
        assert_eq!(section["autostart"], "false");
    }

    #[test]
    fn test_create_requires_required_fields() {
        let err = schema().validate(&json!({}), ValidationMode::Create).unwrap_err();
        assert_eq!(err, SchemaError::MissingKey("name".into()));
    }

    #[test]
    fn test_patch_keeps_only_present_keys() {
        let section = schema()
            .validate(&json!({"autostart": true, "volume": null}), ValidationMode::Patch)
            .unwrap();
        assert_eq!(section.len(), 1);
        assert_eq!(section["autostart"], "true");
    }

    #[test]
    fn test_rejects_bad_values() {
        let s = schema();
        let check = |input: Value| s.validate(&input, ValidationMode::Patch).unwrap_err();

        assert!(matches!(check(json!({"volume": 151})), SchemaError::InvalidValue { .. }));
        assert!(matches!(check(json!({"volume": "loud"})), SchemaError::InvalidValue { .. }));
        assert!(matches!(check(json!({"name": "far too long name"})), SchemaError::InvalidValue { .. }));
        assert!(matches!(check(json!({"playback": "-L -X"})), SchemaError::InvalidValue { .. }));
        assert!(matches!(check(json!({"output": "vulkan"})), SchemaError::InvalidValue { .. }));
        assert_eq!(check(json!({"color": "red"})), SchemaError::UnknownKey("color".into()));
        assert_eq!(check(json!([1, 2])), SchemaError::NotAnObject);
    }

    #[test]
    fn test_normalizes_words_and_empty_default() {
        let section = schema()
            .validate(&json!({"playback": " -L   -Z ", "webPage": ""}), ValidationMode::Patch)
            .unwrap();
        assert_eq!(section["playback"], "-L -Z");
        assert_eq!(section["webPage"], "about:blank");
    }

    #[test]
    fn test_render_types_values() {
        let s = schema();
        let section = s
            .validate(&json!({"name": "x", "volume": "30"}), ValidationMode::Create)
            .unwrap();
        let mut section = section;
        section.insert("uuid".into(), "abc".into());

        let rendered = Value::Object(s.render(&section));
        assert_eq!(rendered["volume"], json!(30));
        assert_eq!(rendered["autostart"], json!(false));
        assert_eq!(rendered["imageDuration"], json!(10.0));
        assert_eq!(rendered["uuid"], json!("abc"));
    }

    #[test]
    fn test_defaults() {
        let defaults = schema().defaults();
        assert_eq!(defaults["volume"], "50");
        assert!(!defaults.contains_key("name"));
    }
}
