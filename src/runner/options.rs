//! Runner configuration options.
//!
//! Each backend declares its options as a `ConfigurationSchema`. Raw option
//! maps are validated against it once, producing an immutable
//! `Configuration` with defaults filled in. Secret options never show up in
//! `Debug` output or redacted renderings.

use crate::error::{Result, RunnerError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;

/// Placeholder shown instead of secret values.
pub const SECRET_MASK: &str = "--------";

/// JSON type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Number,
}

/// A single declared option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub title: Option<&'static str>,
    pub default: Option<JsonValue>,
    pub required: bool,
    pub secret: bool,
}

impl OptionSpec {
    pub fn string(name: &'static str) -> Self {
        Self::new(name, OptionKind::String)
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, OptionKind::Number)
    }

    fn new(name: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            kind,
            title: None,
            default: None,
            required: false,
            secret: false,
        }
    }

    pub fn title(mut self, title: &'static str) -> Self {
        self.title = Some(title);
        self
    }

    pub fn default_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    fn accepts(&self, value: &JsonValue) -> bool {
        match self.kind {
            OptionKind::String => value.is_string(),
            OptionKind::Number => value.is_number(),
        }
    }
}

/// The set of options a runner recognizes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationSchema {
    options: Vec<OptionSpec>,
}

impl ConfigurationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec);
        self
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    pub fn required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.options.iter().filter(|o| o.required).map(|o| o.name)
    }

    pub fn secret(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.options.iter().filter(|o| o.secret).map(|o| o.name)
    }

    /// Renders the schema as a JSON-schema style object.
    pub fn to_json(&self) -> JsonValue {
        let properties: Map<String, JsonValue> = self
            .options
            .iter()
            .map(|spec| {
                let mut property = Map::new();
                property.insert("type".into(), json!(spec.kind));
                if let Some(title) = spec.title {
                    property.insert("title".into(), json!(title));
                }
                if let Some(default) = &spec.default {
                    property.insert("default".into(), default.clone());
                }
                (spec.name.to_string(), JsonValue::Object(property))
            })
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required().collect::<Vec<_>>(),
            "secret": self.secret().collect::<Vec<_>>(),
        })
    }

    /// Validates raw options and fills in defaults.
    ///
    /// Unknown keys are kept as-is. Nulls count as absent, and so do empty
    /// strings for required options.
    pub fn validate(&self, raw: JsonValue) -> Result<Configuration> {
        let mut values = match raw {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => {
                return Err(RunnerError::configuration(format!(
                    "options must be an object, got {other}"
                )))
            }
        };

        values.retain(|_, value| !value.is_null());

        for spec in &self.options {
            match values.get(spec.name) {
                Some(value) if !spec.accepts(value) => {
                    return Err(RunnerError::configuration(format!(
                        "option '{}' must be a {}",
                        spec.name,
                        json!(spec.kind).as_str().unwrap_or("value")
                    )));
                }
                Some(JsonValue::String(s)) if spec.required && s.trim().is_empty() => {
                    return Err(missing(spec.name));
                }
                Some(_) => {}
                None => match &spec.default {
                    Some(default) => {
                        values.insert(spec.name.to_string(), default.clone());
                    }
                    None if spec.required => return Err(missing(spec.name)),
                    None => {}
                },
            }
        }

        Ok(Configuration {
            values,
            secret: self.secret().map(str::to_string).collect(),
        })
    }
}

fn missing(name: &str) -> RunnerError {
    RunnerError::configuration(format!("missing required option '{name}'"))
}

/// Validated, immutable runner options.
#[derive(Clone, PartialEq)]
pub struct Configuration {
    values: Map<String, JsonValue>,
    secret: Vec<String>,
}

impl Configuration {
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(JsonValue::as_str)
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.secret.iter().any(|s| s == name)
    }

    /// Deserializes the options into a backend's typed option struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(JsonValue::Object(self.values.clone()))
            .map_err(|e| RunnerError::configuration(e.to_string()))
    }

    /// Options with secret values masked, for display or persistence.
    pub fn redacted(&self) -> JsonValue {
        let masked = self
            .values
            .iter()
            .map(|(key, value)| {
                let value = if self.is_secret(key) {
                    json!(SECRET_MASK)
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect();
        JsonValue::Object(masked)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration({})", self.redacted())
    }
}
