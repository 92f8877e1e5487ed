//! Configuration schema definitions.
//!
//! The schema is an immutable JSON document describing every configuration
//! parameter (type tag, default, description) and the full list of modules a
//! project may declare. The copy shipped with the crate is embedded at
//! compile time; an alternate file can be loaded with [`Schema::from_path`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::loader::ConfigError;

const EMBEDDED_SCHEMA: &str = include_str!("../../resource/config_schema.json");
const EMBEDDED_SCHEMA_NAME: &str = "<embedded config_schema.json>";

/// Value kind a parameter is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    #[serde(alias = "str")]
    String,
    Bool,
    Path,
    #[serde(alias = "array_str")]
    ArrayOfString,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Bool => "bool",
            TypeTag::Path => "path",
            TypeTag::ArrayOfString => "array_of_string",
        }
    }

    fn legacy_name(&self) -> Option<&'static str> {
        match self {
            TypeTag::String => Some("str"),
            TypeTag::ArrayOfString => Some("array_str"),
            TypeTag::Bool | TypeTag::Path => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a single parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    /// Declared type tag.
    #[serde(rename = "type")]
    pub type_tag: TypeTag,

    /// Raw default, cast through `type_tag` when the store is built.
    pub default: Value,

    /// Description template; may contain `{VERSION}` and `{ALLOWED_MODULES}`.
    #[serde(default)]
    pub desc: String,
}

/// A named group of parameters, kept in schema order.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub params: Vec<(String, ParamSpec)>,
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(default)]
    types: BTreeMap<String, String>,
    #[serde(default)]
    allowed_modules: Vec<String>,
    #[serde(default)]
    config: Map<String, Value>,
}

/// The parsed, immutable schema document.
#[derive(Debug, Clone)]
pub struct Schema {
    types: BTreeMap<String, String>,
    allowed_modules: Vec<String>,
    sections: Vec<Section>,
}

impl Schema {
    /// Parse the schema shipped with the crate.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json_str(EMBEDDED_SCHEMA, EMBEDDED_SCHEMA_NAME)
    }

    /// Load a schema document from disk.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::SchemaLoad {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text, &path.display().to_string())
    }

    /// Parse a schema document. `source_name` is only used in error messages.
    pub fn from_json_str(text: &str, source_name: &str) -> Result<Self, ConfigError> {
        let load_error = |reason: String| ConfigError::SchemaLoad {
            source_name: source_name.to_string(),
            reason,
        };

        let raw: RawSchema = serde_json::from_str(text).map_err(|e| load_error(e.to_string()))?;

        let mut sections = Vec::with_capacity(raw.config.len());
        for (section_name, params) in raw.config {
            let Value::Object(params) = params else {
                return Err(load_error(format!("section '{section_name}' is not a table")));
            };

            let mut specs = Vec::with_capacity(params.len());
            for (param_name, spec) in params {
                let spec: ParamSpec = serde_json::from_value(spec).map_err(|e| {
                    load_error(format!("parameter '{section_name}.{param_name}': {e}"))
                })?;
                specs.push((param_name, spec));
            }

            sections.push(Section {
                name: section_name,
                params: specs,
            });
        }

        Ok(Self {
            types: raw.types,
            allowed_modules: raw.allowed_modules,
            sections,
        })
    }

    /// Every module a project may declare, in schema order.
    pub fn allowed_modules(&self) -> &[String] {
        &self.allowed_modules
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up a parameter declaration by section and name.
    pub fn param(&self, section: &str, name: &str) -> Option<&ParamSpec> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, spec)| spec)
    }

    /// Human-readable description of a type tag.
    pub fn type_description(&self, tag: TypeTag) -> Option<&str> {
        self.types
            .get(tag.as_str())
            .or_else(|| tag.legacy_name().and_then(|name| self.types.get(name)))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_schema_parses() {
        let schema = Schema::embedded().unwrap();
        assert!(!schema.allowed_modules().is_empty());

        let names: Vec<_> = schema.sections().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["plg-sdk", "project", "modules"]);

        let version = schema.param("project", "version").unwrap();
        assert_eq!(version.type_tag, TypeTag::String);
        assert_eq!(
            schema.type_description(TypeTag::ArrayOfString),
            Some("Type: array of strings")
        );
    }

    #[test]
    fn test_legacy_type_names() {
        let schema = Schema::from_json_str(
            r#"{
                "types": {"str": "text"},
                "config": {"a": {"b": {"type": "array_str", "default": []}}}
            }"#,
            "test",
        )
        .unwrap();

        assert_eq!(schema.param("a", "b").unwrap().type_tag, TypeTag::ArrayOfString);
        assert_eq!(schema.type_description(TypeTag::String), Some("text"));
    }

    #[test]
    fn test_malformed_schema_is_fatal() {
        let err = Schema::from_json_str("{ not json", "broken").unwrap_err();
        assert!(matches!(err, ConfigError::SchemaLoad { .. }));

        let err = Schema::from_json_str(
            r#"{"config": {"a": {"b": {"type": "float", "default": 1}}}}"#,
            "unknown-tag",
        )
        .unwrap_err();
        assert!(err.to_string().contains("a.b"));
    }

    #[test]
    fn test_missing_schema_file() {
        let err = Schema::from_path(Path::new("/nonexistent/config_schema.json")).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaLoad { .. }));
    }
}
