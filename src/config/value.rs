//! Typed configuration values and per-tag casting.
//!
//! Raw values (schema defaults and user overrides alike) arrive as JSON
//! values and are cast through the parameter's [`TypeTag`]. The sentinel
//! tokens only exist at this boundary: `%!NOT_SET!%` becomes an absent value
//! and `%!DEFAULT!%` becomes [`ConfigValue::Derived`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::schema::TypeTag;

/// Token marking a parameter as explicitly unset.
pub const NOT_SET_TOKEN: &str = "%!NOT_SET!%";

/// Token asking for a value derived from other parameters.
pub const DEFAULT_TOKEN: &str = "%!DEFAULT!%";

/// A raw value could not be coerced to the declared type tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot cast {found} to {type_tag}: {reason}")]
pub struct CastError {
    pub type_tag: TypeTag,
    pub found: String,
    pub reason: &'static str,
}

/// A resolved configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    String(String),
    Bool(bool),
    Path(PathBuf),
    StringArray(Vec<String>),
    /// Computed from other parameters when read (see `project.namespace`).
    Derived,
}

impl ConfigValue {
    /// Cast a raw value through `tag`.
    ///
    /// Returns `Ok(None)` for the unset sentinel.
    pub fn cast(tag: TypeTag, raw: &Value) -> Result<Option<Self>, CastError> {
        if let Value::String(s) = raw {
            if s == NOT_SET_TOKEN {
                return Ok(None);
            }
            if s == DEFAULT_TOKEN && tag == TypeTag::String {
                return Ok(Some(ConfigValue::Derived));
            }
        }

        let fail = |reason| CastError {
            type_tag: tag,
            found: raw.to_string(),
            reason,
        };

        let value = match tag {
            TypeTag::Bool => match raw {
                Value::Bool(b) => ConfigValue::Bool(*b),
                Value::String(s) if s.eq_ignore_ascii_case("true") => ConfigValue::Bool(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => ConfigValue::Bool(false),
                Value::String(_) => return Err(fail("expected \"true\" or \"false\"")),
                _ => return Err(fail("expected a boolean")),
            },
            TypeTag::Path => match raw {
                Value::String(s) => ConfigValue::Path(PathBuf::from(s)),
                _ => return Err(fail("expected a path string")),
            },
            TypeTag::ArrayOfString => match raw {
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(s) => out.push(s.clone()),
                            _ => return Err(fail("every array element must be a string")),
                        }
                    }
                    ConfigValue::StringArray(out)
                }
                _ => return Err(fail("expected an array of strings")),
            },
            TypeTag::String => match raw {
                Value::String(s) => ConfigValue::String(s.clone()),
                Value::Number(n) => ConfigValue::String(n.to_string()),
                Value::Bool(b) => ConfigValue::String(b.to_string()),
                _ => return Err(fail("expected a scalar")),
            },
        };

        Ok(Some(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ConfigValue::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            ConfigValue::StringArray(items) => Some(items),
            _ => None,
        }
    }

    /// Render the value as a TOML literal, sentinels included.
    pub fn to_toml_literal(&self) -> String {
        let value = match self {
            ConfigValue::String(s) => toml::Value::String(s.clone()),
            ConfigValue::Bool(b) => toml::Value::Boolean(*b),
            ConfigValue::Path(p) => toml::Value::String(p.to_string_lossy().replace('\\', "/")),
            ConfigValue::StringArray(items) => toml::Value::Array(
                items.iter().cloned().map(toml::Value::String).collect(),
            ),
            ConfigValue::Derived => toml::Value::String(DEFAULT_TOKEN.to_string()),
        };
        value.to_string()
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Path(p) => write!(f, "{}", p.display()),
            ConfigValue::StringArray(items) => write!(f, "[{}]", items.join(", ")),
            ConfigValue::Derived => f.write_str(DEFAULT_TOKEN),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<PathBuf> for ConfigValue {
    fn from(p: PathBuf) -> Self {
        ConfigValue::Path(p)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(items: Vec<String>) -> Self {
        ConfigValue::StringArray(items)
    }
}
