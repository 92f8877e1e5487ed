//! The resolved configuration tree.
//!
//! `ConfigStore` is the explicit configuration context: it is built once by
//! [`ConfigStore::init`] and passed by reference to every consumer.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::loader::{read_user_document, ConfigError};
use crate::config::schema::Schema;
use crate::config::value::ConfigValue;

/// Name of the user override file.
pub const CONFIG_FILE_NAME: &str = "plg-sdk-config.toml";

/// Name of the dedicated working directory.
pub const WORK_DIR_NAME: &str = ".plg-sdk";

/// File locations used by the configuration store.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Working directory, created by [`ConfigStore::init`].
    pub work_dir: PathBuf,
    /// User override document.
    pub config_file: PathBuf,
    /// Alternate schema document; `None` uses the embedded schema.
    pub schema: Option<PathBuf>,
}

impl ConfigPaths {
    /// Locations relative to the current directory.
    pub fn from_current_dir() -> std::io::Result<Self> {
        Ok(Self::in_dir(&env::current_dir()?))
    }

    /// Locations rooted under `root`.
    pub fn in_dir(root: &Path) -> Self {
        Self {
            work_dir: root.join(WORK_DIR_NAME),
            config_file: root.join(CONFIG_FILE_NAME),
            schema: None,
        }
    }

    /// Location of the binary module-version cache.
    pub fn module_cache_file(&self) -> PathBuf {
        self.work_dir.join("cache").join("pip_modules.bin")
    }
}

/// A node in the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNode {
    Table(BTreeMap<String, ConfigNode>),
    Value(ConfigValue),
}

/// Schema plus the nested key/value tree resolved from it.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    schema: Schema,
    tree: BTreeMap<String, ConfigNode>,
}

impl ConfigStore {
    /// Load the schema, apply its defaults and overlay the user file.
    ///
    /// Ensures `paths.work_dir` exists.
    pub fn init(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let schema = match &paths.schema {
            Some(path) => Schema::from_path(path)?,
            None => Schema::embedded()?,
        };

        fs::create_dir_all(&paths.work_dir)?;

        let mut store = Self::from_schema(schema)?;
        if let Some(document) = read_user_document(&paths.config_file)? {
            store.apply_overrides(&document, &paths.config_file)?;
        }

        tracing::debug!(
            work_dir = ?paths.work_dir,
            config_file = ?paths.config_file,
            "Configuration loaded"
        );
        Ok(store)
    }

    /// Build a store holding only the schema defaults.
    pub fn from_schema(schema: Schema) -> Result<Self, ConfigError> {
        let mut tree = BTreeMap::new();

        for section in schema.sections() {
            for (name, spec) in &section.params {
                let key = format!("{}.{}", section.name, name);
                let value = ConfigValue::cast(spec.type_tag, &spec.default)
                    .map_err(|source| ConfigError::SchemaDefault { key: key.clone(), source })?;
                if let Some(value) = value {
                    insert(&mut tree, &key, value);
                }
            }
        }

        Ok(Self { schema, tree })
    }

    /// Overlay a user document on top of the current values.
    ///
    /// Only section/parameter pairs declared in the schema are read; every
    /// other key is ignored. `file` is only used in error messages.
    pub fn apply_overrides(&mut self, document: &Value, file: &Path) -> Result<(), ConfigError> {
        for section in self.schema.sections() {
            let Some(Value::Object(user_section)) = document.get(&section.name) else {
                continue;
            };

            for (name, spec) in &section.params {
                let Some(raw) = user_section.get(name) else {
                    continue;
                };

                let key = format!("{}.{}", section.name, name);
                let value = ConfigValue::cast(spec.type_tag, raw).map_err(|source| {
                    ConfigError::TypeCast {
                        key: key.clone(),
                        file: file.to_path_buf(),
                        source,
                    }
                })?;

                match value {
                    Some(value) => insert(&mut self.tree, &key, value),
                    None => remove(&mut self.tree, &key),
                }
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Every module the schema allows a project to declare.
    pub fn modules(&self) -> &[String] {
        self.schema.allowed_modules()
    }

    /// Value stored at a dot-separated path.
    ///
    /// Returns `None` if any segment is missing or the path ends on a table.
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        let path = path.to_lowercase();
        let mut segments = path.split('.');
        let mut node = self.tree.get(segments.next()?)?;

        for segment in segments {
            match node {
                ConfigNode::Table(children) => node = children.get(segment)?,
                ConfigNode::Value(_) => return None,
            }
        }

        match node {
            ConfigNode::Value(value) => Some(value),
            ConfigNode::Table(_) => None,
        }
    }

    /// Value at `path`, or `default` when absent.
    pub fn get_or<'a>(&'a self, path: &str, default: &'a ConfigValue) -> &'a ConfigValue {
        self.get(path).unwrap_or(default)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(ConfigValue::as_str)
    }

    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.get(path).and_then(ConfigValue::as_bool).unwrap_or(default)
    }

    /// Write a value, creating or replacing intermediate tables.
    ///
    /// No schema type check is applied.
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) {
        insert(&mut self.tree, path, value.into());
    }
}

/// Tree keys are always lower-case.
fn insert(tree: &mut BTreeMap<String, ConfigNode>, path: &str, value: ConfigValue) {
    let path = path.to_lowercase();
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or_default();

    let mut current = tree;
    for segment in segments {
        let node = current
            .entry(segment.to_string())
            .or_insert_with(|| ConfigNode::Table(BTreeMap::new()));
        if let ConfigNode::Value(_) = node {
            *node = ConfigNode::Table(BTreeMap::new());
        }
        current = match node {
            ConfigNode::Table(children) => children,
            ConfigNode::Value(_) => return,
        };
    }

    current.insert(last.to_string(), ConfigNode::Value(value));
}

fn remove(tree: &mut BTreeMap<String, ConfigNode>, path: &str) {
    let path = path.to_lowercase();
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = tree;
    for segment in segments {
        match current.get_mut(segment) {
            Some(ConfigNode::Table(children)) => current = children,
            _ => return,
        }
    }
    current.remove(last);
}
