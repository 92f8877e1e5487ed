//! Configuration validation.
//!
//! # Responsibilities
//! - Check declared modules against the schema's module list
//! - Check required project fields are present
//! - Check the project version normalizes cleanly
//! - Check the namespace (explicit or derived) uses only `[A-Za-z0-9_]`
//!
//! # Design Decisions
//! - Returns all findings, not just the first; no rule short-circuits another
//! - Validation is a pure function: &ConfigStore → ValidationReport
//! - Warnings never block; callers decide what non-empty errors mean

use crate::config::store::ConfigStore;
use crate::config::value::ConfigValue;
use crate::version::canonicalize;

/// Wildcard entry in `modules.allowed`.
pub const ALL_MODULES: &str = "all";

/// How a derived namespace is assembled.
pub const NAMESPACE_TEMPLATE: &str = "<project.name>_<project.author>";

const REQUIRED_FIELDS: [&str; 3] = ["project.name", "project.author", "project.version"];

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationReport {
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True when the configuration may drive further operations.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run every rule against the current store contents.
pub fn validate_config(store: &ConfigStore) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_allowed_modules(store, &mut report);
    check_required_fields(store, &mut report);
    check_version(store, &mut report);
    check_namespace(store, &mut report);

    report
}

/// The namespace the project resolves to, deriving it when requested.
pub fn resolve_namespace(store: &ConfigStore) -> Option<String> {
    match store.get("project.namespace")? {
        ConfigValue::Derived => Some(derived_namespace(store)),
        ConfigValue::String(ns) => Some(ns.clone()),
        _ => None,
    }
}

fn derived_namespace(store: &ConfigStore) -> String {
    let part = |key| store.get(key).map(ToString::to_string).unwrap_or_default();
    format!("{}_{}", part("project.name"), part("project.author"))
}

fn is_valid_namespace(ns: &str) -> bool {
    !ns.is_empty() && ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_allowed_modules(store: &ConfigStore, report: &mut ValidationReport) {
    let allowed = store
        .get("modules.allowed")
        .and_then(ConfigValue::as_string_array)
        .unwrap_or_default();

    if allowed.iter().any(|m| m == ALL_MODULES) {
        return;
    }

    let known = store.modules();
    for module in allowed {
        if !known.contains(module) {
            report
                .errors
                .push(format!("MODULES.allowed: module \"{module}\" is not allowed"));
        }
    }
}

fn check_required_fields(store: &ConfigStore, report: &mut ValidationReport) {
    for key in REQUIRED_FIELDS {
        if store.get(key).is_none() {
            let (section, field) = key.split_once('.').unwrap_or((key, ""));
            report
                .errors
                .push(format!("{}.{field} is not set", section.to_uppercase()));
        }
    }
}

fn check_version(store: &ConfigStore, report: &mut ValidationReport) {
    let Some(version) = store.get("project.version") else {
        return;
    };

    let version = version.to_string();
    match canonicalize(&version) {
        None => report
            .errors
            .push(format!("PROJECT.version \"{version}\" is not a valid PEP 440 version")),
        Some(canonical) if canonical != version => report.warnings.push(format!(
            "PROJECT.version is not canonical.\nUsing the normalized version: {canonical}"
        )),
        Some(_) => {}
    }
}

fn check_namespace(store: &ConfigStore, report: &mut ValidationReport) {
    match store.get("project.namespace") {
        Some(ConfigValue::Derived) => {
            let derived = derived_namespace(store);
            if !is_valid_namespace(&derived) {
                report.errors.push(format!(
                    "PROJECT.namespace is set to %!DEFAULT!%\n\
                     The derived namespace is invalid\n\n\
                     Template   : {NAMESPACE_TEMPLATE}\n\
                     Substituted: {derived}\n\
                     Expected   : only [A-Za-z0-9_] characters"
                ));
            }
        }
        Some(ConfigValue::String(ns)) if !is_valid_namespace(ns) => {
            report.errors.push(format!(
                "PROJECT.namespace \"{ns}\" contains invalid characters.\n\
                 Expected: only [A-Za-z0-9_] characters"
            ));
        }
        _ => {}
    }
}
