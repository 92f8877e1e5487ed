//! Commented starter config file, rendered from the schema.

use std::fmt::Write as _;

use crate::config::loader::ConfigError;
use crate::config::schema::Schema;
use crate::config::value::{ConfigValue, NOT_SET_TOKEN};

/// Render a TOML config file holding every schema default.
///
/// Each parameter is preceded by its description (with `{VERSION}` and
/// `{ALLOWED_MODULES}` substituted) and its type description, unless
/// `with_comments` is false.
pub fn render(schema: &Schema, version: &str, with_comments: bool) -> Result<String, ConfigError> {
    let module_list = schema
        .allowed_modules()
        .iter()
        .map(|m| format!("- {m}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = String::new();
    for (i, section) in schema.sections().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "[{}]", section.name);

        for (name, spec) in &section.params {
            let key = format!("{}.{}", section.name, name);
            let literal = match ConfigValue::cast(spec.type_tag, &spec.default) {
                Ok(Some(value)) => value.to_toml_literal(),
                Ok(None) => format!("\"{NOT_SET_TOKEN}\""),
                Err(source) => return Err(ConfigError::SchemaDefault { key, source }),
            };

            if with_comments {
                let desc = spec
                    .desc
                    .replace("{VERSION}", version)
                    .replace("{ALLOWED_MODULES}", &module_list);
                for line in desc.trim().lines() {
                    let _ = writeln!(out, "# {line}");
                }
                if let Some(type_desc) = schema.type_description(spec.type_tag) {
                    let _ = writeln!(out, "# {type_desc}");
                }
            }

            let _ = writeln!(out, "{name} = {literal}");
            if with_comments {
                out.push('\n');
            }
        }
    }

    Ok(out)
}
