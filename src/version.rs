//! PEP 440 version normalization.
//!
//! [`canonicalize`] parses a free-form version string and renders its single
//! canonical form. It does not compare or order versions.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)
        ^\s*
        v?
        (?:
            (?:(?P<epoch>[0-9]+)!)?
            (?P<release>[0-9]+(?:\.[0-9]+)*)
            (?P<pre>
                [-_.]?
                (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
                [-_.]?
                (?P<pre_n>[0-9]+)?
            )?
            (?P<post>
                (?:-(?P<post_n1>[0-9]+))
                |
                (?:
                    [-_.]?
                    (?P<post_l>post|rev|r)
                    [-_.]?
                    (?P<post_n2>[0-9]+)?
                )
            )?
            (?P<dev>
                [-_.]?
                (?P<dev_l>dev)
                [-_.]?
                (?P<dev_n>[0-9]+)?
            )?
        )
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("version pattern is valid")
});

/// Normalize `version` to its canonical PEP 440 form.
///
/// Returns `None` when the input is not a version.
pub fn canonicalize(version: &str) -> Option<String> {
    let caps = VERSION_RE.captures(version)?;
    let mut out = String::new();

    if let Some(epoch) = caps.name("epoch") {
        let epoch = strip_zeros(epoch.as_str());
        if epoch != "0" {
            out.push_str(epoch);
            out.push('!');
        }
    }

    let release: Vec<&str> = caps["release"].split('.').map(strip_zeros).collect();
    out.push_str(&release.join("."));

    if caps.name("pre").is_some() {
        let tag = match caps["pre_l"].to_ascii_lowercase().as_str() {
            "alpha" | "a" => "a",
            "beta" | "b" => "b",
            "preview" | "pre" | "c" | "rc" => "rc",
            _ => return None,
        };
        out.push_str(tag);
        out.push_str(number(&caps, &["pre_n"]));
    }

    if caps.name("post").is_some() {
        out.push_str(".post");
        out.push_str(number(&caps, &["post_n1", "post_n2"]));
    }

    if caps.name("dev").is_some() {
        out.push_str(".dev");
        out.push_str(number(&caps, &["dev_n"]));
    }

    if let Some(local) = caps.name("local") {
        out.push('+');
        out.push_str(&local.as_str().replace(['-', '_'], ".").to_ascii_lowercase());
    }

    Some(out)
}

/// True when `version` parses and is already canonical.
pub fn is_canonical(version: &str) -> bool {
    canonicalize(version).is_some_and(|c| c == version)
}

/// First present group among `groups`, with leading zeros removed; "0" if none.
fn number<'a>(caps: &Captures<'a>, groups: &[&str]) -> &'a str {
    groups
        .iter()
        .find_map(|g| caps.name(g))
        .map_or("0", |m| strip_zeros(m.as_str()))
}

fn strip_zeros(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}
