//! Concrete version sources backed by pip and the PyPI JSON API.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::modules::resolver::{Installer, LocalSource, Lookup, ModuleResolver, RegistrySource, Unknown};

/// Default registry endpoint; `<base>/<module>/json` serves metadata.
pub const PYPI_BASE_URL: &str = "https://pypi.org/pypi/";

/// Resolver wired to the local interpreter and PyPI.
pub type PipResolver = ModuleResolver<PipMetadata, PypiRegistry, PipInstaller>;

impl PipResolver {
    /// Resolver using `python` for metadata/installs and `registry_url` for upstream versions.
    pub fn for_python(python: &Path, registry_url: &str) -> Result<Self, RegistryError> {
        Ok(ModuleResolver::new(
            PipMetadata::new(python),
            PypiRegistry::new(registry_url)?,
            PipInstaller::new(python),
        ))
    }
}

/// Installed versions as reported by `pip show`.
#[derive(Debug, Clone)]
pub struct PipMetadata {
    python: PathBuf,
}

impl PipMetadata {
    pub fn new(python: &Path) -> Self {
        Self {
            python: python.to_path_buf(),
        }
    }
}

impl LocalSource for PipMetadata {
    fn installed_version(&self, module: &str) -> Lookup {
        let output = Command::new(&self.python)
            .args(["-m", "pip", "show", "--disable-pip-version-check", module])
            .output()
            .map_err(|e| Unknown::Backend(format!("cannot run {}: {e}", self.python.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not found") {
                return Err(Unknown::NotInstalled);
            }
            return Err(Unknown::Backend(stderr.trim().to_string()));
        }

        parse_pip_show(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_pip_show(stdout: &str) -> Lookup {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Unknown::Malformed("no Version field in pip output".into()))
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registry URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct RegistryPayload {
    info: RegistryInfo,
}

#[derive(Deserialize)]
struct RegistryInfo {
    version: String,
}

/// Upstream versions from a PyPI-compatible JSON API.
#[derive(Debug, Clone)]
pub struct PypiRegistry {
    client: reqwest::Client,
    base_url: Url,
}

impl PypiRegistry {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("plg-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl RegistrySource for PypiRegistry {
    async fn latest_version(&self, module: &str) -> Lookup {
        let url = self
            .base_url
            .join(&format!("{module}/json"))
            .map_err(|e| Unknown::Backend(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Unknown::Backend(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(Unknown::NotFound),
            other => return Err(Unknown::Status(other)),
        }

        let payload: RegistryPayload = response
            .json()
            .await
            .map_err(|e| Unknown::Malformed(e.to_string()))?;
        Ok(payload.info.version)
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("cannot run {python}: {source}")]
    Spawn {
        python: PathBuf,
        source: std::io::Error,
    },

    #[error("pip install exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Installs with `pip install -U`.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    python: PathBuf,
}

impl PipInstaller {
    pub fn new(python: &Path) -> Self {
        Self {
            python: python.to_path_buf(),
        }
    }
}

impl Installer for PipInstaller {
    type Error = InstallError;

    fn install(&self, modules: &BTreeSet<String>) -> Result<(), InstallError> {
        let output = Command::new(&self.python)
            .args(["-m", "pip", "install", "-U"])
            .args(modules)
            .output()
            .map_err(|source| InstallError::Spawn {
                python: self.python.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(InstallError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pip_show() {
        let stdout = "Name: requests\nVersion: 2.31.0\nSummary: HTTP\n";
        assert_eq!(parse_pip_show(stdout).as_deref(), Ok("2.31.0"));

        assert!(matches!(parse_pip_show("Name: x\n"), Err(Unknown::Malformed(_))));
        assert!(matches!(parse_pip_show("Version:   \n"), Err(Unknown::Malformed(_))));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let registry = PypiRegistry::new("http://127.0.0.1:9/pypi").unwrap();
        assert_eq!(registry.base_url().as_str(), "http://127.0.0.1:9/pypi/");
        assert!(PypiRegistry::new("not a url").is_err());
    }

    #[test]
    fn test_missing_interpreter_is_unknown() {
        let metadata = PipMetadata::new(Path::new("/nonexistent/python3"));
        assert!(matches!(
            metadata.installed_version("requests"),
            Err(Unknown::Backend(_))
        ));

        let installer = PipInstaller::new(Path::new("/nonexistent/python3"));
        let modules = BTreeSet::from(["requests".to_string()]);
        assert!(matches!(installer.install(&modules), Err(InstallError::Spawn { .. })));
    }
}
