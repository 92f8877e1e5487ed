//! Installed and upstream version lookups for the working set of modules.
//!
//! # Responsibilities
//! - Hold the working set of module names
//! - Query local package metadata, one module at a time
//! - Query the remote registry with bounded parallelism and a per-call timeout
//! - Delegate upgrades to an installer and grow the working set on success
//!
//! # Design Decisions
//! - A failed lookup never aborts a batch; it yields an [`Unknown`] reason
//! - `probe_*` keeps the reason, `request_*` collapses it to `None`
//! - Results are keyed by module; completion order is not observable

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tokio::time::timeout;

/// Per-request timeout for registry lookups.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on simultaneous registry lookups.
pub const MAX_PARALLEL_REQUESTS: usize = 4;

/// Why a version could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unknown {
    #[error("module is not installed")]
    NotInstalled,

    #[error("request timed out")]
    Timeout,

    #[error("module not found in registry")]
    NotFound,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("lookup failed: {0}")]
    Backend(String),
}

/// Result of a single version lookup.
pub type Lookup = Result<String, Unknown>;

/// Installed package metadata.
pub trait LocalSource {
    fn installed_version(&self, module: &str) -> Lookup;
}

/// Remote package registry.
pub trait RegistrySource {
    fn latest_version(&self, module: &str) -> impl Future<Output = Lookup> + Send;
}

/// Installs or upgrades modules.
pub trait Installer {
    type Error: std::error::Error;

    fn install(&self, modules: &BTreeSet<String>) -> Result<(), Self::Error>;
}

/// Resolves versions for a working set of modules.
pub struct ModuleResolver<L, R, I> {
    modules: BTreeSet<String>,
    local: L,
    registry: R,
    installer: I,
    request_timeout: Duration,
}

impl<L, R, I> ModuleResolver<L, R, I>
where
    L: LocalSource,
    R: RegistrySource,
    I: Installer,
{
    pub fn new(local: L, registry: R, installer: I) -> Self {
        Self {
            modules: BTreeSet::new(),
            local,
            registry,
            installer,
            request_timeout: REGISTRY_TIMEOUT,
        }
    }

    /// Override the per-request registry timeout.
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Replace the working set.
    pub fn setup_modules<S: Into<String>>(&mut self, modules: impl IntoIterator<Item = S>) {
        self.modules = modules.into_iter().map(Into::into).collect();
    }

    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    /// Installed version of every module, keeping failure reasons.
    pub fn probe_local_versions(&self) -> BTreeMap<String, Lookup> {
        self.modules
            .iter()
            .map(|module| {
                let result = self.local.installed_version(module);
                if let Err(reason) = &result {
                    tracing::debug!(module = %module, %reason, "Local version lookup failed");
                }
                (module.clone(), result)
            })
            .collect()
    }

    /// Installed version of every module; `None` when undetermined.
    pub fn request_local_versions(&self) -> BTreeMap<String, Option<String>> {
        collapse(self.probe_local_versions())
    }

    /// Latest registry version of every module, keeping failure reasons.
    ///
    /// Runs at most `min(4, modules)` lookups at once.
    pub async fn probe_pip_versions(&self) -> BTreeMap<String, Lookup> {
        let limit = MAX_PARALLEL_REQUESTS.min(self.modules.len()).max(1);

        stream::iter(&self.modules)
            .map(|module| async move {
                let lookup = self.registry.latest_version(module);
                let result = match timeout(self.request_timeout, lookup).await {
                    Ok(result) => result,
                    Err(_) => Err(Unknown::Timeout),
                };
                if let Err(reason) = &result {
                    tracing::debug!(module = %module, %reason, "Registry version lookup failed");
                }
                (module.clone(), result)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Latest registry version of every module; `None` when undetermined.
    pub async fn request_pip_versions(&self) -> BTreeMap<String, Option<String>> {
        collapse(self.probe_pip_versions().await)
    }

    /// Install or upgrade `modules`, adding them to the working set on success.
    ///
    /// A failed install is logged and leaves the working set unchanged.
    pub fn update_install_modules(&mut self, modules: BTreeSet<String>) -> bool {
        if modules.is_empty() {
            return true;
        }

        match self.installer.install(&modules) {
            Ok(()) => {
                tracing::info!(modules = ?modules, "Modules installed");
                self.modules.extend(modules);
                true
            }
            Err(e) => {
                tracing::warn!(modules = ?modules, error = %e, "Module install failed");
                false
            }
        }
    }
}

fn collapse(results: BTreeMap<String, Lookup>) -> BTreeMap<String, Option<String>> {
    results.into_iter().map(|(module, r)| (module, r.ok())).collect()
}
