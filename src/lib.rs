//! Developer tooling for plg projects: schema-driven configuration and
//! module version tracking.

pub mod config;
pub mod modules;
pub mod observability;
pub mod version;

pub use config::{ConfigPaths, ConfigStore};
pub use modules::ModuleVersionCache;
