//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config_schema.json (embedded or --schema)
//!     → schema.rs (parse sections, type tags, defaults)
//!     → value.rs (cast every default through its type tag)
//!     → store.rs (nested tree of defaults)
//!
//! plg-sdk-config.toml (optional)
//!     → loader.rs (parse TOML)
//!     → value.rs (cast user values through the same tags)
//!     → store.rs (overlay on the defaults)
//!
//! On demand:
//!     validation.rs (&ConfigStore → ValidationReport)
//!     template.rs (schema → commented starter file)
//! ```
//!
//! # Design Decisions
//! - The store is an explicit context value, built once and passed by reference
//! - Unknown user keys are ignored; a user value of the wrong type is fatal
//! - Sentinel tokens are resolved at the casting boundary only

pub mod loader;
pub mod schema;
pub mod store;
pub mod template;
pub mod validation;
pub mod value;

pub use loader::ConfigError;
pub use schema::{Schema, TypeTag};
pub use store::{ConfigPaths, ConfigStore};
pub use validation::{validate_config, ValidationReport};
pub use value::{CastError, ConfigValue};
