//! Module version tracking.
//!
//! # Data Flow
//! ```text
//! allowed module set
//!     → resolver.rs (local metadata, sequential)
//!     → resolver.rs (registry lookups, up to 4 at once, 5s each)
//!     → caller reconciles against cache.rs
//!     → cache.rs (whole-file binary snapshot)
//! ```

pub mod cache;
pub mod resolver;
pub mod sources;

pub use cache::{CacheError, CacheSnapshot, ModuleVersionCache};
pub use resolver::{Lookup, ModuleResolver, Unknown};
pub use sources::{PipResolver, PYPI_BASE_URL};
