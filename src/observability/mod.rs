//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (module, path, error)
//!
//! Consumers:
//!     → logging.rs (fmt layer on stderr, level from RUST_LOG or plg-sdk.debug)
//! ```
//!
//! # Design Decisions
//! - Logging is installed before the config is read, then re-levelled
//! - RUST_LOG, when set, always wins over the config flag

pub mod logging;
