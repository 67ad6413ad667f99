//! # Cephix Common
//!
//! Shared utilities for the Cephix CSI driver components.
//!
//! ## Logging
//!
//! Structured logging initialisation used by every Cephix binary:
//!
//! ```rust
//! use cephix_common::init_logging;
//!
//! // Initialize with level
//! init_logging("info").unwrap();
//! ```

pub mod logging;

// Re-export logging functions
pub use logging::{init_logging, init_logging_json};
