//! relimg core - foundational types shared by the runtime and the CLI.
//!
//! Holds the error taxonomy and the configuration model for a pin run.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{AnnotationConfig, LogFormat, LogLevel, RelimgConfig, ResolverConfig};
pub use error::{RelimgError, Result};

/// relimg version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
