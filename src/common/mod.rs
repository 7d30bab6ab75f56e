//! Common utilities and types shared across filedrop

pub mod config;
pub mod error;
pub mod tracing_middleware;
pub mod utils;

pub use config::{Config, JournalSyncPolicy};
pub use error::{Error, ErrorClass, Result};
pub use utils::{content_disposition, format_bytes, FileId};
