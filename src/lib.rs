//! # filedrop
//!
//! A small file-upload service with:
//! - Append-only JSON-lines journal for file metadata
//! - Journal replay on startup to rebuild the in-memory index
//! - Flat blob directory keyed by file id, with staged writes
//! - HTTP API for multipart upload, listing and streamed download
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!        POST /files           GET /files, GET /files/:id
//!            │                          │
//! ┌──────────▼──────────┐   ┌───────────▼──────────┐
//! │  Ingest pipeline    │   │  Retrieval           │
//! │  validate → store   │   │  index lookup        │
//! │  → commit           │   │  → blob stream       │
//! └───┬─────────────┬───┘   └───────┬──────────┬───┘
//!     │             │               │          │
//! ┌───▼────────┐ ┌──▼──────────┐ ┌──▼────────┐ │
//! │ Blob store │ │  Journal    │→│  Index    │ │
//! │ files/<id> │ │ journal.txt │ │ (RwLock)  │ │
//! └─────▲──────┘ └─────────────┘ └───────────┘ │
//!       └──────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the server
//! ```bash
//! filedrop serve --bind 0.0.0.0:9000 --data-dir ./data
//! ```
//!
//! ### Use the CLI
//! ```bash
//! filedrop upload ./report.pdf --content-type application/pdf
//! filedrop list
//! filedrop download <id> --output ./report.pdf
//!
//! # Offline consistency check
//! filedrop verify --data-dir ./data
//! ```

pub mod common;
pub mod ops;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use server::{FileServer, FileService};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
