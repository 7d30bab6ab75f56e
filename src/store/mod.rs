//! Metadata persistence and blob storage
//!
//! - Append-only journal of metadata events, replayed on startup
//! - In-memory metadata index guarded by a read-write lock
//! - Flat blob directory keyed by file id, with staged writes

pub mod blob;
pub mod catalog;
pub mod event;
pub mod index;
pub mod journal;

pub use blob::{chunk_stream, BlobSink, BlobStore};
pub use catalog::Catalog;
pub use event::{Event, FileRecord};
pub use index::{MetadataIndex, RebuildStats};
pub use journal::{Journal, Replay};
