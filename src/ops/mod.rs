//! Operator commands: offline verification and a remote client

pub mod client;
pub mod verify;

pub use client::{download_file, list_files, upload_file};
pub use verify::{verify_store, VerifyReport};
