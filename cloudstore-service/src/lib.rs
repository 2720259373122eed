//! The storage service provides convenient access to blobs in an object store.
//!
//! Every operation takes a bucket and a key, opens nothing beyond the service's shared client, and
//! returns its outcome to the caller. On top of plain transfers, the service offers:
//!
//! - existence checks that tell a missing object apart from a failing store,
//! - prefix listings with an optional filter,
//! - [read-only](StorageService::process_file) and
//!   [read-modify-write](StorageService::process_and_update_file) transformations,
//! - [network imports](StorageService::save_network_file) that store a downloaded file,
//! - in-memory [archives](archive) of named buffers.
//!
//! ## Usage
//!
//! ```no_run
//! use cloudstore_service::{Config, StorageService};
//!
//! #[tokio::main]
//! # async fn main() -> cloudstore_service::Result<()> {
//!     let config = Config::load(None).expect("invalid configuration");
//!     let service = StorageService::from_config(&config).await?;
//!
//!     service.put("my-bucket", "a/b/file.json", r#"{"x":1}"#).await?;
//!     for object in service.list("my-bucket", "a/b/", None).await? {
//!         println!("{} ({} bytes)", object.file_name(), object.size);
//!     }
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod archive;
#[allow(missing_docs)]
pub mod backend;
pub mod config;
mod error;
mod metadata;
mod network;
mod service;
mod transform;

pub use archive::{Archive, ArchiveError, pack, unpack};
pub use config::{Config, Storage};
pub use error::*;
pub use metadata::*;
pub use service::*;
