//! Storage backends that the [`StorageService`](crate::StorageService) delegates to.

pub mod common;
pub mod gcs;
pub mod in_memory;
pub mod local_fs;

pub use common::{Backend, BackendError, BackendResult, BoxedBackend, ListPage};
pub use gcs::Gcs;
pub use in_memory::InMemoryBackend;
pub use local_fs::LocalFs;
