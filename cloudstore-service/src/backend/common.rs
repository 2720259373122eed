use std::fmt::Debug;

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

use crate::metadata::ObjectMetadata;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("cloudstore/", env!("CARGO_PKG_VERSION"));

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// A single page of a prefix listing.
#[derive(Debug, Default)]
pub struct ListPage {
    /// The objects on this page, in key order.
    pub objects: Vec<ObjectMetadata>,
    /// The token to request the next page with, if there is one.
    pub next_page_token: Option<String>,
}

#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores an object, replacing any previous contents.
    async fn put_object(&self, bucket: &str, key: &str, payload: Bytes) -> BackendResult<()>;

    /// Retrieves the full contents of an object, or `None` if it does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Option<Bytes>>;

    /// Retrieves only the attributes of an object, or `None` if it does not exist.
    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<Option<ObjectMetadata>>;

    /// Lists one page of objects whose keys start with `prefix`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> BackendResult<ListPage>;

    /// Deletes the object. Deleting a missing object is not an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to de/serialization.
    #[error("serde error: {context}")]
    Serde {
        context: String,
        #[source]
        cause: serde_json::Error,
    },

    /// All errors stemming from the reqwest client when talking to a remote store.
    #[error("reqwest error: {context}")]
    Reqwest {
        context: String,
        #[source]
        cause: reqwest::Error,
    },

    /// The remote store answered with an unexpected status code.
    #[error("{context}: unexpected status {status}")]
    Status { context: String, status: StatusCode },

    /// Errors encountered when attempting to authenticate with GCP.
    #[error("GCP authentication error: {0}")]
    GcpAuth(#[from] gcp_auth::Error),

    /// Any other error stemming from one of the storage backends.
    #[error("storage backend error: {context}")]
    Generic {
        context: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BackendError {
    pub(crate) fn reqwest(context: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Reqwest {
            context: context.into(),
            cause,
        }
    }

    pub(crate) fn generic(context: impl Into<String>) -> Self {
        Self::Generic {
            context: context.into(),
            cause: None,
        }
    }

    /// Returns `true` if the store rejected the credentials or denied access.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
            }
            Self::GcpAuth(_) => true,
            _ => false,
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Creates a reqwest client with required defaults.
pub fn reqwest_client(
    connect_timeout: std::time::Duration,
) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect_timeout)
        .build()
}

/// Returns `true` if the key is usable as a path below a bucket directory.
///
/// Rejects empty segments and `.`/`..` so a key can never escape its bucket.
pub(crate) fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_keys() {
        assert!(is_safe_key("file.json"));
        assert!(is_safe_key("a/b/file.json"));

        assert!(!is_safe_key(""));
        assert!(!is_safe_key("a/b/"));
        assert!(!is_safe_key("/a"));
        assert!(!is_safe_key("a//b"));
        assert!(!is_safe_key("../etc/passwd"));
        assert!(!is_safe_key("a/./b"));
    }

    #[test]
    fn auth_statuses() {
        let error = BackendError::Status {
            context: "get".into(),
            status: StatusCode::FORBIDDEN,
        };
        assert!(error.is_auth());

        let error = BackendError::Status {
            context: "get".into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        };
        assert!(!error.is_auth());
    }
}
