use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::backend::common::BackendError;

/// Errors that can occur in the storage service.
#[derive(Debug, Error)]
pub enum Error {
    /// There is no object stored at the given bucket and key.
    #[error("object not found: {bucket}/{key}")]
    NotFound {
        /// The bucket that was queried.
        bucket: String,
        /// The key that was queried.
        key: String,
    },

    /// An error from the storage backend, such as a network or authentication failure.
    ///
    /// This never stands in for a missing object, see [`Error::NotFound`].
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The operation did not complete within its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The name of the operation that timed out.
        operation: &'static str,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// An archive could not be written or read.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A caller-supplied transformation failed.
    #[error(transparent)]
    Callback(anyhow::Error),

    /// A network file could not be requested or its body could not be read.
    #[error("failed to fetch {url}")]
    Fetch {
        /// The requested URL.
        url: String,
        /// The underlying request error.
        #[source]
        cause: reqwest::Error,
    },

    /// A network file was answered with a non-success status code.
    #[error("fetching {url} returned {status}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// The status code of the response.
        status: StatusCode,
    },

    /// A network file was downloaded but could not be stored.
    ///
    /// The downloaded body is kept, so it does not have to be fetched again.
    #[error("failed to store network file at {bucket}/{key}")]
    Store {
        /// The bucket the file was written to.
        bucket: String,
        /// The key the file was written to.
        key: String,
        /// The downloaded body.
        body: Bytes,
        /// The error of the write.
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps the error of a caller-supplied transformation.
    pub fn callback(error: impl Into<anyhow::Error>) -> Self {
        Self::Callback(error.into())
    }

    /// Returns `true` if this error signals a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this error signals an elapsed deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the backend rejected the credentials or denied access.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Backend(error) => error.is_auth(),
            Self::Store { source, .. } => source.is_auth(),
            _ => false,
        }
    }

    pub(crate) fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        }
    }
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
