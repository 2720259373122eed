//! Core storage service.
//!
//! This module contains [`StorageService`], the main entry point for storing and retrieving
//! objects. Transformations and network imports build on top of it in their own modules.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};

use crate::backend::{self, BoxedBackend};
use crate::config::{Config, Storage};
use crate::error::{Error, Result};
use crate::metadata::ObjectMetadata;

/// A predicate deciding which objects a listing returns.
pub type ListFilter<'a> = &'a (dyn Fn(&ObjectMetadata) -> bool + Send + Sync);

/// High-level asynchronous service for storing and retrieving objects.
///
/// The service is a cheap handle around a single backend and a single HTTP client, which are
/// shared by all clones. Every operation is bounded by a deadline and fails with
/// [`Error::Timeout`] once it elapses. Nothing is retried.
#[derive(Clone, Debug)]
pub struct StorageService(Arc<StorageServiceInner>);

#[derive(Debug)]
struct StorageServiceInner {
    backend: BoxedBackend,
    http: reqwest::Client,
    timeout: Duration,
    list_timeout: Duration,
}

/// Configuration to initialize a [`StorageService`].
#[derive(Debug, Clone)]
pub enum StorageConfig<'a> {
    /// Use a local filesystem as the storage backend.
    FileSystem {
        /// The path to the directory where buckets will be stored.
        path: &'a Path,
    },
    /// Use Google Cloud Storage as storage backend.
    Gcs {
        /// Optional endpoint URL for the GCS JSON API.
        ///
        /// Assumes an emulator without authentication if set.
        endpoint: Option<&'a str>,
    },
    /// Keep objects in memory for the lifetime of the service.
    Memory,
}

impl<'a> From<&'a Storage> for StorageConfig<'a> {
    fn from(storage: &'a Storage) -> Self {
        match storage {
            Storage::Gcs { endpoint } => StorageConfig::Gcs {
                endpoint: endpoint.as_deref(),
            },
            Storage::FileSystem { path } => StorageConfig::FileSystem { path },
            Storage::Memory => StorageConfig::Memory,
        }
    }
}

fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let client = backend::common::reqwest_client(config.connect_timeout)
        .map_err(|cause| backend::BackendError::reqwest("building HTTP client", cause))?;
    Ok(client)
}

impl StorageService {
    /// Creates a new `StorageService` from a loaded [`Config`].
    pub async fn from_config(config: &Config) -> Result<Self> {
        let http = build_http_client(config)?;

        let backend: BoxedBackend = match StorageConfig::from(&config.storage) {
            StorageConfig::FileSystem { path } => Box::new(backend::LocalFs::new(path)),
            StorageConfig::Gcs {
                endpoint: Some(endpoint),
            } => Box::new(backend::Gcs::without_token(http.clone(), endpoint)?),
            StorageConfig::Gcs { endpoint: None } => {
                Box::new(backend::Gcs::new(http.clone()).await?)
            }
            StorageConfig::Memory => Box::new(backend::InMemoryBackend::new()),
        };

        Ok(Self::assemble(backend, http, config))
    }

    /// Creates a new `StorageService` with the specified backend configuration and default
    /// timeouts.
    pub async fn new(storage: StorageConfig<'_>) -> Result<Self> {
        let config = Config {
            storage: match storage {
                StorageConfig::FileSystem { path } => Storage::FileSystem { path: path.into() },
                StorageConfig::Gcs { endpoint } => Storage::Gcs {
                    endpoint: endpoint.map(Into::into),
                },
                StorageConfig::Memory => Storage::Memory,
            },
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Creates a new `StorageService` around an existing backend.
    ///
    /// Only the timeouts of `config` are used, its storage section is ignored.
    pub fn with_backend(backend: BoxedBackend, config: &Config) -> Result<Self> {
        let http = build_http_client(config)?;
        Ok(Self::assemble(backend, http, config))
    }

    fn assemble(backend: BoxedBackend, http: reqwest::Client, config: &Config) -> Self {
        tracing::debug!(backend = backend.name(), "Initialized storage service");
        Self(Arc::new(StorageServiceInner {
            backend,
            http,
            timeout: config.timeout,
            list_timeout: config.list_timeout,
        }))
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.0.http
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.0.timeout
    }

    /// Runs `future` to completion, or fails with [`Error::Timeout`] after `timeout`.
    pub(crate) async fn with_timeout<T>(
        operation: &'static str,
        timeout: Duration,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::debug!(operation, ?timeout, "Operation timed out");
                Err(Error::Timeout { operation, timeout })
            }
        }
    }

    /// Stores `data` at the given key, replacing any previous contents.
    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    pub async fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        let size = data.len();

        Self::with_timeout("put", self.0.timeout, async {
            Ok(self.0.backend.put_object(bucket, key, data).await?)
        })
        .await?;

        tracing::info!(size, "{key} saved to {bucket}/{key}");
        Ok(())
    }

    /// Retrieves the full contents of the object at the given key.
    ///
    /// Fails with [`Error::NotFound`] if there is no such object.
    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let data = Self::with_timeout("get", self.0.timeout, async {
            self.0
                .backend
                .get_object(bucket, key)
                .await?
                .ok_or_else(|| Error::not_found(bucket, key))
        })
        .await?;

        tracing::info!(size = data.len(), "{key} retrieved from {bucket}/{key}");
        Ok(data)
    }

    /// Deletes the object at the given key. Deleting a missing object succeeds.
    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        Self::with_timeout("delete", self.0.timeout, async {
            Ok(self.0.backend.delete_object(bucket, key).await?)
        })
        .await
    }

    /// Fetches the attributes of the object at the given key without its contents.
    ///
    /// Fails with [`Error::NotFound`] if there is no such object.
    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    pub async fn metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        Self::with_timeout("metadata", self.0.timeout, async {
            self.0
                .backend
                .head_object(bucket, key)
                .await?
                .ok_or_else(|| Error::not_found(bucket, key))
        })
        .await
    }

    /// Checks whether an object exists at the given key.
    ///
    /// Returns `Ok(false)` only if the store reports the object as missing. Every other failure,
    /// such as a network or permission problem, is returned as an error.
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.metadata(bucket, key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Streams the metadata of all objects whose key starts with `prefix`.
    ///
    /// Pages are requested lazily as the stream is polled. Directory markers, whose keys end in
    /// `/`, are skipped. Unlike [`list`](Self::list), the stream has no deadline.
    pub fn list_stream(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> impl Stream<Item = Result<ObjectMetadata>> + Send + 'static {
        let service = self.clone();
        let bucket = bucket.to_owned();
        let prefix = prefix.to_owned();

        async_stream::try_stream! {
            let mut page_token: Option<String> = None;
            loop {
                let page = service
                    .0
                    .backend
                    .list_page(&bucket, &prefix, page_token.as_deref())
                    .await?;

                for object in page.objects {
                    if !object.file_name().is_empty() {
                        yield object;
                    }
                }

                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        }
    }

    /// Lists the metadata of all objects whose key starts with `prefix`, in key order.
    ///
    /// If a `filter` is given, only the objects it accepts are returned, in the same relative
    /// order. Directory markers, whose keys end in `/`, are never returned.
    #[tracing::instrument(level = "trace", fields(%bucket, %prefix), skip_all)]
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        filter: Option<ListFilter<'_>>,
    ) -> Result<Vec<ObjectMetadata>> {
        let objects = self.list_stream(bucket, prefix);
        let objects = Self::with_timeout("list", self.0.list_timeout, async {
            objects
                .try_filter(|object| {
                    let keep = filter.is_none_or(|filter| filter(object));
                    std::future::ready(keep)
                })
                .try_collect::<Vec<_>>()
                .await
        })
        .await?;

        tracing::debug!(count = objects.len(), "Listed objects");
        Ok(objects)
    }
}
