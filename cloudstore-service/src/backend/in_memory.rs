//! In-memory backend.
//!
//! This provides a [`Backend`] backed by an ordered map, removing the need for
//! filesystem tempdir management in unit tests. The backend is [`Clone`] so tests
//! can hold a handle for direct inspection while the service owns a boxed copy.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use bytes::Bytes;

use super::common::{Backend, BackendResult, ListPage};
use crate::metadata::ObjectMetadata;

type Store = BTreeMap<(String, String), (ObjectMetadata, Bytes)>;

/// The number of objects returned per listing page unless configured otherwise.
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
    page_size: usize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Default::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limits listings to `page_size` objects per page, forcing continuation.
    pub fn with_page_size(self, page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            ..self
        }
    }

    /// Returns the stored bytes, bypassing the [`Backend`] trait.
    pub fn get_stored(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let id = (bucket.to_owned(), key.to_owned());
        self.lock().get(&id).map(|(_, bytes)| bytes.clone())
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.store.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(&self, bucket: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        let now = SystemTime::now();
        let mut store = self.lock();
        let id = (bucket.to_owned(), key.to_owned());

        let (time_created, generation) = match store.get(&id) {
            Some((previous, _)) => (previous.time_created, previous.generation.map(|g| g + 1)),
            None => (Some(now), Some(1)),
        };

        let mut metadata = ObjectMetadata::new(bucket, key, payload.len() as u64);
        metadata.content_type = Some("application/octet-stream".into());
        metadata.time_created = time_created;
        metadata.updated = Some(now);
        metadata.generation = generation;

        store.insert(id, (metadata, payload));
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Option<Bytes>> {
        Ok(self.get_stored(bucket, key))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<Option<ObjectMetadata>> {
        let id = (bucket.to_owned(), key.to_owned());
        Ok(self.lock().get(&id).map(|(metadata, _)| metadata.clone()))
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> BackendResult<ListPage> {
        let start = match page_token {
            Some(token) => Bound::Excluded((bucket.to_owned(), token.to_owned())),
            None => Bound::Included((bucket.to_owned(), prefix.to_owned())),
        };

        let store = self.lock();
        let mut matching = store
            .range((start, Bound::Unbounded))
            .take_while(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .map(|(_, (metadata, _))| metadata.clone());

        let objects: Vec<_> = matching.by_ref().take(self.page_size).collect();
        let next_page_token = match matching.next() {
            Some(_) => objects.last().map(|metadata| metadata.name.clone()),
            None => None,
        };

        Ok(ListPage {
            objects,
            next_page_token,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        let id = (bucket.to_owned(), key.to_owned());
        self.lock().remove(&id);
        Ok(())
    }
}
