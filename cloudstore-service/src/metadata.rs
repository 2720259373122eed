//! Read-only views over the attributes a store keeps for each object.

use std::time::SystemTime;

use bytes::Bytes;

use crate::error::Result;
use crate::service::StorageService;

/// The attributes of a stored object, as reported by its backend.
///
/// These are produced fresh by every listing or metadata call and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// The bucket containing the object.
    pub bucket: String,
    /// The full key of the object within its bucket.
    pub name: String,
    /// The size of the object in bytes.
    pub size: u64,
    /// The content type, if the store recorded one.
    pub content_type: Option<String>,
    /// When the object was first created.
    pub time_created: Option<SystemTime>,
    /// When the object was last replaced.
    pub updated: Option<SystemTime>,
    /// An opaque version tag for the current contents.
    pub etag: Option<String>,
    /// The generation number, for stores that version their objects.
    pub generation: Option<i64>,
}

impl ObjectMetadata {
    /// Creates metadata with only the required attributes set.
    pub fn new(bucket: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            size,
            content_type: None,
            time_created: None,
            updated: None,
            etag: None,
            generation: None,
        }
    }

    /// Returns the last `/`-separated segment of the key.
    ///
    /// This is empty for keys ending in `/`, which stores use as directory markers.
    pub fn file_name(&self) -> &str {
        leaf_name(&self.name)
    }

    /// Fetches the contents of the object this metadata describes.
    pub async fn fetch(&self, service: &StorageService) -> Result<Bytes> {
        service.get(&self.bucket, &self.name).await
    }
}

/// Returns the last `/`-separated segment of `key`.
pub fn leaf_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_name_of_nested_key() {
        assert_eq!(leaf_name("a/b/file.json"), "file.json");
        assert_eq!(leaf_name("file.json"), "file.json");
    }

    #[test]
    fn leaf_name_of_directory_marker() {
        assert_eq!(leaf_name("a/b/"), "");
        assert_eq!(leaf_name(""), "");
    }

    #[test]
    fn file_name_uses_key() {
        let metadata = ObjectMetadata::new("bucket", "reports/2024/summary.csv", 12);
        assert_eq!(metadata.file_name(), "summary.csv");
    }
}
