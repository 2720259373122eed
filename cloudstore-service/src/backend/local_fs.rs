use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::common::{Backend, BackendError, BackendResult, ListPage, is_safe_key};
use crate::metadata::ObjectMetadata;

/// Directory below the root that holds in-flight writes.
///
/// Objects are written here first and renamed into place, so readers never see a partial write.
const STAGING_DIR: &str = ".staging";

/// Stores every bucket as a directory below `path`, and every key as a file path below that.
#[derive(Debug)]
pub struct LocalFs {
    path: PathBuf,
}

impl LocalFs {
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }

    fn bucket_path(&self, bucket: &str) -> BackendResult<PathBuf> {
        if bucket.contains('/') || !is_safe_key(bucket) || bucket == STAGING_DIR {
            return Err(BackendError::generic(format!("invalid bucket name `{bucket}`")));
        }
        Ok(self.path.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> BackendResult<PathBuf> {
        if !is_safe_key(key) {
            return Err(BackendError::generic(format!("invalid object key `{key}`")));
        }
        Ok(self.bucket_path(bucket)?.join(key))
    }
}

/// Returns `true` if the error means there is nothing at the path.
///
/// A key that runs through an existing file fails with `NotADirectory` rather than `NotFound`.
fn is_missing(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

async fn file_metadata(bucket: &str, key: &str, path: &Path) -> BackendResult<ObjectMetadata> {
    let attributes = fs::metadata(path).await?;
    let mut metadata = ObjectMetadata::new(bucket, key, attributes.len());
    metadata.time_created = attributes.created().ok();
    metadata.updated = attributes.modified().ok();
    Ok(metadata)
}

/// Recursively collects the keys of all files below `dir`, relative to `root`.
async fn collect_keys(root: &Path, dir: PathBuf, keys: &mut Vec<String>) -> BackendResult<()> {
    let mut pending = vec![dir];
    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if is_missing(&err) => continue,
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }

            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let segments: Option<Vec<_>> = relative
                .components()
                .map(|component| component.as_os_str().to_str())
                .collect();
            if let Some(segments) = segments {
                keys.push(segments.join("/"));
            }
        }
    }

    Ok(())
}

#[async_trait::async_trait]
impl Backend for LocalFs {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn put_object(&self, bucket: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        tracing::debug!("Writing to local_fs backend");
        let path = self.object_path(bucket, key)?;
        let parent = path
            .parent()
            .ok_or_else(|| BackendError::generic(format!("invalid object key `{key}`")))?;
        fs::create_dir_all(parent).await?;

        let staging = self.path.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let staged = staging.join(uuid::Uuid::new_v4().to_string());

        let mut file = fs::File::create(&staged).await?;
        let written = async {
            file.write_all(&payload).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;
        drop(file);

        if let Err(err) = written {
            fs::remove_file(&staged).await.ok();
            return Err(err.into());
        }

        fs::rename(&staged, &path).await?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Option<Bytes>> {
        tracing::debug!("Reading from local_fs backend");
        let path = self.object_path(bucket, key)?;
        match fs::read(path).await {
            Ok(contents) => Ok(Some(contents.into())),
            Err(err) if is_missing(&err) => {
                tracing::debug!("Object not found");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<Option<ObjectMetadata>> {
        let path = self.object_path(bucket, key)?;
        match fs::metadata(&path).await {
            Ok(attributes) if attributes.is_file() => {}
            Ok(_) => return Ok(None),
            Err(err) if is_missing(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        file_metadata(bucket, key, &path).await.map(Some)
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %prefix), skip_all)]
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        _page_token: Option<&str>,
    ) -> BackendResult<ListPage> {
        tracing::debug!("Listing local_fs backend");
        let root = self.bucket_path(bucket)?;

        // Only walk the deepest directory that the prefix fully names.
        let start = match prefix.rfind('/') {
            Some(index) if is_safe_key(&prefix[..index]) => root.join(&prefix[..index]),
            _ => root.clone(),
        };

        let mut keys = Vec::new();
        collect_keys(&root, start, &mut keys).await?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let path = root.join(&key);
            match file_metadata(bucket, &key, &path).await {
                Ok(metadata) => objects.push(metadata),
                // Deleted between the directory walk and now.
                Err(BackendError::Io(err)) if is_missing(&err) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(ListPage {
            objects,
            next_page_token: None,
        })
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        tracing::debug!("Deleting from local_fs backend");
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if is_missing(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
