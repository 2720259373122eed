//! Callback-driven helpers that read, and optionally rewrite, a stored object.

use bytes::Bytes;

use crate::error::Error;
use crate::service::StorageService;

impl StorageService {
    /// Fetches an object and hands its contents to `process`.
    ///
    /// The object is never written by this helper, whatever `process` does with the bytes. Errors
    /// from `process` are returned as they are, store errors are converted into `E`.
    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    pub async fn process_file<F, T, E>(&self, bucket: &str, key: &str, process: F) -> Result<T, E>
    where
        F: FnOnce(Bytes) -> Result<T, E>,
        E: From<Error>,
    {
        let data = self.get(bucket, key).await?;
        process(data)
    }

    /// Fetches an object, transforms its contents with `process`, and writes the result back to
    /// the same key.
    ///
    /// Nothing is written if `process` fails. This is not transactional: a write by someone else
    /// between the fetch and the write back is overwritten.
    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    pub async fn process_and_update_file<F, B, E>(
        &self,
        bucket: &str,
        key: &str,
        process: F,
    ) -> Result<(), E>
    where
        F: FnOnce(Bytes) -> Result<B, E>,
        B: Into<Bytes>,
        E: From<Error>,
    {
        let data = self.get(bucket, key).await?;
        let processed = process(data)?;
        self.put(bucket, key, processed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::InMemoryBackend;
    use crate::config::Config;
    use crate::error::Result;

    use super::*;

    const MONARCHS: &str = r#"[{"Name":"Edward the Elder","Country":"United Kingdom"},{"Name":"Athelstan","Country":"United Kingdom"}]"#;

    #[derive(Debug)]
    enum AppError {
        Store(Error),
        Rejected(&'static str),
    }

    impl From<Error> for AppError {
        fn from(error: Error) -> Self {
            Self::Store(error)
        }
    }

    async fn make_service() -> StorageService {
        let backend = InMemoryBackend::new();
        let service = StorageService::with_backend(Box::new(backend), &Config::default()).unwrap();
        service.put("bucket", "monarchs.json", MONARCHS).await.unwrap();
        service
    }

    #[tokio::test]
    async fn process_file_reads_contents() {
        let service = make_service().await;

        let second = service
            .process_file("bucket", "monarchs.json", |data| -> Result<String> {
                let monarchs: Vec<serde_json::Value> =
                    serde_json::from_slice(&data).map_err(Error::callback)?;
                Ok(monarchs[1]["Name"].as_str().unwrap_or_default().to_owned())
            })
            .await
            .unwrap();

        assert_eq!(second, "Athelstan");
    }

    #[tokio::test]
    async fn process_file_leaves_object_untouched() {
        let service = make_service().await;

        service
            .process_file("bucket", "monarchs.json", |data| -> Result<()> {
                let mut data = data.to_vec();
                data.clear();
                assert!(data.is_empty());
                Ok(())
            })
            .await
            .unwrap();

        let stored = service.get("bucket", "monarchs.json").await.unwrap();
        assert_eq!(stored.as_ref(), MONARCHS.as_bytes());
    }

    #[tokio::test]
    async fn process_file_propagates_callback_error() {
        let service = make_service().await;

        let result: Result<(), AppError> = service
            .process_file("bucket", "monarchs.json", |_| Err(AppError::Rejected("nope")))
            .await;

        assert!(matches!(result, Err(AppError::Rejected("nope"))));
    }

    #[tokio::test]
    async fn process_file_converts_store_error() {
        let service = make_service().await;

        let result: Result<(), AppError> = service
            .process_file("bucket", "missing.json", |_| Ok(()))
            .await;

        assert!(matches!(result, Err(AppError::Store(Error::NotFound { .. }))));
    }

    #[tokio::test]
    async fn update_with_identity_keeps_contents() {
        let service = make_service().await;

        service
            .process_and_update_file("bucket", "monarchs.json", Ok::<_, Error>)
            .await
            .unwrap();

        let stored = service.get("bucket", "monarchs.json").await.unwrap();
        assert_eq!(stored.as_ref(), MONARCHS.as_bytes());
    }

    #[tokio::test]
    async fn update_writes_new_contents() {
        let service = make_service().await;

        service
            .process_and_update_file("bucket", "monarchs.json", |data| -> Result<Vec<u8>> {
                let mut monarchs: Vec<serde_json::Value> =
                    serde_json::from_slice(&data).map_err(Error::callback)?;
                monarchs[0]["Country"] = "Wessex".into();
                serde_json::to_vec(&monarchs).map_err(Error::callback)
            })
            .await
            .unwrap();

        let stored = service.get("bucket", "monarchs.json").await.unwrap();
        let monarchs: Vec<serde_json::Value> = serde_json::from_slice(&stored).unwrap();
        assert_eq!(monarchs[0]["Country"], "Wessex");
        assert_eq!(monarchs[1]["Country"], "United Kingdom");
    }

    #[tokio::test]
    async fn failed_update_writes_nothing() {
        let service = make_service().await;

        let result: Result<(), AppError> = service
            .process_and_update_file("bucket", "monarchs.json", |_| {
                Err::<Vec<u8>, _>(AppError::Rejected("invalid"))
            })
            .await;
        assert!(matches!(result, Err(AppError::Rejected("invalid"))));

        let stored = service.get("bucket", "monarchs.json").await.unwrap();
        assert_eq!(stored.as_ref(), MONARCHS.as_bytes());
    }

    #[tokio::test]
    async fn update_of_missing_object_fails() {
        let service = make_service().await;

        let error = service
            .process_and_update_file("bucket", "missing.json", Ok::<_, Error>)
            .await
            .unwrap_err();
        assert!(error.is_not_found());
        assert!(!service.exists("bucket", "missing.json").await.unwrap());
    }
}
