//! Importing files from the network into storage.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::service::StorageService;

impl StorageService {
    /// Downloads `url` and stores the response body at the given key.
    ///
    /// The request carries the optional extra `headers`. A response with a non-success status
    /// fails with [`Error::HttpStatus`] and nothing is stored. On success, the stored body is
    /// returned. If storing fails, the body comes back inside [`Error::Store`].
    ///
    /// The download is bounded by the service's deadline, and the upload by another.
    #[tracing::instrument(level = "trace", fields(%url, %bucket, %key), skip_all)]
    pub async fn save_network_file(
        &self,
        url: &str,
        bucket: &str,
        key: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Bytes> {
        let body = Self::with_timeout("fetch", self.timeout(), self.fetch(url, headers)).await?;
        tracing::debug!(size = body.len(), "Fetched network file");

        if let Err(source) = self.put(bucket, key, body.clone()).await {
            return Err(Error::Store {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                body,
                source: Box::new(source),
            });
        }
        Ok(body)
    }

    async fn fetch(&self, url: &str, headers: Option<&HashMap<String, String>>) -> Result<Bytes> {
        let fetch_error = |cause| Error::Fetch {
            url: url.to_owned(),
            cause,
        };

        let mut request = self.http().get(url);
        for (name, value) in headers.into_iter().flatten() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_owned(),
                status,
            });
        }

        response.bytes().await.map_err(fetch_error)
    }
}
