use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use gcp_auth::TokenProvider;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::common::{Backend, BackendError, BackendResult, ListPage};
use crate::metadata::ObjectMetadata;

/// The public endpoint of the GCS JSON API.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const TOKEN_SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

/// An object resource of the GCS JSON API.
///
/// Numeric fields are transmitted as JSON strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    bucket: String,
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    time_created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    generation: Option<String>,
}

fn parse_time(value: Option<String>) -> Option<SystemTime> {
    humantime::parse_rfc3339_weak(&value?).ok()
}

impl From<GcsObject> for ObjectMetadata {
    fn from(object: GcsObject) -> Self {
        let size = object
            .size
            .as_deref()
            .and_then(|size| size.parse().ok())
            .unwrap_or_default();

        Self {
            bucket: object.bucket,
            name: object.name,
            size,
            content_type: object.content_type,
            time_created: parse_time(object.time_created),
            updated: parse_time(object.updated),
            etag: object.etag,
            generation: object.generation.and_then(|g| g.parse().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Google Cloud Storage, accessed through its JSON API.
pub struct Gcs {
    client: reqwest::Client,
    endpoint: Url,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl Gcs {
    /// Connects to the public GCS endpoint using Application Default Credentials.
    pub async fn new(client: reqwest::Client) -> BackendResult<Self> {
        let token_provider = gcp_auth::provider().await?;
        let mut gcs = Self::without_token(client, DEFAULT_ENDPOINT)?;
        gcs.token_provider = Some(token_provider);
        Ok(gcs)
    }

    /// Connects to a custom endpoint without authentication, such as an emulator.
    pub fn without_token(client: reqwest::Client, endpoint: &str) -> BackendResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|err| BackendError::Generic {
            context: format!("invalid GCS endpoint `{endpoint}`"),
            cause: Some(Box::new(err)),
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::generic(format!(
                "GCS endpoint `{endpoint}` cannot be a base URL"
            )));
        }

        Ok(Self {
            client,
            endpoint,
            token_provider: None,
        })
    }

    fn url(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::generic("GCS endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, bucket: &str, key: &str) -> BackendResult<Url> {
        self.url(&["storage", "v1", "b", bucket, "o", key])
    }

    async fn request(&self, method: Method, url: Url) -> BackendResult<RequestBuilder> {
        let builder = self.client.request(method, url);
        match &self.token_provider {
            Some(provider) => {
                let token = provider.token(TOKEN_SCOPES).await?;
                Ok(builder.bearer_auth(token.as_str()))
            }
            None => Ok(builder),
        }
    }
}

async fn send(builder: RequestBuilder, context: &str) -> BackendResult<Response> {
    builder
        .send()
        .await
        .map_err(|cause| BackendError::reqwest(context, cause))
}

fn check_status(response: Response, context: &str) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BackendError::Status {
            context: context.to_owned(),
            status,
        })
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: Response,
    context: &str,
) -> BackendResult<T> {
    let body = response
        .bytes()
        .await
        .map_err(|cause| BackendError::reqwest(context, cause))?;
    serde_json::from_slice(&body).map_err(|cause| BackendError::Serde {
        context: context.to_owned(),
        cause,
    })
}

impl fmt::Debug for Gcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gcs")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.token_provider.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for Gcs {
    fn name(&self) -> &'static str {
        "gcs"
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn put_object(&self, bucket: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        tracing::debug!("Writing to gcs backend");
        let url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        let builder = self
            .request(Method::POST, url)
            .await?
            .query(&[("uploadType", "media"), ("name", key)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload);

        let response = send(builder, "uploading object").await?;
        check_status(response, "uploading object")?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Option<Bytes>> {
        tracing::debug!("Reading from gcs backend");
        let url = self.object_url(bucket, key)?;
        let builder = self
            .request(Method::GET, url)
            .await?
            .query(&[("alt", "media")]);

        let response = send(builder, "downloading object").await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Object not found");
            return Ok(None);
        }

        let payload = check_status(response, "downloading object")?
            .bytes()
            .await
            .map_err(|cause| BackendError::reqwest("reading object payload", cause))?;
        Ok(Some(payload))
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<Option<ObjectMetadata>> {
        tracing::debug!("Reading metadata from gcs backend");
        let url = self.object_url(bucket, key)?;
        let builder = self.request(Method::GET, url).await?;

        let response = send(builder, "reading object metadata").await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Object not found");
            return Ok(None);
        }

        let response = check_status(response, "reading object metadata")?;
        let object: GcsObject = parse_json(response, "parsing object metadata").await?;
        Ok(Some(object.into()))
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %prefix), skip_all)]
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> BackendResult<ListPage> {
        tracing::debug!(page_token, "Listing gcs backend");
        let url = self.url(&["storage", "v1", "b", bucket, "o"])?;
        let mut builder = self
            .request(Method::GET, url)
            .await?
            .query(&[("prefix", prefix)]);
        if let Some(page_token) = page_token {
            builder = builder.query(&[("pageToken", page_token)]);
        }

        let response = send(builder, "listing objects").await?;
        let response = check_status(response, "listing objects")?;
        let list: GcsListResponse = parse_json(response, "parsing object listing").await?;

        Ok(ListPage {
            objects: list.items.into_iter().map(ObjectMetadata::from).collect(),
            next_page_token: list.next_page_token,
        })
    }

    #[tracing::instrument(level = "trace", fields(%bucket, %key), skip_all)]
    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        tracing::debug!("Deleting from gcs backend");
        let url = self.object_url(bucket, key)?;
        let builder = self.request(Method::DELETE, url).await?;

        let response = send(builder, "deleting object").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response, "deleting object")?;
        Ok(())
    }
}
