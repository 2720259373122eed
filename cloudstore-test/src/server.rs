//! Exposes an in-process fake of the Google Cloud Storage JSON API for use in integration tests.
//!
//! Next to the storage API, the server hosts a few plain HTTP routes that act as network files:
//!
//! - `/files/{name}` serves contents registered with [`TestServer::serve_file`],
//! - `/headers/{name}` echoes the value of the request header `name`,
//! - `/status/{code}` responds with the given status code,
//! - `/slow` takes longer to respond than any test should wait.
//!
//! ```
//! use cloudstore_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let endpoint = server.endpoint();
//!    // point a GCS client at the endpoint...
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::net::{SocketAddr, TcpListener};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;

/// Timestamp reported for every object, the fake does not track time.
const TIMESTAMP: &str = "2024-01-01T00:00:00.000Z";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    generation: u64,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

#[derive(Debug, Clone)]
struct FakeGcs {
    buckets: Arc<Mutex<Buckets>>,
    files: Arc<Mutex<HashMap<String, Bytes>>>,
    forbidden: Arc<AtomicBool>,
    page_size: usize,
}

impl FakeGcs {
    fn check_access(&self) -> Result<(), Response> {
        if self.forbidden.load(Ordering::Relaxed) {
            let body = json!({"error": {"code": 403, "message": "access denied"}});
            return Err((StatusCode::FORBIDDEN, Json(body)).into_response());
        }
        Ok(())
    }
}

fn object_resource(bucket: &str, name: &str, object: &StoredObject) -> serde_json::Value {
    json!({
        "kind": "storage#object",
        "bucket": bucket,
        "name": name,
        "size": object.data.len().to_string(),
        "contentType": object.content_type,
        "timeCreated": TIMESTAMP,
        "updated": TIMESTAMP,
        "etag": format!("etag-{}", object.generation),
        "generation": object.generation.to_string(),
    })
}

fn not_found() -> Response {
    let body = json!({"error": {"code": 404, "message": "No such object"}});
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    prefix: String,
    page_token: Option<String>,
    max_results: Option<usize>,
}

async fn list_objects(
    State(gcs): State<FakeGcs>,
    Path(bucket): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(response) = gcs.check_access() {
        return response;
    }

    let page_size = params.max_results.unwrap_or(gcs.page_size).max(1);
    let start = match params.page_token {
        Some(token) => Bound::Excluded(token),
        None => Bound::Included(params.prefix.clone()),
    };

    let buckets = gcs.buckets.lock().unwrap();
    let empty = BTreeMap::new();
    let objects = buckets.get(&bucket).unwrap_or(&empty);

    let mut matching = objects
        .range((start, Bound::Unbounded))
        .take_while(|(name, _)| name.starts_with(&params.prefix));

    let items: Vec<_> = matching
        .by_ref()
        .take(page_size)
        .map(|(name, object)| (name.clone(), object_resource(&bucket, name, object)))
        .collect();

    let mut body = json!({"kind": "storage#objects"});
    if !items.is_empty() {
        body["items"] = items.iter().map(|(_, item)| item.clone()).collect();
    }
    if matching.next().is_some()
        && let Some((last, _)) = items.last()
    {
        body["nextPageToken"] = last.clone().into();
    }

    Json(body).into_response()
}

#[derive(Debug, Deserialize)]
struct ObjectParams {
    alt: Option<String>,
}

async fn get_object(
    State(gcs): State<FakeGcs>,
    Path((bucket, name)): Path<(String, String)>,
    Query(params): Query<ObjectParams>,
) -> Response {
    if let Err(response) = gcs.check_access() {
        return response;
    }

    let buckets = gcs.buckets.lock().unwrap();
    let Some(object) = buckets.get(&bucket).and_then(|objects| objects.get(&name)) else {
        return not_found();
    };

    match params.alt.as_deref() {
        Some("media") => (
            [(header::CONTENT_TYPE, object.content_type.clone())],
            object.data.clone(),
        )
            .into_response(),
        _ => Json(object_resource(&bucket, &name, object)).into_response(),
    }
}

async fn delete_object(
    State(gcs): State<FakeGcs>,
    Path((bucket, name)): Path<(String, String)>,
) -> Response {
    if let Err(response) = gcs.check_access() {
        return response;
    }

    let mut buckets = gcs.buckets.lock().unwrap();
    match buckets.get_mut(&bucket).and_then(|objects| objects.remove(&name)) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadParams {
    upload_type: String,
    name: String,
}

async fn upload_object(
    State(gcs): State<FakeGcs>,
    Path(bucket): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    data: Bytes,
) -> Response {
    if let Err(response) = gcs.check_access() {
        return response;
    }
    if params.upload_type != "media" || params.name.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_owned();

    let mut buckets = gcs.buckets.lock().unwrap();
    let objects = buckets.entry(bucket.clone()).or_default();
    let generation = objects.get(&params.name).map_or(1, |o| o.generation + 1);
    let object = StoredObject {
        data,
        content_type,
        generation,
    };

    let resource = object_resource(&bucket, &params.name, &object);
    objects.insert(params.name, object);
    Json(resource).into_response()
}

async fn serve_file(State(gcs): State<FakeGcs>, Path(name): Path<String>) -> Response {
    match gcs.files.lock().unwrap().get(&name) {
        Some(contents) => contents.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn echo_header(Path(name): Path<String>, headers: HeaderMap) -> Response {
    match headers.get(name.as_str()) {
        Some(value) => value.as_bytes().to_vec().into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn respond_with_status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {code}")).into_response()
}

async fn respond_slowly() -> &'static str {
    tokio::time::sleep(Duration::from_secs(60)).await;
    "finally"
}

fn router(gcs: FakeGcs) -> Router {
    Router::new()
        .route("/storage/v1/b/{bucket}/o", get(list_objects))
        .route(
            "/storage/v1/b/{bucket}/o/{object}",
            get(get_object).delete(delete_object),
        )
        .route("/upload/storage/v1/b/{bucket}/o", post(upload_object))
        .route("/files/{name}", get(serve_file))
        .route("/headers/{name}", get(echo_header))
        .route("/status/{code}", get(respond_with_status))
        .route("/slow", get(respond_slowly))
        .with_state(gcs)
}

/// An in-process fake GCS server for use in integration tests.
///
/// All objects are kept in memory and dropped with the server. It listens on a random available
/// port on localhost.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    gcs: FakeGcs,
}

impl TestServer {
    /// Starts a server that returns up to 1000 objects per listing page.
    pub async fn new() -> Self {
        Self::with_page_size(1000).await
    }

    /// Starts a server that returns up to `page_size` objects per listing page.
    pub async fn with_page_size(page_size: usize) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let gcs = FakeGcs {
            buckets: Default::default(),
            files: Default::default(),
            forbidden: Default::default(),
            page_size,
        };
        let app = router(gcs.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            gcs,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns the base URL to configure as a GCS endpoint.
    pub fn endpoint(&self) -> String {
        self.url("/")
    }

    /// Makes every storage request fail with `403 Forbidden` until reset.
    pub fn set_forbidden(&self, forbidden: bool) {
        self.gcs.forbidden.store(forbidden, Ordering::Relaxed);
    }

    /// Serves `contents` at `/files/{name}`.
    pub fn serve_file(&self, name: &str, contents: impl Into<Bytes>) {
        let mut files = self.gcs.files.lock().unwrap();
        files.insert(name.to_owned(), contents.into());
    }

    /// Returns the contents stored in the fake, bypassing the API.
    pub fn stored(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let buckets = self.gcs.buckets.lock().unwrap();
        let object = buckets.get(bucket)?.get(key)?;
        Some(object.data.clone())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
