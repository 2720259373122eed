use cloudstore_service::{
    Config, Error, ListFilter, ObjectMetadata, Storage, StorageConfig, StorageService, pack, unpack,
};
use cloudstore_test::server::TestServer;

const BUCKET: &str = "storage-package-test";

async fn connect(server: &TestServer) -> StorageService {
    cloudstore_test::tracing::init();
    let endpoint = server.endpoint();
    let config = StorageConfig::Gcs {
        endpoint: Some(&endpoint),
    };
    StorageService::new(config).await.unwrap()
}

fn names(objects: &[ObjectMetadata]) -> Vec<&str> {
    objects.iter().map(|object| object.name.as_str()).collect()
}

#[tokio::test]
async fn stores_and_retrieves() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    service.put(BUCKET, "putTemp.json", "oh hai!").await.unwrap();
    assert_eq!(server.stored(BUCKET, "putTemp.json").unwrap(), "oh hai!");

    let contents = service.get(BUCKET, "putTemp.json").await.unwrap();
    assert_eq!(contents, "oh hai!");
}

#[tokio::test]
async fn overwrites_existing_key() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    service.put(BUCKET, "key", "initial body").await.unwrap();
    service.put(BUCKET, "key", "new body").await.unwrap();

    let contents = service.get(BUCKET, "key").await.unwrap();
    assert_eq!(contents, "new body");

    let metadata = service.metadata(BUCKET, "key").await.unwrap();
    assert_eq!(metadata.generation, Some(2));
    assert_eq!(metadata.size, 8);
}

#[tokio::test]
async fn encodes_nested_keys() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    let key = "reports/2024/q1 summary?.csv";
    service.put(BUCKET, key, "a,b\n1,2\n").await.unwrap();
    assert!(server.stored(BUCKET, key).is_some());

    let contents = service.get(BUCKET, key).await.unwrap();
    assert_eq!(contents, "a,b\n1,2\n");
}

#[tokio::test]
async fn missing_object_is_not_found() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    let error = service.get(BUCKET, "missing").await.unwrap_err();
    assert!(matches!(error, Error::NotFound { ref key, .. } if key == "missing"));

    let error = service.metadata(BUCKET, "missing").await.unwrap_err();
    assert!(error.is_not_found());
}

#[tokio::test]
async fn exists_before_and_after_put_and_delete() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    assert!(!service.exists(BUCKET, "putTemp.json").await.unwrap());
    service.put(BUCKET, "putTemp.json", "{}").await.unwrap();
    assert!(service.exists(BUCKET, "putTemp.json").await.unwrap());
    service.delete(BUCKET, "putTemp.json").await.unwrap();
    assert!(!service.exists(BUCKET, "putTemp.json").await.unwrap());

    // deleting again is fine
    service.delete(BUCKET, "putTemp.json").await.unwrap();
}

#[tokio::test]
async fn access_denied_is_not_absence() {
    let server = TestServer::new().await;
    let service = connect(&server).await;
    service.put(BUCKET, "key", "data").await.unwrap();

    server.set_forbidden(true);

    let error = service.exists(BUCKET, "key").await.unwrap_err();
    assert!(error.is_auth());
    assert!(!error.is_not_found());

    let error = service.exists(BUCKET, "missing").await.unwrap_err();
    assert!(error.is_auth());

    let error = service.get(BUCKET, "key").await.unwrap_err();
    assert!(matches!(error, Error::Backend(_)));

    server.set_forbidden(false);
    assert!(service.exists(BUCKET, "key").await.unwrap());
}

#[tokio::test]
async fn lists_nested_file() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    service.put(BUCKET, "a/b/file.json", r#"{"x":1}"#).await.unwrap();
    service.put(BUCKET, "a/c/other.json", "{}").await.unwrap();

    let objects = service.list(BUCKET, "a/b/", None).await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].file_name(), "file.json");
    assert_eq!(objects[0].bucket, BUCKET);
    assert_eq!(objects[0].size, 7);
    assert!(objects[0].time_created.is_some());

    let contents = objects[0].fetch(&service).await.unwrap();
    assert_eq!(contents, r#"{"x":1}"#);
}

#[tokio::test]
async fn lists_single_file_by_full_key() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    service
        .put(BUCKET, "english_monarchs_test.json", "[]")
        .await
        .unwrap();

    let objects = service
        .list(BUCKET, "english_monarchs_test.json", None)
        .await
        .unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].file_name(), "english_monarchs_test.json");
}

#[tokio::test]
async fn excludes_directory_markers() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    service.put(BUCKET, "a/b/", "").await.unwrap();
    service.put(BUCKET, "a/b/file.json", "{}").await.unwrap();

    let objects = service.list(BUCKET, "a/b/", None).await.unwrap();
    assert_eq!(names(&objects), ["a/b/file.json"]);
}

#[tokio::test]
async fn follows_page_tokens() {
    let server = TestServer::with_page_size(2).await;
    let service = connect(&server).await;

    for i in 0..7 {
        service
            .put(BUCKET, &format!("logs/{i}.txt"), i.to_string())
            .await
            .unwrap();
    }
    service.put(BUCKET, "other/0.txt", "0").await.unwrap();

    let objects = service.list(BUCKET, "logs/", None).await.unwrap();
    let expected: Vec<_> = (0..7).map(|i| format!("logs/{i}.txt")).collect();
    assert_eq!(names(&objects), expected);
}

#[tokio::test]
async fn filter_keeps_order_across_pages() {
    let server = TestServer::with_page_size(2).await;
    let service = connect(&server).await;

    for i in 0..8 {
        service
            .put(BUCKET, &format!("f/{i}"), vec![b'x'; i])
            .await
            .unwrap();
    }

    // Rejects 2, 3 and 4 back to back, then 6.
    let predicate = |object: &ObjectMetadata| !matches!(object.size, 2..=4 | 6);
    let filter: ListFilter<'_> = &predicate;

    let objects = service.list(BUCKET, "f/", Some(filter)).await.unwrap();
    assert_eq!(names(&objects), ["f/0", "f/1", "f/5", "f/7"]);
}

#[tokio::test]
async fn updates_in_place() {
    let server = TestServer::new().await;
    let service = connect(&server).await;
    service
        .put(BUCKET, "updateTemp.json", r#"[{"Country":"United Kingdom"}]"#)
        .await
        .unwrap();

    service
        .process_and_update_file(BUCKET, "updateTemp.json", |data| -> Result<String, Error> {
            let text = String::from_utf8(data.to_vec()).map_err(Error::callback)?;
            Ok(text.replace("United Kingdom", "Wessex"))
        })
        .await
        .unwrap();

    let contents = service.get(BUCKET, "updateTemp.json").await.unwrap();
    assert_eq!(contents, r#"[{"Country":"Wessex"}]"#);
}

#[tokio::test]
async fn stores_archives() {
    let server = TestServer::new().await;
    let service = connect(&server).await;

    let files = [("file1", b"first".as_slice()), ("file2", b"second".as_slice())];
    service
        .put(BUCKET, "zipTemp.zip", pack(files).unwrap())
        .await
        .unwrap();

    let stored = service.get(BUCKET, "zipTemp.zip").await.unwrap();
    let unpacked = unpack(&stored).unwrap();
    assert_eq!(unpacked.len(), 2);
    assert_eq!(unpacked["file1"], b"first");
    assert_eq!(unpacked["file2"], b"second");
}

#[tokio::test]
async fn loads_from_config() {
    let server = TestServer::new().await;
    let config = Config {
        storage: Storage::Gcs {
            endpoint: Some(server.endpoint()),
        },
        ..Default::default()
    };
    let service = StorageService::from_config(&config).await.unwrap();

    service.put(BUCKET, "key", "configured").await.unwrap();
    assert_eq!(server.stored(BUCKET, "key").unwrap(), "configured");
}
