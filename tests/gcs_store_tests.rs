use album_cover_worker::{
    Error,
    artifacts::{Artifact, ArtifactStore, GcsArtifactStore, create_artifact_store},
    config::{GcsConfig, LocalStorageConfig, StorageConfig},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UPLOAD_PATH: &str = "/upload/storage/v1/b/covers/o";

fn gcs_config(server: &MockServer) -> GcsConfig {
    GcsConfig {
        bucket: "covers".to_string(),
        endpoint: server.uri(),
        public_base_url: "https://cdn.example.com".to_string(),
        access_token: Some("secret-token".to_string()),
    }
}

#[tokio::test]
async fn test_gcs_upload_returns_urls_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(query_param("uploadType", "media"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "storage#object"})))
        .expect(2)
        .mount(&server)
        .await;

    let store = GcsArtifactStore::new(gcs_config(&server)).unwrap();
    let urls = store
        .upload(vec![
            Artifact::new(b"cover-0".to_vec(), "T7x/0.png"),
            Artifact::new(b"cover-1".to_vec(), "T7x/1.jpg"),
        ])
        .await
        .unwrap();

    assert_eq!(
        urls,
        vec![
            "https://cdn.example.com/covers/T7x/0.png",
            "https://cdn.example.com/covers/T7x/1.jpg"
        ]
    );

    let requests = server.received_requests().await.unwrap();
    let names: Vec<String> = requests
        .iter()
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "name")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    assert_eq!(names, vec!["T7x/0.png", "T7x/1.jpg"]);
    assert_eq!(requests[0].body, b"cover-0");
    assert_eq!(
        requests[1].headers.get("content-type").unwrap(),
        "image/jpeg"
    );
}

#[tokio::test]
async fn test_gcs_rejection_is_upload_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let store = GcsArtifactStore::new(gcs_config(&server)).unwrap();
    let err = store
        .upload(vec![Artifact::new(b"x".to_vec(), "T7x/0.png")])
        .await
        .unwrap_err();

    match err {
        Error::Upload(message) => {
            assert!(message.contains("T7x/0.png"));
            assert!(message.contains("403"));
            assert!(message.contains("forbidden"));
        }
        other => panic!("expected upload error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gcs_stops_at_first_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = GcsArtifactStore::new(gcs_config(&server)).unwrap();
    let result = store
        .upload(vec![
            Artifact::new(b"a".to_vec(), "T7x/0.png"),
            Artifact::new(b"b".to_vec(), "T7x/1.png"),
        ])
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_batch_makes_no_requests() {
    let server = MockServer::start().await;
    let store = GcsArtifactStore::new(gcs_config(&server)).unwrap();

    assert!(store.upload(Vec::new()).await.unwrap().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_factory_builds_local_store() {
    let dir = TempDir::new().unwrap();
    let store = create_artifact_store(&StorageConfig::Local(LocalStorageConfig {
        root: dir.path().to_path_buf(),
    }))
    .unwrap();

    let urls = store
        .upload(vec![Artifact::new(b"cover".to_vec(), "T7x/0.png")])
        .await
        .unwrap();

    assert_eq!(urls.len(), 1);
    assert!(urls[0].starts_with("file://"));
    assert_eq!(std::fs::read(dir.path().join("T7x/0.png")).unwrap(), b"cover");
}
