use actix_web::{http::header, http::StatusCode, test, web, App};
use resumable_upload::api;
use resumable_upload::app_state::AppState;
use resumable_upload::config::{AppConfig, MetadataBackend, StorageBackend};
use serde_json::{json, Value};
use std::path::Path;

fn disk_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Disk;
    config.storage.destination = dir.join("files").display().to_string();
    config.metadata.backend = MetadataBackend::SQLite;
    config.metadata.db_path = dir.join("metadata.db").display().to_string();
    config
}

macro_rules! upload_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(|cfg| api::configure(cfg, "/upload")),
        )
        .await
    };
}

fn locator(location: &str) -> String {
    location
        .split("upload_id=")
        .nth(1)
        .expect("Location carries no locator")
        .to_string()
}

fn create_request(user: &str, size: u64) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/upload")
        .insert_header(("User", user))
        .insert_header(("X-Upload-Content-Type", "application/octet-stream"))
        .insert_header(("X-Upload-Content-Length", size.to_string()))
        .set_json(json!({"name": "movie.bin", "lastModified": 1700000000000u64}))
}

fn range_of(resp: &actix_web::dev::ServiceResponse) -> Option<String> {
    resp.headers()
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap().to_string())
}

#[actix_web::test]
async fn test_chunked_upload_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = upload_app!(AppState::from_config(disk_config(dir.path())).unwrap());

    let resp = test::call_service(&app, create_request("alice", 10).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    assert!(location.contains("/upload?upload_id="));
    let id = locator(&location);

    let chunk = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("Content-Range", "bytes 0-4/10"))
        .set_payload("hello")
        .to_request();
    let resp = test::call_service(&app, chunk).await;
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(range_of(&resp).as_deref(), Some("bytes=0-4"));

    let query = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("Content-Range", "bytes */10"))
        .to_request();
    let resp = test::call_service(&app, query).await;
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(range_of(&resp).as_deref(), Some("bytes=0-4"));

    let last = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("Content-Range", "bytes 5-9/10"))
        .set_payload("world")
        .to_request();
    let resp = test::call_service(&app, last).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["bytesWritten"], 10);
    assert_eq!(body["status"], "completed");
    let path = body["path"].as_str().unwrap().to_string();
    assert_eq!(std::fs::read(path).unwrap(), b"helloworld");

    let find = test::TestRequest::get()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("User", "alice"))
        .to_request();
    assert_eq!(test::call_service(&app, find).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_create_rejections() {
    let mut config = AppConfig::default();
    config.metadata.backend = MetadataBackend::Mock;
    config.storage.backend = StorageBackend::Mock;
    config.upload.max_upload_size = 100;
    config.upload.allow_mime = vec!["^image/".to_string()];
    let app = upload_app!(AppState::from_config(config).unwrap());

    let anonymous = test::TestRequest::post()
        .uri("/upload")
        .insert_header(("X-Upload-Content-Type", "image/png"))
        .insert_header(("X-Upload-Content-Length", "10"))
        .to_request();
    assert_eq!(test::call_service(&app, anonymous).await.status(), StatusCode::UNAUTHORIZED);

    let too_big = test::TestRequest::post()
        .uri("/upload")
        .insert_header(("User", "alice"))
        .insert_header(("X-Upload-Content-Type", "image/png"))
        .insert_header(("X-Upload-Content-Length", "101"))
        .to_request();
    assert_eq!(test::call_service(&app, too_big).await.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let wrong_type = test::TestRequest::post()
        .uri("/upload")
        .insert_header(("User", "alice"))
        .insert_header(("X-Upload-Content-Type", "text/html"))
        .insert_header(("X-Upload-Content-Length", "10"))
        .to_request();
    assert_eq!(
        test::call_service(&app, wrong_type).await.status(),
        StatusCode::UNSUPPORTED_MEDIA_TYPE
    );

    let not_an_upload = test::TestRequest::post()
        .uri("/upload")
        .insert_header(("User", "alice"))
        .to_request();
    assert_eq!(test::call_service(&app, not_an_upload).await.status(), StatusCode::NOT_FOUND);

    let bad_metadata = test::TestRequest::post()
        .uri("/upload")
        .insert_header(("User", "alice"))
        .insert_header(("X-Upload-Content-Type", "image/png"))
        .insert_header(("X-Upload-Content-Length", "10"))
        .set_payload("[1, 2, 3]")
        .to_request();
    assert_eq!(test::call_service(&app, bad_metadata).await.status(), StatusCode::BAD_REQUEST);

    let listing = test::TestRequest::get()
        .uri("/upload")
        .insert_header(("User", "alice"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, listing).await;
    assert_eq!(body, json!([]));
}

#[actix_web::test]
async fn test_cancel_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = upload_app!(AppState::from_config(disk_config(dir.path())).unwrap());

    let resp = test::call_service(&app, create_request("alice", 10).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let id = body["id"].as_str().unwrap().to_string();
    let path = body["path"].as_str().unwrap().to_string();
    assert!(Path::new(&path).exists());

    let cancel = || {
        test::TestRequest::delete()
            .uri(&format!("/upload?upload_id={}", id))
            .insert_header(("User", "alice"))
            .to_request()
    };
    assert_eq!(test::call_service(&app, cancel()).await.status(), StatusCode::NO_CONTENT);
    assert!(!Path::new(&path).exists());
    assert_eq!(test::call_service(&app, cancel()).await.status(), StatusCode::NOT_FOUND);

    let chunk = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .set_payload("0123456789")
        .to_request();
    assert_eq!(test::call_service(&app, chunk).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_resume_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let app = upload_app!(AppState::from_config(disk_config(dir.path())).unwrap());
        let resp = test::call_service(&app, create_request("alice", 8).to_request()).await;
        let body: Value = test::read_body_json(resp).await;
        let id = body["id"].as_str().unwrap().to_string();

        let chunk = test::TestRequest::put()
            .uri(&format!("/upload?upload_id={}", id))
            .insert_header(("Content-Range", "bytes 0-3/8"))
            .set_payload("abcd")
            .to_request();
        assert_eq!(test::call_service(&app, chunk).await.status(), StatusCode::PERMANENT_REDIRECT);
        id
    };

    let app = upload_app!(AppState::from_config(disk_config(dir.path())).unwrap());

    // A re-sent create resolves to the same session and its stored bytes
    let resp = test::call_service(&app, create_request("alice", 8).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["bytesWritten"], 4);

    let query = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("Content-Range", "bytes */8"))
        .to_request();
    let resp = test::call_service(&app, query).await;
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(range_of(&resp).as_deref(), Some("bytes=0-3"));

    let rest = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("Content-Range", "bytes 4-7/8"))
        .set_payload("efgh")
        .to_request();
    assert_eq!(test::call_service(&app, rest).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_malformed_range_and_oversized_chunk() {
    let mut config = AppConfig::default();
    config.metadata.backend = MetadataBackend::Mock;
    config.storage.backend = StorageBackend::Mock;
    config.upload.max_chunk_size = 4;
    let app = upload_app!(AppState::from_config(config).unwrap());

    let resp = test::call_service(&app, create_request("alice", 8).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let id = body["id"].as_str().unwrap().to_string();

    let malformed = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("Content-Range", "bytes 4-2/8"))
        .set_payload("ab")
        .to_request();
    assert_eq!(test::call_service(&app, malformed).await.status(), StatusCode::BAD_REQUEST);

    let oversized = test::TestRequest::put()
        .uri(&format!("/upload?upload_id={}", id))
        .insert_header(("Content-Range", "bytes 0-5/8"))
        .set_payload("abcdef")
        .to_request();
    assert_eq!(test::call_service(&app, oversized).await.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
