mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use common::{create_test_db, test_config, tiny_png_bytes};

fn multipart_body(boundary: &str, field_name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn uploading_an_empty_file_is_rejected_with_400() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_test_db().await;
    let app = threat_modeling::build_app(test_config(dir.path()), pool).await.unwrap();

    let boundary = "X-BOUNDARY-EMPTY";
    let body = multipart_body(boundary, "file", "diagram.png", "image/png", b"");

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/analyses")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let text = body_text(response).await;
    assert!(text.to_lowercase().contains("empty"), "expected 'empty' in body, got: {text}");
}

#[tokio::test]
async fn uploading_an_unsupported_content_type_is_rejected_with_400() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_test_db().await;
    let app = threat_modeling::build_app(test_config(dir.path()), pool).await.unwrap();

    let boundary = "X-BOUNDARY-BADTYPE";
    // Plain text is not a recognizable image container at all.
    let body = multipart_body(boundary, "file", "notes.txt", "text/plain", b"just some text, not an image");

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/analyses")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let text = body_text(response).await;
    assert!(
        text.to_lowercase().contains("content type"),
        "expected 'content type' in body, got: {text}"
    );
}

#[tokio::test]
async fn create_then_get_then_delete_then_404() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_test_db().await;
    let app = threat_modeling::build_app(test_config(dir.path()), pool).await.unwrap();

    let boundary = "X-BOUNDARY-OK";
    let body = multipart_body(boundary, "file", "diagram.png", "image/png", &tiny_png_bytes());

    let create_request = Request::builder()
        .method("POST")
        .uri("/api/v1/analyses")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let create_response = app.clone().oneshot(create_request).await.unwrap();
    assert_eq!(create_response.status(), StatusCode::CREATED);
    let created = body_json(create_response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "OPEN");
    assert!(created["code"].as_str().unwrap().starts_with("TMA-"));

    let get_request =
        Request::builder().method("GET").uri(format!("/api/v1/analyses/{id}")).body(Body::empty()).unwrap();
    let get_response = app.clone().oneshot(get_request).await.unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);

    let delete_request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/analyses/{id}"))
        .body(Body::empty())
        .unwrap();
    let delete_response = app.clone().oneshot(delete_request).await.unwrap();
    assert_eq!(delete_response.status(), StatusCode::NO_CONTENT);

    let get_again_request =
        Request::builder().method("GET").uri(format!("/api/v1/analyses/{id}")).body(Body::empty()).unwrap();
    let get_again_response = app.oneshot(get_again_request).await.unwrap();
    assert_eq!(get_again_response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uploading_more_bytes_than_the_configured_limit_is_rejected_with_413() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_test_db().await;
    let mut config = test_config(dir.path());
    config.storage.max_upload_mb = 1;
    let limit = config.storage.max_upload_bytes() as usize;
    let app = threat_modeling::build_app(config, pool).await.unwrap();

    let boundary = "X-BOUNDARY-TOOBIG";
    let oversized = vec![0u8; limit + 1];
    let body = multipart_body(boundary, "file", "diagram.png", "image/png", &oversized);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/analyses")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn getting_an_unknown_id_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_test_db().await;
    let app = threat_modeling::build_app(test_config(dir.path()), pool).await.unwrap();

    let missing_id = uuid::Uuid::new_v4();
    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/analyses/{missing_id}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_paginates_and_reports_total() {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_test_db().await;
    let app = threat_modeling::build_app(test_config(dir.path()), pool).await.unwrap();

    for _ in 0..3 {
        let boundary = "X-BOUNDARY-LIST";
        let body = multipart_body(boundary, "file", "diagram.png", "image/png", &tiny_png_bytes());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/analyses")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/analyses?page=1&size=2")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
}
