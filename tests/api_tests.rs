mod common;

use common::spawn_app;

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_request_id_is_generated_and_echoed() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    let generated = response.headers().get("x-request-id").unwrap();
    assert!(uuid::Uuid::parse_str(generated.to_str().unwrap()).is_ok());

    let response = app
        .client
        .get(app.url("/labels"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me-123");
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = spawn_app().await;
    let doc: serde_json::Value = app
        .client
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/posts/{slug}"));
    assert!(paths.contains_key("/admin/images/reconcile"));
    assert!(paths.contains_key("/admin/layouts/{page}"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/nope")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_cors_preflight_allows_editor_headers() {
    let app = spawn_app().await;
    let response = app
        .client
        .request(reqwest::Method::OPTIONS, app.url("/admin/posts"))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "PUT")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
