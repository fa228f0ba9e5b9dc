use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sieve_core::{IndexBuilder, IndexConfig};
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_index(dir: &Path, docs: &[(&str, &str)]) -> IndexConfig {
    let config = IndexConfig { output_dir: dir.to_path_buf(), max_results: 5, ..IndexConfig::default() };
    let mut builder = IndexBuilder::new(config.clone()).unwrap();
    for (url, text) in docs {
        builder.add_document(url, text).unwrap();
    }
    builder.finish().unwrap();
    config
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let config = build_tiny_index(
        dir.path(),
        &[
            ("https://rust.example/a", "rust crab rust systems"),
            ("https://rust.example/b", "learning rust today"),
            ("https://rust.example/c", "gardening tips"),
        ],
    );
    let app = sieve_server::build_app(config, None).unwrap();

    let (status, json) = call(app.clone(), get("/search?q=Rust&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"].as_u64(), Some(0));
    assert_eq!(arr[1]["doc_id"].as_u64(), Some(1));
    assert_eq!(arr[0]["url"].as_str(), Some("https://rust.example/a"));

    let (status, json) = call(app.clone(), get("/search?q=rust%20gardening")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"].as_u64(), Some(0));

    let (status, json) = call(app, get("/doc/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"].as_str(), Some("https://rust.example/c"));
}

#[tokio::test]
async fn unknown_doc_is_not_found() {
    let dir = tempdir().unwrap();
    let config = build_tiny_index(dir.path(), &[("https://x.example/", "lonely page")]);
    let app = sieve_server::build_app(config, None).unwrap();
    let (status, _) = call(app, get("/doc/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reload_swaps_in_a_rebuilt_index() {
    let dir = tempdir().unwrap();
    let config = build_tiny_index(dir.path(), &[("https://x.example/1", "old words here")]);
    let app = sieve_server::build_app(config, Some("secret".into())).unwrap();

    let (_, json) = call(app.clone(), get("/search?q=fresh")).await;
    assert_eq!(json["total_hits"].as_u64(), Some(0));

    build_tiny_index(
        dir.path(),
        &[("https://x.example/1", "old words here"), ("https://x.example/2", "fresh content arrives")],
    );

    let denied = Request::post("/admin/reload").body(Body::empty()).unwrap();
    let (status, _) = call(app.clone(), denied).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let reload = Request::post("/admin/reload").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, json) = call(app.clone(), reload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["documents"].as_u64(), Some(2));

    let (_, json) = call(app, get("/search?q=fresh")).await;
    assert_eq!(json["results"][0]["url"].as_str(), Some("https://x.example/2"));
}
