#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use catalog::{
    database::run_migrations,
    images::lifecycle::ImageLifecycle,
    services::{asset_store::AssetStore, product_service::ProductService},
    state::AppState,
};
use http_body_util::BodyExt as _;
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqlitePoolOptions;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PUBLIC_URL: &str = "http://catalog.test/assets";
pub const BOUNDARY: &str = "catalog-test-boundary";
pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storage: TempDir,
}

/// App wired to an in-memory database and a temporary asset directory.
pub async fn setup_app() -> TestApp {
    let storage = tempfile::tempdir().expect("tempdir");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");

    let assets = AssetStore::new(storage.path(), PUBLIC_URL, "product_images", 1024);
    let lifecycle = ImageLifecycle::new(Arc::new(assets.clone()), Duration::from_secs(1));
    let products = ProductService::new(Arc::new(pool), lifecycle);
    let state = AppState { products, assets };

    TestApp {
        router: catalog::app(state.clone()),
        state,
        storage,
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: Vec<u8>,
    },
}

/// PNG file bytes: the signature followed by `payload`.
pub fn png(payload: &[u8]) -> Vec<u8> {
    [PNG_SIGNATURE, payload].concat()
}

pub fn image<'a>(field: &'a str, file_name: &'a str, payload: &[u8]) -> Part<'a> {
    Part::File {
        field,
        file_name,
        content_type: "image/png",
        bytes: png(payload),
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                field,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn send(router: &Router, req: Request<Body>) -> Response<Body> {
    router.clone().oneshot(req).await.expect("router response")
}

pub async fn send_form(router: &Router, method: &str, uri: &str, parts: &[Part<'_>]) -> (StatusCode, JsonValue) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request");
    let resp = send(router, req).await;
    let status = resp.status();
    (status, json_body(resp).await)
}

pub async fn send_empty(router: &Router, method: &str, uri: &str) -> Response<Body> {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(router, req).await
}

pub async fn json_body(resp: Response<Body>) -> JsonValue {
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
}

pub async fn raw_body(resp: Response<Body>) -> Vec<u8> {
    resp.into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

/// Request path of an asset URL produced by the store.
pub fn asset_path(url: &str) -> String {
    url.strip_prefix("http://catalog.test")
        .expect("asset url under PUBLIC_URL")
        .to_string()
}

/// Number of regular files under the storage directory.
pub fn stored_files(dir: &TempDir) -> usize {
    fn walk(path: &std::path::Path) -> usize {
        std::fs::read_dir(path)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| {
                        let p = e.path();
                        if p.is_dir() { walk(&p) } else { 1 }
                    })
                    .sum()
            })
            .unwrap_or(0)
    }
    walk(dir.path())
}
