// SPDX-License-Identifier: Apache-2.0

mod support;

use epgcast_server::{build_router, AppState, UpdateResponse};
use flate2::read::GzDecoder;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use support::{coordinator, ScriptedFetcher, FEED};
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn spawn_app(fetcher: Arc<ScriptedFetcher>) -> (SocketAddr, TempDir) {
    let root = tempdir().expect("tempdir");
    let app = build_router(AppState::new(Arc::new(coordinator(root.path(), fetcher))));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve app");
    });
    (addr, root)
}

async fn get(addr: SocketAddr, path: &str) -> (String, Vec<u8>) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write request");
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.expect("read response");
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator");
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    (head, raw[split + 4..].to_vec())
}

fn json_body(head: &str, body: &[u8]) -> UpdateResponse {
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn update_then_download_manifest_and_artifacts() {
    let (addr, _root) = spawn_app(Arc::new(ScriptedFetcher::serving(FEED))).await;

    let (head, body) = get(addr, "/update").await;
    let update = json_body(&head, &body);
    assert_eq!(update.code, 0);
    assert_eq!(update.message, "ok");
    let checksum = update.data.checksum.clone().expect("checksum");
    let index_file = update.data.index_file.clone().expect("index file");
    assert_eq!(index_file, format!("EPG_DATA/epg_index_{checksum}.json"));

    let (head, body) = get(addr, &format!("/{index_file}")).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
    let manifest: serde_json::Value = serde_json::from_slice(&body).expect("manifest json");
    let artifact = manifest["2024-03-06"][0]["file"]
        .as_str()
        .expect("artifact path")
        .to_string();
    assert_eq!(manifest["2024-03-07"][0]["channel"], "globo");

    let (head, gz) = get(addr, &format!("/{artifact}")).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
    let mut doc = String::new();
    GzDecoder::new(gz.as_slice())
        .read_to_string(&mut doc)
        .expect("gunzip artifact");
    assert!(doc.contains("Jornal Nacional"));
    assert!(!doc.contains("Corujão"));

    let (head, body) = get(addr, "/status").await;
    let status = json_body(&head, &body);
    assert_eq!(status.data.checksum.as_deref(), Some(checksum.as_str()));
}

#[tokio::test]
async fn failing_update_still_answers_with_a_result_object() {
    let (addr, _root) = spawn_app(Arc::new(ScriptedFetcher::failing("connection refused"))).await;
    let (head, body) = get(addr, "/update").await;
    let update = json_body(&head, &body);
    assert_eq!(update.code, 1);
    assert!(update.message.contains("connection refused"), "{}", update.message);
    assert!(String::from_utf8_lossy(&body).contains("\"data\":{}"));
}

#[tokio::test]
async fn healthz_and_missing_static_files() {
    let (addr, _root) = spawn_app(Arc::new(ScriptedFetcher::serving(FEED))).await;
    let (head, body) = get(addr, "/healthz").await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
    assert_eq!(body, b"ok");

    let (head, _) = get(addr, "/EPG_DATA/epg_index_deadbeef.json").await;
    assert!(head.starts_with("HTTP/1.1 404"), "{head}");
}
