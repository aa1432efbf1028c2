// Integration test for the HTTP surface: submit, poll, fetch once, cleanup.

mod common;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Notify;

use common::{test_config, FakeEngine, Script};
use ma_fetch_engine::server::FetchServer;
use ma_fetch_engine::service::FetchService;

struct Harness {
    _root: tempfile::TempDir,
    service: FetchService,
    server: FetchServer,
    client: reqwest::Client,
}

async fn start(engine: FakeEngine) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(&root);
    let service = FetchService::start(config, Arc::new(engine));
    let server = FetchServer::start(service.app_state(), "127.0.0.1:0")
        .await
        .unwrap();
    Harness {
        _root: root,
        service,
        server,
        client: reqwest::Client::new(),
    }
}

impl Harness {
    async fn status(&self, id: &str) -> Value {
        self.client
            .get(self.server.url(&format!("/api/status/{}", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn wait_status(&self, id: &str, wanted: &str) -> Value {
        for _ in 0..200 {
            let status = self.status(id).await;
            if status["status"] == wanted {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", id, wanted);
    }

    async fn stop(self) {
        self.server.shutdown().await;
        self.service.shutdown().await;
    }
}

#[tokio::test]
async fn test_download_poll_fetch_cleanup() {
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let h = start(FakeEngine::succeed("Test Song", "Test Artist").with_payload(payload.clone())).await;

    let resp = h
        .client
        .post(h.server.url("/api/download"))
        .json(&json!({
            "url": "https://www.youtube.com/watch?v=abc123",
            "type": "audio",
            "quality": "128"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["platform"], "youtube");
    assert_eq!(body["cookiesAvailable"], false);
    let id = body["downloadId"].as_str().unwrap().to_string();

    let status = h.wait_status(&id, "completed").await;
    assert_eq!(status["progress"], 100);
    assert_eq!(status["title"], "Test Song");
    assert_eq!(status["uploader"], "Test Artist");
    assert_eq!(status["message"], "Download completed successfully!");
    assert!(status.get("workDir").is_none());

    let work_dir = h.service.store().get(&id).unwrap().work_dir.unwrap();
    assert!(work_dir.exists());

    let resp = h
        .client
        .get(h.server.url(&format!("/api/download-file/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "audio/mpeg");
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains(".mp3"));
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), payload.as_slice());

    let resp = h
        .client
        .get(h.server.url(&format!("/api/download-file/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "File not found");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.status(&id).await, json!({ "status": "not_found" }));
    assert!(!work_dir.exists());

    h.stop().await;
}

#[tokio::test]
async fn test_rejected_requests() {
    let h = start(FakeEngine::succeed("x", "y")).await;

    let resp = h
        .client
        .post(h.server.url("/api/download"))
        .json(&json!({ "url": "https://example.com/video.mp4" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "unsupported_source");
    assert!(body["error"].as_str().unwrap().starts_with("Unsupported platform"));

    let resp = h
        .client
        .post(h.server.url("/api/download"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "URL is required");
    assert_eq!(body["code"], "invalid_request");

    let resp = h
        .client
        .post(h.server.url("/api/search"))
        .json(&json!({ "query": "lofi", "type": "gif" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .client
        .post(h.server.url("/api/search"))
        .json(&json!({ "query": "lofi", "type": "best" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Search type must be video or audio");

    let resp = h
        .client
        .post(h.server.url("/api/download"))
        .json(&json!({ "url": "--exec=x.youtube.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "unsupported_source");

    let resp = h
        .client
        .post(h.server.url("/api/search"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");

    assert!(h.service.store().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_fetch_before_completion() {
    let gate = Arc::new(Notify::new());
    let h = start(FakeEngine::succeed("Slow", "Someone").with_gate(gate.clone())).await;

    let body: Value = h
        .client
        .post(h.server.url("/api/download"))
        .json(&json!({ "url": "https://youtu.be/abc123", "type": "video" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = body["downloadId"].as_str().unwrap().to_string();
    h.wait_status(&id, "downloading").await;

    let resp = h
        .client
        .get(h.server.url(&format!("/api/download-file/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "File not ready");

    let resp = h
        .client
        .get(h.server.url("/api/download-file/dl_unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    gate.notify_one();
    let status = h.wait_status(&id, "completed").await;
    assert_eq!(status["platform"], "youtube");
    h.stop().await;
}

#[tokio::test]
async fn test_search_without_results() {
    let h = start(FakeEngine::new(Script::NoResults)).await;

    let body: Value = h
        .client
        .post(h.server.url("/api/search"))
        .json(&json!({ "query": "zzzz-nothing" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["platform"], "youtube");
    let id = body["downloadId"].as_str().unwrap().to_string();

    let status = h.wait_status(&id, "failed").await;
    assert_eq!(status["message"], "No results found");
    assert_eq!(status["errorCode"], "no_results");
    assert!(status.get("filename").is_none());
    h.stop().await;
}

#[tokio::test]
async fn test_capability_endpoints() {
    let h = start(FakeEngine::succeed("x", "y")).await;

    let body: Value = h
        .client
        .get(h.server.url("/api/check-ffmpeg"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ffmpegAvailable"], false);

    let body: Value = h
        .client
        .get(h.server.url("/api/check-cookies"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["cookiesAvailable"], false);
    assert_eq!(body["message"], "No cookies file found or empty");

    let cookies = h.service.runner().config().cookies_file.clone();
    std::fs::write(&cookies, "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tx\n").unwrap();

    let body: Value = h
        .client
        .get(h.server.url("/api/system-status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ffmpegAvailable"], false);
    assert_eq!(body["ytDlpAvailable"], false);
    assert_eq!(body["cookiesAvailable"], true);
    assert_eq!(body["activeJobs"], 0);
    assert!(body["cookiesFile"].as_str().unwrap().ends_with("cookies.txt"));

    h.stop().await;
}
