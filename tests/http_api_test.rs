//! HTTP API over a real listener.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use common::{large_model, small_model, Harness, ScriptedProvider};
use reembed::adapters::http::MigrationHttpServer;
use reembed::domain::models::{MigrationStatus, ServerConfig};

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(harness: &Harness) -> Self {
        let service = Arc::new(harness.service(large_model()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = MigrationHttpServer::new(service, ServerConfig::default());
        tokio::spawn(async move {
            server
                .serve_on(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            shutdown: Some(tx),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn migration_body() -> Value {
    json!({
        "source": small_model(),
        "target": large_model(),
        "strategy": "replace",
        "scope": "all"
    })
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new(ScriptedProvider::new(), 50).await;
    let server = TestServer::start(&harness).await;

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_recommendation_and_model_switch() {
    let harness = Harness::new(ScriptedProvider::new(), 50).await;
    harness
        .seed(&small_model(), 100, Utc::now() - Duration::days(2))
        .await;
    let server = TestServer::start(&harness).await;

    let (status, body) = server.get("/api/v1/embedding/recommendation").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_migration"], true);
    assert_eq!(body["reason"], "model_changed");
    assert_eq!(
        body["previous_model"]["identity"]["model_name"],
        "text-embedding-3-small"
    );
    assert!(body.get("error").is_none());

    let (status, body) = server
        .get("/api/v1/embedding/recommendation?model_name=text-embedding-3-small&provider=openai")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "up_to_date");

    let (status, body) = server
        .get("/api/v1/embedding/recommendation?model_name=text-embedding-3-small")
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_failed");

    let (status, body) = server
        .put("/api/v1/embedding/model", json!(small_model()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_migration"], false);
    assert_eq!(body["new_model"]["embedding_count"], 100);

    let (_, body) = server.get("/api/v1/embedding/recommendation").await;
    assert_eq!(body["reason"], "up_to_date");

    let (status, body) = server
        .put(
            "/api/v1/embedding/model",
            json!({"model_name": "", "provider": "openai"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_failed");
}

#[tokio::test]
async fn test_migration_lifecycle_over_http() {
    let harness = Harness::new(ScriptedProvider::pausing_on_call(1), 50).await;
    harness
        .seed(&small_model(), 100, Utc::now() - Duration::days(2))
        .await;
    let server = TestServer::start(&harness).await;

    let (status, body) = server
        .post("/api/v1/embedding/migrations", migration_body())
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["task"]["status"], "running");
    assert_eq!(body["task"]["total_count"], 100);
    let task_id = body["task_id"].as_str().unwrap().to_string();
    harness.provider.reached.notified().await;

    let (status, body) = server
        .post("/api/v1/embedding/migrations", migration_body())
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
    assert!(body["error"].as_str().unwrap().contains(&task_id));

    let (status, body) = server
        .get(&format!("/api/v1/embedding/migrations/{task_id}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["progress"], 0.0);

    let (status, body) = server
        .post(
            &format!("/api/v1/embedding/migrations/{task_id}/cancel"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancel_requested"], true);

    harness.provider.release.notify_one();
    let finished = harness.wait(task_id.parse().unwrap()).await;
    assert_eq!(finished.status, MigrationStatus::Cancelled);
    assert_eq!(finished.completed_count, 50);

    let (_, body) = server
        .get(&format!("/api/v1/embedding/migrations/{task_id}"))
        .await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["progress"], 0.5);

    let (status, body) = server
        .post(
            &format!("/api/v1/embedding/migrations/{task_id}/cancel"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");

    let (status, body) = server
        .get("/api/v1/embedding/migrations?status=cancelled")
        .await;
    assert_eq!(status, StatusCode::OK);
    let tasks = body.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], task_id.as_str());

    let (_, body) = server
        .get("/api/v1/embedding/migrations?status=running")
        .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_errors() {
    let harness = Harness::new(ScriptedProvider::new(), 50).await;
    let server = TestServer::start(&harness).await;

    let (status, body) = server
        .get(&format!(
            "/api/v1/embedding/migrations/{}",
            uuid::Uuid::new_v4()
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = server.get("/api/v1/embedding/migrations/not-a-uuid").await;
    assert!(status.is_client_error());

    let (status, body) = server
        .get("/api/v1/embedding/migrations?status=paused")
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_failed");

    let (status, body) = server
        .post(
            "/api/v1/embedding/migrations",
            json!({
                "source": small_model(),
                "target": large_model(),
                "scope": "subset"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_scope");

    let (status, body) = server
        .post(
            "/api/v1/embedding/migrations",
            json!({ "source": large_model(), "target": large_model() }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_failed");
}

#[tokio::test]
async fn test_untracked_source_completes_immediately() {
    let harness = Harness::new(ScriptedProvider::new(), 50).await;
    let server = TestServer::start(&harness).await;

    let (status, body) = server
        .post(
            "/api/v1/embedding/migrations",
            json!({ "source": null, "target": large_model() }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["task"]["total_count"], 0);

    let task_id = body["task_id"].as_str().unwrap();
    let finished = harness.wait(task_id.parse().unwrap()).await;
    assert_eq!(finished.status, MigrationStatus::Completed);
    assert_eq!(harness.provider.calls(), 0);
}
