use std::{convert::Infallible, sync::Arc};

use super::middleware::{validate_request_signature, SignatureKey};
use crate::error::AppError;
use crate::middleware::allowed_ips;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{post, MethodRouter},
    Json, Router,
};
use ipnet::IpNet;
use pushlink::{store::TeamId, CommitLinkResult, LinkingEngine, PushEvent, WebhookResult};
use serde::Serialize;

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

#[derive(Serialize)]
struct Pong {
    message: &'static str,
    status: &'static str,
}

const PONG: Pong = Pong {
    message: "pong",
    status: "Webhook configured successfully",
};

#[derive(Serialize)]
struct Ignored<'a> {
    message: &'static str,
    event: Option<&'a str>,
}

#[derive(Serialize)]
struct Rejected {
    success: bool,
    error: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    pub team_id: Option<TeamId>,
    pub team_name: Option<String>,
    pub linked: usize,
    pub skipped: usize,
    pub commits: Vec<CommitLinkResult>,
}

impl From<WebhookResult> for WebhookResponse {
    fn from(result: WebhookResult) -> Self {
        Self {
            success: true,
            linked: result.linked_count(),
            skipped: result.skipped_count(),
            team_id: result.team_id,
            team_name: result.team_name,
            commits: result.commits,
        }
    }
}

fn respond(result: WebhookResult) -> Response {
    match result.error {
        Some(error) => (
            StatusCode::BAD_REQUEST,
            Json(Rejected {
                success: false,
                error,
            }),
        )
            .into_response(),
        None => Json(WebhookResponse::from(result)).into_response(),
    }
}

async fn process(engine: &LinkingEngine, body: &[u8]) -> Result<Response, AppError> {
    let event = PushEvent::parse(body)?;
    tracing::info!(
        "Received push to {}/{} with {} commit(s)",
        event.repository.full_name,
        event.branch_name(),
        event.commits.len()
    );
    Ok(respond(engine.process(&event).await?))
}

#[tracing::instrument(
    skip_all,
    fields(event = ?headers.get(EVENT_HEADER), delivery = ?headers.get(DELIVERY_HEADER)),
    err
)]
async fn webhook(
    State(engine): State<Arc<LinkingEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let event = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    match event {
        Some("push") => process(&engine, &body).await,
        Some("ping") => Ok(Json(PONG).into_response()),
        event => {
            tracing::info!("Ignoring non-push event: {event:?}");
            Ok(Json(Ignored {
                message: "Event ignored",
                event,
            })
            .into_response())
        }
    }
}

async fn ping() -> Json<Pong> {
    Json(PONG)
}

/// Replays a push payload without a signature. Debugging aid, IP-restricted.
#[tracing::instrument(skip_all, err)]
async fn sync(State(engine): State<Arc<LinkingEngine>>, body: Bytes) -> Result<Response, AppError> {
    tracing::info!("Manual sync triggered");
    process(&engine, &body).await
}

pub fn handler(key: SignatureKey) -> MethodRouter<Arc<LinkingEngine>, Infallible> {
    post(webhook).route_layer(middleware::from_fn_with_state(
        key,
        validate_request_signature,
    ))
}

pub fn router(
    engine: Arc<LinkingEngine>,
    key: SignatureKey,
    sync_allowed: Option<Vec<IpNet>>,
) -> Router {
    let body_limit = DefaultBodyLimit::max(key.max_body_bytes);
    let mut router = Router::new()
        .route("/api/webhook/github", handler(key))
        .route("/api/webhook/github/ping", post(ping));
    if let Some(allowed) = sync_allowed {
        router = router.route(
            "/api/webhook/github/sync",
            post(sync).route_layer(middleware::from_fn_with_state(allowed, allowed_ips)),
        );
    }
    router.layer(body_limit).with_state(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::middleware::SIGNATURE_HEADER;
    use axum::{
        body::{self, Body},
        extract::connect_info::MockConnectInfo,
        http::{Method, Request},
    };
    use pushlink::{memory::MemoryStore, store::Task};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const SECRET: &str = "It's a Secret to Everybody";

    fn push_body() -> String {
        json!({
            "ref": "refs/heads/feature/TASK-42-login",
            "before": "0000000000000000000000000000000000000000",
            "after": "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678",
            "repository": {
                "id": 1,
                "name": "board",
                "full_name": "octo/board",
                "html_url": "https://github.com/octo/board",
                "clone_url": "https://github.com/octo/board.git",
            },
            "pusher": {"name": "octocat", "email": "octocat@example.com"},
            "commits": [
                {
                    "id": "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678",
                    "message": "feat: login form",
                    "timestamp": "2024-03-01T12:30:00Z",
                    "url": "https://github.com/octo/board/commit/a1b2c3d",
                    "author": {"name": "Octo Cat", "email": "octocat@example.com", "username": "octocat"},
                },
                {
                    "id": "b1b2c3d4e5f60718293a4b5c6d7e8f9012345678",
                    "message": "docs: readme #404",
                    "timestamp": "2024-03-01T12:31:00Z",
                    "url": "https://github.com/octo/board/commit/b1b2c3d",
                    "author": {"name": "Octo Cat", "email": "octocat@example.com", "username": "octocat"},
                },
            ],
        })
        .to_string()
    }

    fn store(repo_url: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.add_team(7, "Board", repo_url);
        store.add_task(
            Task {
                id: 42,
                title: "Login form".into(),
                team_id: 7,
                created_by: Some(9),
            },
            [1],
        );
        store
    }

    fn app(store: Arc<MemoryStore>, secret: Option<&str>, sync: Option<Vec<IpNet>>) -> Router {
        let key = SignatureKey {
            secret: secret.map(|s| SecretString::from(s.to_owned())),
            max_body_bytes: 1024 * 1024,
        };
        router(Arc::new(LinkingEngine::with_store(store)), key, sync)
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4242))))
    }

    fn request(uri: &str, event: &str, body: String, sign: bool) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(EVENT_HEADER, event)
            .header(DELIVERY_HEADER, "72d3162e-cc78-11e3-81ab-4c9367dc0958");
        if sign {
            let signature =
                pushlink::signature::sign(body.as_bytes(), &SecretString::from(SECRET.to_owned()));
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(request).await.unwrap();
        let status = res.status();
        let body = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn push_links_commits() {
        let store = store("https://github.com/octo/board");
        let (status, body) = send(
            app(store.clone(), Some(SECRET), None),
            request("/api/webhook/github", "push", push_body(), true),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["teamId"], 7);
        assert_eq!(body["teamName"], "Board");
        assert_eq!(body["linked"], 2);
        assert_eq!(body["skipped"], 0);
        assert_eq!(body["commits"][0]["linkedTaskIds"], json!([42]));
        assert_eq!(body["commits"][0]["source"], "branch");
        assert_eq!(body["commits"][1]["source"], "both");
        assert_eq!(body["commits"][1]["linkedTaskIds"], json!([42]));
        assert_eq!(store.links().len(), 2);
        assert_eq!(store.notices().len(), 4);
    }

    #[tokio::test]
    async fn replayed_push_skips() {
        let store = store("https://github.com/octo/board");
        let app = app(store.clone(), None, None);
        send(app.clone(), request("/api/webhook/github", "push", push_body(), false)).await;

        let (status, body) = send(app, request("/api/webhook/github", "push", push_body(), false)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["linked"], 0);
        assert_eq!(body["skipped"], 2);
        assert_eq!(store.links().len(), 2);
    }

    #[tokio::test]
    async fn unsigned_push_rejected() {
        let store = store("https://github.com/octo/board");
        let (status, body) = send(
            app(store.clone(), Some(SECRET), None),
            request("/api/webhook/github", "push", push_body(), false),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid signature");
        assert!(store.links().is_empty());
    }

    #[tokio::test]
    async fn tampered_body_rejected() {
        let mut request = request("/api/webhook/github", "push", push_body(), true);
        *request.body_mut() = Body::from(push_body().replace("TASK-42", "TASK-43"));
        let (status, _) = send(
            app(store("https://github.com/octo/board"), Some(SECRET), None),
            request,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_repository() {
        let store = store("https://github.com/octo/elsewhere");
        let (status, body) = send(
            app(store.clone(), None, None),
            request("/api/webhook/github", "push", push_body(), false),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("https://github.com/octo/board"));
        assert!(store.links().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload() {
        let (status, body) = send(
            app(store("https://github.com/octo/board"), None, None),
            request("/api/webhook/github", "push", "{\"ref\": 1".into(), false),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid payload format");
    }

    #[tokio::test]
    async fn ping_event() {
        let body = json!({"zen": "Keep it logically awesome.", "hook_id": 1}).to_string();
        let (status, body) = send(
            app(store("https://github.com/octo/board"), Some(SECRET), None),
            request("/api/webhook/github", "ping", body, true),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"message": "pong", "status": "Webhook configured successfully"})
        );
    }

    #[tokio::test]
    async fn ping_route() {
        let (status, body) = send(
            app(store("https://github.com/octo/board"), Some(SECRET), None),
            request("/api/webhook/github/ping", "ping", String::new(), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "pong");
    }

    #[tokio::test]
    async fn other_events_ignored() {
        let store = store("https://github.com/octo/board");
        let (status, body) = send(
            app(store.clone(), None, None),
            request("/api/webhook/github", "issues", push_body(), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Event ignored", "event": "issues"}));
        assert!(store.links().is_empty());
    }

    #[tokio::test]
    async fn zero_commits() {
        let body = json!({
            "ref": "refs/heads/main",
            "repository": {"html_url": "https://github.com/octo/board"},
            "commits": [],
        })
        .to_string();
        let (status, body) = send(
            app(store("https://github.com/octo/board"), None, None),
            request("/api/webhook/github", "push", body, false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["teamId"], Value::Null);
        assert_eq!(body["commits"], json!([]));
    }

    #[tokio::test]
    async fn body_limit_without_secret() {
        let key = SignatureKey {
            secret: None,
            max_body_bytes: 1024,
        };
        let app = router(
            Arc::new(LinkingEngine::with_store(store("https://github.com/octo/board"))),
            key,
            Some(vec!["127.0.0.0/8".parse().unwrap()]),
        )
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4242))));
        let body = push_body().replace("feat: login form", &"x".repeat(4096));

        for uri in ["/api/webhook/github", "/api/webhook/github/sync"] {
            let res = app
                .clone()
                .oneshot(request(uri, "push", body.clone(), false))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE, "{uri}");
        }
    }

    #[tokio::test]
    async fn unsigned_deliveries_rejected_before_dispatch() {
        for (event, body) in [("ping", json!({"zen": "Design for failure."})), ("issues", json!({}))] {
            let (status, body) = send(
                app(store("https://github.com/octo/board"), Some(SECRET), None),
                request("/api/webhook/github", event, body.to_string(), false),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{event}");
            assert_eq!(body["error"], "Invalid signature");
        }
    }

    #[tokio::test]
    async fn manual_sync() {
        let store = store("https://github.com/octo/board");

        let res = app(store.clone(), Some(SECRET), None)
            .oneshot(request("/api/webhook/github/sync", "push", push_body(), false))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let (status, _) = send(
            app(store.clone(), Some(SECRET), Some(vec!["10.0.0.0/8".parse().unwrap()])),
            request("/api/webhook/github/sync", "push", push_body(), false),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            app(store.clone(), Some(SECRET), Some(vec!["127.0.0.0/8".parse().unwrap()])),
            request("/api/webhook/github/sync", "push", push_body(), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["linked"], 2);
    }
}
