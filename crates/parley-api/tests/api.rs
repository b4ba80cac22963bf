use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::admission::{Rate, SlidingWindowLimiter, Throttles};
use parley_api::auth::{AppStateInner, create_token};
use parley_db::Database;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    db: Arc<Database>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_throttles(Throttles::unlimited())
    }

    fn with_throttles(throttles: Throttles) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state = AppStateInner::new(db.clone(), SECRET.to_string(), throttles);
        Self {
            router: parley_api::router(state),
            db,
        }
    }

    /// Create a user directly in the store and mint a token for them.
    fn user(&self, name: &str) -> (i64, String) {
        let id = self.db.create_user(name, "not-a-real-hash").unwrap();
        (id, create_token(SECRET, id, name).unwrap())
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.call_from(None, method, uri, token, body).await
    }

    /// Like `call`, from the client address given in `X-Forwarded-For`.
    async fn call_from(
        &self,
        client: Option<&str>,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(client) = client {
            builder = builder.header("x-forwarded-for", client);
        }
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send(&self, token: &str, receiver: i64, content: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/api/chat/messages",
            Some(token),
            Some(json!({ "receiver": receiver, "content": content })),
        )
        .await
    }
}

fn ids(messages: &Value) -> Vec<i64> {
    messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn send_and_poll_end_to_end() {
    let app = TestApp::new();
    let (a, a_token) = app.user("alice");
    let (b, b_token) = app.user("bob");

    let (status, first) = app.send(&a_token, b, "hi").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["sender_id"], a);
    assert_eq!(first["receiver_id"], b);
    assert_eq!(first["is_read"], false);
    let (_, second) = app.send(&a_token, b, "there").await;

    let (status, fetched) = app
        .call("GET", &format!("/api/chat/messages?user_id={a}"), Some(&b_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&fetched), vec![first["id"].as_i64().unwrap(), second["id"].as_i64().unwrap()]);
    assert!(fetched.as_array().unwrap().iter().all(|m| m["is_read"] == true));
    assert_eq!(fetched[0]["content"], "hi");

    let (_, third) = app.send(&a_token, b, "again").await;
    let cursor = second["id"].as_i64().unwrap();
    let (_, delta) = app
        .call("GET", &format!("/api/chat/messages?user_id={a}&after={cursor}"), Some(&b_token), None)
        .await;
    assert_eq!(ids(&delta), vec![third["id"].as_i64().unwrap()]);
}

#[tokio::test]
async fn blocking_forbids_both_directions() {
    let app = TestApp::new();
    let (a, a_token) = app.user("alice");
    let (b, b_token) = app.user("bob");

    let (status, body) = app
        .call("POST", "/api/chat/block", Some(&a_token), Some(json!({ "user_id": b })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "blocked": true }));

    let (status, body) = app.send(&a_token, b, "hey").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "You blocked this user.");

    let (status, body) = app.send(&b_token, a, "hey").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "This user has blocked you.");

    let (_, status_body) = app
        .call("GET", &format!("/api/chat/block/status?user_id={a}"), Some(&b_token), None)
        .await;
    assert_eq!(status_body, json!({ "blocked_by_me": false, "blocked_me": true }));

    let (status, body) = app
        .call("DELETE", &format!("/api/chat/block?user_id={b}"), Some(&a_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "blocked": false }));

    let (status, _) = app.send(&b_token, a, "hey").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn block_validation() {
    let app = TestApp::new();
    let (a, a_token) = app.user("alice");

    let (status, body) = app
        .call("POST", "/api/chat/block", Some(&a_token), Some(json!({ "user_id": a })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "You cannot block yourself.");

    let (status, _) = app
        .call("POST", "/api/chat/block", Some(&a_token), Some(json!({ "user_id": 9999 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.call("POST", "/api/chat/block", Some(&a_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "user_id is required");

    // Unblocking someone who does not exist is still a success
    let (status, _) = app.call("DELETE", "/api/chat/block?user_id=9999", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("DELETE", "/api/chat/block", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("GET", "/api/chat/block/status?user_id=9999", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_and_fetch_validation() {
    let app = TestApp::new();
    let (_, a_token) = app.user("alice");
    let (b, _) = app.user("bob");

    let (status, body) = app
        .call("POST", "/api/chat/messages", Some(&a_token), Some(json!({ "content": "hi" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "receiver is required");

    let (status, body) = app.send(&a_token, 9999, "hi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Receiver not found");

    let (status, body) = app
        .call("POST", "/api/chat/messages", Some(&a_token), Some(json!({ "receiver": b })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "content is required");

    let (status, _) = app.call("GET", "/api/chat/messages", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("GET", "/api/chat/messages?user_id=9999", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unread_summary_clears_after_fetch() {
    let app = TestApp::new();
    let (a, a_token) = app.user("alice");
    let (b, b_token) = app.user("bob");
    let (c, c_token) = app.user("carol");

    for _ in 0..3 {
        app.send(&b_token, a, "ping").await;
    }
    app.send(&c_token, a, "hello").await;

    let (status, summary) = app.call("GET", "/api/chat/unread", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        summary,
        json!([{ "user_id": b, "count": 3 }, { "user_id": c, "count": 1 }])
    );

    app.call("GET", &format!("/api/chat/messages?user_id={b}"), Some(&a_token), None).await;
    app.call("GET", &format!("/api/chat/messages?user_id={c}"), Some(&a_token), None).await;

    let (_, summary) = app.call("GET", "/api/chat/unread", Some(&a_token), None).await;
    assert_eq!(summary, json!([]));
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let app = TestApp::new();
    let (b, _) = app.user("bob");

    let (status, _) = app.call("GET", "/api/chat/unread", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = create_token("some-other-secret", b, "bob").unwrap();
    let (status, _) = app.send(&forged, b, "hi").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.db.list_conversation(b, b).unwrap().is_empty());
}

#[tokio::test]
async fn sends_are_throttled_but_reads_are_not() {
    let app = TestApp::with_throttles(Throttles {
        send: Arc::new(SlidingWindowLimiter::<i64>::new("2/min".parse::<Rate>().unwrap())),
        ..Throttles::unlimited()
    });
    let (a, a_token) = app.user("alice");
    let (b, _) = app.user("bob");

    assert_eq!(app.send(&a_token, b, "one").await.0, StatusCode::CREATED);
    assert_eq!(app.send(&a_token, b, "two").await.0, StatusCode::CREATED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat/messages")
        .header(header::AUTHORIZATION, format!("Bearer {a_token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "receiver": b, "content": "three" }).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    assert_eq!(app.db.list_conversation(a, b).unwrap().len(), 2);

    for _ in 0..5 {
        let (status, _) = app
            .call("GET", &format!("/api/chat/messages?user_id={b}"), Some(&a_token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn register_login_me() {
    let app = TestApp::new();

    let (status, registered) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "dora", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "dora", "password": "another one" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "dora", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "dora", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["user_id"], registered["user_id"]);

    let token = login["token"].as_str().unwrap();
    let (status, me) = app.call("GET", "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "dora");
    assert_eq!(me["id"], registered["user_id"]);
    assert!(me["created_at"].is_string());
    assert!(me.get("password").is_none());
}

#[tokio::test]
async fn malformed_bodies_and_queries_are_validation_errors() {
    let app = TestApp::new();
    let (_, a_token) = app.user("alice");
    let (b, _) = app.user("bob");

    for body in [
        json!({ "receiver": "abc", "content": "hi" }),
        json!({ "receiver": b, "content": 5 }),
    ] {
        let (status, reply) = app.call("POST", "/api/chat/messages", Some(&a_token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["detail"].is_string());
    }

    let (status, reply) = app
        .call("POST", "/api/chat/block", Some(&a_token), Some(json!({ "user_id": [1] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["detail"].is_string());

    let (status, reply) = app
        .call("GET", "/api/chat/messages?user_id=bob", Some(&a_token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["detail"].is_string());

    let (status, reply) = app
        .call("GET", &format!("/api/chat/messages?user_id={b}&after=latest"), Some(&a_token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["detail"].is_string());
}

#[tokio::test]
async fn unknown_fields_are_ignored() {
    let app = TestApp::new();
    let (_, a_token) = app.user("alice");
    let (b, _) = app.user("bob");

    let (status, message) = app
        .call(
            "POST",
            "/api/chat/messages",
            Some(&a_token),
            Some(json!({ "receiver": b, "content": "hi", "extra": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "hi");
}

#[tokio::test]
async fn zero_ids_count_as_missing() {
    let app = TestApp::new();
    let (_, a_token) = app.user("alice");

    let (status, reply) = app
        .call("POST", "/api/chat/messages", Some(&a_token), Some(json!({ "receiver": 0, "content": "hi" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["detail"], "receiver is required");

    let (status, reply) = app
        .call("POST", "/api/chat/block", Some(&a_token), Some(json!({ "user_id": 0 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["detail"], "user_id is required");
}

#[tokio::test]
async fn login_and_register_are_throttled_per_client() {
    let app = TestApp::with_throttles(Throttles {
        login: Arc::new(SlidingWindowLimiter::<IpAddr>::new("2/min".parse::<Rate>().unwrap())),
        register: Arc::new(SlidingWindowLimiter::<IpAddr>::new("1/min".parse::<Rate>().unwrap())),
        ..Throttles::unlimited()
    });
    let nobody = json!({ "username": "nobody", "password": "whatever1" });

    for _ in 0..2 {
        let (status, _) = app
            .call_from(Some("10.0.0.1"), "POST", "/api/auth/login", None, Some(nobody.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, reply) = app
        .call_from(Some("10.0.0.1"), "POST", "/api/auth/login", None, Some(nobody.clone()))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(reply["detail"].is_string());

    // Another client has its own budget
    let (status, _) = app
        .call_from(Some("10.0.0.2"), "POST", "/api/auth/login", None, Some(nobody.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Rejected attempts still count against the register budget
    let short = json!({ "username": "x", "password": "short" });
    let (status, _) = app
        .call_from(Some("10.0.0.1"), "POST", "/api/auth/register", None, Some(short.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .call_from(Some("10.0.0.1"), "POST", "/api/auth/register", None, Some(short))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
