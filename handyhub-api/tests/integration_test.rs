use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use handyhub_api::{app, auth::issue_token, AppState, StateOptions};
use handyhub_core::identity::hash_password;
use handyhub_core::{MemoryObjectStore, Repositories, Role, User};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const DATE: &str = "2030-01-07";

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let state = AppState::new(
            Repositories::in_memory(),
            Arc::new(MemoryObjectStore::new("http://media.test")),
            None,
            StateOptions::default(),
        );
        Self {
            router: app(state.clone()),
            state,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
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
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn sign_up(&self, email: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/auth/signup",
                None,
                Some(json!({ "email": email, "password": "secret123", "data": { "full_name": "Test" } })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        let now = Utc::now();
        let admin = User {
            id: Uuid::new_v4(),
            email: "admin@handyhub.test".to_string(),
            password_hash: hash_password("admin-pass").unwrap(),
            role: Role::Admin,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
        };
        self.state.repos.users.create_user(&admin).await.unwrap();
        issue_token(&self.state, &admin).unwrap()
    }

    /// Provider account approved with one 60-minute service
    async fn approved_provider(&self) -> (String, String, String) {
        let token = self.sign_up("plumber@handyhub.test").await;
        let (status, provider) = self
            .send(
                Method::POST,
                "/providers",
                Some(&token),
                Some(json!({ "business_name": "Quick Plumbing", "category": "Plumbing", "city": "Austin" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let provider_id = provider["id"].as_str().unwrap().to_string();

        let admin = self.admin_token().await;
        let (status, approved) = self
            .send(Method::POST, &format!("/admin/providers/{}/approve", provider_id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");

        let (status, service) = self
            .send(
                Method::POST,
                &format!("/providers/{}/services", provider_id),
                Some(&token),
                Some(json!({ "name": "Leak repair", "duration": 60, "price_cents": 5000 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", service);
        let service_id = service["id"].as_str().unwrap().to_string();

        (token, provider_id, service_id)
    }
}

fn booking_body(provider_id: &str, service_id: &str, start: &str, end: &str) -> Value {
    json!({
        "provider_id": provider_id,
        "service_id": service_id,
        "date": DATE,
        "slot": { "start": start, "end": end },
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_booking_flow_rejects_double_booking() {
    let app = TestApp::new();
    let (provider_token, provider_id, service_id) = app.approved_provider().await;
    let customer = app.sign_up("customer@handyhub.test").await;

    let slots_uri = format!("/providers/{}/services/{}/slots?date={}", provider_id, service_id, DATE);
    let (status, slots) = app.send(Method::GET, &slots_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let slots = slots["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 8);
    assert!(slots.iter().all(|s| s["is_available"] == true));
    assert_eq!(slots[0]["start"], "09:00");

    let body = booking_body(&provider_id, &service_id, "09:00", "10:00");
    let (status, booking) = app.send(Method::POST, "/bookings", Some(&customer), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", booking);
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["amount_cents"], 5000);

    let (status, err) = app.send(Method::POST, "/bookings", Some(&customer), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(err["error"].is_string());

    let (_, slots) = app.send(Method::GET, &slots_uri, None, None).await;
    assert_eq!(slots["slots"][0]["is_available"], false);
    assert_eq!(slots["slots"][1]["is_available"], true);

    // The provider hears about it
    let (status, feed) = app.send(Method::GET, "/notifications", Some(&provider_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["notifications"][0]["link"], "/provider/bookings");
    assert!(feed["unread_count"].as_u64().unwrap() >= 1);

    let (status, incoming) = app
        .send(Method::GET, "/provider/bookings?status=pending", Some(&provider_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incoming.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_anonymous_booking_is_refused() {
    let app = TestApp::new();
    let (_, provider_id, service_id) = app.approved_provider().await;

    let (status, _) = app
        .send(
            Method::POST,
            "/bookings",
            None,
            Some(booking_body(&provider_id, &service_id, "09:00", "10:00")),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::GET, "/bookings", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provider_accepts_and_completes() {
    let app = TestApp::new();
    let (provider_token, provider_id, service_id) = app.approved_provider().await;
    let customer = app.sign_up("customer@handyhub.test").await;

    let (_, booking) = app
        .send(
            Method::POST,
            "/bookings",
            Some(&customer),
            Some(booking_body(&provider_id, &service_id, "11:00", "12:00")),
        )
        .await;
    let booking_id = booking["id"].as_str().unwrap();

    // Customers cannot act on the provider side
    let (status, _) = app
        .send(Method::POST, &format!("/bookings/{}/accept", booking_id), Some(&customer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = app
        .send(Method::POST, &format!("/bookings/{}/accept", booking_id), Some(&provider_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");

    let (status, _) = app
        .send(Method::POST, &format!("/bookings/{}/reject", booking_id), Some(&provider_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, done) = app
        .send(Method::POST, &format!("/bookings/{}/complete", booking_id), Some(&provider_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let (status, rated) = app
        .send(
            Method::POST,
            &format!("/bookings/{}/rating", booking_id),
            Some(&customer),
            Some(json!({ "rating": 5, "review": "Fixed in no time" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rated["is_rated"], true);
}

#[tokio::test]
async fn test_view_toggle() {
    let app = TestApp::new();
    let (provider_token, _, _) = app.approved_provider().await;
    let customer = app.sign_up("customer@handyhub.test").await;

    let (_, caps) = app
        .send(Method::GET, "/me/capabilities?route=/provider/dashboard", Some(&provider_token), None)
        .await;
    assert_eq!(caps["can_view_as_provider"], true);
    assert_eq!(caps["active_view"], "provider");

    let (_, next) = app
        .send(Method::POST, "/me/toggle-view?route=/provider/dashboard", Some(&provider_token), None)
        .await;
    assert_eq!(next, json!({ "action": "navigate", "path": "/dashboard" }));

    let (_, next) = app
        .send(Method::POST, "/me/toggle-view?route=/dashboard", Some(&customer), None)
        .await;
    assert_eq!(next, json!({ "action": "redirect_to_application", "path": "/become-provider" }));

    let (status, next) = app.send(Method::POST, "/me/toggle-view", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next["action"], "redirect_to_sign_in");
}

#[tokio::test]
async fn test_pending_provider_is_hidden_and_admin_only_review() {
    let app = TestApp::new();
    let owner = app.sign_up("pending@handyhub.test").await;
    let stranger = app.sign_up("stranger@handyhub.test").await;

    let (_, provider) = app
        .send(
            Method::POST,
            "/providers",
            Some(&owner),
            Some(json!({ "business_name": "Sparky", "category": "electrical" })),
        )
        .await;
    let provider_id = provider["id"].as_str().unwrap();

    let (status, _) = app.send(Method::GET, &format!("/providers/{}", provider_id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(Method::GET, &format!("/providers/{}", provider_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(Method::POST, &format!("/admin/providers/{}/approve", provider_id), Some(&stranger), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = app.send(Method::GET, "/providers", None, None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_signature_unavailable_without_media_config() {
    let app = TestApp::new();
    let (token, provider_id, _) = app.approved_provider().await;

    let (status, _) = app
        .send(
            Method::POST,
            "/uploads/signature",
            Some(&token),
            Some(json!({ "provider_id": provider_id })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = TestApp::new();
    app.sign_up("session@handyhub.test").await;

    let (status, session) = app
        .send(
            Method::POST,
            "/auth/signin",
            None,
            Some(json!({ "email": "Session@HandyHub.test", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = session["access_token"].as_str().unwrap();
    assert_eq!(session["token_type"], "bearer");

    let (status, user) = app.send(Method::GET, "/auth/user", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "session@handyhub.test");
    assert!(user.get("password_hash").is_none());

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/signin",
            None,
            Some(json!({ "email": "session@handyhub.test", "password": "wrong-one" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_realtime_hides_pending_providers_from_strangers() {
    use futures_util::StreamExt;

    let app = TestApp::new();
    let watcher = app.sign_up("watcher@handyhub.test").await;

    let request = Request::builder()
        .uri("/realtime?table=providers")
        .header(header::AUTHORIZATION, format!("Bearer {}", watcher))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut frames = response.into_body().into_data_stream();

    // Pending insert, then the approval update
    let (_, provider_id, _) = app.approved_provider().await;

    let frame = tokio::time::timeout(std::time::Duration::from_secs(2), frames.next())
        .await
        .expect("an approved provider event")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains(&provider_id));
    assert!(text.contains("\"status\":\"approved\""), "{}", text);
    assert!(!text.contains("\"status\":\"pending\""), "{}", text);
}

#[tokio::test]
async fn test_realtime_rejects_foreign_booking_filter() {
    let app = TestApp::new();
    let watcher = app.sign_up("watcher@handyhub.test").await;

    let uri = format!("/realtime?table=bookings&column=user_id&value={}", Uuid::new_v4());
    let request = Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", watcher))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
