use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use schedule_cell::handlers::ScheduleState;
use schedule_cell::router::schedule_routes;
use schedule_cell::store::MemoryScheduleStore;
use shared_utils::clock::{ClinicClock, FixedClock};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    app: Router,
    jwt_secret: String,
}

impl TestApp {
    fn token(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.jwt_secret, Some(1))
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = if bytes.is_empty() {
            json!({})
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

fn create_test_app() -> TestApp {
    let config = TestConfig::default();
    let clock = ClinicClock::new(
        Arc::new(FixedClock::new("2025-11-10T09:00:00Z".parse().unwrap())),
        0,
    );

    let state = ScheduleState {
        config: config.to_arc(),
        store: Arc::new(MemoryScheduleStore::new()),
        clock,
    };

    TestApp {
        app: schedule_routes(state),
        jwt_secret: config.jwt_secret,
    }
}

fn post_json(uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn schedule_body(doctor_id: Uuid) -> Value {
    json!({
        "doctor_id": doctor_id,
        "date": "2025-11-20",
        "shift": "morning"
    })
}

#[tokio::test]
async fn test_admin_creates_a_schedule() {
    let test_app = create_test_app();
    let admin = TestUser::admin("admin@example.com");
    let token = test_app.token(&admin);
    let doctor_id = Uuid::new_v4();

    let (status, body) = test_app.send(post_json("/", &token, &schedule_body(doctor_id))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["shift"], json!("morning"));
    assert_eq!(body["schedule"]["doctor_id"], json!(doctor_id));
}

#[tokio::test]
async fn test_non_admins_cannot_manage_schedules() {
    let test_app = create_test_app();
    let doctor = TestUser::doctor("doctor@example.com");
    let token = test_app.token(&doctor);

    let (status, _) = test_app.send(post_json("/", &token, &schedule_body(doctor.id))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_schedule_returns_409() {
    let test_app = create_test_app();
    let admin = TestUser::admin("admin@example.com");
    let token = test_app.token(&admin);
    let doctor_id = Uuid::new_v4();

    let (status, _) = test_app.send(post_json("/", &token, &schedule_body(doctor_id))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = test_app.send(post_json("/", &token, &schedule_body(doctor_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_past_date_returns_400() {
    let test_app = create_test_app();
    let admin = TestUser::admin("admin@example.com");
    let token = test_app.token(&admin);

    let body = json!({
        "doctor_id": Uuid::new_v4(),
        "date": "2025-11-01",
        "shift": "morning"
    });

    let (status, _) = test_app.send(post_json("/", &token, &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_any_authenticated_role_can_read_schedules() {
    let test_app = create_test_app();
    let admin = TestUser::admin("admin@example.com");
    let patient = TestUser::patient("patient@example.com");
    let doctor_id = Uuid::new_v4();

    test_app
        .send(post_json("/", &test_app.token(&admin), &schedule_body(doctor_id)))
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(format!("/doctors/{}/2025-11-20", doctor_id))
        .header("Authorization", format!("Bearer {}", test_app.token(&patient)))
        .body(Body::empty())
        .unwrap();
    let (status, body) = test_app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["date"], json!("2025-11-20"));

    let request = Request::builder()
        .method("GET")
        .uri(format!("/doctors/{}/2025-12-01", doctor_id))
        .header("Authorization", format!("Bearer {}", test_app.token(&patient)))
        .body(Body::empty())
        .unwrap();
    let (status, _) = test_app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
