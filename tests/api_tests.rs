/// End-to-end tests driving the router in-process
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use evalap::{
    account::CreateAccountRequest,
    admin::{Administrator, RegionAssignment, Role},
    clock::{Clock, ManualClock},
    config::ServerConfig,
    db,
    guard::MemoryAttemptStore,
    server::build_router,
    AppContext,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const PASSWORD: &str = "correct horse battery";
const DEFAULT_IP: &str = "198.51.100.1";

struct TestApp {
    ctx: AppContext,
    router: Router,
    clock: ManualClock,
}

impl TestApp {
    async fn new() -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(MemoryAttemptStore::new(shared_clock.clone()));
        let pool = db::memory_pool().await.unwrap();

        let ctx = AppContext::with_components(ServerConfig::for_tests(), pool, store, shared_clock);
        let router = build_router(ctx.clone());

        Self { ctx, router, clock }
    }

    async fn with_period(deadline_day: u32) -> Self {
        let app = Self::new().await;
        let deadline = Utc.with_ymd_and_hms(2025, 3, deadline_day, 0, 0, 0).unwrap();
        app.ctx
            .period_manager
            .set_active(2025, deadline, 1, app.clock.now())
            .await
            .unwrap();
        app
    }

    async fn account(&self, email: &str, role: Role, region: RegionAssignment) -> Administrator {
        let request = CreateAccountRequest {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            password: PASSWORD.to_string(),
            role,
            organization_id: None,
            organization_level_id: None,
            region,
        };
        self.ctx.account_manager.create_account(None, &request).await.unwrap()
    }

    async fn token(&self, account: &Administrator) -> String {
        self.ctx
            .account_manager
            .create_session(account.id)
            .await
            .unwrap()
            .access_token
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request_from(DEFAULT_IP, method, uri, token, body).await
    }

    async fn request_from(
        &self,
        ip: &str,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", ip);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn login(&self, ip: &str, email: &str, password: &str) -> (StatusCode, Value) {
        self.request_from(
            ip,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }
}

fn region(region: i64, district: Option<i64>, village: Option<i64>) -> RegionAssignment {
    RegionAssignment {
        origin_region_id: Some(region),
        origin_district_id: district,
        origin_village_id: village,
    }
}

fn evaluation_body(name: &str) -> Value {
    json!({
        "organization_name": name,
        "organization_level": "Desa",
        "answers": [
            { "question_key": "q1", "value": 1.0 },
            { "question_key": "q2", "value": 0.5, "note": "Sebagian" }
        ]
    })
}

fn report_body(name: &str) -> Value {
    json!({
        "organization_name": name,
        "organization_level": "Desa",
        "sections": [
            { "section_key": "summary", "title": "Ringkasan", "content": "Kegiatan berjalan baik." }
        ]
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_unknown_route_and_missing_token() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, body) = app.request(Method::GET, "/api/evaluations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationRequired");
}

#[tokio::test]
async fn test_malformed_login_is_validation_error() {
    let app = TestApp::new().await;

    let (status, body) = app.login(DEFAULT_IP, "not-an-email", "x").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "ValidationFailed");

    let (status, _) = app
        .request(Method::POST, "/api/auth/login", None, Some(json!({ "email": "a@b.id" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_query_and_path_are_validation_errors() {
    let app = TestApp::new().await;
    let admin = app
        .account("prov@example.go.id", Role::ProvinceAdmin, RegionAssignment::default())
        .await;
    let token = app.token(&admin).await;

    let (status, body) = app
        .request(Method::GET, "/api/evaluations?status=bogus", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "ValidationFailed");

    let (status, body) = app
        .request(Method::GET, "/api/reports?page=first", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "ValidationFailed");

    let (status, body) = app.request(Method::GET, "/api/evaluations/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "ValidationFailed");

    let (status, _) = app
        .request(Method::GET, "/api/evaluations?status=verified", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_blank_organization_name_is_rejected() {
    let app = TestApp::new().await;
    let admin = app
        .account("prov@example.go.id", Role::ProvinceAdmin, RegionAssignment::default())
        .await;
    let token = app.token(&admin).await;

    let mut body = report_body("   ");
    body["report_year"] = json!(2025);
    let (status, body) = app.request(Method::POST, "/api/reports", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "ValidationFailed");
}

#[tokio::test]
async fn test_login_lockout_flow() {
    let app = TestApp::new().await;
    app.account("camat@example.go.id", Role::DistrictAdmin, region(3, Some(7), None))
        .await;
    let ip = "203.0.113.5";

    let (status, body) = app.login(ip, "camat@example.go.id", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "unauthorized");
    assert_eq!(body["remaining_attempts"], 2);

    let (status, body) = app.login(ip, "camat@example.go.id", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["remaining_attempts"], 1);

    let (status, body) = app.login(ip, "camat@example.go.id", "wrong").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "blocked");
    assert_eq!(body["context"]["retry_after_seconds"], 1800);
    assert!(body["message"].as_str().is_some());

    // Correct credentials do not get past an active block
    app.clock.advance(Duration::seconds(600));
    let (status, body) = app.login(ip, "camat@example.go.id", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["context"]["retry_after_seconds"], 1200);

    // The block answers before the body is parsed
    let (status, body) = app
        .request_from(ip, Method::POST, "/api/auth/login", None, Some(json!({ "email": 42 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "blocked");

    // Other addresses are unaffected
    let (status, _) = app.login("203.0.113.9", "camat@example.go.id", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    app.clock.advance(Duration::seconds(1201));
    let (status, body) = app.login(ip, "camat@example.go.id", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["account"]["role"], "district_admin");

    let token = body["access_token"].as_str().unwrap().to_string();
    let (status, me) = app.request(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "camat@example.go.id");

    let (status, _) = app.request(Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.request(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_district_visibility_and_dashboard() {
    let app = TestApp::with_period(10).await;
    let d7 = app
        .account("d7@example.go.id", Role::DistrictAdmin, region(3, Some(7), None))
        .await;
    let d8 = app
        .account("d8@example.go.id", Role::DistrictAdmin, region(3, Some(8), None))
        .await;
    let regency = app
        .account("kab@example.go.id", Role::RegencyAdmin, region(3, None, None))
        .await;
    let (t7, t8, tr) = (app.token(&d7).await, app.token(&d8).await, app.token(&regency).await);

    let (status, e7) = app
        .request(Method::POST, "/api/evaluations", Some(&t7), Some(evaluation_body("Desa Sukamaju")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(e7["origin_district_id"], 7);
    assert_eq!(e7["status"], "pending");
    assert_eq!(e7["answers"].as_array().unwrap().len(), 2);

    let (status, e8) = app
        .request(Method::POST, "/api/evaluations", Some(&t8), Some(evaluation_body("Desa Mekarsari")))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .request(Method::POST, "/api/reports", Some(&t7), Some(report_body("Desa Sukamaju")))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, list) = app.request(Method::GET, "/api/evaluations", Some(&t7), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["id"], e7["id"]);

    let (status, body) = app
        .request(Method::GET, &format!("/api/evaluations/{}", e8["id"]), Some(&t7), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (_, list) = app.request(Method::GET, "/api/evaluations", Some(&tr), None).await;
    assert_eq!(list["total"], 2);

    let (status, dashboard) = app
        .request(Method::GET, "/api/dashboard?report_year=2025", Some(&t7), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["evaluations"]["total"], 1);
    assert!(dashboard.get("reports").is_none());

    let (_, dashboard) = app.request(Method::GET, "/api/dashboard", Some(&tr), None).await;
    assert_eq!(dashboard["evaluations"]["total"], 2);
    assert_eq!(dashboard["reports"]["total"], 1);
}

#[tokio::test]
async fn test_status_transitions_and_history() {
    let app = TestApp::with_period(10).await;
    let village = app
        .account("desa@example.go.id", Role::VillageAdmin, region(3, Some(7), Some(70)))
        .await;
    let regency = app
        .account("kab@example.go.id", Role::RegencyAdmin, region(3, None, None))
        .await;
    let outsider = app
        .account("lain@example.go.id", Role::RegencyAdmin, region(4, None, None))
        .await;
    let (tv, tr, to) = (
        app.token(&village).await,
        app.token(&regency).await,
        app.token(&outsider).await,
    );

    let (_, report) = app
        .request(Method::POST, "/api/reports", Some(&tv), Some(report_body("Desa Sukamaju")))
        .await;
    let id = report["id"].as_i64().unwrap();
    let status_uri = format!("/api/reports/{}/status", id);

    let (status, body) = app
        .request(Method::POST, &status_uri, Some(&tr), Some(json!({ "status": "verified" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "verified");
    assert_eq!(body["verified_by"], regency.id);

    let (status, body) = app
        .request(
            Method::POST,
            &status_uri,
            Some(&tr),
            Some(json!({ "status": "rejected", "remark": "Lampiran kurang" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let (_, body) = app
        .request(Method::POST, &status_uri, Some(&tr), Some(json!({ "status": "pending" })))
        .await;
    assert_eq!(body["status"], "pending");
    assert!(body["verified_by"].is_null());
    assert!(body["verified_at"].is_null());

    let (status, _) = app
        .request(Method::POST, &status_uri, Some(&tr), Some(json!({ "status": "archived" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .request(Method::POST, &status_uri, Some(&to), Some(json!({ "status": "verified" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, history) = app
        .request(Method::GET, &format!("/api/reports/{}/history", id), Some(&tr), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 4);
    assert!(entries[0]["previous_status"].is_null());
    assert_eq!(entries[0]["new_status"], "pending");
    assert_eq!(entries[1]["new_status"], "verified");
    assert_eq!(entries[2]["remark"], "Lampiran kurang");
    assert_eq!(entries[3]["previous_status"], "rejected");
    assert_eq!(entries[3]["new_status"], "pending");

    let (_, current) = app
        .request(Method::GET, &format!("/api/reports/{}", id), Some(&tv), None)
        .await;
    assert_eq!(current["status"], entries[3]["new_status"]);
    assert_eq!(current["sections"][0]["section_key"], "summary");
}

#[tokio::test]
async fn test_delete_removes_children_and_log() {
    let app = TestApp::with_period(10).await;
    let regency = app
        .account("kab@example.go.id", Role::RegencyAdmin, region(3, None, None))
        .await;
    let token = app.token(&regency).await;

    let (_, evaluation) = app
        .request(Method::POST, "/api/evaluations", Some(&token), Some(evaluation_body("Desa Sukamaju")))
        .await;
    let id = evaluation["id"].as_i64().unwrap();
    app.request(
        Method::POST,
        &format!("/api/evaluations/{}/status", id),
        Some(&token),
        Some(json!({ "status": "verified" })),
    )
    .await;

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/evaluations/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(Method::GET, &format!("/api/evaluations/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let logs: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM submission_status_logs WHERE submission_type = 'evaluation' AND submission_id = ?",
    )
    .bind(id)
    .fetch_one(&app.ctx.db)
    .await
    .unwrap();
    assert_eq!(logs, 0);

    let answers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evaluation_answers WHERE evaluation_id = ?")
        .bind(id)
        .fetch_one(&app.ctx.db)
        .await
        .unwrap();
    assert_eq!(answers, 0);
}

#[tokio::test]
async fn test_lateness_is_fixed_at_submission() {
    let app = TestApp::with_period(2).await;
    let village = app
        .account("desa@example.go.id", Role::VillageAdmin, region(3, Some(7), Some(70)))
        .await;
    let token = app.token(&village).await;

    let (_, on_time) = app
        .request(Method::POST, "/api/evaluations", Some(&token), Some(evaluation_body("Desa A")))
        .await;
    assert_eq!(on_time["is_late"], false);
    assert_eq!(on_time["report_year"], 2025);

    app.clock.advance(Duration::days(2));
    let (_, late) = app
        .request(Method::POST, "/api/evaluations", Some(&token), Some(evaluation_body("Desa B")))
        .await;
    assert_eq!(late["is_late"], true);

    // Moving the deadline later does not relabel stored submissions
    let later = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
    app.ctx
        .period_manager
        .set_active(2025, later, village.id, app.clock.now())
        .await
        .unwrap();

    let (_, reread) = app
        .request(Method::GET, &format!("/api/evaluations/{}", late["id"]), Some(&token), None)
        .await;
    assert_eq!(reread["is_late"], true);
}

#[tokio::test]
async fn test_reporting_period_requires_province_admin() {
    let app = TestApp::new().await;
    let regency = app
        .account("kab@example.go.id", Role::RegencyAdmin, region(3, None, None))
        .await;
    let province = app
        .account("prov@example.go.id", Role::ProvinceAdmin, RegionAssignment::default())
        .await;
    let (tr, tp) = (app.token(&regency).await, app.token(&province).await);
    let body = json!({ "report_year": 2025, "deadline": "2025-06-30T23:59:59Z" });

    let (status, _) = app
        .request(Method::GET, "/api/settings/reporting-period", Some(&tr), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, response) = app
        .request(Method::PUT, "/api/settings/reporting-period", Some(&tr), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"], "Forbidden");

    let (status, period) = app
        .request(Method::PUT, "/api/settings/reporting-period", Some(&tp), Some(body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(period["report_year"], 2025);
    assert_eq!(period["is_active"], true);

    let (status, period) = app
        .request(Method::GET, "/api/settings/reporting-period", Some(&tr), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(period["updated_by"], province.id);
}

#[tokio::test]
async fn test_account_creation_respects_rank_and_scope() {
    let app = TestApp::new().await;
    let regency = app
        .account("kab@example.go.id", Role::RegencyAdmin, region(3, None, None))
        .await;
    let token = app.token(&regency).await;

    let (status, created) = app
        .request(
            Method::POST,
            "/api/accounts",
            Some(&token),
            Some(json!({
                "name": "Camat",
                "email": "camat@example.go.id",
                "password": PASSWORD,
                "role": "district_admin",
                "origin_region_id": 3,
                "origin_district_id": 7
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["role"], "district_admin");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/accounts",
            Some(&token),
            Some(json!({
                "name": "Gubernur",
                "email": "gub@example.go.id",
                "password": PASSWORD,
                "role": "province_admin"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/accounts",
            Some(&token),
            Some(json!({
                "name": "Camat Lain",
                "email": "camat@example.go.id",
                "password": PASSWORD,
                "role": "district_admin",
                "origin_region_id": 3,
                "origin_district_id": 8
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, list) = app.request(Method::GET, "/api/accounts", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 2);
}
