//! API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack on protected routes (outermost → innermost):
//! 1. Extension(ApiContext) → 2. Auth validator → 3. Audit logger

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Build router from a pre-constructed `ApiContext`.
#[cfg(test)]
pub(crate) fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    // Layers apply bottom (innermost) to top (outermost).
    // Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/me", get(endpoints::auth::me))
        .route(
            "/orders",
            get(endpoints::orders::list).post(endpoints::orders::create),
        )
        .route("/orders/validate", post(endpoints::orders::validate))
        .route("/orders/:id", get(endpoints::orders::detail))
        .route("/orders/:id/sign", post(endpoints::orders::sign))
        .route(
            "/orders/:id/patient-info",
            post(endpoints::orders::patient_info),
        )
        .route("/orders/:id/cancel", post(endpoints::orders::cancel))
        .route(
            "/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route("/patients/:id", get(endpoints::patients::detail))
        .route("/organizations/me", get(endpoints::organizations::me))
        .route(
            "/organizations/directory",
            get(endpoints::organizations::directory),
        )
        .route(
            "/organizations/relationships",
            get(endpoints::organizations::relationships).post(endpoints::organizations::connect),
        )
        .route(
            "/organizations/relationships/:id/respond",
            post(endpoints::organizations::respond),
        )
        .route("/users", get(endpoints::users::list))
        .route(
            "/users/invitations",
            get(endpoints::users::invitations).post(endpoints::users::invite),
        )
        .route("/users/:id/deactivate", post(endpoints::users::deactivate))
        .route(
            "/medical-codes/icd10",
            get(endpoints::medical_codes::icd10_search),
        )
        .route(
            "/medical-codes/icd10/:code",
            get(endpoints::medical_codes::icd10_detail),
        )
        .route("/medical-codes/cpt", get(endpoints::medical_codes::cpt_search))
        .route("/pdf/orders/:id", get(endpoints::pdf::order_pdf))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .route(
            "/auth/accept-invitation",
            post(endpoints::auth::accept_invitation),
        )
        .with_state(ctx.clone())
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", protected)
        .nest("/api", public)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::pipeline::validation::{CodeDatabase, DictationValidator};

    const DICTATION: &str =
        "MRI right shoulder without contrast for chronic shoulder pain with suspected rotator cuff tear after failed physical therapy";

    fn test_core_state() -> (Arc<CoreState>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::for_tests(tmp.path());
        let validator =
            DictationValidator::new(None, CodeDatabase::File(config.code_database_path.clone()));
        let core = CoreState::with_validator(config, validator).unwrap();
        (Arc::new(core), tmp)
    }

    fn make_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn register(app: &Router, org_name: &str, org_type: &str, email: &str) -> Value {
        let (status, body) = send(
            app,
            make_request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "organization": { "name": org_name, "org_type": org_type },
                    "admin": {
                        "email": email,
                        "password": "correct horse",
                        "first_name": "Ada",
                        "last_name": "Admin"
                    }
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    /// Invite a user as `admin_token` and accept the invitation; returns the
    /// new user's bearer token.
    async fn invite_and_accept(app: &Router, admin_token: &str, email: &str, role: &str) -> String {
        let (status, invite) = send(
            app,
            make_request(
                "POST",
                "/api/users/invitations",
                Some(admin_token),
                Some(json!({ "email": email, "role": role })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{invite}");
        assert!(invite["invitation"].get("token_hash").is_none());

        let (status, session) = send(
            app,
            make_request(
                "POST",
                "/api/auth/accept-invitation",
                None,
                Some(json!({
                    "token": invite["token"],
                    "password": "another secret",
                    "first_name": "Grace",
                    "last_name": "Hopper",
                    "specialty": "orthopedics"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{session}");
        assert_eq!(session["user"]["role"], role);
        session["token"].as_str().unwrap().to_string()
    }

    async fn create_patient(app: &Router, token: &str) -> String {
        let (status, patient) = send(
            app,
            make_request(
                "POST",
                "/api/patients",
                Some(token),
                Some(json!({ "first_name": "Jane", "last_name": "Doe", "mrn": "MRN-1" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{patient}");
        patient["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let (status, body) = send(&app, make_request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["llm_enabled"], false);
    }

    #[tokio::test]
    async fn protected_route_requires_token() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let (status, body) = send(&app, make_request("GET", "/api/orders", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTH_REQUIRED");

        let (status, _) = send(
            &app,
            make_request("GET", "/api/orders", Some("not-a-real-token"), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let response = app
            .oneshot(make_request("GET", "/api/nonexistent", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_me_logout_flow() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let token = registered["token"].as_str().unwrap();
        assert_eq!(registered["user"]["role"], "admin");
        assert!(registered["user"].get("password_hash").is_none());

        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/auth/me", Some(token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
        assert_eq!(
            response.headers().get("X-Content-Type-Options").unwrap(),
            "nosniff"
        );

        let (status, _) = send(&app, make_request("POST", "/api/auth/logout", Some(token), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, make_request("GET", "/api/auth/me", Some(token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_is_case_insensitive_and_uniform_on_failure() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        register(&app, "Valley Ortho", "referring", "ada@valley.test").await;

        let (status, body) = send(
            &app,
            make_request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "ADA@valley.test", "password": "correct horse" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["token"].is_string());

        let (wrong_pw, _) = send(
            &app,
            make_request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "ada@valley.test", "password": "wrong password" })),
            ),
        )
        .await;
        let (unknown, _) = send(
            &app,
            make_request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "nobody@valley.test", "password": "whatever1" })),
            ),
        )
        .await;
        assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn repeated_login_failures_are_throttled() {
        let (core, _tmp) = test_core_state();
        let ctx = ApiContext::new(core);
        let app = api_router_with_ctx(ctx);
        register(&app, "Valley Ortho", "referring", "ada@valley.test").await;

        let attempt = || {
            make_request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "ada@valley.test", "password": "wrong password" })),
            )
        };
        for _ in 0..5 {
            let (status, _) = send(&app, attempt()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let response = app.clone().oneshot(attempt()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
    }

    #[tokio::test]
    async fn register_reports_field_errors() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let (status, body) = send(
            &app,
            make_request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "organization": { "name": "", "org_type": "referring" },
                    "admin": {
                        "email": "not-an-email",
                        "password": "short",
                        "first_name": "Ada",
                        "last_name": ""
                    }
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        let fields: Vec<&str> = body["error"]["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"organization.name"));
        assert!(fields.contains(&"admin.email"));
        assert!(fields.contains(&"admin.password"));
        assert!(fields.contains(&"admin.last_name"));
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn admin_cannot_validate_dictation() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let token = registered["token"].as_str().unwrap();

        let (status, body) = send(
            &app,
            make_request(
                "POST",
                "/api/orders/validate",
                Some(token),
                Some(json!({ "dictation": DICTATION })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn short_dictation_is_rejected() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let admin = registered["token"].as_str().unwrap();
        let physician = invite_and_accept(&app, admin, "grace@valley.test", "physician").await;

        let (status, body) = send(
            &app,
            make_request(
                "POST",
                "/api/orders/validate",
                Some(&physician),
                Some(json!({ "dictation": "MRI" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"][0]["field"], "dictation");
    }

    #[tokio::test]
    async fn order_lifecycle_end_to_end() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let admin = registered["token"].as_str().unwrap().to_string();
        let physician = invite_and_accept(&app, &admin, "grace@valley.test", "physician").await;
        let staff = invite_and_accept(&app, &admin, "front@valley.test", "admin_staff").await;
        let patient_id = create_patient(&app, &staff).await;

        // Preview.
        let (status, preview) = send(
            &app,
            make_request(
                "POST",
                "/api/orders/validate",
                Some(&physician),
                Some(json!({ "dictation": DICTATION })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{preview}");
        assert_eq!(preview["source"], "fallback");
        let score = preview["result"]["compliance_score"].as_u64().unwrap();
        assert!((1..=9).contains(&score));

        // Create.
        let (status, created) = send(
            &app,
            make_request(
                "POST",
                "/api/orders",
                Some(&physician),
                Some(json!({ "patient_id": patient_id, "dictation": DICTATION })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        let order = &created["order"];
        assert_eq!(order["status"], "pending_signature");
        assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
        let order_id = order["id"].as_str().unwrap().to_string();

        // Staff cannot sign.
        let (status, _) = send(
            &app,
            make_request(
                "POST",
                &format!("/api/orders/{order_id}/sign"),
                Some(&staff),
                Some(json!({ "signature_name": "Front Desk" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Patient info before signing is out of order.
        let (status, _) = send(
            &app,
            make_request(
                "POST",
                &format!("/api/orders/{order_id}/patient-info"),
                Some(&staff),
                Some(json!({ "phone": "555-0100" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, signed) = send(
            &app,
            make_request(
                "POST",
                &format!("/api/orders/{order_id}/sign"),
                Some(&physician),
                Some(json!({ "signature_name": "Grace Hopper, MD" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{signed}");
        assert_eq!(signed["status"], "pending_patient_info");

        let (status, done) = send(
            &app,
            make_request(
                "POST",
                &format!("/api/orders/{order_id}/patient-info"),
                Some(&staff),
                Some(json!({
                    "date_of_birth": "1970-01-02",
                    "phone": "555-0100",
                    "insurance_provider": "Acme Health"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{done}");
        assert_eq!(done["status"], "complete");

        let (status, patient) = send(
            &app,
            make_request("GET", &format!("/api/patients/{patient_id}"), Some(&staff), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patient["insurance_provider"], "Acme Health");

        let (status, listed) = send(
            &app,
            make_request("GET", "/api/orders?status=complete", Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // Completed orders cannot be cancelled.
        let (status, _) = send(
            &app,
            make_request("POST", &format!("/api/orders/{order_id}/cancel"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(make_request(
                "GET",
                &format!("/api/pdf/orders/{order_id}"),
                Some(&physician),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/pdf"
        );
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 22)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn orders_are_hidden_from_unrelated_organizations() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let admin = registered["token"].as_str().unwrap().to_string();
        let physician = invite_and_accept(&app, &admin, "grace@valley.test", "physician").await;
        let patient_id = create_patient(&app, &physician).await;
        let (_, created) = send(
            &app,
            make_request(
                "POST",
                "/api/orders",
                Some(&physician),
                Some(json!({ "patient_id": patient_id, "dictation": DICTATION })),
            ),
        )
        .await;
        let order_id = created["order"]["id"].as_str().unwrap().to_string();

        let other = register(&app, "Hill Clinic", "referring", "bo@hill.test").await;
        let other_token = other["token"].as_str().unwrap();
        let (status, _) = send(
            &app,
            make_request("GET", &format!("/api/orders/{order_id}"), Some(other_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(
            &app,
            make_request("GET", &format!("/api/patients/{patient_id}"), Some(other_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn relationship_request_and_accept() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let referring = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let radiology = register(&app, "Lakeside Imaging", "radiology", "rad@lake.test").await;
        let ref_token = referring["token"].as_str().unwrap();
        let rad_token = radiology["token"].as_str().unwrap();
        let rad_org_id = radiology["organization"]["id"].as_str().unwrap();

        let (status, directory) = send(
            &app,
            make_request("GET", "/api/organizations/directory", Some(ref_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(directory[0]["id"], rad_org_id);

        let (status, requested) = send(
            &app,
            make_request(
                "POST",
                "/api/organizations/relationships",
                Some(ref_token),
                Some(json!({ "related_organization_id": rad_org_id })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{requested}");
        assert_eq!(requested["status"], "pending");
        let rel_id = requested["id"].as_str().unwrap();

        let (status, _) = send(
            &app,
            make_request(
                "POST",
                "/api/organizations/relationships",
                Some(ref_token),
                Some(json!({ "related_organization_id": rad_org_id })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // The requester cannot answer its own request.
        let (status, _) = send(
            &app,
            make_request(
                "POST",
                &format!("/api/organizations/relationships/{rel_id}/respond"),
                Some(ref_token),
                Some(json!({ "accept": true })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, accepted) = send(
            &app,
            make_request(
                "POST",
                &format!("/api/organizations/relationships/{rel_id}/respond"),
                Some(rad_token),
                Some(json!({ "accept": true })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["status"], "active");

        let (status, listed) = send(
            &app,
            make_request("GET", "/api/organizations/relationships", Some(rad_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["counterpart"]["name"], "Valley Ortho");
        assert_eq!(listed[0]["outgoing"], false);
    }

    #[tokio::test]
    async fn deactivated_user_loses_access() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let admin = registered["token"].as_str().unwrap().to_string();
        let physician = invite_and_accept(&app, &admin, "grace@valley.test", "physician").await;

        let (_, me) = send(&app, make_request("GET", "/api/auth/me", Some(&physician), None)).await;
        let user_id = me["user"]["id"].as_str().unwrap();

        let (status, user) = send(
            &app,
            make_request("POST", &format!("/api/users/{user_id}/deactivate"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["is_active"], false);

        let (status, _) = send(&app, make_request("GET", "/api/auth/me", Some(&physician), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn medical_code_search_and_detail() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core);
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let token = registered["token"].as_str().unwrap();

        let (status, found) = send(
            &app,
            make_request("GET", "/api/medical-codes/icd10?q=shoulder&limit=5", Some(token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let found = found.as_array().unwrap();
        assert!(!found.is_empty() && found.len() <= 5);

        let (status, cpt) = send(
            &app,
            make_request("GET", "/api/medical-codes/cpt?q=73221", Some(token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cpt[0]["code"], "73221");

        let (status, code) = send(
            &app,
            make_request("GET", "/api/medical-codes/icd10/m25.511", Some(token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(code["code"], "M25.511");

        let (status, _) = send(
            &app,
            make_request("GET", "/api/medical-codes/icd10/ZZZ.999", Some(token), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn authenticated_requests_are_audited() {
        let (core, _tmp) = test_core_state();
        let app = api_router(core.clone());
        let registered = register(&app, "Valley Ortho", "referring", "ada@valley.test").await;
        let token = registered["token"].as_str().unwrap();
        send(&app, make_request("GET", "/api/users", Some(token), None)).await;

        let entries = core.audit_entries();
        assert!(entries
            .iter()
            .any(|e| e.action == "GET" && e.entity == "/api/users -> 200"));
    }
}
