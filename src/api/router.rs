//! Clinic API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Three route groups share one `ApiContext`:
//! - public: catalog, review workflow, complaints, images, login
//! - staff: `require_user` → audit logger
//! - admin: `require_admin` → audit logger

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::handler::Handler;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::api::endpoints::{
    admin, catalog, complaints, dashboard, images, messenger, prompts, reviews, session, users,
};
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::db::ReferenceEntity;
use crate::models::*;

/// Multipart framing allowance on top of the configured image size.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the clinic API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Admin list/create/update/delete/reorder routes for one reference kind.
fn reference_routes<T, C, CArgs, U, UArgs>(path: &str, create: C, update: U) -> Router<ApiContext>
where
    T: ReferenceEntity + Serialize + Send + 'static,
    C: Handler<CArgs, ApiContext>,
    U: Handler<UArgs, ApiContext>,
    CArgs: 'static,
    UArgs: 'static,
{
    Router::new()
        .route(&format!("/admin/{path}"), get(admin::list::<T>).post(create))
        .route(&format!("/admin/{path}/reorder"), post(admin::reorder::<T>))
        .route(&format!("/admin/{path}/:id"), post(update).delete(admin::delete::<T>))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let public = Router::new()
        .route("/login", post(session::login))
        .route("/doctors", get(catalog::list_enabled::<Doctor>))
        .route("/services", get(catalog::list_enabled::<Service>))
        .route("/services/doctors", get(catalog::services_for_doctors))
        .route("/aspects", get(catalog::list_enabled::<Aspect>))
        .route("/sources", get(catalog::list_enabled::<Source>))
        .route("/rewards", get(catalog::list_enabled::<Reward>))
        .route("/platforms", get(catalog::list_enabled::<Platform>))
        .route("/reasons", get(catalog::list_enabled::<Reason>))
        .route("/owner", get(catalog::owner))
        .route("/images/:name", get(images::download))
        .route("/reviews", post(reviews::create))
        .route("/reviews/:id", get(reviews::get))
        .route("/reviews/:id/doctors", post(reviews::set_doctors))
        .route("/reviews/:id/services", post(reviews::set_services))
        .route("/reviews/:id/aspects", post(reviews::set_aspects))
        .route("/reviews/:id/source", post(reviews::set_source))
        .route("/reviews/:id/contacts", post(reviews::set_contacts))
        .route("/reviews/:id/generate", post(reviews::generate))
        .route("/reviews/:id/text", post(reviews::set_text))
        .route("/reviews/:id/reward", post(reviews::set_reward))
        .route(
            "/reviews/:id/platforms/:platform_id/publish",
            post(reviews::publish),
        )
        .route("/complaints", post(complaints::create))
        .with_state(ctx.clone());

    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Auth → Audit (innermost) → Handler
    let staff = Router::new()
        .route("/user", get(session::current_user))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/export/reviews", get(dashboard::export_reviews))
        .route("/export/complaints", get(dashboard::export_complaints))
        .route("/telegram/link", get(messenger::telegram_link))
        .route("/telegram/unlink", post(messenger::telegram_unlink))
        .route("/max/link", get(messenger::max_link))
        .route("/max/unlink", post(messenger::max_unlink))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_user))
        .layer(axum::Extension(ctx.clone()));

    let upload_limit = ctx.core.config.images.max_bytes + UPLOAD_OVERHEAD_BYTES;
    let admin = Router::new()
        .merge(reference_routes::<Doctor, _, _, _, _>(
            "doctors",
            admin::create_doctor,
            admin::update_doctor,
        ))
        .merge(reference_routes::<Service, _, _, _, _>(
            "services",
            admin::create_service,
            admin::update_service,
        ))
        .merge(reference_routes::<Aspect, _, _, _, _>(
            "aspects",
            admin::create_named::<Aspect>,
            admin::update_named::<Aspect>,
        ))
        .merge(reference_routes::<Source, _, _, _, _>(
            "sources",
            admin::create_named::<Source>,
            admin::update_named::<Source>,
        ))
        .merge(reference_routes::<Reason, _, _, _, _>(
            "reasons",
            admin::create_named::<Reason>,
            admin::update_named::<Reason>,
        ))
        .merge(reference_routes::<Reward, _, _, _, _>(
            "rewards",
            admin::create_reward,
            admin::update_reward,
        ))
        .merge(reference_routes::<Platform, _, _, _, _>(
            "platforms",
            admin::create_platform,
            admin::update_platform,
        ))
        .route("/admin/users", get(users::list).post(users::create))
        .route("/admin/users/:id", post(users::update).delete(users::delete))
        .route("/admin/owner", post(admin::set_owner))
        .route("/admin/prompts", get(prompts::list))
        .route("/admin/prompts/:id", post(prompts::upsert))
        .route("/admin/prompts/:id/test", post(prompts::test))
        .route(
            "/admin/images",
            post(images::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_admin))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", public)
        .nest("/api", staff)
        .nest("/api", admin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth;
    use crate::config::BotConfig;
    use crate::core_state::tests::{test_config, test_state, test_state_with, TEST_SECRET};
    use crate::db;
    use crate::llm::MockReviewGenerator;
    use crate::notify::{NotificationHub, RecordingNotifier};

    fn add_user(core: &CoreState, username: &str, is_admin: bool) -> (User, String) {
        let conn = core.lock_db().unwrap();
        let hash = auth::hash_password("pa55word", 1_000).unwrap();
        let user = db::insert_user(
            &conn,
            &UserInput {
                name: username.to_uppercase(),
                username: username.into(),
                password: None,
                is_admin,
                avatar_url: None,
            },
            &hash,
        )
        .unwrap();
        let token = auth::issue_token(user.id, TEST_SECRET, 1).unwrap();
        (user, token)
    }

    /// Enabled catalog: one service, doctor, aspect, source, reward and platform.
    fn seed_catalog(core: &CoreState) -> [i64; 6] {
        let conn = core.lock_db().unwrap();
        let service = db::insert_service(
            &conn,
            &ServiceInput { name: "Чистка".into(), category: "Гигиена".into(), is_enabled: true },
        )
        .unwrap();
        let doctor = db::insert_doctor(
            &conn,
            &DoctorInput {
                name: "Иванова".into(),
                role: "Стоматолог".into(),
                avatar_url: None,
                is_enabled: true,
                service_ids: vec![service.id],
            },
        )
        .unwrap();
        let named = |name: &str| NamedInput { name: name.into(), is_enabled: true };
        let aspect = db::insert_named::<Aspect>(&conn, &named("Вежливость")).unwrap();
        let source = db::insert_named::<Source>(&conn, &named("Друзья")).unwrap();
        let reward = db::insert_reward(
            &conn,
            &RewardInput { name: "Щётка".into(), image_url: None, is_enabled: true },
        )
        .unwrap();
        let platform = db::insert_platform(
            &conn,
            &PlatformInput {
                name: "Карты".into(),
                url: "https://maps.example.com".into(),
                image_url: None,
                is_enabled: true,
            },
        )
        .unwrap();
        [service.id, doctor.id, aspect.id, source.id, reward.id, platform.id]
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

    async fn send(core: &Arc<CoreState>, req: Request<Body>) -> Response {
        api_router(core.clone()).oneshot(req).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ── Session ─────────────────────────────────────────

    #[tokio::test]
    async fn login_issues_token_for_valid_credentials() {
        let core = Arc::new(test_state());
        add_user(&core, "anna", false);

        let req = make_request(
            "POST",
            "/api/login",
            None,
            Some(json!({"username": "anna", "password": "pa55word"})),
        );
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["user"]["username"], "anna");
        let token = json["access_token"].as_str().unwrap();
        assert!(auth::decode_token(token, TEST_SECRET).is_ok());

        let req = make_request("GET", "/api/user", Some(token), None);
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "ANNA");
    }

    #[tokio::test]
    async fn login_rejects_bad_password() {
        let core = Arc::new(test_state());
        add_user(&core, "anna", false);

        let req = make_request(
            "POST",
            "/api/login",
            None,
            Some(json!({"username": "anna", "password": "nope"})),
        );
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn staff_routes_require_token() {
        let core = Arc::new(test_state());
        let response = send(&core, make_request("GET", "/api/dashboard", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&core, make_request("GET", "/api/user", Some("garbage"), None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_rejected() {
        let core = Arc::new(test_state());
        let (user, token) = add_user(&core, "gone", false);
        db::delete_user(&core.lock_db().unwrap(), user.id).unwrap();

        let response = send(&core, make_request("GET", "/api/user", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["message"], "Unknown user!");
    }

    #[tokio::test]
    async fn admin_routes_refuse_regular_staff() {
        let core = Arc::new(test_state());
        let (_, token) = add_user(&core, "staff", false);

        let response = send(&core, make_request("GET", "/api/admin/users", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    // ── Public catalog ──────────────────────────────────

    #[tokio::test]
    async fn public_catalog_hides_disabled_rows() {
        let core = Arc::new(test_state());
        seed_catalog(&core);
        db::insert_named::<Aspect>(
            &core.lock_db().unwrap(),
            &NamedInput { name: "Скрытый".into(), is_enabled: false },
        )
        .unwrap();

        let response = send(&core, make_request("GET", "/api/aspects", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["name"], "Вежливость");
    }

    #[tokio::test]
    async fn services_for_doctors_accepts_repeated_ids() {
        let core = Arc::new(test_state());
        let [service_id, doctor_id, ..] = seed_catalog(&core);

        let uri = format!("/api/services/doctors?doctor_ids={doctor_id}&doctor_ids=999");
        let response = send(&core, make_request("GET", &uri, None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await[0]["id"], service_id);

        let response =
            send(&core, make_request("GET", "/api/services/doctors", None, None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn owner_is_404_until_set() {
        let core = Arc::new(test_state());
        let (_, admin) = add_user(&core, "root", true);

        let response = send(&core, make_request("GET", "/api/owner", None, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let req = make_request(
            "POST",
            "/api/admin/owner",
            Some(&admin),
            Some(json!({"name": "Д-р Петров", "avatar_url": null})),
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::OK);

        let response = send(&core, make_request("GET", "/api/owner", None, None)).await;
        assert_eq!(body_json(response).await["name"], "Д-р Петров");
    }

    // ── Review workflow ─────────────────────────────────

    #[tokio::test]
    async fn review_workflow_end_to_end() {
        let telegram = Arc::new(RecordingNotifier::new());
        let core = Arc::new(test_state_with(
            test_config(),
            Arc::new(MockReviewGenerator::new("Отличная клиника")),
            NotificationHub::new(Some(telegram.clone()), None),
        ));
        let [service_id, doctor_id, aspect_id, source_id, reward_id, platform_id] =
            seed_catalog(&core);
        let (staff, _) = add_user(&core, "staff", false);
        db::set_messenger_link(&core.lock_db().unwrap(), staff.id, Channel::Telegram, 42, None)
            .unwrap();

        let response = send(&core, make_request("POST", "/api/reviews", None, None)).await;
        let id = body_json(response).await["id"].as_i64().unwrap();
        let base = format!("/api/reviews/{id}");

        // Generation needs doctors, services and aspects first.
        let response = send(&core, make_request("POST", &format!("{base}/generate"), None, None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let steps = [
            ("doctors", json!({"doctor_ids": [doctor_id, 999]})),
            ("services", json!({"service_ids": [service_id]})),
            ("aspects", json!({"aspect_ids": [aspect_id]})),
            ("source", json!({"source_id": source_id})),
            ("contacts", json!({"contact_name": "  Мария ", "contact_phone": ""})),
        ];
        for (step, body) in steps {
            let req = make_request("POST", &format!("{base}/{step}"), None, Some(body));
            assert_eq!(send(&core, req).await.status(), StatusCode::OK, "step {step}");
        }

        let response = send(&core, make_request("POST", &format!("{base}/generate"), None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["review_text"], "Отличная клиника");
        assert_eq!(json["contact_name"], "Мария");
        assert!(json["contact_phone"].is_null());
        assert_eq!(json["selected_doctors"].as_array().unwrap().len(), 1);

        let req = make_request(
            "POST",
            &format!("{base}/reward"),
            None,
            Some(json!({"reward_id": reward_id})),
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::OK);

        let publish = format!("{base}/platforms/{platform_id}/publish");
        for _ in 0..2 {
            let response = send(&core, make_request("POST", &publish, None, None)).await;
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["published_platforms"].as_array().unwrap().len(), 1);
            assert_eq!(json["notified"], true);
        }

        let second = db::insert_platform(
            &core.lock_db().unwrap(),
            &PlatformInput {
                name: "Отзовик".into(),
                url: "https://reviews.example.com".into(),
                image_url: None,
                is_enabled: true,
            },
        )
        .unwrap();
        let publish = format!("{base}/platforms/{}/publish", second.id);
        let response = send(&core, make_request("POST", &publish, None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["published_platforms"].as_array().unwrap().len(), 2);

        let sent = telegram.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.chat_id, 42);
        assert!(sent[0].1.contains(&format!("#{id}")));
    }

    #[tokio::test]
    async fn failed_announcement_is_retried_on_next_publish() {
        let telegram = Arc::new(RecordingNotifier::new());
        let core = Arc::new(test_state_with(
            test_config(),
            Arc::new(MockReviewGenerator::new("")),
            NotificationHub::new(Some(telegram.clone()), None),
        ));
        let platform_id = seed_catalog(&core)[5];
        let (staff, _) = add_user(&core, "staff", false);
        let id = {
            let conn = core.lock_db().unwrap();
            // A chat id that cannot be read back makes the recipient lookup fail.
            conn.execute("UPDATE users SET telegram_id = 'broken' WHERE id = ?1", [staff.id])
                .unwrap();
            db::create_review(&conn).unwrap()
        };
        let publish = format!("/api/reviews/{id}/platforms/{platform_id}/publish");

        let response = send(&core, make_request("POST", &publish, None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["notified"], false);
        assert!(!db::get_review(&core.lock_db().unwrap(), id).unwrap().unwrap().notified);
        assert!(telegram.sent().is_empty());

        db::set_messenger_link(&core.lock_db().unwrap(), staff.id, Channel::Telegram, 42, None)
            .unwrap();
        let response = send(&core, make_request("POST", &publish, None, None)).await;
        assert_eq!(body_json(response).await["notified"], true);
        assert_eq!(telegram.sent().len(), 1);
    }

    #[tokio::test]
    async fn review_steps_validate_selections() {
        let core = Arc::new(test_state());
        seed_catalog(&core);
        let id = db::create_review(&core.lock_db().unwrap()).unwrap();

        let req = make_request(
            "POST",
            &format!("/api/reviews/{id}/doctors"),
            None,
            Some(json!({"doctor_ids": [999]})),
        );
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["message"], "No request doctors found!");

        let req = make_request(
            "POST",
            &format!("/api/reviews/{id}/platforms/999/publish"),
            None,
            None,
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::BAD_REQUEST);

        let req = make_request(
            "POST",
            &format!("/api/reviews/{id}/text"),
            None,
            Some(json!({"review_text": "   "})),
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::BAD_REQUEST);

        let response = send(&core, make_request("GET", "/api/reviews/999", None, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["message"], "Review request not found!");
    }

    #[tokio::test]
    async fn llm_failure_is_reported_as_bad_gateway() {
        let core = Arc::new(test_state_with(
            test_config(),
            Arc::new(MockReviewGenerator::failing()),
            NotificationHub::default(),
        ));
        let [service_id, doctor_id, aspect_id, ..] = seed_catalog(&core);
        let id = {
            let conn = core.lock_db().unwrap();
            let id = db::create_review(&conn).unwrap();
            db::set_review_doctors(&conn, id, &[doctor_id]).unwrap();
            db::set_review_services(&conn, id, &[service_id]).unwrap();
            db::set_review_aspects(&conn, id, &[aspect_id]).unwrap();
            id
        };

        let req = make_request("POST", &format!("/api/reviews/{id}/generate"), None, None);
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let review = db::get_review(&core.lock_db().unwrap(), id).unwrap().unwrap();
        assert!(review.review_text.is_none());
    }

    // ── Complaints ──────────────────────────────────────

    #[tokio::test]
    async fn complaint_is_stored_and_announced() {
        let max = Arc::new(RecordingNotifier::new());
        let core = Arc::new(test_state_with(
            test_config(),
            Arc::new(MockReviewGenerator::new("")),
            NotificationHub::new(None, Some(max.clone())),
        ));
        let (staff, _) = add_user(&core, "staff", false);
        let reason_id = {
            let conn = core.lock_db().unwrap();
            db::set_messenger_link(&conn, staff.id, Channel::Max, 7, None).unwrap();
            db::insert_named::<Reason>(&conn, &NamedInput { name: "Очередь".into(), is_enabled: true })
                .unwrap()
                .id
        };

        let req = make_request(
            "POST",
            "/api/complaints",
            None,
            Some(json!({"complaint_text": "Долго ждали", "reason_ids": [reason_id]})),
        );
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let id = body_json(response).await["id"].as_i64().unwrap();

        let complaint = db::get_complaint(&core.lock_db().unwrap(), id).unwrap().unwrap();
        assert_eq!(complaint.selected_reasons.len(), 1);
        assert_eq!(max.sent().len(), 1);
    }

    #[tokio::test]
    async fn complaint_without_text_is_rejected() {
        let core = Arc::new(test_state());
        let req = make_request("POST", "/api/complaints", None, Some(json!({"complaint_text": " "})));
        assert_eq!(send(&core, req).await.status(), StatusCode::BAD_REQUEST);
    }

    // ── Dashboard & export ──────────────────────────────

    #[tokio::test]
    async fn dashboard_counts_reviews_and_complaints() {
        let core = Arc::new(test_state());
        let (_, token) = add_user(&core, "staff", false);
        let [_, _, _, _, _, platform_id] = seed_catalog(&core);
        {
            let conn = core.lock_db().unwrap();
            let published = db::create_review(&conn).unwrap();
            db::set_review_text(&conn, published, "Спасибо").unwrap();
            db::add_published_platform(&conn, published, platform_id).unwrap();
            db::create_review(&conn).unwrap();
            db::create_complaint(&conn, None, None, "Шумно", &[]).unwrap();
        }

        let response = send(&core, make_request("GET", "/api/dashboard", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total_reviews"], 2);
        assert_eq!(json["total_generated"], 1);
        assert_eq!(json["total_published"], 1);
        assert_eq!(json["total_complaints"], 1);

        let req = make_request("GET", "/api/dashboard?date_after=2999-01-01", Some(&token), None);
        assert_eq!(body_json(send(&core, req).await).await["total_reviews"], 0);

        let req = make_request("GET", "/api/dashboard?date_before=soon", Some(&token), None);
        assert_eq!(send(&core, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_returns_xlsx_attachment() {
        let core = Arc::new(test_state());
        let (_, token) = add_user(&core, "staff", false);
        db::create_review(&core.lock_db().unwrap()).unwrap();

        let response =
            send(&core, make_request("GET", "/api/export/reviews", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            crate::export::XLSX_CONTENT_TYPE
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"PK"));
    }

    // ── Messenger linking ───────────────────────────────

    #[tokio::test]
    async fn telegram_link_needs_configured_bot() {
        let core = Arc::new(test_state());
        let (_, token) = add_user(&core, "staff", false);
        let response =
            send(&core, make_request("GET", "/api/telegram/link", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let mut config = test_config();
        config.telegram = Some(BotConfig { token: "t".into(), bot_username: "clinic_bot".into() });
        let core = Arc::new(test_state_with(
            config,
            Arc::new(MockReviewGenerator::new("")),
            NotificationHub::default(),
        ));
        let (user, token) = add_user(&core, "staff", false);
        let response =
            send(&core, make_request("GET", "/api/telegram/link", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let link = body_json(response).await["start_link"].as_str().unwrap().to_string();
        let payload = link.strip_prefix("https://t.me/clinic_bot?start=").unwrap();
        assert_eq!(auth::decode_link_payload(payload, TEST_SECRET), Some(user.id));
    }

    #[tokio::test]
    async fn unlink_clears_chat() {
        let core = Arc::new(test_state());
        let (user, token) = add_user(&core, "staff", false);
        db::set_messenger_link(&core.lock_db().unwrap(), user.id, Channel::Max, 5, Some("Anna"))
            .unwrap();

        let response =
            send(&core, make_request("POST", "/api/max/unlink", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let user = db::get_user(&core.lock_db().unwrap(), user.id).unwrap().unwrap();
        assert!(user.max_id.is_none());
    }

    // ── Admin ───────────────────────────────────────────

    #[tokio::test]
    async fn admin_manages_reference_data() {
        let core = Arc::new(test_state());
        let (_, admin) = add_user(&core, "root", true);

        let req = make_request(
            "POST",
            "/api/admin/doctors",
            Some(&admin),
            Some(json!({"name": "Смирнов", "role": "Хирург", "service_ids": [1]})),
        );
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["message"], "No services found!");

        let mut ids = Vec::new();
        for name in ["Первая", "Вторая"] {
            let req = make_request("POST", "/api/admin/sources", Some(&admin), Some(json!({"name": name})));
            let response = send(&core, req).await;
            assert_eq!(response.status(), StatusCode::OK);
            ids.push(body_json(response).await["id"].as_i64().unwrap());
        }

        let req = make_request(
            "POST",
            "/api/admin/sources/reorder",
            Some(&admin),
            Some(json!({"ordered_ids": [ids[1], ids[0]]})),
        );
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await[0]["name"], "Вторая");

        let req = make_request(
            "POST",
            "/api/admin/sources/reorder",
            Some(&admin),
            Some(json!({"ordered_ids": [ids[0], ids[0]]})),
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::BAD_REQUEST);

        let req = make_request(
            "POST",
            &format!("/api/admin/sources/{}", ids[0]),
            Some(&admin),
            Some(json!({"name": "Первая", "is_enabled": false})),
        );
        assert_eq!(body_json(send(&core, req).await).await["is_enabled"], false);

        let uri = format!("/api/admin/sources/{}", ids[0]);
        let response = send(&core, make_request("DELETE", &uri, Some(&admin), None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&core, make_request("DELETE", &uri, Some(&admin), None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            send(&core, make_request("GET", "/api/admin/sources", Some(&admin), None)).await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admin_manages_users() {
        let core = Arc::new(test_state());
        let (root, admin) = add_user(&core, "root", true);
        let body = json!({"name": "Olga", "username": "olga", "password": "secret"});

        let req = make_request("POST", "/api/admin/users", Some(&admin), Some(body.clone()));
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let olga = body_json(response).await["id"].as_i64().unwrap();

        let req = make_request("POST", "/api/admin/users", Some(&admin), Some(body));
        assert_eq!(send(&core, req).await.status(), StatusCode::CONFLICT);

        let req = make_request(
            "POST",
            "/api/admin/users",
            Some(&admin),
            Some(json!({"name": "Nop", "username": "nop"})),
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/api/admin/users/{}", root.id);
        let response = send(&core, make_request("DELETE", &uri, Some(&admin), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/api/admin/users/{olga}");
        let response = send(&core, make_request("DELETE", &uri, Some(&admin), None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn admin_edits_and_tests_prompts() {
        let generator = Arc::new(MockReviewGenerator::new("Пробный отзыв"));
        let core = Arc::new(test_state_with(
            test_config(),
            generator.clone(),
            NotificationHub::default(),
        ));
        let (_, admin) = add_user(&core, "root", true);

        let response =
            send(&core, make_request("GET", "/api/admin/prompts", Some(&admin), None)).await;
        assert_eq!(body_json(response).await[0]["id"], "review");

        let req = make_request(
            "POST",
            "/api/admin/prompts/review",
            Some(&admin),
            Some(json!({"prompt_text": "Врачи: {doctors}", "temperature": 3.0, "frequency_penalty": 0.0})),
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::BAD_REQUEST);

        let req = make_request(
            "POST",
            "/api/admin/prompts/review",
            Some(&admin),
            Some(json!({"prompt_text": "Врачи: {doctors}", "temperature": 0.5, "frequency_penalty": 0.0})),
        );
        assert_eq!(send(&core, req).await.status(), StatusCode::OK);

        let req = make_request(
            "POST",
            "/api/admin/prompts/review/test",
            Some(&admin),
            Some(json!({"doctor_names": ["Иванова", "Петров"]})),
        );
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["generated_text"], "Пробный отзыв");
        assert_eq!(generator.requests()[0].user, "Врачи: Иванова, Петров");
    }

    // ── Images ──────────────────────────────────────────

    #[tokio::test]
    async fn image_upload_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.images.dir = dir.path().to_path_buf();
        config.server.public_url = "https://clinic.example.com".into();
        let core = Arc::new(test_state_with(
            config,
            Arc::new(MockReviewGenerator::new("")),
            NotificationHub::default(),
        ));
        let (_, admin) = add_user(&core, "root", true);

        let png: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
        let mut body = Vec::new();
        body.extend_from_slice(
            b"--XBOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
              Content-Type: image/png\r\n\r\n",
        );
        body.extend_from_slice(png);
        body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");
        let req = Request::builder()
            .method("POST")
            .uri("/api/admin/images")
            .header("Authorization", format!("Bearer {admin}"))
            .header("Content-Type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();
        let response = send(&core, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let filename = json["filename"].as_str().unwrap().to_string();
        assert!(filename.ends_with(".png"));
        assert_eq!(
            json["image_url"],
            format!("https://clinic.example.com/api/images/{filename}")
        );

        let uri = format!("/api/images/{filename}");
        let response = send(&core, make_request("GET", &uri, None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "image/png");

        let response = send(&core, make_request("GET", "/api/images/missing.png", None, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
