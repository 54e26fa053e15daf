use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api::handlers;
use crate::api::middleware::{origin_check, request_logging};
use crate::AppState;

/// The operation table. Payment and edit-token gates live in the handlers;
/// the origin check wraps every mutating route.
///
/// `/services/bulk` and `/services/:slug` coexist because static segments
/// take precedence over captures; "bulk" is never read as a slug.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/services",
            get(handlers::list_services).post(handlers::create_service),
        )
        .route("/services/bulk", get(handlers::bulk_export))
        .route(
            "/services/:slug",
            get(handlers::get_service)
                .patch(handlers::update_service)
                .delete(handlers::delete_service),
        )
        .route(
            "/services/:slug/ratings",
            get(handlers::list_ratings).post(handlers::create_rating),
        )
        .route(
            "/services/:slug/recover/generate",
            post(handlers::recover_generate),
        )
        .route(
            "/services/:slug/recover/verify",
            post(handlers::recover_verify),
        )
        .route("/services/:slug/reputation", get(handlers::reputation))
        .route("/search", get(handlers::search_services))
        .route("/analytics", get(handlers::analytics))
        .route("/payment-status/:payment_hash", get(handlers::payment_status))
        .layer(middleware::from_fn_with_state(state.clone(), origin_check))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, Config, DatabaseConfig, PaymentsConfig, ServerConfig};
    use crate::db;
    use crate::db::repositories::ServiceRepository;
    use crate::models::{Service, ServiceCreate};
    use crate::services::{edit_token, l402, DomainVerifier, PaymentsClient};
    use crate::AppState;

    use axum::body::Body;
    use axum::http::{header, HeaderMap, Request, StatusCode};
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROOT_KEY: &str = "integration-root-key";

    fn config_with(root_key: &str, payment_url: &str) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            payments: PaymentsConfig {
                url: payment_url.to_string(),
                api_key: "test-key".to_string(),
            },
            auth: AuthConfig {
                root_key: root_key.to_string(),
                price_sats: 100,
                submit_price_sats: 1000,
                review_price_sats: 10,
                bulk_price_sats: 1000,
            },
            base_url: "http://localhost:8080".to_string(),
        }
    }

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        db::run_migrations(&pool).await.expect("migrations");
        db::seed_categories(&pool).await.expect("seed");
        pool
    }

    async fn state_with(root_key: &str, payment_url: &str, permissive: bool) -> AppState {
        let config = config_with(root_key, payment_url);
        let pool = memory_pool().await;
        let payments = PaymentsClient::new(&config.payments);
        let verifier = if permissive {
            DomainVerifier::permissive()
        } else {
            DomainVerifier::new()
        };
        AppState::new(config, pool, payments, verifier)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.oneshot(request).await.expect("request");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn insert_listing(pool: &SqlitePool, name: &str, url: &str) -> (Service, String) {
        let token = edit_token::mint().unwrap();
        let hash = edit_token::hash(&token);
        let body = ServiceCreate {
            name: name.to_string(),
            url: url.to_string(),
            description: String::new(),
            pricing_sats: 0,
            pricing_model: "per-request".to_string(),
            protocol: "L402".to_string(),
            owner_name: String::new(),
            owner_contact: String::new(),
            logo_url: String::new(),
            category_ids: vec![1],
            existing_edit_token: None,
        };
        let slug = ServiceRepository::unique_slug(pool, name).await.unwrap();
        let service = ServiceRepository::create(pool, &body, &slug, &hash)
            .await
            .unwrap();
        (service, token)
    }

    fn matching_pair(preimage: &[u8]) -> (String, String) {
        (
            hex::encode(Sha256::digest(preimage)),
            hex::encode(preimage),
        )
    }

    // --- paywall scenarios ---

    #[tokio::test]
    async fn unpaid_bulk_export_gets_402_challenge() {
        let payments = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_hash": "a1b2".repeat(16),
                "payment_request": "lnbc10n1test",
            })))
            .expect(1)
            .mount(&payments)
            .await;

        let state = state_with(ROOT_KEY, &payments.uri(), false).await;
        let app = create_router(state);

        let (status, headers, body) = send(app, get_request("/services/bulk")).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["detail"], "Payment Required");

        let challenge = headers
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.starts_with("L402 macaroon=\""));
        assert!(challenge.contains("invoice=\"lnbc10n1test\""));
    }

    #[tokio::test]
    async fn paid_retry_succeeds_then_replay_is_refused() {
        let state = state_with(ROOT_KEY, "http://payments.invalid", false).await;
        let app = create_router(state);

        let (payment_hash, preimage_hex) = matching_pair(b"retry-preimage");
        let macaroon = l402::mint_macaroon(ROOT_KEY, &payment_hash).unwrap();
        let auth = format!("L402 {}:{}", macaroon, preimage_hex);

        let request = Request::builder()
            .uri("/services/bulk")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);

        // Identical request again: the ledger already holds the hash.
        let request = Request::builder()
            .uri("/services/bulk")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid L402 credentials");
    }

    #[tokio::test]
    async fn lsat_scheme_is_accepted_identically() {
        let state = state_with(ROOT_KEY, "http://payments.invalid", false).await;
        let app = create_router(state);

        let (payment_hash, preimage_hex) = matching_pair(b"lsat-preimage");
        let macaroon = l402::mint_macaroon(ROOT_KEY, &payment_hash).unwrap();

        let request = Request::builder()
            .uri("/services/bulk")
            .header(
                header::AUTHORIZATION,
                format!("LSAT {}:{}", macaroon, preimage_hex),
            )
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn token_without_colon_is_401_format_error() {
        let state = state_with(ROOT_KEY, "http://payments.invalid", false).await;
        let app = create_router(state);

        let request = Request::builder()
            .uri("/services/bulk")
            .header(header::AUTHORIZATION, "L402 no-colon-here")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid L402 token format");
    }

    #[tokio::test]
    async fn garbage_credentials_are_401() {
        let state = state_with(ROOT_KEY, "http://payments.invalid", false).await;
        let app = create_router(state);

        let request = Request::builder()
            .uri("/services/bulk")
            .header(header::AUTHORIZATION, "L402 badmac:badpreimage")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid L402 credentials");
    }

    #[tokio::test]
    async fn test_mode_bypasses_every_gate() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);

        let (status, _, _) = send(app.clone(), get_request("/services/bulk")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(app, get_request("/analytics")).await;
        assert_eq!(status, StatusCode::OK);
    }

    // --- listing lifecycle (test-mode keeps the paywall out of the way) ---

    #[tokio::test]
    async fn submit_edit_delete_resubmit_lifecycle() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);

        let (status, _, created) = send(
            app.clone(),
            json_request(
                "POST",
                "/services",
                json!({
                    "name": "Echo API",
                    "url": "https://echo.example/v1",
                    "description": "echoes things",
                    "category_ids": [1],
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["token_reused"], false);
        let token = created["edit_token"].as_str().unwrap().to_string();
        assert_eq!(token.len(), 43);
        let slug = created["slug"].as_str().unwrap().to_string();
        let id = created["id"].as_i64().unwrap();

        // Wrong token cannot edit.
        let mut request = json_request(
            "PATCH",
            &format!("/services/{}", slug),
            json!({"description": "hijacked"}),
        );
        request
            .headers_mut()
            .insert("x-edit-token", "wrong-token".parse().unwrap());
        let (status, _, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Invalid edit token");

        // Right token edits.
        let mut request = json_request(
            "PATCH",
            &format!("/services/{}", slug),
            json!({"description": "now better"}),
        );
        request
            .headers_mut()
            .insert("x-edit-token", token.parse().unwrap());
        let (status, _, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["description"], "now better");

        // Delete tombstones the listing.
        let mut request = Request::builder()
            .method("DELETE")
            .uri(format!("/services/{}", slug))
            .body(Body::empty())
            .unwrap();
        request
            .headers_mut()
            .insert("x-edit-token", token.parse().unwrap());
        let (status, _, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = send(app.clone(), get_request(&format!("/services/{}", slug))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Resubmitting the same URL reuses the purged row.
        let (status, _, recreated) = send(
            app,
            json_request(
                "POST",
                "/services",
                json!({
                    "name": "Echo API Reborn",
                    "url": "https://echo.example/v1",
                    "category_ids": [1],
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(recreated["id"].as_i64().unwrap(), id);
    }

    #[tokio::test]
    async fn matching_existing_token_binds_the_domain() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);

        let (_, _, first) = send(
            app.clone(),
            json_request(
                "POST",
                "/services",
                json!({
                    "name": "First",
                    "url": "https://multi.example/one",
                    "category_ids": [1],
                }),
            ),
        )
        .await;
        let token = first["edit_token"].as_str().unwrap().to_string();

        let (status, _, second) = send(
            app.clone(),
            json_request(
                "POST",
                "/services",
                json!({
                    "name": "Second",
                    "url": "https://multi.example/two",
                    "existing_edit_token": token,
                    "category_ids": [1],
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(second["token_reused"], true);
        assert_eq!(second["edit_token"].as_str().unwrap(), token);

        // A non-matching token mints a fresh one instead.
        let (_, _, third) = send(
            app,
            json_request(
                "POST",
                "/services",
                json!({
                    "name": "Third",
                    "url": "https://multi.example/three",
                    "existing_edit_token": "not-the-right-token",
                    "category_ids": [1],
                }),
            ),
        )
        .await;
        assert_eq!(third["token_reused"], false);
        assert_ne!(third["edit_token"].as_str().unwrap(), token);
    }

    #[tokio::test]
    async fn boundary_responses_never_leak_secrets() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state.clone());
        let (service, _) = insert_listing(&state.db, "Sealed", "https://sealed.example/").await;

        let (_, _, one) = send(app.clone(), get_request(&format!("/services/{}", service.slug))).await;
        let (_, _, many) = send(app, get_request("/services")).await;

        for body in [&one, &many["services"][0]] {
            assert!(body.get("edit_token_hash").is_none());
            assert!(body.get("domain_challenge").is_none());
            assert!(body.get("domain_challenge_expires_at").is_none());
        }
    }

    #[tokio::test]
    async fn invalid_submissions_are_422() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);

        // Scheme other than http(s).
        let (status, _, _) = send(
            app.clone(),
            json_request(
                "POST",
                "/services",
                json!({"name": "Ftp thing", "url": "ftp://files.example/", "category_ids": [1]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        // Too many categories.
        let (status, _, _) = send(
            app.clone(),
            json_request(
                "POST",
                "/services",
                json!({"name": "Over", "url": "https://x.example/", "category_ids": [1, 2, 3]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        // Rating score out of range.
        let state2 = state_with("test-mode", "http://payments.invalid", false).await;
        let app2 = create_router(state2.clone());
        let (service, _) = insert_listing(&state2.db, "Rated", "https://rated.example/").await;
        let (status, _, _) = send(
            app2,
            json_request(
                "POST",
                &format!("/services/{}/ratings", service.slug),
                json!({"score": 6}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    // --- ratings ---

    #[tokio::test]
    async fn ratings_update_denormalized_aggregates() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state.clone());
        let (service, _) = insert_listing(&state.db, "Scored", "https://scored.example/").await;

        for (score, comment) in [(5, "great"), (4, "good")] {
            let (status, _, _) = send(
                app.clone(),
                json_request(
                    "POST",
                    &format!("/services/{}/ratings", service.slug),
                    json!({"score": score, "comment": comment}),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, _, body) = send(app.clone(), get_request(&format!("/services/{}", service.slug))).await;
        assert_eq!(body["rating_count"], 2);
        assert!((body["avg_rating"].as_f64().unwrap() - 4.5).abs() < 1e-9);

        let (_, _, list) = send(
            app.clone(),
            get_request(&format!("/services/{}/ratings", service.slug)),
        )
        .await;
        assert_eq!(list.as_array().unwrap().len(), 2);

        let (_, _, reputation) = send(
            app,
            get_request(&format!("/services/{}/reputation", service.slug)),
        )
        .await;
        assert_eq!(reputation["distribution"]["5"], 1);
        assert_eq!(reputation["distribution"]["4"], 1);
        assert_eq!(reputation["distribution"]["1"], 0);
    }

    // --- domain recovery ---

    #[tokio::test]
    async fn domain_recovery_rotates_every_same_domain_listing() {
        let well_known = MockServer::start().await;
        let state = state_with(ROOT_KEY, "http://payments.invalid", true).await;
        let app = create_router(state.clone());

        let base = well_known.uri();
        let (service_a, token_a) =
            insert_listing(&state.db, "Alpha", &format!("{}/a", base)).await;
        let (service_b, _token_b) =
            insert_listing(&state.db, "Beta", &format!("{}/b", base)).await;

        let (status, _, issued) = send(
            app.clone(),
            json_request(
                "POST",
                &format!("/services/{}/recover/generate", service_a.slug),
                Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let challenge = issued["challenge"].as_str().unwrap().to_string();
        assert_eq!(challenge.len(), 64);
        assert!(issued["verify_url"]
            .as_str()
            .unwrap()
            .ends_with("/.well-known/satring-verify"));

        // Host publishes the challenge, surrounded by whitespace.
        Mock::given(method("GET"))
            .and(path("/.well-known/satring-verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("  {}\n", challenge)))
            .mount(&well_known)
            .await;

        let (status, _, outcome) = send(
            app.clone(),
            json_request(
                "POST",
                &format!("/services/{}/recover/verify", service_a.slug),
                Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let new_token = outcome["edit_token"].as_str().unwrap().to_string();
        let affected: Vec<&str> = outcome["affected_services"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s.as_str().unwrap())
            .collect();
        assert!(affected.contains(&service_a.slug.as_str()));
        assert!(affected.contains(&service_b.slug.as_str()));

        // The new token now edits both listings; the old one is dead.
        for slug in [&service_a.slug, &service_b.slug] {
            let mut request = json_request(
                "PATCH",
                &format!("/services/{}", slug),
                json!({"description": "recovered"}),
            );
            request
                .headers_mut()
                .insert("x-edit-token", new_token.parse().unwrap());
            let (status, _, _) = send(app.clone(), request).await;
            assert_eq!(status, StatusCode::OK);
        }

        let mut request = json_request(
            "PATCH",
            &format!("/services/{}", service_a.slug),
            json!({"description": "stale"}),
        );
        request
            .headers_mut()
            .insert("x-edit-token", token_a.parse().unwrap());
        let (status, _, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, _, body) = send(app, get_request(&format!("/services/{}", service_b.slug))).await;
        assert_eq!(body["domain_verified"], true);
    }

    #[tokio::test]
    async fn challenge_mismatch_leaves_tokens_untouched() {
        let well_known = MockServer::start().await;
        let state = state_with(ROOT_KEY, "http://payments.invalid", true).await;
        let app = create_router(state.clone());

        let base = well_known.uri();
        let (service, token) = insert_listing(&state.db, "Gamma", &format!("{}/g", base)).await;

        let (_, _, _) = send(
            app.clone(),
            json_request(
                "POST",
                &format!("/services/{}/recover/generate", service.slug),
                Value::Null,
            ),
        )
        .await;

        Mock::given(method("GET"))
            .and(path("/.well-known/satring-verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("wrong"))
            .mount(&well_known)
            .await;

        let (status, _, body) = send(
            app.clone(),
            json_request(
                "POST",
                &format!("/services/{}/recover/verify", service.slug),
                Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Challenge code does not match");

        // Old token still works.
        let mut request = json_request(
            "PATCH",
            &format!("/services/{}", service.slug),
            json!({"description": "still mine"}),
        );
        request
            .headers_mut()
            .insert("x-edit-token", token.parse().unwrap());
        let (status, _, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn private_hosts_are_refused_with_zero_fetches() {
        let target = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/satring-verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("anything"))
            .expect(0)
            .mount(&target)
            .await;

        // Strict verifier; the listing resolves to loopback.
        let state = state_with(ROOT_KEY, "http://payments.invalid", false).await;
        let app = create_router(state.clone());
        let (service, _) = insert_listing(&state.db, "Inside", &target.uri()).await;

        let (status, _, _) = send(
            app.clone(),
            json_request(
                "POST",
                &format!("/services/{}/recover/generate", service.slug),
                Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(
            app,
            json_request(
                "POST",
                &format!("/services/{}/recover/verify", service.slug),
                Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            "Cannot verify domain: hostname resolves to a private or unreachable address"
        );
    }

    #[tokio::test]
    async fn verify_without_challenge_or_expired_is_400() {
        let state = state_with(ROOT_KEY, "http://payments.invalid", true).await;
        let app = create_router(state.clone());
        let (service, _) =
            insert_listing(&state.db, "Delta", "https://delta.example/").await;

        let (status, _, body) = send(
            app.clone(),
            json_request(
                "POST",
                &format!("/services/{}/recover/verify", service.slug),
                Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "No active challenge or challenge expired");

        // Expired challenge behaves the same.
        ServiceRepository::set_challenge(
            &state.db,
            service.id,
            &"e".repeat(64),
            chrono::Utc::now() - chrono::Duration::minutes(1),
        )
        .await
        .unwrap();
        let (status, _, _) = send(
            app,
            json_request(
                "POST",
                &format!("/services/{}/recover/verify", service.slug),
                Value::Null,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // --- routing, CSRF, limits ---

    #[tokio::test]
    async fn bulk_is_not_treated_as_a_slug() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);

        let (status, _, body) = send(app, get_request("/services/bulk")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_array());
    }

    #[tokio::test]
    async fn cross_origin_mutations_are_blocked() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);

        let mut request = json_request(
            "POST",
            "/services",
            json!({"name": "Evil", "url": "https://evil.example/", "category_ids": [1]}),
        );
        request
            .headers_mut()
            .insert(header::ORIGIN, "https://evil.example".parse().unwrap());
        let (status, _, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Cross-origin request blocked");

        // Same-host origin passes (BASE_URL is localhost).
        let mut request = json_request(
            "POST",
            "/services",
            json!({"name": "Friendly", "url": "https://friendly.example/", "category_ids": [1]}),
        );
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://localhost:8080".parse().unwrap());
        let (status, _, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::CREATED);

        // Cross-origin GETs are untouched.
        let mut request = get_request("/services");
        request
            .headers_mut()
            .insert(header::ORIGIN, "https://evil.example".parse().unwrap());
        let (status, _, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_rate_limit_trips_after_ten() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);

        for _ in 0..10 {
            let (status, _, _) = send(
                app.clone(),
                Request::builder()
                    .method("DELETE")
                    .uri("/services/no-such-slug")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        let (status, _, _) = send(
            app,
            Request::builder()
                .method("DELETE")
                .uri("/services/no-such-slug")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    // --- search & payment status ---

    #[tokio::test]
    async fn search_filters_by_name_and_description() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state.clone());
        insert_listing(&state.db, "Weather Oracle", "https://wx.example/").await;
        insert_listing(&state.db, "Stock Feed", "https://stocks.example/").await;

        let (status, _, body) = send(app, get_request("/search?q=weather")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["services"][0]["name"], "Weather Oracle");
    }

    #[tokio::test]
    async fn payment_status_polls_the_backend() {
        let payments = MockServer::start().await;
        let hash = "ab".repeat(32);
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/payments/{}", hash)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"paid": true})))
            .mount(&payments)
            .await;

        let state = state_with(ROOT_KEY, &payments.uri(), false).await;
        let app = create_router(state);
        let (status, _, body) = send(app, get_request(&format!("/payment-status/{}", hash))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paid"], true);
    }

    #[tokio::test]
    async fn payment_status_is_always_paid_in_test_mode() {
        let state = state_with("test-mode", "http://payments.invalid", false).await;
        let app = create_router(state);
        let (status, _, body) = send(app, get_request("/payment-status/whatever")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paid"], true);
    }
}
