//! The token lookup endpoint.
//!
//! `GET <endpoint_path>?token=<token>` answers with the full profile as JSON,
//! or with `{"error": "..."}` and one of the contract status codes:
//! 400 for a missing token, 404 for an unknown one, 410 once it has expired
//! and 500 for anything else.

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::http::API_KEY_HEADER;
use super::local::{LocalResolutionService, UNKNOWN_SCANNER};
use super::LookupError;
use crate::config::Config;
use crate::error::Result;
use crate::storage::Storage;

/// Settings for the lookup endpoint.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Route serving lookups.
    pub endpoint_path: String,
    /// When set, requests must carry this key in the `apikey` header.
    pub api_key: Option<String>,
}

impl ServerOptions {
    /// Derive endpoint settings from the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint_path: config.server.endpoint_path.clone(),
            api_key: if config.server.require_api_key {
                config.service.api_key.clone()
            } else {
                None
            },
        }
    }
}

#[derive(Clone)]
struct AppState {
    service: LocalResolutionService,
    api_key: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Build the lookup router.
#[must_use]
pub fn router(service: LocalResolutionService, options: &ServerOptions) -> Router {
    let state = AppState {
        service,
        api_key: options.api_key.as_deref().map(Arc::from),
    };
    Router::new()
        .route(&options.endpoint_path, get(get_emergency_profile))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the lookup endpoint until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(config: &Config, storage: Arc<Mutex<Storage>>) -> Result<()> {
    let options = ServerOptions::from_config(config);
    let app = router(LocalResolutionService::new(storage), &options);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(
        "Serving emergency profiles on http://{}{}",
        listener.local_addr()?,
        options.endpoint_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn get_emergency_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    if let Some(expected) = &state.api_key {
        let given = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(&**expected) {
            return error_response(&LookupError::Unauthorized);
        }
    }

    let Some(token) = query.token.filter(|t| !t.trim().is_empty()) else {
        return error_response(&LookupError::MissingToken);
    };
    let scanner_ip = scanner_ip(&headers);

    let service = state.service.clone();
    let result =
        tokio::task::spawn_blocking(move || service.lookup_from(&token, &scanner_ip)).await;

    match result {
        Ok(Ok(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(_) => error_response(&LookupError::Internal(500)),
    }
}

/// First address in `x-forwarded-for`, or `"unknown"`.
fn scanner_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_SCANNER)
        .to_string()
}

fn error_response(err: &LookupError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(serde_json::json!({ "error": err.public_message() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BloodGroup, Contact, EmergencyProfile, Profile};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use tower::ServiceExt;

    const PATH: &str = "/get-emergency-profile";

    fn setup(api_key: Option<&str>) -> (Router, Arc<Mutex<Storage>>, String) {
        let storage = Storage::open_in_memory().unwrap();
        let profile = Profile::new(
            "Jane Doe",
            BloodGroup::ONegative,
            vec![Contact::new("Sam", "555-1234")],
        );
        storage
            .publish_profile("u1", &EmergencyProfile::from(&profile))
            .unwrap();
        let token = storage.issue_token("u1", Duration::hours(24)).unwrap().token;
        let shared = Arc::new(Mutex::new(storage));
        let options = ServerOptions {
            endpoint_path: PATH.to_string(),
            api_key: api_key.map(String::from),
        };
        let app = router(LocalResolutionService::new(shared.clone()), &options);
        (app, shared, token)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_returns_profile() {
        let (app, storage, token) = setup(None);
        let request = Request::builder()
            .uri(format!("{PATH}?token={token}"))
            .header("x-forwarded-for", "198.51.100.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fullName"], "Jane Doe");
        assert_eq!(body["bloodGroup"], "O-");
        assert_eq!(body["contacts"][0]["phone"], "555-1234");

        let scans = storage.lock().unwrap().recent_scans("u1", 1).unwrap();
        assert_eq!(scans[0].scanner_ip, "198.51.100.7");
    }

    #[tokio::test]
    async fn test_missing_token_is_400() {
        let (app, _, _) = setup(None);
        let (status, body) = send(app, get(PATH)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Token required");
    }

    #[tokio::test]
    async fn test_unknown_token_is_404() {
        let (app, _, _) = setup(None);
        let (status, body) = send(app, get(&format!("{PATH}?token=bogus"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_expired_token_is_410() {
        let (app, storage, _) = setup(None);
        let old = storage
            .lock()
            .unwrap()
            .issue_token_at("u1", Utc::now() - Duration::days(3), Duration::hours(1))
            .unwrap();
        let (status, body) = send(app, get(&format!("{PATH}?token={}", old.token))).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["error"], "Token expired");
    }

    #[tokio::test]
    async fn test_api_key_required() {
        let (app, _, token) = setup(Some("secret"));
        let (status, _) = send(app.clone(), get(&format!("{PATH}?token={token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri(format!("{PATH}?token={token}"))
            .header("apikey", "secret")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_scanner_ip_defaults_to_unknown() {
        assert_eq!(scanner_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.service.api_key = Some("k".into());
        assert!(ServerOptions::from_config(&config).api_key.is_none());
        config.server.require_api_key = true;
        assert_eq!(ServerOptions::from_config(&config).api_key.as_deref(), Some("k"));
        assert_eq!(
            ServerOptions::from_config(&config).endpoint_path,
            "/get-emergency-profile"
        );
    }
}
