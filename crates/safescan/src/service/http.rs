//! Remote token lookup over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::{require_name, LookupError, ResolutionService};
use crate::error::Result;
use crate::profile::EmergencyProfile;
use crate::storage::tokens::token_prefix;

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "apikey";

/// Resolves tokens with `GET <base_url>?token=<token>`.
#[derive(Debug, Clone)]
pub struct HttpResolutionService {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpResolutionService {
    /// Create a client for the endpoint at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, api_key: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
            api_key,
        })
    }

    /// The endpoint being called.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl ResolutionService for HttpResolutionService {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn lookup(&self, token: &str) -> std::result::Result<EmergencyProfile, LookupError> {
        debug!("Looking up token {}… at {}", token_prefix(token), self.base_url);

        let mut request = self
            .client
            .get(self.base_url.clone())
            .query(&[("token", token)]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Token lookup request failed: {}", e);
            LookupError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!("Token lookup answered {}", status);
            return Err(LookupError::from_status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| LookupError::MalformedBody(e.to_string()))?;

        let has_name = value
            .get("fullName")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|name| !name.is_empty());
        if !has_name {
            return Err(LookupError::Incomplete);
        }

        let profile: EmergencyProfile =
            serde_json::from_value(value).map_err(|e| LookupError::MalformedBody(e.to_string()))?;
        require_name(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server: &MockServer, api_key: Option<&str>) -> HttpResolutionService {
        let url = Url::parse(&format!("{}/get-emergency-profile", server.uri())).unwrap();
        HttpResolutionService::new(url, api_key.map(String::from), Some(Duration::from_secs(5)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get-emergency-profile"))
            .and(query_param("token", "abc123"))
            .and(header("apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fullName": "Jane Doe",
                "bloodGroup": "O-",
                "dob": "2014-10-14",
                "allergies": ["Peanuts"],
                "medications": null,
                "conditions": ["Asthma"],
                "contacts": [{"name": "Sam", "phone": "555-1234", "relationship": "Brother"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_for(&server, Some("secret"));
        let profile = service.lookup("abc123").await.unwrap();
        assert_eq!(profile.full_name, "Jane Doe");
        assert_eq!(profile.blood_group, "O-");
        assert_eq!(profile.allergies, vec!["Peanuts"]);
        assert!(profile.medications.is_empty());
        assert_eq!(profile.conditions, vec!["Asthma"]);
        assert_eq!(profile.contacts[0].relationship.as_deref(), Some("Brother"));
    }

    #[tokio::test]
    async fn test_lookup_maps_statuses() {
        let server = MockServer::start().await;
        for (token, status) in [("missing", 400), ("unknown", 404), ("old", 410), ("boom", 500)] {
            Mock::given(method("GET"))
                .and(query_param("token", token))
                .respond_with(
                    ResponseTemplate::new(status)
                        .set_body_json(serde_json::json!({"error": "nope"})),
                )
                .mount(&server)
                .await;
        }

        let service = service_for(&server, None);
        assert_eq!(service.lookup("missing").await, Err(LookupError::MissingToken));
        assert_eq!(service.lookup("unknown").await, Err(LookupError::NotFound));
        assert_eq!(service.lookup("old").await, Err(LookupError::Expired));
        assert_eq!(service.lookup("boom").await, Err(LookupError::Internal(500)));
    }

    #[tokio::test]
    async fn test_lookup_without_full_name_is_incomplete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"bloodGroup": "A+"})),
            )
            .mount(&server)
            .await;

        let service = service_for(&server, None);
        assert_eq!(service.lookup("t").await, Err(LookupError::Incomplete));
    }

    #[tokio::test]
    async fn test_lookup_accepts_any_non_empty_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("token", "blank"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"fullName": " "})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("token", "empty"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"fullName": ""})),
            )
            .mount(&server)
            .await;

        let service = service_for(&server, None);
        assert_eq!(service.lookup("blank").await.unwrap().full_name, " ");
        assert_eq!(service.lookup("empty").await, Err(LookupError::Incomplete));
    }

    #[tokio::test]
    async fn test_lookup_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let service = service_for(&server, None);
        assert!(matches!(
            service.lookup("t").await,
            Err(LookupError::MalformedBody(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_transport_error() {
        let server = MockServer::start().await;
        let url = Url::parse(&format!("{}/get-emergency-profile", server.uri())).unwrap();
        drop(server);

        let service = HttpResolutionService::new(url, None, Some(Duration::from_secs(2))).unwrap();
        assert!(matches!(
            service.lookup("t").await,
            Err(LookupError::Transport(_))
        ));
    }

    #[test]
    fn test_base_url() {
        let url = Url::parse("https://example.test/lookup").unwrap();
        let service = HttpResolutionService::new(url.clone(), None, None).unwrap();
        assert_eq!(service.base_url(), &url);
        assert_eq!(service.name(), "http");
    }
}
