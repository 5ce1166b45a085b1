use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::AuthError;
use super::token_source::TokenRefresher;
use crate::models::Credential;

pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
pub const SCOPES: &[&str] = &["user-modify-playback-state", "user-read-playback-state"];

/// Client half of the authorization code grant: builds consent URLs and talks
/// to the token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_endpoint: String,
    token_endpoint: String,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http: crate::http::client(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
        }
    }

    pub fn with_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = url.into();
        self
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.authorize_endpoint,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
            ],
        )
        .map_err(|e| AuthError::Config(format!("invalid authorize endpoint: {e}")))?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let payload = self
            .request_token(&form)
            .await
            .map_err(AuthError::ExchangeFailed)?;

        let refresh_token = payload.refresh_token.clone().ok_or_else(|| {
            AuthError::ExchangeFailed("token response is missing refresh_token".to_string())
        })?;
        Ok(payload.into_credential(refresh_token))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let resp = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{} ({}): {description}", err.error, status),
                    None => format!("{} ({})", err.error, status),
                },
                Err(_) => format!("token endpoint returned {status}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| format!("invalid token response: {e}"))
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        if credential.refresh_token.is_empty() {
            return Err(AuthError::RefreshFailed(
                "credential has no refresh token".to_string(),
            ));
        }

        debug!("Requesting refreshed access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", credential.refresh_token.as_str()),
        ];
        let payload = self
            .request_token(&form)
            .await
            .map_err(AuthError::RefreshFailed)?;

        // The provider may keep the existing refresh token in place.
        let refresh_token = payload
            .refresh_token
            .clone()
            .unwrap_or_else(|| credential.refresh_token.clone());
        Ok(payload.into_credential(refresh_token))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, refresh_token: String) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token,
            expiry: Utc::now() + Duration::seconds(self.expires_in),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OAuthClient {
        OAuthClient::new("id", "secret", "https://127.0.0.1:9120/callback")
            .with_token_endpoint(format!("{}/api/token", server.uri()))
    }

    #[test]
    fn test_authorize_url_embeds_state_and_scopes() {
        let oauth = OAuthClient::new("my-client", "secret", "https://127.0.0.1:9120/callback");
        let url = Url::parse(&oauth.authorize_url("abc123").unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(pairs["state"], "abc123");
        assert_eq!(pairs["client_id"], "my-client");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "https://127.0.0.1:9120/callback");
        assert_eq!(
            pairs["scope"],
            "user-modify-playback-state user-read-playback-state"
        );
    }

    #[tokio::test]
    async fn test_exchange_code_returns_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "refresh-1",
                "scope": "user-read-playback-state"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = client(&server).exchange_code("the-code").await.unwrap();
        assert_eq!(credential.access_token, "access-1");
        assert_eq!(credential.refresh_token, "refresh-1");
        assert!(!credential.is_expired());
    }

    #[tokio::test]
    async fn test_exchange_code_surfaces_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code"
            })))
            .mount(&server)
            .await;

        let err = client(&server).exchange_code("bad").await.unwrap_err();
        match err {
            AuthError::ExchangeFailed(msg) => {
                assert!(msg.contains("invalid_grant"));
                assert!(msg.contains("Invalid authorization code"));
            }
            other => panic!("expected ExchangeFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-2",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let mut expired = Credential::new("access-1", "old-refresh", 3600);
        expired.expiry = Utc::now() - Duration::seconds(60);

        let refreshed = client(&server).refresh(&expired).await.unwrap();
        assert_eq!(refreshed.access_token, "access-2");
        assert_eq!(refreshed.refresh_token, "old-refresh");
    }

    #[tokio::test]
    async fn test_refresh_rejected_grant_is_refresh_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Refresh token revoked"
            })))
            .mount(&server)
            .await;

        let credential = Credential::new("a", "revoked", -60);
        let err = client(&server).refresh(&credential).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(msg) if msg.contains("revoked")));
    }
}
