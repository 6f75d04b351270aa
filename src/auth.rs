//! OAuth2 token endpoint grants.

use crate::credentials::{token_fingerprint, Credentials, GrantMode};
use crate::error::{Error, Result, TransportError};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info};

/// Token endpoint path, relative to the login host.
pub const TOKEN_PATH: &str = "/services/oauth2/token";

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub instance_url: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub issued_at: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    /// Only issued by some grants; refresh responses usually omit it.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Runs grants against a login host's token endpoint.
///
/// Never retries; a failed grant is reported as-is.
#[derive(Debug, Clone)]
pub struct Authenticator {
    http_client: reqwest::Client,
    token_url: String,
    user_agent: String,
}

impl Authenticator {
    /// Create an authenticator for the given login host.
    pub fn new(
        http_client: reqwest::Client,
        login_url: &str,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            token_url: format!("{}{}", login_url.trim_end_matches('/'), TOKEN_PATH),
            user_agent: user_agent.into(),
        }
    }

    /// Full URL of the token endpoint.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Obtain the first token pair for an interactive grant.
    ///
    /// `PresetToken` only reaches the endpoint when no access token was
    /// supplied, in which case the refresh grant is used.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        grant: &GrantMode,
    ) -> Result<Option<TokenResponse>> {
        match grant {
            GrantMode::Password {
                username,
                password,
                security_token,
            } => {
                let secret = format!("{}{}", password, security_token);
                let form = [
                    ("grant_type", "password"),
                    ("client_id", credentials.client_id.as_str()),
                    ("client_secret", credentials.client_secret.as_str()),
                    ("username", username.as_str()),
                    ("password", secret.as_str()),
                ];
                self.request_token(grant.name(), &form).await.map(Some)
            }
            GrantMode::AuthorizationCode { code, redirect_uri } => {
                let form = [
                    ("grant_type", "authorization_code"),
                    ("client_id", credentials.client_id.as_str()),
                    ("client_secret", credentials.client_secret.as_str()),
                    ("code", code.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                ];
                self.request_token(grant.name(), &form).await.map(Some)
            }
            GrantMode::PresetToken {
                access_token,
                refresh_token,
                ..
            } => match access_token.as_deref() {
                Some(t) if !t.is_empty() => Ok(None),
                _ => self.refresh(credentials, refresh_token).await.map(Some),
            },
        }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(
        &self,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.request_token("refresh_token", &form).await
    }

    async fn request_token(&self, grant: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        debug!(grant = grant, token_url = %self.token_url, "Requesting token");

        let response = self
            .http_client
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .form(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;

        if !(200..300).contains(&status) {
            return Err(Error::from_token_body(status, &body));
        }

        let token: TokenResponse =
            serde_json::from_slice(&body).map_err(|source| TransportError::Malformed {
                context: "token",
                status,
                source,
            })?;

        info!(
            grant = grant,
            instance_url = %token.instance_url,
            access_token = %token_fingerprint(&token.access_token),
            refresh_token_issued = token.refresh_token.is_some(),
            "Token issued"
        );

        Ok(token)
    }
}
