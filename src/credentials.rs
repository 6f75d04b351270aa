//! OAuth2 credentials and grant selection.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Login host for production orgs.
pub const PRODUCTION_LOGIN_URL: &str = "https://login.salesforce.com";

/// Login host for sandbox orgs.
pub const SANDBOX_LOGIN_URL: &str = "https://test.salesforce.com";

/// Which login host issues tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// `login.salesforce.com`
    #[default]
    Production,
    /// `test.salesforce.com`
    Sandbox,
}

impl Environment {
    /// Base URL of the login host.
    pub fn login_url(&self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_LOGIN_URL,
            Environment::Sandbox => SANDBOX_LOGIN_URL,
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "sandbox" => Ok(Environment::Sandbox),
            other => Err(Error::Config(format!(
                "unknown environment `{}`, expected `production` or `sandbox`",
                other
            ))),
        }
    }
}

/// The protocol used to obtain the first access token.
///
/// Chosen once when a session is built and never re-derived from which
/// credential fields happen to be set later on.
#[derive(Clone, PartialEq, Eq)]
pub enum GrantMode {
    /// Resource-owner password grant. The security token is appended to the
    /// password on the wire.
    Password {
        username: String,
        password: String,
        security_token: String,
    },
    /// Authorization-code grant for a code received on `redirect_uri`.
    AuthorizationCode { code: String, redirect_uri: String },
    /// Tokens obtained elsewhere. If only a refresh token is supplied, the
    /// access token is fetched with the refresh grant during bootstrap.
    PresetToken {
        access_token: Option<String>,
        refresh_token: String,
        instance_url: String,
    },
}

impl GrantMode {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            GrantMode::Password { .. } => "password",
            GrantMode::AuthorizationCode { .. } => "authorization_code",
            GrantMode::PresetToken { .. } => "preset_token",
        }
    }
}

impl fmt::Debug for GrantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantMode::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            GrantMode::AuthorizationCode { redirect_uri, .. } => f
                .debug_struct("AuthorizationCode")
                .field("redirect_uri", redirect_uri)
                .finish_non_exhaustive(),
            GrantMode::PresetToken { instance_url, .. } => f
                .debug_struct("PresetToken")
                .field("instance_url", instance_url)
                .finish_non_exhaustive(),
        }
    }
}

/// Client identity, grant secrets and the current token pair.
///
/// Owned by a session. The access token is replaced in place on refresh;
/// the refresh token only when the server issues a new one.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Base URL of the org's API host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_url: Option<String>,
    /// Identity URL issued with the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Credentials {
    /// Credentials for the given client and grant.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        environment: Environment,
        grant: &GrantMode,
    ) -> Self {
        let mut creds = Credentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Default::default()
        };

        match grant {
            GrantMode::Password {
                username,
                password,
                security_token,
            } => {
                creds.username = Some(username.clone());
                creds.password = Some(password.clone());
                creds.security_token = Some(security_token.clone());
                creds.environment = Some(environment);
            }
            GrantMode::AuthorizationCode { code, redirect_uri } => {
                creds.code = Some(code.clone());
                creds.redirect_uri = Some(redirect_uri.clone());
                creds.environment = Some(environment);
            }
            GrantMode::PresetToken {
                access_token,
                refresh_token,
                instance_url,
            } => {
                creds.access_token = access_token.clone();
                creds.refresh_token = Some(refresh_token.clone());
                creds.instance_url = Some(instance_url.trim_end_matches('/').to_string());
            }
        }

        creds
    }

    /// Check that at least one usable state holds:
    ///
    /// - access token, refresh token and instance URL;
    /// - client id/secret, username, password, security token and environment;
    /// - client id/secret, authorization code and redirect URI.
    pub fn validate(&self) -> Result<()> {
        if self.has_token_pair() || self.has_password_grant() || self.has_code_grant() {
            return Ok(());
        }
        Err(Error::IncompleteCredentials(
            "expected an access/refresh token pair with an instance URL, \
             password grant fields, or an authorization code with a redirect URI"
                .into(),
        ))
    }

    fn has_token_pair(&self) -> bool {
        present(&self.access_token) && present(&self.refresh_token) && present(&self.instance_url)
    }

    fn has_client(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    fn has_password_grant(&self) -> bool {
        self.has_client()
            && present(&self.username)
            && present(&self.password)
            && present(&self.security_token)
            && self.environment.is_some()
    }

    fn has_code_grant(&self) -> bool {
        self.has_client() && present(&self.code) && present(&self.redirect_uri)
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Instance URL without a trailing slash, if known.
    pub fn instance_url(&self) -> Option<&str> {
        self.instance_url.as_deref()
    }

    /// Store a token endpoint response.
    ///
    /// Keeps the existing refresh token when the response carries none.
    pub(crate) fn apply(&mut self, token: crate::auth::TokenResponse) {
        self.access_token = Some(token.access_token);
        self.instance_url = Some(token.instance_url.trim_end_matches('/').to_string());
        if token.refresh_token.is_some() {
            self.refresh_token = token.refresh_token;
        }
        if token.id.is_some() {
            self.id = token.id;
        }
        if token.issued_at.is_some() {
            self.issued_at = token.issued_at;
        }
        if token.signature.is_some() {
            self.signature = token.signature;
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("environment", &self.environment)
            .field(
                "access_token",
                &self.access_token.as_deref().map(token_fingerprint),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(token_fingerprint),
            )
            .field("instance_url", &self.instance_url)
            .field("id", &self.id)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Fingerprint of a secret for logs (first 16 hex chars of its SHA-256).
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
