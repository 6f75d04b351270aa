//! Authenticated call path with one automatic refresh-and-retry.

use crate::auth::Authenticator;
use crate::credentials::{token_fingerprint, Credentials, GrantMode};
use crate::error::{Error, Result};
use crate::trace::Tracer;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Executes API calls against the instance URL held in the session's
/// credentials.
///
/// A 401 triggers one refresh of the access token and one retry; a second
/// 401 is reported as [`Error::SessionExpired`]. No other status is retried.
pub struct Dispatcher {
    http_client: reqwest::Client,
    authenticator: Authenticator,
    grant: GrantMode,
    credentials: RwLock<Credentials>,
    refresh_gate: Mutex<()>,
    tracer: RwLock<Option<Tracer>>,
    user_agent: String,
}

impl Dispatcher {
    pub(crate) fn new(
        http_client: reqwest::Client,
        authenticator: Authenticator,
        grant: GrantMode,
        credentials: Credentials,
        user_agent: String,
    ) -> Self {
        Self {
            http_client,
            authenticator,
            grant,
            credentials: RwLock::new(credentials),
            refresh_gate: Mutex::new(()),
            tracer: RwLock::new(None),
            user_agent,
        }
    }

    /// Snapshot of the current credentials.
    pub fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The grant the session was built with.
    pub fn grant(&self) -> &GrantMode {
        &self.grant
    }

    pub(crate) fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub(crate) fn credentials_mut(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_tracer(&self, tracer: Option<Tracer>) {
        *self.tracer.write().unwrap_or_else(PoisonError::into_inner) = tracer;
    }

    fn trace(&self, name: &str, value: impl std::fmt::Display) {
        let tracer = self
            .tracer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(tracer) = tracer {
            tracer.trace(name, value);
        }
    }

    /// GET `path` and decode the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.request(Method::GET, path, query, None::<&()>).await
    }

    /// Issue a call and decode the JSON response body into `T`.
    ///
    /// `path` is relative to the instance URL; an absolute `http(s)://` URL
    /// is used as-is.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let bytes = self.execute(method, path, query, body).await?;
        let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(bytes).map_err(Error::Decode)
    }

    /// Issue a call whose success response carries no payload.
    pub async fn request_empty<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute(method, path, query, body).await.map(|_| ())
    }

    /// Replace the access token now, regardless of whether it has expired.
    pub async fn refresh(&self) -> Result<()> {
        self.reauthenticate(None).await
    }

    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        let mut refreshed = false;

        loop {
            let (url, token) = self.target(path)?;

            let mut req = self
                .http_client
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header(ACCEPT, "application/json")
                .header(USER_AGENT, &self.user_agent);
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(b) = body {
                req = req.json(b);
            }

            self.trace("Request:", format!("{} {}", method, url));

            let response = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    warn!(method = %method, url = %url, "Request timed out");
                }
                Error::from(e)
            })?;

            let status = response.status();
            self.trace("Response:", status);
            debug!(method = %method, url = %url, status = status.as_u16(), refreshed, "API call");

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    warn!(method = %method, url = %url, "Still unauthorized after refreshing the token");
                    return Err(Error::SessionExpired);
                }
                self.reauthenticate(Some(&token)).await?;
                refreshed = true;
                continue;
            }

            let bytes = response.bytes().await?.to_vec();
            self.trace("Response Body:", String::from_utf8_lossy(&bytes));

            if !status.is_success() {
                return Err(Error::from_api_body(status.as_u16(), &bytes));
            }

            return Ok(bytes);
        }
    }

    fn target(&self, path: &str) -> Result<(String, String)> {
        let creds = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let token = creds
            .access_token()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::IncompleteCredentials("no access token".into()))?
            .to_string();

        if path.starts_with("https://") || path.starts_with("http://") {
            return Ok((path.to_string(), token));
        }

        let instance = creds
            .instance_url()
            .ok_or_else(|| Error::IncompleteCredentials("no instance URL".into()))?;
        let url = if path.starts_with('/') {
            format!("{}{}", instance, path)
        } else {
            format!("{}/{}", instance, path)
        };

        Ok((url, token))
    }

    /// Obtain a new access token.
    ///
    /// Callers racing on the same expired token wait on the gate; whoever
    /// finds the token already replaced returns without another grant.
    async fn reauthenticate(&self, stale: Option<&str>) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        let current = self.credentials();

        if let Some(stale) = stale {
            if current.access_token() != Some(stale) {
                debug!("Access token already replaced by a concurrent refresh");
                return Ok(());
            }
        }

        let token = match current.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            Some(refresh_token) => self.authenticator.refresh(&current, refresh_token).await?,
            None => match &self.grant {
                GrantMode::Password { .. } => self
                    .authenticator
                    .authenticate(&current, &self.grant)
                    .await?
                    .ok_or(Error::SessionExpired)?,
                _ => {
                    warn!(grant = self.grant.name(), "No refresh token stored");
                    return Err(Error::SessionExpired);
                }
            },
        };

        info!(
            access_token = %token_fingerprint(&token.access_token),
            "Access token refreshed"
        );
        self.credentials_mut().apply(token);

        Ok(())
    }
}
