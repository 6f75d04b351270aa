//! Session construction and bootstrap.

use crate::auth::Authenticator;
use crate::credentials::{Credentials, Environment, GrantMode};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::metadata::MetadataCache;
use crate::trace::{TraceSink, Tracer};
use crate::types::{Identity, ResourceMap, VersionInfo};
use crate::version::{build_user_agent, find_version, select_highest, url_version};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Bootstrap progress. Linear; any failure abandons the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Empty,
    Authenticated,
    VersionSelected,
    ResourcesDiscovered,
    Ready,
}

impl Stage {
    fn next(self) -> Option<Stage> {
        match self {
            Stage::Empty => Some(Stage::Authenticated),
            Stage::Authenticated => Some(Stage::VersionSelected),
            Stage::VersionSelected => Some(Stage::ResourcesDiscovered),
            Stage::ResourcesDiscovered => Some(Stage::Ready),
            Stage::Ready => None,
        }
    }

    /// Move to `to`, which must directly follow the current stage.
    fn advance(self, to: Stage) -> Result<Stage> {
        if self.next() != Some(to) {
            return Err(Error::Config(format!(
                "bootstrap cannot move from {:?} to {:?}",
                self, to
            )));
        }
        debug!(from = ?self, to = ?to, "Bootstrap stage");
        Ok(to)
    }
}

/// Builder for constructing a [`Session`].
pub struct SessionBuilder {
    client_id: String,
    client_secret: String,
    grant: Option<GrantMode>,
    environment: Environment,
    login_url: Option<String>,
    timeout: Duration,
    api_version: Option<String>,
    user_agent_suffix: Option<String>,
    trace: Option<(String, Arc<dyn TraceSink>)>,
}

impl SessionBuilder {
    /// Create a new session builder for a connected app.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            grant: None,
            environment: Environment::default(),
            login_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            api_version: None,
            user_agent_suffix: None,
            trace: None,
        }
    }

    /// Authenticate with the resource-owner password grant.
    pub fn password(
        self,
        username: impl Into<String>,
        password: impl Into<String>,
        security_token: impl Into<String>,
    ) -> Self {
        self.grant(GrantMode::Password {
            username: username.into(),
            password: password.into(),
            security_token: security_token.into(),
        })
    }

    /// Authenticate with a code received on `redirect_uri`.
    pub fn authorization_code(
        self,
        code: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        self.grant(GrantMode::AuthorizationCode {
            code: code.into(),
            redirect_uri: redirect_uri.into(),
        })
    }

    /// Use a token pair obtained elsewhere.
    pub fn access_token(
        self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        instance_url: impl Into<String>,
    ) -> Self {
        self.grant(GrantMode::PresetToken {
            access_token: Some(access_token.into()),
            refresh_token: refresh_token.into(),
            instance_url: instance_url.into(),
        })
    }

    /// Start from a refresh token only; the access token is fetched on connect.
    pub fn refresh_token(
        self,
        refresh_token: impl Into<String>,
        instance_url: impl Into<String>,
    ) -> Self {
        self.grant(GrantMode::PresetToken {
            access_token: None,
            refresh_token: refresh_token.into(),
            instance_url: instance_url.into(),
        })
    }

    /// Set the grant explicitly. Replaces any grant set before.
    pub fn grant(mut self, grant: GrantMode) -> Self {
        self.grant = Some(grant);
        self
    }

    /// Select the production or sandbox login host.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Override the login host, e.g. a My Domain URL.
    pub fn login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pin an API version instead of using the highest one offered.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Set a custom User-Agent suffix.
    pub fn user_agent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    /// Trace every request and response from the start, bootstrap included.
    pub fn trace(mut self, prefix: impl Into<String>, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some((prefix.into(), sink));
        self
    }

    /// Authenticate, select the API version and discover resources.
    ///
    /// Returns a ready session or the first error; a partially initialized
    /// session is never handed out.
    pub async fn connect(self) -> Result<Session> {
        let grant = self.grant.ok_or_else(|| {
            Error::IncompleteCredentials("no grant configured on the session builder".into())
        })?;

        let credentials =
            Credentials::new(&self.client_id, &self.client_secret, self.environment, &grant);
        precheck(&credentials, &grant)?;

        let login_url = self
            .login_url
            .unwrap_or_else(|| self.environment.login_url().to_string());

        // Warn about insecure connections
        if !login_url.starts_with("https://") {
            warn!(
                login_url = %login_url,
                "Login URL is not using HTTPS. This is insecure."
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()?;

        let user_agent = build_user_agent(self.user_agent_suffix.as_deref());
        let authenticator = Authenticator::new(http_client.clone(), &login_url, &user_agent);
        let dispatcher = Dispatcher::new(
            http_client,
            authenticator,
            grant,
            credentials,
            user_agent,
        );
        if let Some((prefix, sink)) = self.trace {
            dispatcher.set_tracer(Some(Tracer::new(&prefix, sink)));
        }

        let mut stage = Stage::Empty;
        debug!(
            stage = ?stage,
            grant = dispatcher.grant().name(),
            token_url = dispatcher.authenticator().token_url(),
            "Bootstrapping session"
        );

        let snapshot = dispatcher.credentials();
        if let Some(token) = dispatcher
            .authenticator()
            .authenticate(&snapshot, dispatcher.grant())
            .await?
        {
            dispatcher.credentials_mut().apply(token);
        }
        dispatcher.credentials().validate()?;
        stage = stage.advance(Stage::Authenticated)?;

        let metadata = MetadataCache::new();
        let versions = metadata.versions(&dispatcher).await?;
        let selected = match self.api_version.as_deref() {
            Some(wanted) => find_version(&versions, wanted).ok_or_else(|| {
                Error::Config(format!(
                    "API version {} is not offered by the server",
                    url_version(wanted)
                ))
            })?,
            None => select_highest(&versions)
                .ok_or_else(|| Error::Config("server offered no API versions".into()))?,
        };
        let api_version = url_version(&selected.version);
        stage = stage.advance(Stage::VersionSelected)?;

        let resources = metadata.resources(&dispatcher, &api_version).await?;
        stage = stage.advance(Stage::ResourcesDiscovered)?;

        let stage = stage.advance(Stage::Ready)?;
        let instance_url = dispatcher.credentials().instance_url.unwrap_or_default();
        info!(
            api_version = %api_version,
            resources = resources.len(),
            instance_url = %instance_url,
            stage = ?stage,
            "Session ready"
        );

        Ok(Session {
            dispatcher,
            metadata,
            api_version,
        })
    }
}

fn precheck(credentials: &Credentials, grant: &GrantMode) -> Result<()> {
    match grant {
        GrantMode::PresetToken {
            access_token: None,
            refresh_token,
            instance_url,
        } => {
            if credentials.client_id.is_empty()
                || credentials.client_secret.is_empty()
                || refresh_token.is_empty()
                || instance_url.is_empty()
            {
                return Err(Error::IncompleteCredentials(
                    "a refresh token grant needs client id, client secret, refresh token and instance URL"
                        .into(),
                ));
            }
            Ok(())
        }
        _ => credentials.validate(),
    }
}

/// An authenticated, discovered connection to one org.
///
/// Safe to share between tasks: metadata lookups and reads may run
/// concurrently, and a token refresh replaces the credentials under an
/// exclusive lock.
///
/// # Example
///
/// ```rust,no_run
/// use sforce::Session;
///
/// #[tokio::main]
/// async fn main() -> Result<(), sforce::Error> {
///     let session = Session::builder("client-id", "client-secret")
///         .password("user@example.com", "password", "security-token")
///         .connect()
///         .await?;
///
///     println!("connected with API {}", session.api_version());
///     Ok(())
/// }
/// ```
pub struct Session {
    dispatcher: Dispatcher,
    metadata: MetadataCache,
    api_version: String,
}

impl Session {
    /// Create a new session builder.
    pub fn builder(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> SessionBuilder {
        SessionBuilder::new(client_id, client_secret)
    }

    /// Selected API version, e.g. `v36.0`.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Snapshot of the current credentials, safe to persist.
    pub fn credentials(&self) -> Credentials {
        self.dispatcher.credentials()
    }

    /// The authenticated call path, for resources without a dedicated method.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// API versions offered by the server.
    pub async fn versions(&self) -> Result<Arc<Vec<VersionInfo>>> {
        self.metadata.versions(&self.dispatcher).await
    }

    /// Resource map of the session's API version.
    pub async fn resources(&self) -> Result<Arc<ResourceMap>> {
        self.metadata
            .resources(&self.dispatcher, &self.api_version)
            .await
    }

    /// Path of a named resource, e.g. `sobjects`.
    pub async fn resource_path(&self, name: &str) -> Result<String> {
        self.resources()
            .await?
            .get(name)
            .map(|p| p.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::MissingResource(name.to_string()))
    }

    /// Drop and refetch the resource map.
    pub async fn rediscover_resources(&self) -> Result<Arc<ResourceMap>> {
        self.metadata.forget_resources(&self.api_version);
        self.resources().await
    }

    /// Replace the access token now.
    pub async fn refresh_token(&self) -> Result<()> {
        self.dispatcher.refresh().await
    }

    /// Fetch the authenticated user from the identity URL.
    pub async fn identity(&self) -> Result<Identity> {
        let url = self
            .credentials()
            .id
            .ok_or_else(|| Error::IncompleteCredentials("no identity URL was issued".into()))?;
        self.dispatcher.get(&url, &[]).await
    }

    /// Send every request, response status and response body to `sink`.
    ///
    /// A non-empty `prefix` is written in front of each message.
    pub fn trace_on(&self, prefix: &str, sink: Arc<dyn TraceSink>) {
        self.dispatcher.set_tracer(Some(Tracer::new(prefix, sink)));
    }

    /// Stop tracing. Idempotent.
    pub fn trace_off(&self) {
        self.dispatcher.set_tracer(None);
    }
}
