//! Rust client for the Force.com REST API.
//!
//! A [`Session`] authenticates against the OAuth2 token endpoint, picks the
//! newest API version the org offers, discovers the resource map and then
//! routes record operations through it. Expired access tokens are refreshed
//! once, transparently, when the API answers 401.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use sforce::{Record, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sforce::Error> {
//!     let session = Session::builder("client-id", "client-secret")
//!         .password("user@example.com", "password", "security-token")
//!         .connect()
//!         .await?;
//!
//!     let mut account = Record::new();
//!     account.insert("Name".into(), json!("Acme"));
//!     let created = session.insert_record("Account", &account).await?;
//!
//!     if let Some(id) = created.id {
//!         let fetched = session.get_record("Account", &id, Some(&["Name"])).await?;
//!         println!("{:?}", fetched);
//!     }
//!     Ok(())
//! }
//! ```

mod auth;
mod cache;
mod credentials;
mod dispatch;
mod error;
mod metadata;
mod session;
mod sobjects;
mod trace;
mod types;
mod version;

pub use auth::{Authenticator, TokenResponse, TOKEN_PATH};
pub use credentials::{
    token_fingerprint, Credentials, Environment, GrantMode, PRODUCTION_LOGIN_URL,
    SANDBOX_LOGIN_URL,
};
pub use dispatch::Dispatcher;
pub use error::{Error, Result, TransportError};
pub use metadata::{MetadataCache, DATA_ROOT};
pub use session::{Session, SessionBuilder};
pub use sobjects::{SObject, MAX_COLLECTION_SIZE};
pub use trace::{LogSink, TraceEvent, TraceSink};
pub use types::*;
pub use version::{compare_versions, parse_version, select_highest, url_version, SDK_VERSION};

/// Re-exported for [`Dispatcher::request`].
pub use reqwest::Method;
