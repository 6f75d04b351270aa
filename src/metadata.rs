//! Lazily fetched, memoized API metadata.
//!
//! Versions, resource maps and record-type schemas are fetched at most once
//! per key and never invalidated implicitly. A new session is needed to see
//! schema changes on the server.

use crate::cache::MemoCache;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::types::{DescribeGlobal, ResourceMap, SObjectDescription, VersionInfo};
use crate::version::url_version;
use std::sync::Arc;
use tracing::debug;

/// Version-less root of the data API.
pub const DATA_ROOT: &str = "/services/data/";

const VERSIONS_KEY: &str = "versions";

/// Per-session metadata cache.
#[derive(Default)]
pub struct MetadataCache {
    versions: MemoCache<Vec<VersionInfo>>,
    resources: MemoCache<ResourceMap>,
    descriptions: MemoCache<SObjectDescription>,
    global: MemoCache<DescribeGlobal>,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// API versions offered by the server, in server order.
    pub async fn versions(&self, dispatcher: &Dispatcher) -> Result<Arc<Vec<VersionInfo>>> {
        if let Some(hit) = self.versions.get(VERSIONS_KEY) {
            return Ok(hit);
        }
        debug!("Fetching API versions");
        let versions: Vec<VersionInfo> = dispatcher.get(DATA_ROOT, &[]).await?;
        Ok(self.versions.insert(VERSIONS_KEY, versions))
    }

    /// Resource name to path map of an API version, e.g. `v36.0`.
    pub async fn resources(
        &self,
        dispatcher: &Dispatcher,
        version: &str,
    ) -> Result<Arc<ResourceMap>> {
        let version = url_version(version);
        if let Some(hit) = self.resources.get(&version) {
            return Ok(hit);
        }
        debug!(version = %version, "Fetching API resources");
        let path = format!("{}{}/", DATA_ROOT, version);
        let resources: ResourceMap = dispatcher.get(&path, &[]).await?;
        Ok(self.resources.insert(&version, resources))
    }

    /// Schema of a record type.
    ///
    /// `sobjects_path` is the `sobjects` entry of the resource map.
    pub async fn describe(
        &self,
        dispatcher: &Dispatcher,
        sobjects_path: &str,
        type_name: &str,
    ) -> Result<Arc<SObjectDescription>> {
        if let Some(hit) = self.descriptions.get(type_name) {
            return Ok(hit);
        }
        debug!(sobject = type_name, "Fetching SObject description");
        let path = format!(
            "{}/{}/describe/",
            sobjects_path.trim_end_matches('/'),
            type_name
        );
        let description: SObjectDescription = dispatcher.get(&path, &[]).await?;
        Ok(self.descriptions.insert(type_name, description))
    }

    /// Summaries of every record type visible to the user.
    pub async fn describe_global(
        &self,
        dispatcher: &Dispatcher,
        sobjects_path: &str,
    ) -> Result<Arc<DescribeGlobal>> {
        if let Some(hit) = self.global.get(sobjects_path) {
            return Ok(hit);
        }
        debug!(path = sobjects_path, "Fetching global describe");
        let global: DescribeGlobal = dispatcher.get(sobjects_path, &[]).await?;
        Ok(self.global.insert(sobjects_path, global))
    }

    /// Drop the resource map of a version so the next lookup refetches it.
    pub fn forget_resources(&self, version: &str) {
        self.resources.remove(&url_version(version));
    }

    /// Record types whose schema is cached, sorted by name.
    pub fn described_types(&self) -> Vec<String> {
        self.descriptions.keys()
    }

    /// Cached schema of a record type, without fetching.
    pub fn cached_description(&self, type_name: &str) -> Option<Arc<SObjectDescription>> {
        self.descriptions.get(type_name)
    }

    /// Number of cached schemas.
    pub fn description_count(&self) -> usize {
        self.descriptions.len()
    }
}
