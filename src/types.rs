//! Wire types for the Force.com REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A record as a map of field API name to JSON value.
pub type Record = Map<String, Value>;

/// Resource name to instance-relative path, e.g. `sobjects` ->
/// `/services/data/v36.0/sobjects`.
pub type ResourceMap = HashMap<String, String>;

/// An API version offered by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// Version number without the `v` prefix, e.g. `36.0`.
    pub version: String,
    /// Release label, e.g. `Spring '16`.
    pub label: String,
    /// Instance-relative path of the version root.
    pub url: String,
}

/// One entry of the standard API error envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorEntry {
    /// Error code, e.g. `INVALID_SESSION_ID`.
    pub error_code: String,
    /// Error message
    pub message: String,
    /// Fields the error applies to.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Per-record error inside an [`SObjectResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    /// Error kind, e.g. `REQUIRED_FIELD_MISSING`.
    pub status_code: String,
    /// Error message
    pub message: String,
    /// Fields the error applies to.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Outcome of a write on a single record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SObjectResponse {
    /// Record identifier. Absent when the write failed.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the write succeeded.
    pub success: bool,
    /// Errors in the order the server listed them.
    #[serde(default)]
    pub errors: Vec<RecordError>,
}

/// Schema of a record type as returned by the describe resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SObjectDescription {
    /// API name, e.g. `Account`.
    pub name: String,
    /// Label
    #[serde(default)]
    pub label: String,
    /// Three character id prefix.
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Whether the type is a custom object.
    #[serde(default)]
    pub custom: bool,
    /// Whether records can be created.
    #[serde(default)]
    pub createable: bool,
    /// Whether records can be updated.
    #[serde(default)]
    pub updateable: bool,
    /// Whether records can be deleted.
    #[serde(default)]
    pub deletable: bool,
    /// Whether records can be queried.
    #[serde(default)]
    pub queryable: bool,
    /// Fields in the order the server listed them.
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
    /// Relationships in which this type is the parent.
    #[serde(default)]
    pub child_relationships: Vec<ChildRelationship>,
    /// Named URLs of the type's sub-resources.
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

impl SObjectDescription {
    /// Look up a field by API name.
    pub fn field(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of fields accepted on insert.
    pub fn createable_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.createable)
            .map(|f| f.name.as_str())
    }

    /// Names of fields accepted on update.
    pub fn updateable_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.updateable)
            .map(|f| f.name.as_str())
    }
}

/// A field of a record type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescription {
    /// API name
    pub name: String,
    /// Label
    #[serde(default)]
    pub label: String,
    /// Field type, e.g. `string`, `reference`, `boolean`.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether the field can be set on update.
    #[serde(default)]
    pub updateable: bool,
    /// Whether the field can be set on insert.
    #[serde(default)]
    pub createable: bool,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub length: u32,
    /// Target types of a reference field.
    #[serde(default)]
    pub reference_to: Vec<String>,
    #[serde(default)]
    pub relationship_name: Option<String>,
}

/// A relationship pointing at the described type from a child type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRelationship {
    /// Child type API name.
    #[serde(rename = "childSObject")]
    pub child_sobject: String,
    /// Lookup field on the child.
    pub field: String,
    #[serde(default)]
    pub relationship_name: Option<String>,
    #[serde(default)]
    pub cascade_delete: bool,
}

/// Result of the global describe: every record type available to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeGlobal {
    #[serde(default)]
    pub encoding: String,
    /// Maximum number of records per batch call.
    #[serde(default)]
    pub max_batch_size: u32,
    /// Record type summaries.
    pub sobjects: Vec<SObjectMetaData>,
}

/// Summary entry of the global describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SObjectMetaData {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub createable: bool,
    #[serde(default)]
    pub updateable: bool,
    #[serde(default)]
    pub deletable: bool,
    #[serde(default)]
    pub queryable: bool,
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

/// The authenticated user as returned by the identity URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Identity URL
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Remaining attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of an sObject collection insert or update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionRequest {
    pub all_or_none: bool,
    pub records: Vec<Record>,
}
