//! Record operations routed through the discovered `sobjects` and
//! `composite` resources.

use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{CollectionRequest, DescribeGlobal, Record, SObjectDescription, SObjectResponse};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Maximum records per sObject collection call.
pub const MAX_COLLECTION_SIZE: usize = 200;

/// Maps a Rust type onto a record type.
///
/// Implementors list their writable fields under their API names and build
/// themselves back from a fetched record.
///
/// ```rust
/// use serde_json::{json, Value};
/// use sforce::{Record, SObject};
///
/// struct Account {
///     id: Option<String>,
///     name: String,
/// }
///
/// impl SObject for Account {
///     fn api_name() -> &'static str {
///         "Account"
///     }
///
///     fn id(&self) -> Option<&str> {
///         self.id.as_deref()
///     }
///
///     fn writable_fields(&self) -> Vec<(&'static str, Value)> {
///         vec![("Name", json!(self.name))]
///     }
///
///     fn from_fields(fields: Record) -> sforce::Result<Self> {
///         Ok(Account {
///             id: fields.get("Id").and_then(Value::as_str).map(String::from),
///             name: fields.get("Name").and_then(Value::as_str).unwrap_or_default().into(),
///         })
///     }
/// }
/// ```
pub trait SObject: Sized {
    /// API name of the record type, e.g. `Account` or `Invoice__c`.
    fn api_name() -> &'static str;

    /// Record identifier, if the record has been saved.
    fn id(&self) -> Option<&str>;

    /// Writable fields as `(API name, value)` pairs, in wire order.
    fn writable_fields(&self) -> Vec<(&'static str, Value)>;

    /// Build the value from a fetched record.
    fn from_fields(fields: Record) -> Result<Self>;

    /// Writable fields as a record.
    fn to_record(&self) -> Record {
        self.writable_fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

impl Session {
    /// Fetch a record. `fields` limits the returned fields.
    pub async fn get_record(
        &self,
        type_name: &str,
        id: &str,
        fields: Option<&[&str]>,
    ) -> Result<Record> {
        let path = self.record_path(type_name, Some(id)).await?;
        let field_list = fields.map(|f| f.join(","));
        let query: Vec<(&str, &str)> = field_list
            .as_deref()
            .map(|f| vec![("fields", f)])
            .unwrap_or_default();

        match self.dispatcher().get(&path, &query).await {
            Err(Error::Api { status: 404, .. }) => {
                Err(Error::NotFound(format!("{} {}", type_name, id)))
            }
            other => other,
        }
    }

    /// Create a record. Read-only keys (`Id`, `attributes`) are not sent.
    pub async fn insert_record(&self, type_name: &str, record: &Record) -> Result<SObjectResponse> {
        let path = self.record_path(type_name, None).await?;
        let body = writable(record);
        let response: SObjectResponse = self
            .dispatcher()
            .request(Method::POST, &path, &[], Some(&body))
            .await?;
        debug!(sobject = type_name, id = ?response.id, "Inserted record");
        Ok(response)
    }

    /// Partially update a record with the given fields.
    pub async fn update_record(&self, type_name: &str, id: &str, record: &Record) -> Result<()> {
        let path = self.record_path(type_name, Some(id)).await?;
        let body = writable(record);
        self.dispatcher()
            .request_empty(Method::PATCH, &path, &[], Some(&body))
            .await
    }

    /// Delete a record.
    pub async fn delete_record(&self, type_name: &str, id: &str) -> Result<()> {
        let path = self.record_path(type_name, Some(id)).await?;
        self.dispatcher()
            .request_empty(Method::DELETE, &path, &[], None::<&()>)
            .await
    }

    /// Create records in one call.
    ///
    /// The result has one entry per input record, in input order. A failed
    /// record does not stop the others.
    pub async fn insert_records(
        &self,
        type_name: &str,
        records: &[Record],
    ) -> Result<Vec<SObjectResponse>> {
        check_batch(records.len())?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let body = CollectionRequest {
            all_or_none: false,
            records: records
                .iter()
                .map(|r| with_attributes(type_name, writable(r)))
                .collect(),
        };
        self.collection(Method::POST, &body).await
    }

    /// Update records in one call. Every record must carry its `Id`.
    pub async fn update_records(
        &self,
        type_name: &str,
        records: &[Record],
    ) -> Result<Vec<SObjectResponse>> {
        check_batch(records.len())?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut prepared = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let id = record
                .get("Id")
                .or_else(|| record.get("id"))
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Config(format!("record {} has no Id", index)))?;
            let mut fields = with_attributes(type_name, writable(record));
            fields.insert("id".into(), json!(id));
            prepared.push(fields);
        }

        let body = CollectionRequest {
            all_or_none: false,
            records: prepared,
        };
        self.collection(Method::PATCH, &body).await
    }

    /// Delete records by id in one call.
    pub async fn delete_records(&self, ids: &[&str]) -> Result<Vec<SObjectResponse>> {
        check_batch(ids.len())?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        for id in ids {
            check_segment("record id", id)?;
        }

        let path = self.collection_path().await?;
        let joined = ids.join(",");
        let results: Vec<SObjectResponse> = self
            .dispatcher()
            .request(
                Method::DELETE,
                &path,
                &[("ids", joined.as_str()), ("allOrNone", "false")],
                None::<&()>,
            )
            .await?;
        check_results(ids.len(), &results)?;
        Ok(results)
    }

    /// Schema of a record type, fetched once per session.
    pub async fn describe(&self, type_name: &str) -> Result<Arc<SObjectDescription>> {
        check_segment("record type", type_name)?;
        let sobjects = self.resource_path("sobjects").await?;
        self.metadata()
            .describe(self.dispatcher(), &sobjects, type_name)
            .await
    }

    /// Summaries of every record type, fetched once per session.
    pub async fn describe_all(&self) -> Result<Arc<DescribeGlobal>> {
        let sobjects = self.resource_path("sobjects").await?;
        self.metadata()
            .describe_global(self.dispatcher(), &sobjects)
            .await
    }

    /// Record types whose schema has been fetched so far.
    pub fn described_types(&self) -> Vec<String> {
        self.metadata().described_types()
    }

    // === Typed ===

    /// Fetch a record as `T`.
    pub async fn get_sobject<T: SObject>(&self, id: &str, fields: Option<&[&str]>) -> Result<T> {
        let record = self.get_record(T::api_name(), id, fields).await?;
        T::from_fields(record)
    }

    /// Create a record from `T`'s writable fields.
    pub async fn insert_sobject<T: SObject>(&self, sobject: &T) -> Result<SObjectResponse> {
        self.insert_record(T::api_name(), &sobject.to_record()).await
    }

    /// Update record `id` with `T`'s writable fields.
    pub async fn update_sobject<T: SObject>(&self, id: &str, sobject: &T) -> Result<()> {
        self.update_record(T::api_name(), id, &sobject.to_record())
            .await
    }

    /// Delete a record of type `T`.
    pub async fn delete_sobject<T: SObject>(&self, id: &str) -> Result<()> {
        self.delete_record(T::api_name(), id).await
    }

    /// Schema of `T`'s record type.
    pub async fn describe_sobject<T: SObject>(&self) -> Result<Arc<SObjectDescription>> {
        self.describe(T::api_name()).await
    }

    /// Create several `T` records in one call.
    pub async fn insert_sobjects<T: SObject>(&self, sobjects: &[T]) -> Result<Vec<SObjectResponse>> {
        let records: Vec<Record> = sobjects.iter().map(T::to_record).collect();
        self.insert_records(T::api_name(), &records).await
    }

    /// Update several saved `T` records in one call.
    pub async fn update_sobjects<T: SObject>(&self, sobjects: &[T]) -> Result<Vec<SObjectResponse>> {
        let mut records = Vec::with_capacity(sobjects.len());
        for (index, sobject) in sobjects.iter().enumerate() {
            let id = sobject
                .id()
                .ok_or_else(|| Error::Config(format!("record {} has no Id", index)))?;
            let mut record = sobject.to_record();
            record.insert("Id".into(), json!(id));
            records.push(record);
        }
        self.update_records(T::api_name(), &records).await
    }

    /// Delete several saved `T` records in one call.
    pub async fn delete_sobjects<T: SObject>(&self, sobjects: &[T]) -> Result<Vec<SObjectResponse>> {
        let mut ids = Vec::with_capacity(sobjects.len());
        for (index, sobject) in sobjects.iter().enumerate() {
            ids.push(
                sobject
                    .id()
                    .ok_or_else(|| Error::Config(format!("record {} has no Id", index)))?,
            );
        }
        self.delete_records(&ids).await
    }

    // === Internal methods ===

    async fn record_path(&self, type_name: &str, id: Option<&str>) -> Result<String> {
        check_segment("record type", type_name)?;
        if let Some(id) = id {
            check_segment("record id", id)?;
        }
        let sobjects = self.resource_path("sobjects").await?;
        Ok(match id {
            Some(id) => format!("{}/{}/{}", sobjects, type_name, id),
            None => format!("{}/{}/", sobjects, type_name),
        })
    }

    async fn collection_path(&self) -> Result<String> {
        let composite = self.resource_path("composite").await?;
        Ok(format!("{}/sobjects", composite))
    }

    async fn collection(
        &self,
        method: Method,
        body: &CollectionRequest,
    ) -> Result<Vec<SObjectResponse>> {
        let path = self.collection_path().await?;
        let results: Vec<SObjectResponse> = self
            .dispatcher()
            .request(method, &path, &[], Some(body))
            .await?;
        check_results(body.records.len(), &results)?;
        debug!(
            records = body.records.len(),
            failed = results.iter().filter(|r| !r.success).count(),
            "sObject collection call"
        );
        Ok(results)
    }
}

fn writable(record: &Record) -> Record {
    record
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "Id" | "id" | "attributes"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn with_attributes(type_name: &str, mut record: Record) -> Record {
    record.insert("attributes".into(), json!({ "type": type_name }));
    record
}

/// Type names and ids become URL path segments; only `[A-Za-z0-9_]` is
/// accepted so a value can never address another resource.
fn check_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Config(format!("invalid {} `{}`", kind, value)));
    }
    Ok(())
}

/// Collection replies carry exactly one result per input, in input order.
fn check_results(expected: usize, results: &[SObjectResponse]) -> Result<()> {
    if results.len() != expected {
        return Err(Error::Decode(serde::de::Error::custom(format!(
            "collection returned {} results for {} records",
            results.len(),
            expected
        ))));
    }
    Ok(())
}

fn check_batch(len: usize) -> Result<()> {
    if len > MAX_COLLECTION_SIZE {
        return Err(Error::Config(format!(
            "{} records exceed the collection limit of {}",
            len, MAX_COLLECTION_SIZE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::connected;
    use wiremock::matchers::{body_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SOBJECTS: &str = "/services/data/v36.0/sobjects";
    const COLLECTION: &str = "/services/data/v36.0/composite/sobjects";

    struct Invoice {
        id: Option<String>,
        number: String,
        paid: bool,
    }

    impl SObject for Invoice {
        fn api_name() -> &'static str {
            "Invoice__c"
        }

        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn writable_fields(&self) -> Vec<(&'static str, Value)> {
            vec![("Number__c", json!(self.number)), ("Paid__c", json!(self.paid))]
        }

        fn from_fields(fields: Record) -> Result<Self> {
            Ok(Invoice {
                id: fields.get("Id").and_then(Value::as_str).map(String::from),
                number: fields
                    .get("Number__c")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                paid: fields.get("Paid__c").and_then(Value::as_bool).unwrap_or(false),
            })
        }
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test records are objects"),
        }
    }

    #[tokio::test]
    async fn get_with_field_list_and_not_found() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("{}/Account/001A", SOBJECTS)))
            .and(query_param("fields", "Name,Id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "attributes": {"type": "Account"},
                "Id": "001A",
                "Name": "Acme"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/Account/001B", SOBJECTS)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!([
                {"errorCode": "NOT_FOUND", "message": "The requested resource does not exist"}
            ])))
            .mount(&server)
            .await;

        let acc = session
            .get_record("Account", "001A", Some(&["Name", "Id"]))
            .await
            .expect("get");
        assert_eq!(acc["Name"], "Acme");

        let err = session.get_record("Account", "001B", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref what) if what == "Account 001B"));
    }

    #[tokio::test]
    async fn insert_and_update_send_writable_fields_only() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{}/Account/", SOBJECTS)))
            .and(body_json(json!({"Name": "Acme"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "001A", "success": true, "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/Account/001A", SOBJECTS)))
            .and(body_json(json!({"Name": "Acme Corp"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let created = session
            .insert_record(
                "Account",
                &record(json!({"Name": "Acme", "attributes": {"type": "Account"}})),
            )
            .await
            .expect("insert");
        assert!(created.success);
        assert_eq!(created.id.as_deref(), Some("001A"));

        session
            .update_record("Account", "001A", &record(json!({"Id": "001A", "Name": "Acme Corp"})))
            .await
            .expect("update");
    }

    #[tokio::test]
    async fn batch_insert_reports_per_record_outcome() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(COLLECTION))
            .and(body_string_contains("\"allOrNone\":false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "001A", "success": true, "errors": []},
                {"success": false, "errors": [{
                    "statusCode": "REQUIRED_FIELD_MISSING",
                    "message": "Required fields are missing: [Name]",
                    "fields": ["Name"]
                }]},
                {"id": "001C", "success": true, "errors": []}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = vec![
            record(json!({"Name": "One"})),
            record(json!({"Name": null})),
            record(json!({"Name": "Three"})),
        ];
        let results = session.insert_records("Account", &records).await.expect("batch");

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| !r.success).count(), 1);
        assert!(!results[1].success);
        assert_eq!(results[1].errors[0].fields, vec!["Name".to_string()]);
        assert_eq!(results[0].id.as_deref(), Some("001A"));
        assert_eq!(results[2].id.as_deref(), Some("001C"));

        let sent = server.received_requests().await.expect("recording");
        let body: Value = sent
            .iter()
            .find(|r| r.url.path() == COLLECTION)
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .unwrap();
        assert_eq!(body["records"][2]["attributes"]["type"], "Account");
        assert_eq!(body["records"][2]["Name"], "Three");
    }

    #[tokio::test]
    async fn batch_update_and_delete() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("PATCH"))
            .and(path(COLLECTION))
            .and(body_string_contains("\"id\":\"a01A\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a01A", "success": true, "errors": []}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(COLLECTION))
            .and(query_param("ids", "a01A,a01B"))
            .and(query_param("allOrNone", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a01A", "success": true, "errors": []},
                {"id": "a01B", "success": false, "errors": [{
                    "statusCode": "ENTITY_IS_DELETED", "message": "entity is deleted", "fields": []
                }]}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let invoice = Invoice {
            id: Some("a01A".into()),
            number: "INV-1".into(),
            paid: true,
        };
        let updated = session
            .update_sobjects(std::slice::from_ref(&invoice))
            .await
            .expect("update");
        assert!(updated[0].success);

        let other = Invoice {
            id: Some("a01B".into()),
            number: "INV-2".into(),
            paid: false,
        };
        let deleted = session
            .delete_sobjects(&[invoice, other])
            .await
            .expect("delete");
        assert!(deleted[0].success);
        assert_eq!(deleted[1].errors[0].status_code, "ENTITY_IS_DELETED");
    }

    #[tokio::test]
    async fn batch_preconditions_fail_locally() {
        let server = MockServer::start().await;
        let session = connected(&server).await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let unsaved = Invoice {
            id: None,
            number: "INV-3".into(),
            paid: false,
        };
        let err = session.update_sobjects(&[unsaved]).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let too_many = vec![record(json!({"Name": "x"})); MAX_COLLECTION_SIZE + 1];
        let err = session.insert_records("Account", &too_many).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(session.insert_records("Account", &[]).await.unwrap().is_empty());
        assert!(session.delete_records(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn typed_roundtrip() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{}/Invoice__c/", SOBJECTS)))
            .and(body_json(json!({"Number__c": "INV-9", "Paid__c": false})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "a01Z", "success": true, "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/Invoice__c/a01Z", SOBJECTS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Id": "a01Z", "Number__c": "INV-9", "Paid__c": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = session
            .insert_sobject(&Invoice {
                id: None,
                number: "INV-9".into(),
                paid: false,
            })
            .await
            .expect("insert");
        let id = created.id.expect("id");

        let fetched: Invoice = session.get_sobject(&id, None).await.expect("get");
        assert_eq!(fetched.id.as_deref(), Some("a01Z"));
        assert_eq!(fetched.number, "INV-9");
    }

    #[tokio::test]
    async fn describe_goes_through_the_cache() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("{}/Invoice__c/describe/", SOBJECTS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Invoice__c",
                "custom": true,
                "fields": [
                    {"name": "Id", "type": "id"},
                    {"name": "Number__c", "type": "string", "createable": true, "updateable": true}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(SOBJECTS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sobjects": [{"name": "Account"}, {"name": "Invoice__c", "custom": true}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let first = session.describe_sobject::<Invoice>().await.expect("describe");
        let second = session.describe("Invoice__c").await.expect("describe");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.custom);
        assert_eq!(session.described_types(), vec!["Invoice__c"]);

        let all = session.describe_all().await.expect("global");
        session.describe_all().await.expect("global");
        assert_eq!(all.sobjects.len(), 2);
    }

    #[tokio::test]
    async fn ids_and_type_names_cannot_escape_their_path() {
        let server = MockServer::start().await;
        let session = connected(&server).await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/Contact/003X", SOBJECTS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": "003X"})))
            .expect(0)
            .mount(&server)
            .await;

        let err = session
            .delete_record("Account", "../Contact/003X")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        for (type_name, id) in [
            ("Account", "001A?fields=Id"),
            ("Account", "001A%2F..%2FContact"),
            ("Account/../Contact", "003X"),
            ("", "001A"),
            ("Account", ""),
        ] {
            assert!(
                matches!(
                    session.get_record(type_name, id, None).await,
                    Err(Error::Config(_))
                ),
                "accepted {} {}",
                type_name,
                id
            );
        }

        assert!(matches!(
            session.describe("../query").await,
            Err(Error::Config(_))
        ));
        assert!(matches!(
            session.delete_records(&["a01A", "a01B,003X"]).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn collection_reply_must_match_input_length() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "001A", "success": true, "errors": []}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a01A", "success": true, "errors": []},
                {"id": "a01B", "success": true, "errors": []},
                {"id": "a01C", "success": true, "errors": []}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = vec![
            record(json!({"Name": "One"})),
            record(json!({"Name": "Two"})),
            record(json!({"Name": "Three"})),
        ];
        let err = session.insert_records("Account", &records).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "unexpected error: {:?}", err);

        let err = session.delete_records(&["a01A", "a01B"]).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "unexpected error: {:?}", err);
    }
}
