//! Request and response shapes for the Koji store

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dispatch mode of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every operation is sent as soon as it is called
    Immediate,
    /// Mutations are queued until `commit_transaction`
    Transaction,
}

/// Outcome of a mutation (`set`, `update`, `array_push`, `array_remove`, `delete`)
///
/// Immediate mutations never return an error: any failure is reported as
/// `Failed` and logged. Callers that need failure detail cannot get it here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The remote call completed with a 2xx status
    Applied,
    /// The remote call failed
    Failed,
    /// The operation was queued in a transaction; there is no result yet
    Queued,
}

impl WriteOutcome {
    /// `true` only for `Applied`
    pub fn succeeded(self) -> bool {
        self == WriteOutcome::Applied
    }

    /// `Some(bool)` for an immediate outcome, `None` for a queued one
    pub fn as_bool(self) -> Option<bool> {
        match self {
            WriteOutcome::Applied => Some(true),
            WriteOutcome::Failed => Some(false),
            WriteOutcome::Queued => None,
        }
    }
}

/// Comparison used by predicate queries. Evaluated by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateOperator {
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "array-contains")]
    ArrayContains,
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not-in")]
    NotIn,
}

/// A `{key, operation, value}` filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub key: String,
    pub operation: PredicateOperator,
    pub value: Value,
}

impl Predicate {
    pub fn new(key: impl Into<String>, operation: PredicateOperator, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            operation,
            value: value.into(),
        }
    }
}

/// Pre-authorized upload target returned by `generate_signed_upload_request`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUploadRequest {
    /// Where the file will be reachable once uploaded
    pub url: String,
    pub signed_request: SignedRequest,
}

/// URL and form fields for a direct upload to object storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub url: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

/// A started transcode job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeJob {
    pub url: String,
    #[serde(default)]
    pub callback_tokens: Vec<String>,
}

/// Progress of a transcode job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeStatus {
    #[serde(rename = "isResolved")]
    pub is_finished: bool,
}

// Request bodies. Field names follow the remote API.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentRef<'a> {
    pub collection: &'a str,
    pub document_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentWrite<'a> {
    pub collection: &'a str,
    pub document_name: &'a str,
    pub document_body: &'a Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct PredicateQuery<'a> {
    pub collection: &'a str,
    pub predicate: &'a Predicate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchQuery<'a> {
    pub collection: &'a str,
    pub query_key: &'a str,
    pub query_value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetAllQuery<'a> {
    pub collection: &'a str,
    pub document_names: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetAllWhereQuery<'a> {
    pub collection: &'a str,
    pub predicate_key: &'a str,
    pub predicate_operation: PredicateOperator,
    pub predicate_values: &'a [Value],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedRequestQuery<'a> {
    pub file_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranscodeRequest<'a> {
    pub path: &'a str,
    #[serde(rename = "type")]
    pub asset_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TranscodeStatusQuery<'a> {
    pub callback_token: &'a str,
}

// Response envelopes.

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentEnvelope<T> {
    pub document: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionsEnvelope {
    pub collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultsEnvelope {
    pub results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UrlEnvelope {
    pub url: String,
}

/// Marker values interpreted by the remote update semantics
pub mod value_types {
    use serde_json::{json, Value};

    /// Field value that makes `update` add `amount` to the stored number.
    pub fn increment(amount: impl Into<Value>) -> Value {
        json!({
            "__kojiValueType": "increment",
            "value": amount.into(),
        })
    }
}
