//! Koji store client

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ConfigProvider, Endpoint, EnvConfigProvider, ProjectConfig};
use crate::dispatch::{Dispatcher, ImmediateDispatcher, PendingRequest, QueueingDispatcher, Submission};
use crate::error::{Error, Result};
use crate::multipart::MultipartForm;
use crate::transport::{ApiResponse, HttpTransport, Transport, DEFAULT_TIMEOUT_MS};
use crate::types::*;

const GET_PATH: &str = "/v1/store/get";
const GET_COLLECTIONS_PATH: &str = "/v1/store/getCollections";
const SEARCH_PATH: &str = "/v1/store/search";
const GET_ALL_PATH: &str = "/v1/store/getAll";
const GET_ALL_WHERE_PATH: &str = "/v1/store/getAllWhere";
const SET_PATH: &str = "/v1/store/set";
const UPDATE_PATH: &str = "/v1/store/update";
const ARRAY_PUSH_PATH: &str = "/v1/store/update/push";
const ARRAY_REMOVE_PATH: &str = "/v1/store/update/remove";
const DELETE_PATH: &str = "/v1/store/delete";
const UPLOAD_PATH: &str = "/v1/objectStore/upload";
const SIGNED_REQUEST_PATH: &str = "/v1/objectStore/generateSignedRequest";
const TRANSCODE_PATH: &str = "/v1/objectStore/transcode";
const TRANSCODE_STATUS_PATH: &str = "/v1/objectStore/transcode/status";

/// Transport options for clients built by this crate
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL (default: chosen by `KOJI_TEST_MODE`)
    pub endpoint: Endpoint,
    /// Request timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::from_env(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Client for the Koji document store and object store
///
/// A client built by a constructor is in [`Mode::Immediate`]: every call is
/// sent as it is made. [`Client::begin_transaction`] returns a second client in
/// [`Mode::Transaction`] that queues mutations until
/// [`Client::commit_transaction`] and refuses everything else.
///
/// # Example
/// ```rust,no_run
/// use koji_store::{Client, ProjectConfig};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), koji_store::Error> {
///     let client = Client::new(ProjectConfig::new("project-id", "project-token"))?;
///
///     client.set("players", "alice", &json!({"score": 10})).await;
///     let alice = client.get("players", "alice").await?;
///     println!("{}", alice);
///
///     let tx = client.begin_transaction();
///     tx.set("players", "bob", &json!({"score": 0})).await;
///     tx.update("players", "alice", &json!({"score": 11})).await;
///     tx.commit_transaction().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<ProjectConfig>,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("project_id", &self.config.project_id)
            .field("endpoint", &self.transport.endpoint().as_str())
            .field("mode", &self.dispatcher.mode())
            .finish()
    }
}

impl Client {
    /// Create a client with explicit credentials and default options
    pub fn new(config: ProjectConfig) -> Result<Self> {
        Self::with_options(config, ClientOptions::default())
    }

    /// Create a client from `KOJI_PROJECT_ID` / `KOJI_PROJECT_TOKEN`
    ///
    /// # Errors
    /// `ConfigurationMissing` if either variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_provider(&EnvConfigProvider)
    }

    /// Create a client with credentials from `provider`
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self> {
        let config = provider.resolve()?;
        Self::new(config)
    }

    /// Create a client with custom transport options
    pub fn with_options(config: ProjectConfig, options: ClientOptions) -> Result<Self> {
        let config = Arc::new(config);
        let transport = HttpTransport::new(config.clone(), options.endpoint, options.timeout_ms)?;
        Ok(Self::from_parts(config, Arc::new(transport)))
    }

    /// Create a client that sends through a caller-supplied transport
    pub fn with_transport(config: ProjectConfig, transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(Arc::new(config), transport)
    }

    fn from_parts(config: Arc<ProjectConfig>, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = Arc::new(ImmediateDispatcher::new(transport.clone()));
        Self {
            config,
            transport,
            dispatcher,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint().as_str()
    }

    pub fn mode(&self) -> Mode {
        self.dispatcher.mode()
    }

    /// Queued mutations, in call order. Always empty for an immediate client.
    pub fn pending_operations(&self) -> Vec<PendingRequest> {
        self.dispatcher.pending()
    }

    // ===== Transactions =====

    /// New client that queues mutations until `commit_transaction`
    ///
    /// Shares this client's configuration and transport; this client is
    /// unaffected.
    pub fn begin_transaction(&self) -> Client {
        debug!("Beginning transaction for project {}", self.config.project_id);
        Client {
            config: self.config.clone(),
            transport: self.transport.clone(),
            dispatcher: Arc::new(QueueingDispatcher::new(self.transport.clone())),
        }
    }

    /// Send every queued mutation as one `/v1/store/transaction` call
    ///
    /// The client is spent afterwards, whether or not the call succeeded.
    ///
    /// # Errors
    /// `NotInTransaction` on an immediate or already committed client,
    /// `Service` if the remote call fails.
    pub async fn commit_transaction(&self) -> Result<()> {
        self.dispatcher.commit().await.map(|_| ())
    }

    // ===== Reads =====

    /// Fetch one document
    ///
    /// # Errors
    /// `DocumentNotFound` if the document does not exist.
    pub async fn get(&self, collection: &str, document_name: &str) -> Result<Value> {
        let body = DocumentRef {
            collection,
            document_name,
        };
        let response = self.read("get", GET_PATH, &body).await?;
        let envelope: DocumentEnvelope<Value> = response.json()?;
        Ok(envelope.document)
    }

    /// Names of every collection in the project
    pub async fn get_collections(&self) -> Result<Vec<String>> {
        let response = self
            .read("get_collections", GET_COLLECTIONS_PATH, &serde_json::json!({}))
            .await?;
        let envelope: CollectionsEnvelope = response.json()?;
        Ok(envelope.collections)
    }

    /// Documents whose `query_key` field matches `query_value`
    pub async fn search(&self, collection: &str, query_key: &str, query_value: &str) -> Result<Vec<Value>> {
        let body = SearchQuery {
            collection,
            query_key,
            query_value,
        };
        let response = self.read("search", SEARCH_PATH, &body).await?;
        let envelope: ResultsEnvelope = response.json()?;
        Ok(envelope.results)
    }

    /// Documents matching one predicate
    pub async fn get_where(&self, collection: &str, predicate: &Predicate) -> Result<Vec<Value>> {
        let body = PredicateQuery {
            collection,
            predicate,
        };
        let response = self.read("get_where", GET_PATH, &body).await?;
        let envelope: DocumentEnvelope<Vec<Value>> = response.json()?;
        Ok(envelope.document)
    }

    /// Fetch several documents by name
    pub async fn get_all(&self, collection: &str, document_names: &[String]) -> Result<Vec<Value>> {
        let body = GetAllQuery {
            collection,
            document_names,
        };
        let response = self.read("get_all", GET_ALL_PATH, &body).await?;
        let envelope: ResultsEnvelope = response.json()?;
        Ok(envelope.results)
    }

    /// Documents whose `predicate_key` compares with any of `predicate_values`
    pub async fn get_all_where(
        &self,
        collection: &str,
        predicate_key: &str,
        predicate_operation: PredicateOperator,
        predicate_values: &[Value],
    ) -> Result<Vec<Value>> {
        let body = GetAllWhereQuery {
            collection,
            predicate_key,
            predicate_operation,
            predicate_values,
        };
        let response = self.read("get_all_where", GET_ALL_WHERE_PATH, &body).await?;
        let envelope: ResultsEnvelope = response.json()?;
        Ok(envelope.results)
    }

    // ===== Mutations =====

    /// Create or replace a document
    pub async fn set(&self, collection: &str, document_name: &str, document_body: &Value) -> WriteOutcome {
        self.write_document(SET_PATH, collection, document_name, document_body)
            .await
    }

    /// Merge `document_body` into an existing document
    ///
    /// Field values may be markers from [`value_types`].
    pub async fn update(&self, collection: &str, document_name: &str, document_body: &Value) -> WriteOutcome {
        self.write_document(UPDATE_PATH, collection, document_name, document_body)
            .await
    }

    /// Append the values in `document_body` to the named array fields
    pub async fn array_push(&self, collection: &str, document_name: &str, document_body: &Value) -> WriteOutcome {
        self.write_document(ARRAY_PUSH_PATH, collection, document_name, document_body)
            .await
    }

    /// Remove the values in `document_body` from the named array fields
    pub async fn array_remove(&self, collection: &str, document_name: &str, document_body: &Value) -> WriteOutcome {
        self.write_document(ARRAY_REMOVE_PATH, collection, document_name, document_body)
            .await
    }

    /// Delete a document
    pub async fn delete(&self, collection: &str, document_name: &str) -> WriteOutcome {
        let body = DocumentRef {
            collection,
            document_name,
        };
        self.write(DELETE_PATH, &body).await
    }

    // ===== Object store =====

    /// Upload a local file; returns its public URL
    pub async fn upload_file(&self, path: impl AsRef<Path>, file_name: &str) -> Result<String> {
        let transport = self.dispatcher.network("upload_file")?;
        let data = tokio::fs::read(path.as_ref()).await?;
        let form = MultipartForm::new(file_name, data)?;
        upload(transport, form).await
    }

    /// Upload in-memory bytes; returns their public URL
    pub async fn upload_bytes(&self, file_name: &str, data: impl Into<bytes::Bytes>) -> Result<String> {
        let transport = self.dispatcher.network("upload_bytes")?;
        let form = MultipartForm::new(file_name, data)?;
        upload(transport, form).await
    }

    /// Pre-authorized request for uploading `file_name` directly to object storage
    pub async fn generate_signed_upload_request(&self, file_name: &str) -> Result<SignedUploadRequest> {
        let body = SignedRequestQuery { file_name };
        let response = self
            .object_call("generate_signed_upload_request", SIGNED_REQUEST_PATH, &body)
            .await?;
        response.json()
    }

    /// Start transcoding the asset at `path`
    pub async fn transcode_asset(&self, path: &str, asset_type: &str) -> Result<TranscodeJob> {
        let body = TranscodeRequest { path, asset_type };
        let response = self
            .object_call("transcode_asset", TRANSCODE_PATH, &body)
            .await?;
        response.json()
    }

    /// Whether the transcode job behind `callback_token` has finished
    pub async fn get_transcode_status(&self, callback_token: &str) -> Result<TranscodeStatus> {
        let body = TranscodeStatusQuery { callback_token };
        let response = self
            .object_call("get_transcode_status", TRANSCODE_STATUS_PATH, &body)
            .await?;
        response.json()
    }

    // ===== Internals =====

    /// Read-family call: 404 becomes `DocumentNotFound`, anything else `Service`.
    async fn read<B: Serialize>(&self, operation: &'static str, path: &str, body: &B) -> Result<ApiResponse> {
        let transport = self.dispatcher.network(operation)?;
        let payload = to_payload(body)?;
        let response = transport.post_json(path, &payload).await?;

        if response.is_success() {
            Ok(response)
        } else if response.is_not_found() {
            Err(Error::DocumentNotFound(describe_target(&payload)))
        } else {
            Err(response.into_service_error())
        }
    }

    /// Object-store call: every failure is `Service`.
    async fn object_call<B: Serialize>(&self, operation: &'static str, path: &str, body: &B) -> Result<ApiResponse> {
        let transport = self.dispatcher.network(operation)?;
        let payload = to_payload(body)?;
        let response = transport.post_json(path, &payload).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(response.into_service_error())
        }
    }

    async fn write_document(
        &self,
        path: &str,
        collection: &str,
        document_name: &str,
        document_body: &Value,
    ) -> WriteOutcome {
        let body = DocumentWrite {
            collection,
            document_name,
            document_body,
        };
        self.write(path, &body).await
    }

    /// Mutation call. Failures are logged and reported as `Failed`, never raised.
    async fn write<B: Serialize>(&self, path: &str, body: &B) -> WriteOutcome {
        let payload = match to_payload(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{} failed: {}", path, e);
                return WriteOutcome::Failed;
            }
        };

        match self.dispatcher.submit(PendingRequest::new(path, payload)).await {
            Ok(Submission::Queued) => WriteOutcome::Queued,
            Ok(Submission::Sent(response)) if response.is_success() => WriteOutcome::Applied,
            Ok(Submission::Sent(response)) => {
                warn!("{} failed: {}", path, response.into_service_error());
                WriteOutcome::Failed
            }
            Err(e) => {
                warn!("{} failed: {}", path, e);
                WriteOutcome::Failed
            }
        }
    }
}

async fn upload(transport: &dyn Transport, form: MultipartForm) -> Result<String> {
    let response = transport.post_multipart(UPLOAD_PATH, form).await?;
    if !response.is_success() {
        return Err(response.into_service_error());
    }
    let envelope: UrlEnvelope = response.json()?;
    Ok(envelope.url)
}

fn to_payload<B: Serialize>(body: &B) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| Error::transport(format!("Failed to encode request body: {}", e)))
}

/// `collection/documentName` for not-found messages.
fn describe_target(payload: &Value) -> String {
    let collection = payload["collection"].as_str().unwrap_or_default();
    match payload["documentName"].as_str() {
        Some(name) => format!("{}/{}", collection, name),
        None => collection.to_string(),
    }
}
