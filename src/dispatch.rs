//! Immediate and queueing request dispatch
//!
//! A [`Client`](crate::Client) never checks its own mode. Every operation goes
//! through the injected [`Dispatcher`]:
//!
//! - network-only operations (reads, search, uploads, transcoding) ask for the
//!   transport with [`Dispatcher::network`], which a queueing dispatcher refuses;
//! - mutations hand a [`PendingRequest`] to [`Dispatcher::submit`], which either
//!   sends it now or appends it to the queue;
//! - [`Dispatcher::commit`] flushes the queue as one `/v1/store/transaction` call.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{ApiResponse, Transport};
use crate::types::Mode;

pub const TRANSACTION_PATH: &str = "/v1/store/transaction";

/// A mutation captured for replay inside a combined commit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// API path, e.g. `/v1/store/set`
    pub target_path: String,
    pub payload: Value,
}

impl PendingRequest {
    pub fn new(target_path: impl Into<String>, payload: Value) -> Self {
        Self {
            target_path: target_path.into(),
            payload,
        }
    }
}

/// What `submit` did with a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Sent right away; the response is whatever the service answered
    Sent(ApiResponse),
    /// Appended to the transaction queue
    Queued,
}

/// Routes operations according to the client's mode.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn mode(&self) -> Mode;

    /// Transport for an operation that must run now, or
    /// `UnavailableInTransaction` when this dispatcher only queues.
    fn network(&self, operation: &'static str) -> Result<&dyn Transport>;

    async fn submit(&self, request: PendingRequest) -> Result<Submission>;

    /// Send every queued request as one combined call.
    async fn commit(&self) -> Result<ApiResponse>;

    /// Snapshot of the queue, in insertion order.
    fn pending(&self) -> Vec<PendingRequest>;
}

/// Sends every operation as soon as it is called.
pub struct ImmediateDispatcher {
    transport: Arc<dyn Transport>,
}

impl ImmediateDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Dispatcher for ImmediateDispatcher {
    fn mode(&self) -> Mode {
        Mode::Immediate
    }

    fn network(&self, _operation: &'static str) -> Result<&dyn Transport> {
        Ok(self.transport.as_ref())
    }

    async fn submit(&self, request: PendingRequest) -> Result<Submission> {
        let response = self
            .transport
            .post_json(&request.target_path, &request.payload)
            .await?;
        Ok(Submission::Sent(response))
    }

    async fn commit(&self) -> Result<ApiResponse> {
        Err(Error::NotInTransaction)
    }

    fn pending(&self) -> Vec<PendingRequest> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<PendingRequest>,
    spent: bool,
}

/// Buffers mutations until `commit`. Refuses network-only operations.
///
/// Single writer: the queue is locked only to keep the client `Sync`, not to
/// order concurrent callers.
pub struct QueueingDispatcher {
    transport: Arc<dyn Transport>,
    state: Mutex<QueueState>,
}

impl QueueingDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// `true` once `commit` has been called.
    pub fn is_spent(&self) -> bool {
        self.lock().spent
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Dispatcher for QueueingDispatcher {
    fn mode(&self) -> Mode {
        Mode::Transaction
    }

    fn network(&self, operation: &'static str) -> Result<&dyn Transport> {
        Err(Error::UnavailableInTransaction(operation))
    }

    async fn submit(&self, request: PendingRequest) -> Result<Submission> {
        let mut state = self.lock();
        if state.spent {
            return Err(Error::NotInTransaction);
        }
        debug!(
            "Queued {} (position {})",
            request.target_path,
            state.pending.len()
        );
        state.pending.push(request);
        Ok(Submission::Queued)
    }

    async fn commit(&self) -> Result<ApiResponse> {
        let body = {
            let mut state = self.lock();
            if state.spent {
                return Err(Error::NotInTransaction);
            }
            state.spent = true;

            let endpoint = self.transport.endpoint();
            let operations: Vec<Value> = state
                .pending
                .iter()
                .map(|op| {
                    json!({
                        "uri": endpoint.url_for(&op.target_path),
                        "body": op.payload,
                    })
                })
                .collect();
            json!({ "operations": operations })
        };

        debug!(
            "Committing transaction with {} operation(s)",
            body["operations"].as_array().map_or(0, Vec::len)
        );

        let response = self.transport.post_json(TRANSACTION_PATH, &body).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(response.into_service_error())
        }
    }

    fn pending(&self) -> Vec<PendingRequest> {
        self.lock().pending.clone()
    }
}
