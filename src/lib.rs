//! Async client for the Koji document store and object store
//!
//! Every operation becomes an authenticated JSON `POST` against the Koji API.
//! Remote failures are folded into a few local errors: `DocumentNotFound`,
//! `Service`, and the transaction errors.
//!
//! # Features
//! - Document reads, predicate queries and search
//! - Mutations reported as a [`WriteOutcome`]
//! - Client-side transactions: queue mutations, send them as one call
//! - Object store uploads, signed upload requests and transcoding
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use koji_store::Client;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), koji_store::Error> {
//!     // Reads KOJI_PROJECT_ID and KOJI_PROJECT_TOKEN
//!     let client = Client::from_env()?;
//!
//!     if client.set("scores", "alice", &json!({"points": 3})).await.succeeded() {
//!         let doc = client.get("scores", "alice").await?;
//!         println!("Stored: {}", doc);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod multipart;
pub mod transport;
pub mod types;

pub use client::{Client, ClientOptions};
pub use config::{resolve_config, ConfigProvider, Endpoint, EnvConfigProvider, ProjectConfig, ProjectToken};
pub use dispatch::{Dispatcher, ImmediateDispatcher, PendingRequest, QueueingDispatcher, Submission};
pub use error::{Error, Result};
pub use multipart::MultipartForm;
pub use transport::{ApiResponse, HttpTransport, Transport};
pub use types::{
    value_types, Mode, Predicate, PredicateOperator, SignedRequest, SignedUploadRequest, TranscodeJob,
    TranscodeStatus, WriteOutcome,
};
