//! Transaction example for the Koji store client
//!
//! Queues several writes and sends them as one combined call.
//!
//! Run with: KOJI_PROJECT_ID=... KOJI_PROJECT_TOKEN=... cargo run --example transaction

use koji_store::{value_types, Client};
use serde_json::json;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let client = Client::from_env()?;

    info!("=== Transaction Example ===");

    let tx = client.begin_transaction();
    tx.set("teams", "red", &json!({"members": ["alice"], "wins": 0})).await;
    tx.array_push("teams", "red", &json!({"members": ["bob"]})).await;
    tx.update("teams", "red", &json!({"wins": value_types::increment(1)})).await;
    tx.delete("teams", "blue").await;

    info!("Queued {} operation(s):", tx.pending_operations().len());
    for op in tx.pending_operations() {
        info!("  {} {}", op.target_path, op.payload);
    }

    // Reads are refused while queueing
    if let Err(e) = tx.get("teams", "red").await {
        warn!("As expected: {}", e);
    }

    tx.commit_transaction().await?;
    info!("Committed");

    let red = client.get("teams", "red").await?;
    info!("teams/red is now {}", red);

    Ok(())
}
