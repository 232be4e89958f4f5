//! Basic usage example for the Koji store client
//!
//! Run with: KOJI_PROJECT_ID=... KOJI_PROJECT_TOKEN=... cargo run --example basic_usage

use koji_store::{Client, Error, Predicate, PredicateOperator};
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    // Credentials come from KOJI_PROJECT_ID / KOJI_PROJECT_TOKEN
    let client = Client::from_env()?;
    info!("Using endpoint {}", client.endpoint());

    info!("Storing 'players/alice'...");
    let outcome = client.set("players", "alice", &json!({"name": "Alice", "score": 30})).await;
    info!("Stored: {}", outcome.succeeded());

    info!("Retrieving 'players/alice'...");
    let alice = client.get("players", "alice").await?;
    info!("Retrieved: {}", alice);

    info!("Players scoring above 10...");
    let high = client
        .get_where("players", &Predicate::new("score", PredicateOperator::GreaterThan, 10))
        .await?;
    for player in &high {
        info!("  - {}", player);
    }

    info!("Collections: {:?}", client.get_collections().await?);

    info!("Deleting 'players/alice'...");
    info!("Deleted: {}", client.delete("players", "alice").await.succeeded());

    match client.get("players", "alice").await {
        Err(Error::DocumentNotFound(target)) => info!("{} is gone", target),
        other => info!("Unexpected: {:?}", other),
    }

    info!("Example completed successfully!");
    Ok(())
}
