//! Live Feed Demonstration
//!
//! Connects to an in-memory engine, registers a live query on `person` and
//! prints every notification the relay delivers while records change.
//!
//! Features shown:
//! - Loading configuration (adapter.toml, env overrides)
//! - Watching status transitions
//! - Subscribing to a live query
//! - Clean disconnect
//!
//! Run with: `cargo run --example live_feed`

use anyhow::{anyhow, Context};
use engine_adapter::logging::init_tracing;
use engine_adapter::{AdapterConfig, EmbeddedAdapter, MemoryConnector};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AdapterConfig::load().unwrap_or_else(|e| {
        eprintln!("Using default configuration ({e})");
        AdapterConfig::default()
    });
    init_tracing(&config.logging);

    println!("=== Embedded Engine Live Feed Demo ===\n");

    let adapter = EmbeddedAdapter::from_config(MemoryConnector::new(), &config);
    let mut status = adapter.subscribe_status();
    let status_printer = tokio::spawn(async move {
        while let Ok(event) = status.recv().await {
            match event.error {
                Some(error) => println!("[status] {} ({error})", event.status),
                None => println!("[status] {}", event.status),
            }
        }
    });

    adapter
        .connect_default("mem://")
        .await
        .context("connecting to mem://")?;
    println!("Engine version: {}\n", adapter.version().await?);

    adapter
        .call("use", vec![json!("demo"), json!("demo")])
        .await?
        .into_result()
        .map_err(|e| anyhow!("use failed: {e}"))?;

    // ========================================================================
    // Register a live query
    // ========================================================================
    let live_id = adapter
        .call("live", vec![json!("person")])
        .await?
        .into_result()
        .map_err(|e| anyhow!("live failed: {e}"))?;
    let live_id = live_id
        .as_str()
        .ok_or_else(|| anyhow!("live query id is not a string: {live_id}"))?
        .to_string();
    let mut feed = adapter.subscribe_live(&live_id);
    println!("Watching live query {live_id}\n");

    // ========================================================================
    // Change some records
    // ========================================================================
    adapter
        .call("create", vec![json!("person:ada"), json!({"name": "Ada"})])
        .await?;
    adapter
        .call("merge", vec![json!("person:ada"), json!({"born": 1815})])
        .await?;
    adapter.call("delete", vec![json!("person:ada")]).await?;

    for _ in 0..3 {
        let Some(event) = feed.recv().await else {
            break;
        };
        let action = event
            .action
            .as_ref()
            .map_or("?", |action| action.as_str());
        println!("[{}] {action} {}", event.channel_name(), event.result);
    }

    adapter.disconnect().await?;
    drop(adapter);
    status_printer.abort();

    println!("\n=== Demo Complete ===");
    Ok(())
}
