//! Pair with a TV and show a toast notification.
//!
//! Demonstrates:
//! - Building a client for a TV address
//! - Registering (accept the prompt on the TV the first time)
//! - Sending a fire-and-forget request
//! - Reading a reply with a blocking request
//!
//! Usage:
//!   cargo run --example toast -- 192.168.1.20
//!   cargo run --example toast -- 192.168.1.20 "Dinner is ready"
//!   cargo run --example toast -- 192.168.1.20 --ephemeral --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use anyhow::{Context, bail};
use common::Args;
use serde_json::json;
use webos_client::Client;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_MESSAGE: &str = "Hello, World!";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== Toast ===\n");

    let Some(address) = args.address else {
        bail!("usage: toast <tv-address> [message] [--ephemeral] [--debug]");
    };

    // ========================================================================
    // Create Client
    // ========================================================================

    println!("[1] Creating client for {address}...");

    let mut builder = Client::builder().address(&address);
    if args.ephemeral {
        builder = builder.ephemeral();
    }
    let client = builder.build().context("invalid client configuration")?;

    println!("    Registered: {}\n", client.is_registered());

    // ========================================================================
    // Pair
    // ========================================================================

    println!("[2] Pairing...");
    if !client.is_registered() {
        println!("    Accept the prompt on the TV");
    }

    client
        .register_client()
        .await
        .context("TV did not accept the pairing request")?;

    println!("    ✓ Paired (key: {})\n", client.client_key());

    // ========================================================================
    // Toast
    // ========================================================================

    let message = args.message.as_deref().unwrap_or(DEFAULT_MESSAGE);
    println!("[3] Showing toast \"{message}\"...");

    let id = client.show_toast(message)?;
    println!("    ✓ Sent as {id}\n");

    // ========================================================================
    // Volume
    // ========================================================================

    println!("[4] Reading volume...");

    match client.blocking_request("audio/getVolume", json!({})).await? {
        Some(reply) => println!("    Reply: {}\n", reply["payload"]),
        None => println!("    No reply in time\n"),
    }

    client.close().await;
    println!("=== Done ===");
    Ok(())
}
