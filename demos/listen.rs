//! Join a room and print its events.
//!
//! Demonstrates:
//! - Building a client for a host and room
//! - Installing an extension that maps chat messages
//! - Watching client state changes
//! - Terminating on Ctrl+C
//!
//! Usage:
//!   cargo run --example listen
//!   cargo run --example listen -- --room 21452505 --debug
//!   cargo run --example listen -- --host broadcastlv.chat.bilibili.com --no-keep-alive

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use danmaku_socket::{Client, ClientEvent, Error, Extension, MessageRegistry, Result};
use serde_json::{Value, json};

// ============================================================================
// Extension
// ============================================================================

/// Maps chat messages to `{ user, text }`.
struct ChatMessages;

impl Extension for ChatMessages {
    fn name(&self) -> &str {
        "chat-messages"
    }

    fn install(&self, registry: &mut MessageRegistry) {
        registry.register("DANMU_MSG", |raw: &Value| -> Result<Value> {
            let info = &raw["info"];
            let text = info[1]
                .as_str()
                .ok_or_else(|| Error::protocol("DANMU_MSG without text"))?;
            let user = info[2][1].as_str().unwrap_or("?");
            Ok(json!({ "user": user, "text": text }))
        });
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== listen ===\n");
    println!("[1] Building client...");
    println!("    Host: {}", args.host);
    println!("    Room: {}", args.room);

    let client = Client::builder()
        .host(&args.host)
        .room_id(args.room)
        .keep_alive(!args.no_keep_alive)
        .extension(ChatMessages)
        .build()?;

    println!("    ✓ Client ready\n");

    client.subscribe(|event| match event {
        ClientEvent::Open => println!("[open] joined room"),
        ClientEvent::Close => println!("[close] client terminated"),
        ClientEvent::Error(e) => println!("[error] {e}"),
        ClientEvent::Message(event) => match (event.tag(), event.mapped()) {
            (_, Some(chat)) => println!("[chat] {}: {}", chat["user"], chat["text"]),
            (Some(tag), None) => println!("[{tag}]"),
            (None, None) => println!("[?] {}", event.raw()),
        },
    });

    let mut states = client.state_receiver();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            println!("[state] {state}");
        }
    });

    println!("[2] Starting...");
    client.start()?;

    common::wait_for_exit(args.no_wait).await;

    println!("\n[3] Terminating...");
    client.terminate();
    println!("    ✓ Done");
    Ok(())
}
