//! Simple IRC bot example
//!
//! Connects, joins a channel, answers PINGs and logs lifecycle events. The
//! connection is re-established automatically if the server drops it; press
//! Ctrl-C to send QUIT and exit.
//!
//! Run with: `RUST_LOG=slirc_client=debug cargo run --example simple_bot -- irc.libera.chat`

use std::sync::Arc;

use anyhow::Context;
use slirc_client::{ChannelBus, Client, Collaborators, Configuration, Event, LineInterpreter, ParsedLine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Answers server PINGs and prints channel messages.
struct Pong;

impl LineInterpreter for Pong {
    fn handle_line(&self, client: &Client, line: &str) {
        let Ok(parsed) = ParsedLine::parse(line) else {
            return;
        };
        match parsed.code {
            "PING" => {
                let reply = format!("PONG :{}", parsed.param(0).unwrap_or_default());
                let client = client.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.send_raw_line(reply).await {
                        warn!(error = %e, "failed to answer PING");
                    }
                });
            }
            "PRIVMSG" => println!(
                "<{}> {}",
                parsed.sender.unwrap_or_default(),
                parsed.param(1).unwrap_or_default()
            ),
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "irc.libera.chat".to_string());

    let mut config = Configuration::new(host, "slirc_example");
    config.auto_nick_change = true;
    config.auto_reconnect = true;
    config.auto_reconnect_channels = true;
    config.quit_message = "bye".to_string();
    config.add_auto_join("#slirc-example", "");

    let (bus, mut events) = ChannelBus::new();
    let client = Client::with_collaborators(
        config,
        Collaborators::default()
            .with_events(Arc::new(bus))
            .with_interpreter(Arc::new(Pong)),
    );

    client.connect().await.context("initial connect failed")?;
    info!(nick = %client.nick(), caps = ?client.enabled_capabilities(), "✓ registered");

    while let Some(event) = events.recv().await {
        match event {
            Event::Disconnect => {
                info!("disconnected");
                break;
            }
            Event::Reconnect { success: false, cause } => {
                warn!(?cause, "reconnect failed, giving up");
                break;
            }
            other => info!(?other, "event"),
        }
    }

    Ok(())
}
