//! # slirc-client
//!
//! The connection lifecycle of an IRC client: connecting, registering,
//! negotiating IRCv3 capabilities, upgrading to TLS with `STARTTLS`, and
//! shutting down and reconnecting exactly once per drop.
//!
//! ## Features
//!
//! - Registration handshake with automatic nick changes on `433`
//! - Pluggable CAP negotiation (`multi-prefix`, SASL PLAIN, `STARTTLS`, ...)
//! - Mid-handshake TLS upgrade on `670`
//! - Idempotent shutdown with optional reconnect and channel rejoin
//! - A single background consumer task per connection
//!
//! Everything beyond the lifecycle (tracking users and channels, reacting to
//! messages, file transfers, ident) is reached through the traits in
//! [`collab`].

#![deny(clippy::all)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Quick Start
//!
//! ```no_run
//! use slirc_client::{Client, Configuration};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Configuration::new("irc.libera.chat", "slircbot");
//! config.add_auto_join("#slirc", "");
//! config.auto_reconnect = true;
//! config.auto_reconnect_channels = true;
//!
//! let client = Client::new(config);
//! client.connect().await?;
//! println!("registered as {}", client.nick());
//!
//! client.send_quit("bye").await?;
//! client.shutdown(true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Reacting to lifecycle events
//!
//! ```no_run
//! use std::sync::Arc;
//! use slirc_client::{ChannelBus, Client, Collaborators, Configuration, Event};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (bus, mut events) = ChannelBus::new();
//! let client = Client::with_collaborators(
//!     Configuration::new("irc.libera.chat", "slircbot"),
//!     Collaborators::default().with_events(Arc::new(bus)),
//! );
//! client.connect().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let Event::Reconnect { success: false, cause } = event {
//!         eprintln!("reconnect failed: {:?}", cause);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod caps;
mod client;
pub mod collab;
pub mod config;
pub mod error;
pub mod event;
pub mod line;
pub mod message;
pub mod output;
pub mod state;
pub mod transport;

pub use self::caps::{CapError, CapHandler, EnableCapHandler, SaslCapHandler, TlsCapHandler};
pub use self::client::Client;
pub use self::collab::{
    Collaborators, Directory, IdentResponder, LineInterpreter, MemoryDirectory, SideChannelEngine,
};
pub use self::config::{Configuration, Settings, WebIrc};
pub use self::error::{ConnectError, HandshakeError, LineError, Result, ShutdownError};
pub use self::event::{ChannelBus, Event, EventBus, LogBus};
pub use self::line::{LineCodec, MAX_IRC_LINE_LEN};
pub use self::message::ParsedLine;
pub use self::state::ConnectionState;
