//! Collaborators the lifecycle engine talks to.
//!
//! The engine does not track users or channels, interpret post-registration
//! traffic, run side-channel transfers or answer ident queries. It reaches
//! those through the traits here; [`Collaborators`] bundles one of each,
//! defaulting to the minimal in-crate implementations.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::client::Client;
use crate::event::{EventBus, LogBus};

/// User and channel bookkeeping.
pub trait Directory: Send + Sync {
    /// Rename ourselves to `new`. `commit` must be called with the new nick
    /// while the directory's lock is held; it swaps the client's nick and
    /// returns the old one, so readers never see a half-renamed user.
    fn rename_user(&self, new: &str, commit: &mut dyn FnMut(&str) -> String);

    /// Joined channels with their keys (empty when none).
    fn channel_keys(&self) -> Vec<(String, String)>;

    /// Release all state. Called at the end of every shutdown.
    fn close(&self);
}

/// Consumer of raw server lines.
pub trait LineInterpreter: Send + Sync {
    /// Handle one raw line, during registration and afterwards.
    fn handle_line(&self, client: &Client, line: &str);

    /// Called at the end of every shutdown.
    fn close(&self) {}
}

/// Auxiliary transfer engine (file and chat side channels).
pub trait SideChannelEngine: Send + Sync {
    /// Abort all transfers. Called at the end of every shutdown.
    fn close(&self);
}

/// Ident (RFC 1413) responder.
pub trait IdentResponder: Send + Sync {
    /// Whether the responder is accepting queries.
    fn is_running(&self) -> bool;

    /// Answer queries for the connection from `local_port` to `remote` with `login`.
    fn add_entry(&self, remote: SocketAddr, local_port: u16, login: &str);
}

#[derive(Debug, Default)]
struct Tables {
    nick: Option<String>,
    channels: Vec<(String, String)>,
}

/// In-memory [`Directory`] tracking our own nick and joined channels.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    tables: Mutex<Tables>,
}

impl MemoryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a joined channel, replacing the key if it is already known.
    pub fn add_channel(&self, name: impl Into<String>, key: impl Into<String>) {
        let name = name.into();
        let key = key.into();
        let mut tables = self.tables.lock();
        match tables.channels.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = key,
            None => tables.channels.push((name, key)),
        }
    }

    /// Forget a channel.
    pub fn remove_channel(&self, name: &str) {
        self.tables
            .lock()
            .channels
            .retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Our nick as last committed.
    pub fn nick(&self) -> Option<String> {
        self.tables.lock().nick.clone()
    }
}

impl Directory for MemoryDirectory {
    fn rename_user(&self, new: &str, commit: &mut dyn FnMut(&str) -> String) {
        let mut tables = self.tables.lock();
        let old = commit(new);
        debug!(%old, new, "renaming user");
        tables.nick = Some(new.to_string());
    }

    fn channel_keys(&self) -> Vec<(String, String)> {
        self.tables.lock().channels.clone()
    }

    fn close(&self) {
        let mut tables = self.tables.lock();
        tables.nick = None;
        tables.channels.clear();
    }
}

/// Interpreter that drops every line.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreLines;

impl LineInterpreter for IgnoreLines {
    fn handle_line(&self, _client: &Client, _line: &str) {}
}

/// Side-channel engine with nothing to close.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSideChannel;

impl SideChannelEngine for NoSideChannel {
    fn close(&self) {}
}

/// The collaborators of one client.
#[derive(Clone)]
pub struct Collaborators {
    /// Lifecycle event sink.
    pub events: Arc<dyn EventBus>,
    /// User and channel bookkeeping.
    pub directory: Arc<dyn Directory>,
    /// Raw line consumer.
    pub interpreter: Arc<dyn LineInterpreter>,
    /// Auxiliary transfers.
    pub side_channel: Arc<dyn SideChannelEngine>,
    /// Ident responder, if one runs in this process.
    pub ident: Option<Arc<dyn IdentResponder>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            events: Arc::new(LogBus),
            directory: Arc::new(MemoryDirectory::new()),
            interpreter: Arc::new(IgnoreLines),
            side_channel: Arc::new(NoSideChannel),
            ident: None,
        }
    }
}

impl Collaborators {
    /// Use `events` for lifecycle events.
    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Use `directory` for bookkeeping.
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    /// Use `interpreter` for raw lines.
    pub fn with_interpreter(mut self, interpreter: Arc<dyn LineInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Use `side_channel` for auxiliary transfers.
    pub fn with_side_channel(mut self, side_channel: Arc<dyn SideChannelEngine>) -> Self {
        self.side_channel = side_channel;
        self
    }

    /// Register connections with `ident`.
    pub fn with_ident(mut self, ident: Arc<dyn IdentResponder>) -> Self {
        self.ident = Some(ident);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("ident", &self.ident.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_keep_order_and_update_keys() {
        let dir = MemoryDirectory::new();
        dir.add_channel("#a", "key1");
        dir.add_channel("#b", "");
        dir.add_channel("#A", "key2");

        assert_eq!(
            dir.channel_keys(),
            vec![("#a".to_string(), "key2".to_string()), ("#b".to_string(), String::new())]
        );

        dir.remove_channel("#a");
        assert_eq!(dir.channel_keys().len(), 1);
    }

    #[test]
    fn test_rename_commits_under_lock() {
        let dir = MemoryDirectory::new();
        let mut seen = None;
        dir.rename_user("bot2", &mut |nick| {
            seen = Some(nick.to_string());
            "bot".to_string()
        });

        assert_eq!(seen.as_deref(), Some("bot2"));
        assert_eq!(dir.nick().as_deref(), Some("bot2"));
    }

    #[test]
    fn test_close_clears() {
        let dir = MemoryDirectory::new();
        dir.add_channel("#a", "");
        dir.close();
        assert!(dir.channel_keys().is_empty());
        assert_eq!(dir.nick(), None);
    }
}
