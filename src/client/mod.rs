//! The IRC client and its connection lifecycle.
//!
//! A [`Client`] is a cheap, clonable handle. [`Client::connect`] performs the
//! registration handshake on the calling task and then hands the read side
//! to a single background consumer task; [`Client::shutdown`] tears the
//! connection down exactly once and optionally reconnects.

mod connect;
mod reader;
mod shutdown;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Span};

use crate::collab::Collaborators;
use crate::config::Configuration;
use crate::error::LineError;
use crate::event::Event;
use crate::output;
use crate::state::{ConnectionState, ShutdownGuard};
use crate::transport::LineWriter;

use self::shutdown::boxed_lost_link;

static BOT_COUNT: AtomicUsize = AtomicUsize::new(0);

pub(crate) struct Inner {
    id: usize,
    span: Span,
    config: Configuration,
    collab: Collaborators,
    state: Mutex<ConnectionState>,
    nick: Mutex<String>,
    logged_in: AtomicBool,
    tls: AtomicBool,
    enabled_caps: Mutex<Arc<[String]>>,
    closer: Mutex<Option<CancellationToken>>,
    writer: tokio::sync::Mutex<Option<LineWriter>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    exit_hook: Mutex<Option<JoinHandle<()>>>,
    handshake: tokio::sync::Mutex<()>,
    guard: ShutdownGuard,
    auto_reconnect: AtomicBool,
    auto_reconnect_channels: AtomicBool,
    attempted: AtomicBool,
    /// Bumped for every connection handed to a consumer task.
    generation: AtomicU64,
}

/// Handle to one IRC connection.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// A disconnected client with the default collaborators.
    pub fn new(config: Configuration) -> Self {
        Self::with_collaborators(config, Collaborators::default())
    }

    /// A disconnected client using `collab`.
    pub fn with_collaborators(config: Configuration, collab: Collaborators) -> Self {
        let id = BOT_COUNT.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("client", bot = %format_args!("bot{}", id));
        let nick = config.name.clone();

        Self {
            inner: Arc::new(Inner {
                id,
                span,
                auto_reconnect: AtomicBool::new(config.auto_reconnect),
                auto_reconnect_channels: AtomicBool::new(config.auto_reconnect_channels),
                config,
                collab,
                state: Mutex::new(ConnectionState::Disconnected),
                nick: Mutex::new(nick),
                logged_in: AtomicBool::new(false),
                tls: AtomicBool::new(false),
                enabled_caps: Mutex::new(Arc::from(Vec::new())),
                closer: Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
                reader_task: Mutex::new(None),
                exit_hook: Mutex::new(None),
                handshake: tokio::sync::Mutex::new(()),
                guard: ShutdownGuard::new(),
                attempted: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Process-wide sequence number of this client.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether the client is registered and its consumer task is running.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether registration completed on the current connection.
    pub fn is_logged_in(&self) -> bool {
        self.inner.logged_in.load(Ordering::Acquire)
    }

    /// Whether the current connection is encrypted, from the start or after `STARTTLS`.
    pub fn is_tls(&self) -> bool {
        self.inner.tls.load(Ordering::Acquire)
    }

    /// Our current nick.
    pub fn nick(&self) -> String {
        self.inner.nick.lock().clone()
    }

    /// Capabilities enabled during the last registration.
    pub fn enabled_capabilities(&self) -> Arc<[String]> {
        self.inner.enabled_caps.lock().clone()
    }

    /// Whether a dropped connection is re-established.
    pub fn auto_reconnect(&self) -> bool {
        self.inner.auto_reconnect.load(Ordering::Acquire)
    }

    /// Enable or disable reconnecting after a dropped connection.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.auto_reconnect.store(enabled, Ordering::Release);
    }

    /// Whether channels are rejoined after an automatic reconnect.
    pub fn auto_reconnect_channels(&self) -> bool {
        self.inner.auto_reconnect_channels.load(Ordering::Acquire)
    }

    /// Enable or disable rejoining channels after an automatic reconnect.
    pub fn set_auto_reconnect_channels(&self, enabled: bool) {
        self.inner
            .auto_reconnect_channels
            .store(enabled, Ordering::Release);
    }

    /// Record a new nick for ourselves, atomically with the directory entry.
    ///
    /// The old nick is read and replaced inside the directory's lock.
    pub fn set_nick(&self, nick: &str) {
        let slot = &self.inner.nick;
        self.inner.collab.directory.rename_user(nick, &mut |new: &str| {
            std::mem::replace(&mut *slot.lock(), new.to_string())
        });
    }

    /// Send one raw line. Embedded line endings truncate the line.
    pub async fn send_raw_line(&self, line: impl Into<String>) -> Result<(), LineError> {
        let mut writer = self.inner.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => writer.write_line(line).await,
            None => Err(LineError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected",
            ))),
        }
    }

    /// `JOIN <channel> [<key>]`
    pub async fn send_join(&self, channel: &str, key: &str) -> Result<(), LineError> {
        self.send_raw_line(output::join(channel, key)).await
    }

    /// `QUIT [:<reason>]`
    pub async fn send_quit(&self, reason: &str) -> Result<(), LineError> {
        self.send_raw_line(output::quit(reason)).await
    }

    /// Allow the next teardown. If the current connection was lost while the
    /// guard was held, tear it down now.
    pub(crate) fn rearm_shutdown(&self) {
        let current = self.inner.generation.load(Ordering::Acquire);
        if self.inner.guard.clear() == Some(current) {
            info!("connection lost while being set up, shutting down");
            reader::spawn_shutdown(self.clone(), current);
        }
    }

    pub(crate) fn span(&self) -> Span {
        self.inner.span.clone()
    }

    pub(crate) fn dispatch(&self, event: Event) {
        self.inner.collab.events.dispatch(event);
    }

    /// Move to `next`, logging transitions the lifecycle does not allow.
    pub(crate) fn advance(&self, next: ConnectionState) {
        let mut state = self.inner.state.lock();
        if *state == next {
            return;
        }
        if state.can_advance_to(next) {
            debug!(from = %*state, to = %next, "state transition");
        } else {
            debug!(from = %*state, to = %next, "unexpected state transition");
        }
        *state = next;
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = &self.inner.config;
        write!(
            f,
            "Version{{{}}} Connected{{{}}} Server{{{}}} Port{{{}}} Password{{{}}}",
            config.version,
            self.is_connected(),
            config.server_hostname,
            config.server_port,
            config.server_password.as_deref().unwrap_or_default()
        )
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{Directory, MemoryDirectory};

    #[test]
    fn test_display_summary() {
        let mut config = Configuration::new("irc.example.net", "bot");
        config.version = "slirc 1.0".to_string();
        config.server_password = Some("pw".to_string());
        let client = Client::new(config);

        assert_eq!(
            client.to_string(),
            "Version{slirc 1.0} Connected{false} Server{irc.example.net} Port{6667} Password{pw}"
        );
        assert_eq!(format!("{:?}", client), client.to_string());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Client::new(Configuration::new("irc.example.net", "a"));
        let b = Client::new(Configuration::new("irc.example.net", "b"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_set_nick_updates_directory() {
        let dir = Arc::new(MemoryDirectory::new());
        let client = Client::with_collaborators(
            Configuration::new("irc.example.net", "bot"),
            Collaborators::default().with_directory(dir.clone()),
        );

        client.set_nick("bot_");
        assert_eq!(client.nick(), "bot_");
        assert_eq!(dir.nick().as_deref(), Some("bot_"));
    }

    /// Records every rename it sees, under its own lock.
    #[derive(Default)]
    struct RenameLog(parking_lot::Mutex<Vec<(String, String)>>);

    impl Directory for RenameLog {
        fn rename_user(&self, new: &str, commit: &mut dyn FnMut(&str) -> String) {
            let mut log = self.0.lock();
            let old = commit(new);
            log.push((old, new.to_string()));
        }

        fn channel_keys(&self) -> Vec<(String, String)> {
            Vec::new()
        }

        fn close(&self) {}
    }

    #[test]
    fn test_concurrent_renames_chain() {
        let log = Arc::new(RenameLog::default());
        let client = Client::with_collaborators(
            Configuration::new("irc.example.net", "bot"),
            Collaborators::default().with_directory(log.clone()),
        );

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let client = client.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        client.set_nick(&format!("bot{t}_{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // every rename starts from the nick the previous one committed
        let log = log.0.lock();
        assert_eq!(log.len(), 400);
        assert_eq!(log[0].0, "bot");
        for pair in log.windows(2) {
            assert_eq!(pair[1].0, pair[0].1);
        }
        assert_eq!(client.nick(), log[399].1);
    }

    #[test]
    fn test_runtime_reconnect_flags() {
        let mut config = Configuration::new("irc.example.net", "bot");
        config.auto_reconnect = true;
        let client = Client::new(config);
        assert!(client.auto_reconnect());
        assert!(!client.auto_reconnect_channels());

        client.set_auto_reconnect(false);
        client.set_auto_reconnect_channels(true);
        assert!(!client.auto_reconnect());
        assert!(client.auto_reconnect_channels());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let client = Client::new(Configuration::new("irc.example.net", "bot"));
        let err = client.send_raw_line("PING x").await.unwrap_err();
        assert!(matches!(err, LineError::Io(e) if e.kind() == io::ErrorKind::NotConnected));
    }
}
