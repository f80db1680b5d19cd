//! Client configuration.
//!
//! [`Configuration`] is handed to a [`Client`](crate::Client) once and never
//! changes afterwards. [`Settings`] carries the plain-data subset and can be
//! deserialized when the `serde` feature is enabled.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::rustls::ClientConfig;

use crate::caps::{CapHandler, EnableCapHandler, TlsCapHandler};

/// Default IRC port.
pub const DEFAULT_PORT: u16 = 6667;

/// Default idle read timeout after which the server is pinged.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default upper bound on the whole registration handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// WEBIRC gateway parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WebIrc {
    /// Gateway password.
    pub password: String,
    /// Gateway username.
    pub username: String,
    /// Hostname of the real client.
    pub hostname: String,
    /// Address of the real client.
    pub address: IpAddr,
}

/// Everything a client needs to connect, register and recover.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Server host name; resolved on every connect.
    pub server_hostname: String,
    /// Server port.
    pub server_port: u16,
    /// Server password sent as `PASS`, if non-blank.
    pub server_password: Option<String>,
    /// Local address to bind before connecting.
    pub local_address: Option<IpAddr>,
    /// Wrap the socket in TLS right after connecting.
    pub use_tls: bool,
    /// TLS client config for direct TLS and STARTTLS; platform roots when unset.
    pub tls_config: Option<Arc<ClientConfig>>,
    /// Nick to register with.
    pub name: String,
    /// Login (ident username).
    pub login: String,
    /// Version string, sent as the realname.
    pub version: String,
    /// Run CAP negotiation during registration.
    pub cap_enabled: bool,
    /// Capability handlers, consulted in order.
    pub cap_handlers: Vec<Box<dyn CapHandler>>,
    /// Retry with `<name>2`, `<name>3`, ... on 433.
    pub auto_nick_change: bool,
    /// WEBIRC parameters.
    pub webirc: Option<WebIrc>,
    /// Idle time after which the consumer pings the server.
    pub socket_timeout: Duration,
    /// Upper bound on the registration handshake. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Reconnect from `shutdown(false)`.
    pub auto_reconnect: bool,
    /// Rejoin the previous channels after an automatic reconnect.
    pub auto_reconnect_channels: bool,
    /// Channels to join after registration, with their keys.
    pub auto_join_channels: Vec<(String, String)>,
    /// Require a running ident responder.
    pub use_ident_server: bool,
    /// Install the process-exit hook on connect.
    pub shutdown_hook: bool,
    /// Reason sent with the exit hook's `QUIT`.
    pub quit_message: String,
}

impl Configuration {
    /// Defaults for connecting `name` to `server_hostname`.
    pub fn new(server_hostname: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            server_hostname: server_hostname.into(),
            server_port: DEFAULT_PORT,
            server_password: None,
            local_address: None,
            use_tls: false,
            tls_config: None,
            name: name.into(),
            login: "slirc".to_string(),
            version: concat!("slirc-client ", env!("CARGO_PKG_VERSION")).to_string(),
            cap_enabled: true,
            cap_handlers: vec![Box::new(EnableCapHandler::new("multi-prefix", true))],
            auto_nick_change: false,
            webirc: None,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            auto_reconnect: false,
            auto_reconnect_channels: false,
            auto_join_channels: Vec::new(),
            use_ident_server: false,
            shutdown_hook: true,
            quit_message: String::new(),
        }
    }

    /// Add a channel to join after registration.
    pub fn add_auto_join(&mut self, channel: impl Into<String>, key: impl Into<String>) {
        self.auto_join_channels.push((channel.into(), key.into()));
    }

    /// Check the invariants the handshake relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.server_hostname.trim().is_empty() {
            return Err("server hostname must not be blank".to_string());
        }
        if self.server_port == 0 {
            return Err("server port must not be 0".to_string());
        }
        for (what, value) in [("nick", &self.name), ("login", &self.login)] {
            if value.is_empty() || value.contains([' ', '\r', '\n', ':']) {
                return Err(format!("invalid {}: {:?}", what, value));
            }
        }
        if self.socket_timeout.is_zero() {
            return Err("socket timeout must be positive".to_string());
        }
        Ok(())
    }

    /// The server password, unless it is blank.
    pub(crate) fn password(&self) -> Option<&str> {
        self.server_password
            .as_deref()
            .filter(|pass| !pass.trim().is_empty())
    }
}

/// Plain-data client settings, e.g. loaded from a config file.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Server password.
    pub password: Option<String>,
    /// Connect with TLS directly.
    pub tls: bool,
    /// Ask for STARTTLS during CAP negotiation.
    pub starttls: bool,
    /// Nick to register with.
    pub nick: String,
    /// Login (ident username).
    pub login: String,
    /// Realname / version string; crate default when unset.
    pub version: Option<String>,
    /// Capabilities to request; failures are ignored.
    pub request_caps: Vec<String>,
    /// Run CAP negotiation.
    pub cap_enabled: bool,
    /// Retry with numbered nicks on collision.
    pub auto_nick_change: bool,
    /// Reconnect after a dropped connection.
    pub auto_reconnect: bool,
    /// Rejoin channels after reconnecting.
    pub auto_reconnect_channels: bool,
    /// Channels to join, `(name, key)`.
    pub channels: Vec<(String, String)>,
    /// Idle read timeout in seconds.
    pub socket_timeout_secs: u64,
    /// Handshake timeout in seconds, 0 disables it.
    pub handshake_timeout_secs: u64,
    /// WEBIRC parameters.
    pub webirc: Option<WebIrc>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            password: None,
            tls: false,
            starttls: false,
            nick: String::new(),
            login: "slirc".to_string(),
            version: None,
            request_caps: vec!["multi-prefix".to_string()],
            cap_enabled: true,
            auto_nick_change: false,
            auto_reconnect: false,
            auto_reconnect_channels: false,
            channels: Vec::new(),
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT.as_secs(),
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            webirc: None,
        }
    }
}

impl From<Settings> for Configuration {
    fn from(settings: Settings) -> Self {
        let mut config = Configuration::new(settings.host, settings.nick);
        config.server_port = settings.port;
        config.server_password = settings.password;
        config.use_tls = settings.tls;
        config.login = settings.login;
        if let Some(version) = settings.version {
            config.version = version;
        }
        config.cap_enabled = settings.cap_enabled;
        config.cap_handlers = settings
            .request_caps
            .iter()
            .map(|cap| Box::new(EnableCapHandler::new(cap.as_str(), true)) as Box<dyn CapHandler>)
            .collect();
        if settings.starttls {
            config.cap_handlers.push(Box::new(TlsCapHandler::new(false)));
        }
        config.auto_nick_change = settings.auto_nick_change;
        config.auto_reconnect = settings.auto_reconnect;
        config.auto_reconnect_channels = settings.auto_reconnect_channels;
        config.auto_join_channels = settings.channels;
        config.socket_timeout = Duration::from_secs(settings.socket_timeout_secs);
        config.handshake_timeout = match settings.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        config.webirc = settings.webirc;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::new("irc.example.net", "bot");
        assert_eq!(config.server_port, 6667);
        assert!(config.cap_enabled);
        assert_eq!(config.cap_handlers.len(), 1);
        assert!(!config.auto_nick_change);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_nick() {
        let config = Configuration::new("irc.example.net", "two words");
        assert!(config.validate().unwrap_err().contains("nick"));

        let config = Configuration::new("", "bot");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_password_is_not_sent() {
        let mut config = Configuration::new("irc.example.net", "bot");
        config.server_password = Some("   ".to_string());
        assert_eq!(config.password(), None);

        config.server_password = Some("secret".to_string());
        assert_eq!(config.password(), Some("secret"));
    }

    #[test]
    fn test_clone_keeps_handlers() {
        let mut config = Configuration::new("irc.example.net", "bot");
        config.cap_handlers.push(Box::new(TlsCapHandler::new(true)));
        let cloned = config.clone();
        assert_eq!(cloned.cap_handlers.len(), 2);
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            host: "irc.example.net".to_string(),
            nick: "bot".to_string(),
            starttls: true,
            request_caps: vec!["away-notify".to_string(), "account-tag".to_string()],
            channels: vec![("#a".to_string(), "key1".to_string())],
            handshake_timeout_secs: 0,
            ..Settings::default()
        };

        let config = Configuration::from(settings);
        assert_eq!(config.server_hostname, "irc.example.net");
        assert_eq!(config.cap_handlers.len(), 3);
        assert_eq!(config.handshake_timeout, None);
        assert_eq!(config.auto_join_channels, vec![("#a".to_string(), "key1".to_string())]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_from_json() {
        let settings: Settings = serde_json::from_str(
            r##"{"host": "irc.libera.chat", "nick": "slircbot", "channels": [["#rust", ""]]}"##,
        )
        .unwrap();
        assert_eq!(settings.port, 6667);
        assert_eq!(settings.channels, vec![("#rust".to_string(), String::new())]);
    }
}
