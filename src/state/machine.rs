//! Sans-IO registration handshake.
//!
//! The machine performs no I/O. It produces the opening lines, consumes
//! each raw line the server sends, and answers with [`HandshakeAction`]s
//! for the connection loop to carry out.
//!
//! # Example
//!
//! ```
//! use slirc_client::state::{HandshakeAction, HandshakeMachine};
//! use slirc_client::Configuration;
//!
//! let mut config = Configuration::new("irc.example.net", "slircbot");
//! config.cap_enabled = false;
//! let mut machine = HandshakeMachine::from_config(&config);
//!
//! let opening = machine.start();
//! assert_eq!(opening[0], "NICK slircbot");
//!
//! let actions = machine.feed(":irc.example.net 001 slircbot :Welcome").unwrap();
//! assert!(actions.contains(&HandshakeAction::Complete));
//! ```

use std::sync::Arc;

use tokio_rustls::rustls::ClientConfig;
use tracing::debug;

use super::ConnectionState;
use crate::caps::{CapHandler, CapabilityNegotiator};
use crate::config::{Configuration, WebIrc};
use crate::error::HandshakeError;
use crate::message::{is_error_numeric, is_registration_success, ParsedLine};
use crate::output;

/// The `n`-th alternative for a nick taken on the server: `<base><n>`.
///
/// Attempts start at 2, so the first collision on `bot` retries as `bot2`.
pub fn alternate_nick(base: &str, attempt: u32) -> String {
    format!("{}{}", base, attempt)
}

/// What the connection loop must do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Write this line to the server.
    Send(String),
    /// Replace the transport with TLS, then call
    /// [`HandshakeMachine::finish_upgrade`] with the same line.
    UpgradeTransport,
    /// Registration is complete.
    Complete,
}

/// The parts of [`Configuration`] the handshake needs.
#[derive(Clone, Debug)]
pub struct HandshakeSettings {
    /// Nick to register with.
    pub nick: String,
    /// Login (ident username).
    pub login: String,
    /// Realname.
    pub realname: String,
    /// Non-blank server password.
    pub password: Option<String>,
    /// WEBIRC parameters.
    pub webirc: Option<WebIrc>,
    /// Run CAP negotiation.
    pub cap_enabled: bool,
    /// Retry with numbered nicks on 433.
    pub auto_nick_change: bool,
}

impl From<&Configuration> for HandshakeSettings {
    fn from(config: &Configuration) -> Self {
        Self {
            nick: config.name.clone(),
            login: config.login.clone(),
            realname: config.version.clone(),
            password: config.password().map(str::to_string),
            webirc: config.webirc.clone(),
            cap_enabled: config.cap_enabled,
            auto_nick_change: config.auto_nick_change,
        }
    }
}

/// Registration state machine for one connection attempt.
#[derive(Debug)]
pub struct HandshakeMachine {
    settings: HandshakeSettings,
    state: ConnectionState,
    negotiator: CapabilityNegotiator,
    nick: String,
    attempts: u32,
    registered: bool,
}

impl HandshakeMachine {
    /// A machine using fresh clones of `handlers`.
    pub fn new(settings: HandshakeSettings, handlers: &[Box<dyn CapHandler>]) -> Self {
        let nick = settings.nick.clone();
        Self {
            settings,
            state: ConnectionState::Registering,
            negotiator: CapabilityNegotiator::new(handlers),
            nick,
            attempts: 1,
            registered: false,
        }
    }

    /// A machine for `config`.
    pub fn from_config(config: &Configuration) -> Self {
        Self::new(HandshakeSettings::from(config), &config.cap_handlers)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The nick we are registering with, collision suffix included.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// The capability negotiator.
    pub fn negotiator(&self) -> &CapabilityNegotiator {
        &self.negotiator
    }

    /// Read-only snapshot of the enabled capabilities.
    pub fn enabled_capabilities(&mut self) -> Arc<[String]> {
        self.negotiator.snapshot()
    }

    /// TLS settings a capability handler asked for, if any.
    pub fn tls_config(&self) -> Option<Arc<ClientConfig>> {
        self.negotiator.tls_config()
    }

    /// The opening lines, in order: `CAP LS`, `WEBIRC`, `PASS`, `NICK`, `USER`.
    pub fn start(&mut self) -> Vec<String> {
        let mut lines = Vec::with_capacity(5);

        if self.settings.cap_enabled {
            self.state = ConnectionState::NegotiatingCapabilities;
            lines.push(output::cap_ls());
        }
        if let Some(webirc) = &self.settings.webirc {
            lines.push(output::webirc(webirc));
        }
        if let Some(password) = &self.settings.password {
            lines.push(output::pass(password));
        }
        lines.push(output::nick(&self.nick));
        lines.push(output::user(&self.settings.login, &self.settings.realname));

        lines
    }

    /// Consume one raw line from the server.
    pub fn feed(&mut self, line: &str) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let mut actions = Vec::new();

        let parsed = match ParsedLine::parse(line) {
            Ok(parsed) if parsed.token_count() >= 2 => parsed,
            _ => return Ok(self.after_line(actions)),
        };

        let code = parsed.code;
        if is_registration_success(code) {
            self.registered = true;
        } else if code == "433" {
            if !self.settings.auto_nick_change {
                return Err(HandshakeError::NickInUse {
                    line: line.to_string(),
                });
            }
            self.attempts += 1;
            self.nick = alternate_nick(&self.settings.nick, self.attempts);
            debug!(nick = %self.nick, "nick in use, trying alternative");
            actions.push(HandshakeAction::Send(output::nick(&self.nick)));
        } else if code == "439" {
            // target change too fast; nothing to do
        } else if code == "451" && self.settings.cap_enabled && is_cap_451(&parsed) {
            // server does not know CAP
        } else if is_error_numeric(code) {
            return Err(HandshakeError::Protocol(line.to_string()));
        } else if code == "670" {
            self.state = ConnectionState::UpgradingTransport;
            actions.push(HandshakeAction::UpgradeTransport);
            return Ok(actions);
        } else if code == "CAP" {
            self.extend_sends(&mut actions, |n| n.handle_cap(&parsed, line))?;
        } else {
            self.extend_sends(&mut actions, |n| n.handle_unknown(line))?;
        }

        Ok(self.after_line(actions))
    }

    /// Continue after the transport was upgraded in response to `line` (`670`).
    pub fn finish_upgrade(&mut self, line: &str) -> Result<Vec<HandshakeAction>, HandshakeError> {
        self.state = if self.settings.cap_enabled {
            ConnectionState::NegotiatingCapabilities
        } else {
            ConnectionState::Registering
        };

        let mut actions = Vec::new();
        self.extend_sends(&mut actions, |n| n.handle_unknown(line))?;
        Ok(self.after_line(actions))
    }

    /// Whether registration has completed.
    pub fn is_complete(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn extend_sends<F>(&mut self, actions: &mut Vec<HandshakeAction>, f: F) -> Result<(), HandshakeError>
    where
        F: FnOnce(&mut CapabilityNegotiator) -> Result<Vec<String>, crate::caps::CapError>,
    {
        let lines = f(&mut self.negotiator)?;
        actions.extend(lines.into_iter().map(HandshakeAction::Send));
        Ok(())
    }

    fn after_line(&mut self, mut actions: Vec<HandshakeAction>) -> Vec<HandshakeAction> {
        if self.settings.cap_enabled {
            if let Some(end) = self.negotiator.try_finish() {
                debug!(caps = ?self.negotiator.enabled().as_slice(), "capability negotiation finished");
                actions.push(HandshakeAction::Send(end));
            }
        }

        let negotiated = !self.settings.cap_enabled || self.negotiator.is_finished();
        if self.registered && negotiated && self.state != ConnectionState::Connected {
            self.state = ConnectionState::Connected;
            actions.push(HandshakeAction::Complete);
        }
        actions
    }
}

/// `451 CAP :You have not registered`, with or without a `*` target.
fn is_cap_451(line: &ParsedLine<'_>) -> bool {
    line.param(0) == Some("CAP") || (line.param(0) == Some("*") && line.param(1) == Some("CAP"))
}
