//! IRCv3 capability negotiation.
//!
//! Negotiation is driven by an ordered list of [`CapHandler`]s. Each handler
//! sees every `CAP LS`, `CAP ACK` and `CAP NAK` as well as every other line
//! that arrives while registering, and answers with the raw lines it wants
//! sent. Negotiation ends with `CAP END` once every handler reports done.
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>
//! - STARTTLS: <https://ircv3.net/specs/deprecated/tls>
//! - SASL: <https://ircv3.net/specs/extensions/sasl-3.2>

mod enable;
mod negotiation;
mod sasl;
mod tls;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls::ClientConfig;

pub use self::enable::EnableCapHandler;
pub use self::negotiation::{CapabilityNegotiator, EnabledCapabilities};
pub use self::sasl::SaslCapHandler;
pub use self::tls::TlsCapHandler;

/// A capability handler aborted negotiation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CapError {
    /// The server does not offer a required capability.
    #[error("server does not support the {0} capability")]
    UnsupportedCapability(String),

    /// The server refused a requested capability.
    #[error("server rejected capability request: {0}")]
    Rejected(String),

    /// SASL authentication failed.
    #[error("SASL authentication failed: {0}")]
    SaslFailed(String),

    /// The server refused STARTTLS.
    #[error("server refused STARTTLS: {0}")]
    TlsRejected(String),
}

/// One participant in capability negotiation.
///
/// Every callback returns the raw lines to send in response, in order. An
/// error aborts the whole handshake. Handlers are cloned fresh for every
/// connection attempt, so they may keep per-attempt state.
pub trait CapHandler: Send + Sync + fmt::Debug {
    /// The server listed its capabilities (`CAP LS`).
    fn handle_ls(&mut self, caps: &[String]) -> Result<Vec<String>, CapError>;

    /// The server acknowledged a request (`CAP ACK`).
    fn handle_ack(&mut self, caps: &[String]) -> Result<Vec<String>, CapError>;

    /// The server refused a request (`CAP NAK`).
    fn handle_nak(&mut self, caps: &[String]) -> Result<Vec<String>, CapError>;

    /// Any other line received while registering.
    fn handle_unknown(&mut self, line: &str) -> Result<Vec<String>, CapError>;

    /// Whether this handler has nothing left to negotiate.
    fn is_done(&self) -> bool;

    /// TLS settings to use when the transport is upgraded.
    fn tls_config(&self) -> Option<Arc<ClientConfig>> {
        None
    }

    /// Clone into a fresh box.
    fn boxed_clone(&self) -> Box<dyn CapHandler>;
}

impl Clone for Box<dyn CapHandler> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Strip a `=value` suffix from an advertised capability (`sasl=PLAIN` -> `sasl`).
pub fn cap_name(token: &str) -> &str {
    token.split_once('=').map_or(token, |(name, _)| name)
}

/// Whether `caps` contains `name`, ignoring values and case.
pub(crate) fn offers(caps: &[String], name: &str) -> bool {
    caps.iter()
        .any(|cap| cap_name(cap).eq_ignore_ascii_case(name))
}
