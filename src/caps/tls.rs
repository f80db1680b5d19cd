use std::sync::Arc;

use tokio_rustls::rustls::ClientConfig;

use super::{offers, CapError, CapHandler};
use crate::message::ParsedLine;

/// Numeric: STARTTLS accepted, the TLS handshake may begin.
pub const RPL_STARTTLS: &str = "670";
/// Numeric: STARTTLS failed.
pub const ERR_STARTTLS: &str = "691";

/// Upgrades the connection with `STARTTLS` when the server offers `tls`.
///
/// The transport swap itself happens in the connection loop when `670`
/// arrives; this handler only asks for it and tracks the outcome.
#[derive(Clone, Debug)]
pub struct TlsCapHandler {
    config: Option<Arc<ClientConfig>>,
    ignore_fail: bool,
    sent: bool,
    done: bool,
}

impl TlsCapHandler {
    /// Use the connection's TLS settings for the upgrade.
    pub fn new(ignore_fail: bool) -> Self {
        Self {
            config: None,
            ignore_fail,
            sent: false,
            done: false,
        }
    }

    /// Use `config` for the upgrade.
    pub fn with_config(config: Arc<ClientConfig>, ignore_fail: bool) -> Self {
        Self {
            config: Some(config),
            ..Self::new(ignore_fail)
        }
    }

    fn give_up(&mut self, err: CapError) -> Result<Vec<String>, CapError> {
        if self.ignore_fail {
            self.done = true;
            Ok(Vec::new())
        } else {
            Err(err)
        }
    }
}

impl CapHandler for TlsCapHandler {
    fn handle_ls(&mut self, caps: &[String]) -> Result<Vec<String>, CapError> {
        if self.done || self.sent {
            return Ok(Vec::new());
        }
        if offers(caps, "tls") {
            self.sent = true;
            Ok(vec!["STARTTLS".to_string()])
        } else {
            self.give_up(CapError::UnsupportedCapability("tls".to_string()))
        }
    }

    fn handle_ack(&mut self, _caps: &[String]) -> Result<Vec<String>, CapError> {
        Ok(Vec::new())
    }

    fn handle_nak(&mut self, _caps: &[String]) -> Result<Vec<String>, CapError> {
        Ok(Vec::new())
    }

    fn handle_unknown(&mut self, line: &str) -> Result<Vec<String>, CapError> {
        if !self.sent || self.done {
            return Ok(Vec::new());
        }
        let Ok(parsed) = ParsedLine::parse(line) else {
            return Ok(Vec::new());
        };
        match parsed.code {
            RPL_STARTTLS => {
                self.done = true;
                Ok(Vec::new())
            }
            ERR_STARTTLS => self.give_up(CapError::TlsRejected(line.to_string())),
            _ => Ok(Vec::new()),
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn tls_config(&self) -> Option<Arc<ClientConfig>> {
        self.config.clone()
    }

    fn boxed_clone(&self) -> Box<dyn CapHandler> {
        Box::new(self.clone())
    }
}
