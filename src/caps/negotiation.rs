use std::sync::Arc;

use tokio_rustls::rustls::ClientConfig;
use tracing::debug;

use super::{cap_name, CapError, CapHandler};
use crate::message::ParsedLine;
use crate::output;

/// Capabilities the server acknowledged, in acknowledgement order.
///
/// Writable only until [`freeze`](Self::freeze) is called, which happens the
/// moment `CAP END` goes out.
#[derive(Clone, Debug, Default)]
pub struct EnabledCapabilities {
    caps: Vec<String>,
    frozen: Option<Arc<[String]>>,
}

impl EnabledCapabilities {
    /// An empty, writable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cap`. Returns false if it was already present or the set is frozen.
    pub fn insert(&mut self, cap: &str) -> bool {
        if self.frozen.is_some() || self.contains(cap) {
            return false;
        }
        self.caps.push(cap.to_string());
        true
    }

    /// Whether `cap` was acknowledged.
    pub fn contains(&self, cap: &str) -> bool {
        self.caps.iter().any(|c| c.eq_ignore_ascii_case(cap))
    }

    /// Make the set read-only and return a shared snapshot of it.
    pub fn freeze(&mut self) -> Arc<[String]> {
        self.frozen
            .get_or_insert_with(|| Arc::from(self.caps.as_slice()))
            .clone()
    }

    /// Whether [`freeze`](Self::freeze) has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// The acknowledged capabilities.
    pub fn as_slice(&self) -> &[String] {
        &self.caps
    }
}

/// Drives `CAP` negotiation over an ordered list of handlers.
#[derive(Debug)]
pub struct CapabilityNegotiator {
    handlers: Vec<Box<dyn CapHandler>>,
    enabled: EnabledCapabilities,
    pending_ls: Vec<String>,
    end_sent: bool,
}

impl CapabilityNegotiator {
    /// Start a negotiation with fresh clones of `handlers`.
    pub fn new(handlers: &[Box<dyn CapHandler>]) -> Self {
        Self {
            handlers: handlers.iter().map(|h| h.boxed_clone()).collect(),
            enabled: EnabledCapabilities::new(),
            pending_ls: Vec::new(),
            end_sent: false,
        }
    }

    /// Handle a `CAP` line from the server.
    ///
    /// The capability list is always the last parameter, so both
    /// `CAP * LS :a b` and the multiline `CAP * LS * :a b` form work. Multiline
    /// listings are collected and handed to the handlers once complete.
    pub fn handle_cap(&mut self, line: &ParsedLine<'_>, raw: &str) -> Result<Vec<String>, CapError> {
        let subcommand = line.param(1).unwrap_or_default().to_ascii_uppercase();
        let caps: Vec<String> = line
            .params
            .last()
            .map(|list| list.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        match subcommand.as_str() {
            "LS" => {
                self.pending_ls.extend(caps);
                if line.params.len() >= 4 && line.param(2) == Some("*") {
                    return Ok(Vec::new());
                }
                let offered = std::mem::take(&mut self.pending_ls);
                debug!(caps = ?offered, "server capabilities");
                self.each(|h| h.handle_ls(&offered))
            }
            "ACK" => {
                for cap in caps.iter().filter(|cap| !cap.starts_with('-')) {
                    let name = cap_name(cap.trim_start_matches(['~', '=']));
                    if !self.enabled.insert(name) && self.enabled.is_frozen() {
                        debug!(cap = name, "ACK after CAP END ignored");
                    }
                }
                self.each(|h| h.handle_ack(&caps))
            }
            "NAK" => self.each(|h| h.handle_nak(&caps)),
            _ => self.handle_unknown(raw),
        }
    }

    /// Hand any other line to every handler.
    pub fn handle_unknown(&mut self, raw: &str) -> Result<Vec<String>, CapError> {
        self.each(|h| h.handle_unknown(raw))
    }

    fn each<F>(&mut self, mut f: F) -> Result<Vec<String>, CapError>
    where
        F: FnMut(&mut dyn CapHandler) -> Result<Vec<String>, CapError>,
    {
        let mut out = Vec::new();
        for handler in self.handlers.iter_mut() {
            out.extend(f(handler.as_mut())?);
        }
        Ok(out)
    }

    /// Whether every handler is finished.
    pub fn all_done(&self) -> bool {
        self.handlers.iter().all(|h| h.is_done())
    }

    /// Whether `CAP END` has been sent.
    pub fn is_finished(&self) -> bool {
        self.end_sent
    }

    /// `CAP END`, exactly once, as soon as every handler is done.
    /// Freezes the enabled set.
    pub fn try_finish(&mut self) -> Option<String> {
        if self.end_sent || !self.all_done() {
            return None;
        }
        self.end_sent = true;
        self.enabled.freeze();
        Some(output::cap_end())
    }

    /// TLS settings offered by the first handler that has any.
    pub fn tls_config(&self) -> Option<Arc<ClientConfig>> {
        self.handlers.iter().find_map(|h| h.tls_config())
    }

    /// The capabilities enabled so far.
    pub fn enabled(&self) -> &EnabledCapabilities {
        &self.enabled
    }

    /// Read-only snapshot of the enabled capabilities.
    pub fn snapshot(&mut self) -> Arc<[String]> {
        if self.enabled.is_frozen() {
            self.enabled.freeze()
        } else {
            Arc::from(self.enabled.as_slice())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{EnableCapHandler, SaslCapHandler, TlsCapHandler};

    fn negotiator(handlers: Vec<Box<dyn CapHandler>>) -> CapabilityNegotiator {
        CapabilityNegotiator::new(&handlers)
    }

    fn feed(n: &mut CapabilityNegotiator, raw: &str) -> Result<Vec<String>, CapError> {
        let line = ParsedLine::parse(raw).unwrap();
        if line.code == "CAP" {
            n.handle_cap(&line, raw)
        } else {
            n.handle_unknown(raw)
        }
    }

    #[test]
    fn test_enabled_set_freezes() {
        let mut set = EnabledCapabilities::new();
        assert!(set.insert("multi-prefix"));
        assert!(!set.insert("multi-prefix"));

        let snapshot = set.freeze();
        assert!(!set.insert("sasl"));
        assert_eq!(&*snapshot, &["multi-prefix".to_string()]);
    }

    #[test]
    fn test_ls_ack_end() {
        let mut n = negotiator(vec![Box::new(EnableCapHandler::new("multi-prefix", false))]);

        let out = feed(&mut n, ":irc CAP * LS :multi-prefix sasl").unwrap();
        assert_eq!(out, vec!["CAP REQ :multi-prefix"]);
        assert_eq!(n.try_finish(), None);

        feed(&mut n, ":irc CAP * ACK :multi-prefix").unwrap();
        assert!(n.enabled().contains("multi-prefix"));
        assert_eq!(n.try_finish().as_deref(), Some("CAP END"));
        assert_eq!(n.try_finish(), None);
        assert!(n.enabled().is_frozen());
    }

    #[test]
    fn test_multiline_ls_is_collected() {
        let mut n = negotiator(vec![Box::new(EnableCapHandler::new("sasl", false))]);

        let out = feed(&mut n, ":irc CAP * LS * :multi-prefix away-notify").unwrap();
        assert!(out.is_empty());

        let out = feed(&mut n, ":irc CAP * LS :sasl").unwrap();
        assert_eq!(out, vec!["CAP REQ :sasl"]);
    }

    #[test]
    fn test_nak_does_not_enable() {
        let mut n = negotiator(vec![Box::new(EnableCapHandler::new("multi-prefix", true))]);
        feed(&mut n, ":irc CAP * LS :multi-prefix").unwrap();
        feed(&mut n, ":irc CAP * NAK :multi-prefix").unwrap();

        assert!(n.enabled().as_slice().is_empty());
        assert!(n.all_done());
    }

    #[test]
    fn test_handlers_run_in_order() {
        let mut n = negotiator(vec![
            Box::new(EnableCapHandler::new("multi-prefix", false)),
            Box::new(SaslCapHandler::new("bot", "pw", false)),
        ]);
        let out = feed(&mut n, ":irc CAP * LS :sasl multi-prefix").unwrap();
        assert_eq!(out, vec!["CAP REQ :multi-prefix", "CAP REQ :sasl"]);
    }

    #[test]
    fn test_error_aborts() {
        let mut n = negotiator(vec![Box::new(EnableCapHandler::new("away-notify", false))]);
        let err = feed(&mut n, ":irc CAP * LS :multi-prefix").unwrap_err();
        assert!(matches!(err, CapError::UnsupportedCapability(_)));
    }

    #[test]
    fn test_unknown_reaches_handlers() {
        let mut n = negotiator(vec![Box::new(TlsCapHandler::new(false))]);
        assert_eq!(feed(&mut n, ":irc CAP * LS :tls").unwrap(), vec!["STARTTLS"]);
        feed(&mut n, ":irc 670 bot :go ahead").unwrap();
        assert!(n.all_done());
    }

    #[test]
    fn test_handlers_are_cloned_fresh() {
        let template: Vec<Box<dyn CapHandler>> =
            vec![Box::new(EnableCapHandler::new("multi-prefix", false))];

        let mut first = CapabilityNegotiator::new(&template);
        feed(&mut first, ":irc CAP * LS :multi-prefix").unwrap();
        feed(&mut first, ":irc CAP * ACK :multi-prefix").unwrap();
        assert!(first.all_done());

        let second = CapabilityNegotiator::new(&template);
        assert!(!second.all_done());
        assert!(!template[0].is_done());
    }

    #[test]
    fn test_no_handlers_finishes_immediately() {
        let mut n = negotiator(Vec::new());
        assert_eq!(n.try_finish().as_deref(), Some("CAP END"));
    }
}
