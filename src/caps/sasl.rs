//! SASL PLAIN authentication during capability negotiation.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::{offers, CapError, CapHandler};
use crate::message::ParsedLine;
use crate::output;

/// Maximum length of a single `AUTHENTICATE` payload chunk.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Encode credentials for the PLAIN mechanism (empty authzid).
pub fn encode_plain(account: &str, password: &str) -> String {
    let payload = format!("\0{}\0{}", account, password);
    BASE64.encode(payload.as_bytes())
}

/// Split an encoded payload into `AUTHENTICATE` lines.
///
/// A payload that is an exact multiple of the chunk size is terminated by
/// `AUTHENTICATE +`.
fn authenticate_lines(encoded: &str) -> Vec<String> {
    let mut lines: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .map(|chunk| format!("AUTHENTICATE {}", String::from_utf8_lossy(chunk)))
        .collect();
    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        lines.push("AUTHENTICATE +".to_string());
    }
    lines
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Idle,
    Requested,
    Authenticating,
    PayloadSent,
    Done,
}

/// Authenticates with SASL PLAIN before registration completes.
#[derive(Clone)]
pub struct SaslCapHandler {
    account: String,
    password: String,
    ignore_fail: bool,
    step: Step,
}

impl fmt::Debug for SaslCapHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCapHandler")
            .field("account", &self.account)
            .field("ignore_fail", &self.ignore_fail)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl SaslCapHandler {
    /// Authenticate as `account`. With `ignore_fail`, a failed login lets
    /// registration continue unauthenticated.
    pub fn new(account: impl Into<String>, password: impl Into<String>, ignore_fail: bool) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
            ignore_fail,
            step: Step::Idle,
        }
    }

    fn give_up(&mut self, err: CapError) -> Result<Vec<String>, CapError> {
        if self.ignore_fail {
            self.step = Step::Done;
            Ok(Vec::new())
        } else {
            Err(err)
        }
    }
}

impl CapHandler for SaslCapHandler {
    fn handle_ls(&mut self, caps: &[String]) -> Result<Vec<String>, CapError> {
        if self.step != Step::Idle {
            return Ok(Vec::new());
        }
        if offers(caps, "sasl") {
            self.step = Step::Requested;
            Ok(vec![output::cap_req("sasl")])
        } else {
            self.give_up(CapError::UnsupportedCapability("sasl".to_string()))
        }
    }

    fn handle_ack(&mut self, caps: &[String]) -> Result<Vec<String>, CapError> {
        if self.step == Step::Requested && offers(caps, "sasl") {
            self.step = Step::Authenticating;
            return Ok(vec!["AUTHENTICATE PLAIN".to_string()]);
        }
        Ok(Vec::new())
    }

    fn handle_nak(&mut self, caps: &[String]) -> Result<Vec<String>, CapError> {
        if self.step == Step::Requested && offers(caps, "sasl") {
            return self.give_up(CapError::Rejected("sasl".to_string()));
        }
        Ok(Vec::new())
    }

    fn handle_unknown(&mut self, line: &str) -> Result<Vec<String>, CapError> {
        if matches!(self.step, Step::Idle | Step::Requested | Step::Done) {
            return Ok(Vec::new());
        }
        let Ok(parsed) = ParsedLine::parse(line) else {
            return Ok(Vec::new());
        };
        match parsed.code {
            "AUTHENTICATE" if self.step == Step::Authenticating && parsed.param(0) == Some("+") => {
                self.step = Step::PayloadSent;
                Ok(authenticate_lines(&encode_plain(
                    &self.account,
                    &self.password,
                )))
            }
            // RPL_SASLSUCCESS
            "903" => {
                self.step = Step::Done;
                Ok(Vec::new())
            }
            // ERR_NICKLOCKED, ERR_SASLFAIL, ERR_SASLTOOLONG, ERR_SASLABORTED, ERR_SASLALREADY
            "902" | "904" | "905" | "906" | "907" => {
                let reason = parsed.params.last().copied().unwrap_or(parsed.code);
                self.give_up(CapError::SaslFailed(reason.to_string()))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    fn boxed_clone(&self) -> Box<dyn CapHandler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(list: &str) -> Vec<String> {
        list.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_encode_plain() {
        let encoded = encode_plain("testuser", "testpass");
        let decoded = BASE64.decode(&encoded).unwrap();
        assert_eq!(decoded, b"\0testuser\0testpass");
    }

    #[test]
    fn test_full_exchange() {
        let mut handler = SaslCapHandler::new("bot", "secret", false);
        assert_eq!(
            handler.handle_ls(&caps("sasl=PLAIN,EXTERNAL")).unwrap(),
            vec!["CAP REQ :sasl"]
        );
        assert_eq!(
            handler.handle_ack(&caps("sasl")).unwrap(),
            vec!["AUTHENTICATE PLAIN"]
        );

        let lines = handler.handle_unknown("AUTHENTICATE +").unwrap();
        assert_eq!(lines, vec![format!("AUTHENTICATE {}", encode_plain("bot", "secret"))]);
        assert!(!handler.is_done());

        handler
            .handle_unknown(":irc 900 bot bot!u@h bot :You are now logged in as bot")
            .unwrap();
        assert!(!handler.is_done());
        handler
            .handle_unknown(":irc 903 bot :SASL authentication successful")
            .unwrap();
        assert!(handler.is_done());
    }

    #[test]
    fn test_failure() {
        let mut handler = SaslCapHandler::new("bot", "wrong", false);
        handler.handle_ls(&caps("sasl")).unwrap();
        handler.handle_ack(&caps("sasl")).unwrap();
        handler.handle_unknown("AUTHENTICATE +").unwrap();

        let err = handler
            .handle_unknown(":irc 904 bot :SASL authentication failed")
            .unwrap_err();
        assert_eq!(
            err,
            CapError::SaslFailed("SASL authentication failed".to_string())
        );
    }

    #[test]
    fn test_failure_ignored() {
        let mut handler = SaslCapHandler::new("bot", "wrong", true);
        handler.handle_ls(&caps("sasl")).unwrap();
        handler.handle_ack(&caps("sasl")).unwrap();
        handler.handle_unknown(":irc 904 bot :nope").unwrap();
        assert!(handler.is_done());
    }

    #[test]
    fn test_long_payload_is_chunked() {
        let encoded = "A".repeat(SASL_CHUNK_SIZE * 2);
        let lines = authenticate_lines(&encoded);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "AUTHENTICATE +");
    }

    #[test]
    fn test_debug_hides_password() {
        let handler = SaslCapHandler::new("bot", "hunter2", false);
        assert!(!format!("{:?}", handler).contains("hunter2"));
    }
}
