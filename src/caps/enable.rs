use super::{offers, CapError, CapHandler};
use crate::output;

/// Requests a single capability and waits for the server's verdict.
#[derive(Clone, Debug)]
pub struct EnableCapHandler {
    cap: String,
    ignore_fail: bool,
    requested: bool,
    done: bool,
}

impl EnableCapHandler {
    /// Request `cap`. With `ignore_fail`, a missing or refused capability
    /// just ends this handler instead of aborting the connection.
    pub fn new(cap: impl Into<String>, ignore_fail: bool) -> Self {
        Self {
            cap: cap.into(),
            ignore_fail,
            requested: false,
            done: false,
        }
    }

    /// The capability this handler requests.
    pub fn cap(&self) -> &str {
        &self.cap
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

impl CapHandler for EnableCapHandler {
    fn handle_ls(&mut self, caps: &[String]) -> Result<Vec<String>, CapError> {
        if self.done || self.requested {
            return Ok(Vec::new());
        }
        if offers(caps, &self.cap) {
            self.requested = true;
            Ok(vec![output::cap_req(&self.cap)])
        } else {
            self.give_up(CapError::UnsupportedCapability(self.cap.clone()))
        }
    }

    fn handle_ack(&mut self, caps: &[String]) -> Result<Vec<String>, CapError> {
        if offers(caps, &self.cap) {
            self.done = true;
        }
        Ok(Vec::new())
    }

    fn handle_nak(&mut self, caps: &[String]) -> Result<Vec<String>, CapError> {
        if self.requested && !self.done && offers(caps, &self.cap) {
            return self.give_up(CapError::Rejected(self.cap.clone()));
        }
        Ok(Vec::new())
    }

    fn handle_unknown(&mut self, _line: &str) -> Result<Vec<String>, CapError> {
        Ok(Vec::new())
    }

    fn is_done(&self) -> bool {
        self.done
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
    fn test_requests_offered_cap() {
        let mut handler = EnableCapHandler::new("multi-prefix", false);
        let lines = handler.handle_ls(&caps("sasl multi-prefix")).unwrap();
        assert_eq!(lines, vec!["CAP REQ :multi-prefix"]);
        assert!(!handler.is_done());

        handler.handle_ack(&caps("multi-prefix")).unwrap();
        assert!(handler.is_done());
    }

    #[test]
    fn test_missing_cap_fails_unless_ignored() {
        let mut strict = EnableCapHandler::new("away-notify", false);
        assert_eq!(
            strict.handle_ls(&caps("sasl")),
            Err(CapError::UnsupportedCapability("away-notify".to_string()))
        );

        let mut lenient = EnableCapHandler::new("away-notify", true);
        assert!(lenient.handle_ls(&caps("sasl")).unwrap().is_empty());
        assert!(lenient.is_done());
    }

    #[test]
    fn test_nak() {
        let mut strict = EnableCapHandler::new("multi-prefix", false);
        strict.handle_ls(&caps("multi-prefix")).unwrap();
        assert!(matches!(
            strict.handle_nak(&caps("multi-prefix")),
            Err(CapError::Rejected(_))
        ));

        let mut lenient = EnableCapHandler::new("multi-prefix", true);
        lenient.handle_ls(&caps("multi-prefix")).unwrap();
        lenient.handle_nak(&caps("multi-prefix")).unwrap();
        assert!(lenient.is_done());
    }

    #[test]
    fn test_unrelated_ack_does_not_finish() {
        let mut handler = EnableCapHandler::new("multi-prefix", false);
        handler.handle_ls(&caps("multi-prefix sasl")).unwrap();
        handler.handle_ack(&caps("sasl")).unwrap();
        assert!(!handler.is_done());
    }
}
