//! Fuzz target for the registration state machine.
//!
//! Feeds arbitrary server lines into a handshake and checks that it either
//! fails cleanly or keeps producing well-formed output.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_client::state::{HandshakeAction, HandshakeMachine};
use slirc_client::{Configuration, SaslCapHandler, TlsCapHandler};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let mut config = Configuration::new("irc.example.net", "fuzz");
    config.auto_nick_change = true;
    config.cap_handlers.push(Box::new(SaslCapHandler::new("fuzz", "secret", true)));
    config.cap_handlers.push(Box::new(TlsCapHandler::new(true)));

    let mut machine = HandshakeMachine::from_config(&config);
    machine.start();
    for line in input.split(['\r', '\n']) {
        let Ok(actions) = machine.feed(line) else {
            return;
        };
        for action in actions {
            match action {
                HandshakeAction::Send(out) => assert!(!out.contains(['\r', '\n'])),
                HandshakeAction::UpgradeTransport => {
                    if machine.finish_upgrade(line).is_err() {
                        return;
                    }
                }
                HandshakeAction::Complete => return,
            }
        }
    }
});
