//! Outbound line formatting.
//!
//! Small builders for the lines the lifecycle engine sends itself. They
//! return plain strings without a line ending; the codec appends `\r\n`.

use std::net::IpAddr;

use crate::config::WebIrc;

/// `CAP LS`
pub fn cap_ls() -> String {
    "CAP LS".to_string()
}

/// `CAP REQ :<caps>`
pub fn cap_req(caps: &str) -> String {
    format!("CAP REQ :{}", caps)
}

/// `CAP END`
pub fn cap_end() -> String {
    "CAP END".to_string()
}

/// `WEBIRC <password> <username> <hostname> <address>`
pub fn webirc(webirc: &WebIrc) -> String {
    format!(
        "WEBIRC {} {} {} {}",
        webirc.password,
        webirc.username,
        webirc.hostname,
        format_address(&webirc.address)
    )
}

/// `PASS <password>`
pub fn pass(password: &str) -> String {
    format!("PASS {}", password)
}

/// `NICK <nick>`
pub fn nick(nick: &str) -> String {
    format!("NICK {}", nick)
}

/// `USER <login> 8 * :<realname>`
pub fn user(login: &str, realname: &str) -> String {
    format!("USER {} 8 * :{}", login, realname)
}

/// `JOIN <channel> [<key>]`
///
/// An empty key is omitted rather than sent as a trailing space.
pub fn join(channel: &str, key: &str) -> String {
    if key.is_empty() {
        format!("JOIN {}", channel)
    } else {
        format!("JOIN {} {}", channel, key)
    }
}

/// `QUIT [:<reason>]`
pub fn quit(reason: &str) -> String {
    if reason.is_empty() {
        "QUIT".to_string()
    } else {
        format!("QUIT :{}", reason)
    }
}

/// `PING <token>`
pub fn ping(token: &str) -> String {
    format!("PING {}", token)
}

fn format_address(addr: &IpAddr) -> String {
    match addr {
        // a leading colon would be read as a trailing parameter
        IpAddr::V6(v6) if v6.to_string().starts_with(':') => format!("0{}", v6),
        other => other.to_string(),
    }
}
