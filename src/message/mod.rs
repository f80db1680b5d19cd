//! Tokenizing of raw IRC lines.
//!
//! The lifecycle engine only needs the shape of a line (sender, code and
//! parameters); typed command parsing is left to the line interpreter.

mod nom_parser;

pub use self::nom_parser::{DetailedParseError, ParsedLine};

/// Numeric replies that prove the server has accepted our registration:
/// welcome burst (001-005), LUSERS (251-255) and MOTD (375, 376).
pub const REGISTRATION_SUCCESS: [&str; 12] = [
    "001", "002", "003", "004", "005", "251", "252", "253", "254", "255", "375", "376",
];

/// Whether `code` is one of [`REGISTRATION_SUCCESS`].
pub fn is_registration_success(code: &str) -> bool {
    REGISTRATION_SUCCESS.contains(&code)
}

/// Whether `code` is a 4xx or 5xx error numeric.
pub fn is_error_numeric(code: &str) -> bool {
    code.len() == 3
        && code.bytes().all(|b| b.is_ascii_digit())
        && matches!(code.as_bytes()[0], b'4' | b'5')
}
