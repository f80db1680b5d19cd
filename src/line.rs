//! Line-based codec for tokio.
//!
//! Reads and writes CRLF-terminated IRC lines. Decoded lines have their line
//! ending stripped; encoded lines are truncated at the first embedded line
//! ending and always terminated with `\r\n`.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::LineError;

/// Maximum IRC line length (8191 bytes, tags included).
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// Line-based codec that handles newline-terminated messages.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a new codec limited to [`MAX_IRC_LINE_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(MAX_IRC_LINE_LEN)
    }

    /// Create a new codec with custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }

    /// Sanitize outgoing line data.
    ///
    /// Everything from the first line ending on is dropped, so a caller can
    /// never smuggle a second command into one write.
    pub fn sanitize(line: &str) -> &str {
        match line.find(['\r', '\n']) {
            Some(pos) => &line[..pos],
            None => line,
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, LineError> {
        // Look for newline starting from where we left off
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(LineError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let data = match String::from_utf8(line.to_vec()) {
                Ok(s) => s,
                Err(e) => {
                    debug!(
                        valid_up_to = e.utf8_error().valid_up_to(),
                        "non UTF-8 line, decoding lossily"
                    );
                    String::from_utf8_lossy(&line).into_owned()
                }
            };

            Ok(Some(data.trim_end_matches(['\r', '\n']).to_string()))
        } else {
            // No complete line yet - remember where we stopped
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(LineError::MessageTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> Result<(), LineError> {
        let line = Self::sanitize(&msg);
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n");

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result, Some("PING :test".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"later\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("PING :later".to_string())
        );
    }

    #[test]
    fn test_decode_two_lines_in_one_read() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(":irc 001 bot :hi\r\n:irc 002 bot :host\r\n");

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(":irc 001 bot :hi".to_string())
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(":irc 002 bot :host".to_string())
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_too_long() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("this is way too long\n");

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(LineError::MessageTooLong { .. })));
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #a :caf\xe9\r\n"[..]);

        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #a :caf"));
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("PONG :test".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :test\r\n");
    }

    #[test]
    fn test_encode_truncates_injected_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode("PRIVMSG #test :hello\r\nQUIT".to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #test :hello\r\n");
    }
}
