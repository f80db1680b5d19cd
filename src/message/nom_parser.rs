//! Nom-based IRC line tokenizer.
//!
//! Splits a raw line into its tags, sender, command/numeric code and
//! parameters without allocating for the pieces themselves.

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    error::{context, ErrorKind, VerboseError},
    sequence::preceded,
    IResult,
};

type ParseResult<I, O> = IResult<I, O, VerboseError<I>>;

/// Parse IRCv3 message tags (the part after `@` and before the first space).
fn parse_tags(input: &str) -> ParseResult<&str, &str> {
    context("parsing IRCv3 message tags", preceded(char('@'), take_until(" ")))(input)
}

/// Parse the sender (the part after `:` and before the first space).
fn parse_sender(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing message sender",
        preceded(char(':'), take_while1(|c| c != ' ')),
    )(input)
}

/// Parse the command name or three-digit numeric.
fn parse_code(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing command code",
        take_while1(|c: char| c.is_ascii_alphanumeric()),
    )(input)
}

/// Parse a complete IRC line into its components.
///
/// ```text
/// [@tags] [:sender] <code> [params...] [:trailing]
/// ```
pub fn parse_line(input: &str) -> ParseResult<&str, ParsedLine<'_>> {
    let (input, tags) = context("parsing optional tags", opt(parse_tags))(input)?;
    let (input, _) = space0(input)?;

    let (input, sender) = context("parsing optional sender", opt(parse_sender))(input)?;
    let (input, _) = space0(input)?;

    let (input, code) = context("parsing required code", parse_code)(input)?;

    let mut params: Vec<&str> = Vec::new();
    let mut rest = input;

    loop {
        let trimmed = rest.trim_start_matches(' ');
        if trimmed.len() == rest.len() {
            // no separator, so no further parameter
            break;
        }
        rest = trimmed;

        if let Some(after_colon) = rest.strip_prefix(':') {
            let end = after_colon.find(['\r', '\n']).unwrap_or(after_colon.len());
            params.push(&after_colon[..end]);
            rest = &after_colon[end..];
            break;
        }

        let end = rest.find([' ', '\r', '\n']).unwrap_or(rest.len());
        if end == 0 {
            break;
        }
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    Ok((
        rest,
        ParsedLine {
            tags,
            sender,
            code,
            params,
        },
    ))
}

/// A tokenized IRC line with borrowed string slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    /// Raw tags string (without the leading `@`), if present.
    pub tags: Option<&'a str>,
    /// Sender (without the leading `:`), if present.
    pub sender: Option<&'a str>,
    /// Command name or numeric reply code.
    pub code: &'a str,
    /// Parameters, trailing parameter included.
    pub params: Vec<&'a str>,
}

impl<'a> ParsedLine<'a> {
    /// Tokenize a raw line.
    pub fn parse(input: &'a str) -> Result<Self, DetailedParseError> {
        match parse_line(input) {
            Ok((_remaining, line)) => Ok(line),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let mut context_info = None;
                let mut position = input.len();
                let mut kind = ErrorKind::Tag;

                for (error_input, error_kind) in &e.errors {
                    position = input.len() - error_input.len();
                    match error_kind {
                        nom::error::VerboseErrorKind::Context(ctx) => context_info = Some(*ctx),
                        nom::error::VerboseErrorKind::Nom(ek) => kind = *ek,
                        nom::error::VerboseErrorKind::Char(_) => kind = ErrorKind::Char,
                    }
                }

                Err(DetailedParseError {
                    input: input.to_string(),
                    position,
                    context: context_info,
                    kind,
                })
            }
            Err(nom::Err::Incomplete(_)) => Err(DetailedParseError {
                input: input.to_string(),
                position: input.len(),
                context: Some("incomplete input"),
                kind: ErrorKind::Eof,
            }),
        }
    }

    /// Number of whitespace-separated tokens, sender and code included.
    pub fn token_count(&self) -> usize {
        usize::from(self.sender.is_some()) + 1 + self.params.len()
    }

    /// Parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }

    /// Whether the code is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.code.len() == 3 && self.code.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Detailed parse error with position and context information.
#[derive(Debug, Clone)]
pub struct DetailedParseError {
    /// The original input string that failed to parse.
    pub input: String,
    /// Character position where parsing failed.
    pub position: usize,
    /// Context about what was being parsed when the error occurred.
    pub context: Option<&'static str>,
    /// The nom error kind.
    pub kind: ErrorKind,
}

impl std::fmt::Display for DetailedParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error at position {}", self.position)?;
        if let Some(ctx) = self.context {
            write!(f, " while {}", ctx)?;
        }
        write!(f, ": {:?}", self.kind)
    }
}

impl std::error::Error for DetailedParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_command() {
        let line = ParsedLine::parse("PING").unwrap();
        assert_eq!(line.code, "PING");
        assert!(line.tags.is_none());
        assert!(line.sender.is_none());
        assert!(line.params.is_empty());
        assert_eq!(line.token_count(), 1);
    }

    #[test]
    fn test_parse_numeric_response() {
        let line = ParsedLine::parse(":server 001 nick :Welcome").unwrap();
        assert_eq!(line.sender, Some("server"));
        assert_eq!(line.code, "001");
        assert!(line.is_numeric());
        assert_eq!(line.params, vec!["nick", "Welcome"]);
    }

    #[test]
    fn test_parse_cap_ls_continuation() {
        let line = ParsedLine::parse(":irc CAP * LS * :multi-prefix sasl").unwrap();
        assert_eq!(line.code, "CAP");
        assert_eq!(line.params, vec!["*", "LS", "*", "multi-prefix sasl"]);
    }

    #[test]
    fn test_parse_with_tags() {
        let line = ParsedLine::parse("@time=2023-01-01T00:00:00Z :nick PRIVMSG #ch :Hi").unwrap();
        assert_eq!(line.tags, Some("time=2023-01-01T00:00:00Z"));
        assert_eq!(line.sender, Some("nick"));
        assert_eq!(line.code, "PRIVMSG");
        assert_eq!(line.params, vec!["#ch", "Hi"]);
    }

    #[test]
    fn test_parse_with_crlf() {
        let line = ParsedLine::parse("PING :server\r\n").unwrap();
        assert_eq!(line.params, vec!["server"]);
    }

    #[test]
    fn test_parse_collapses_repeated_spaces() {
        let line = ParsedLine::parse(":irc  451  CAP :You have not registered").unwrap();
        assert_eq!(line.code, "451");
        assert_eq!(line.params, vec!["CAP", "You have not registered"]);
    }

    #[test]
    fn test_parse_empty_trailing() {
        let line = ParsedLine::parse("PRIVMSG #channel :").unwrap();
        assert_eq!(line.params, vec!["#channel", ""]);
    }

    #[test]
    fn test_parse_rejects_empty() {
        let err = ParsedLine::parse("").unwrap_err();
        assert_eq!(err.position, 0);
    }
}
