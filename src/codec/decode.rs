//! # Decoding of messages.
//!
//! You can use [`Decoder`]s to parse messages from the unread slice of an
//! input buffer.
//!
//! Decoders never consume bytes that do not form a complete message: as long
//! as the terminating newline of a command (or of the last response line) has
//! not arrived, `decode` returns `Incomplete` and leaves the input untouched.
//! Callers re-invoke `decode` once more bytes are available.

use std::fmt::{Display, Formatter};

use log::warn;
use nom::error::{ErrorKind, ParseError};
use smtp_types::{command::Command, core::ReplyCode, response::Response, utils::escape_byte_string};
use thiserror::Error;

use crate::{
    codec::{CommandCodec, ResponseCodec},
    rfc5321::{command::command_args, response::reply_line},
};

/// An extended version of [`nom::IResult`].
pub(crate) type SmtpResult<'a, O> = Result<(&'a [u8], O), nom::Err<SmtpParseError<'a>>>;

/// An extended version of [`nom::error::Error`].
#[derive(Debug)]
pub(crate) struct SmtpParseError<'a> {
    #[allow(unused)]
    pub input: &'a [u8],
    pub kind: SmtpErrorKind,
}

/// An extended version of [`nom::error::ErrorKind`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SmtpErrorKind {
    Expected(&'static str),
    BadDomain,
    BadAddressLiteral,
    BadLocalPart,
    BadReplyCode,
    TrailingBytes,
    Nom(ErrorKind),
}

impl Display for SmtpErrorKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Expected(what) => write!(f, "expected {}", what),
            Self::BadDomain => write!(f, "malformed domain"),
            Self::BadAddressLiteral => write!(f, "malformed address literal"),
            Self::BadLocalPart => write!(f, "malformed mailbox"),
            Self::BadReplyCode => write!(f, "malformed reply code"),
            Self::TrailingBytes => write!(f, "unexpected trailing bytes"),
            Self::Nom(_) => write!(f, "syntax error"),
        }
    }
}

impl<'a> ParseError<&'a [u8]> for SmtpParseError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self {
            input,
            kind: SmtpErrorKind::Nom(kind),
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, _: Self) -> Self {
        Self {
            input,
            kind: SmtpErrorKind::Nom(kind),
        }
    }
}

/// A malformed command or response, together with the SMTP reply it draws.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{code} {message}")]
pub struct GrammarError {
    pub code: u16,
    pub message: String,
}

impl GrammarError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Decoder.
///
/// Implemented for types that know how to decode a specific SMTP message. See
/// [implementors](trait.Decoder.html#implementors).
pub trait Decoder {
    type Message;
    type Error;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Self::Message), Self::Error>;
}

/// Error during command decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandDecodeError {
    /// More data is needed.
    Incomplete,

    /// The line exceeds the configured length limit.
    ///
    /// The offending bytes are still in the input; the caller decides how to
    /// resynchronize (a server typically discards up to the next LF).
    LineTooLong { limit: usize },

    /// Decoding failed.
    ///
    /// `reply` is the protocol reply a server should send; the offending line
    /// (terminator included) spans the first `discard` bytes of the input.
    Failed { reply: GrammarError, discard: usize },
}

/// Error during response decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResponseDecodeError {
    /// More data is needed.
    Incomplete,

    /// A response line exceeds the configured length limit.
    LineTooLong { limit: usize },

    /// Decoding failed.
    ///
    /// The valid prefix lines span the first `discard` bytes of the input;
    /// the offending line starts right after them.
    Failed { message: String, discard: usize },
}

/// A complete line framed out of the input.
pub(crate) struct Line<'a> {
    /// Line content without the terminator.
    pub content: &'a [u8],
    /// Bytes of input the line spans, terminator included.
    pub consumed: usize,
    /// Whether the line was terminated by CRLF (as opposed to a bare LF).
    pub crlf: bool,
}

/// Frame one line out of `input`.
///
/// `Ok(None)` means no full line has arrived yet. `Err(limit)` means the
/// line grew past `limit` bytes without a terminator (or with one).
pub(crate) fn take_line(input: &[u8], limit: usize) -> Result<Option<Line<'_>>, usize> {
    match input.iter().position(|b| *b == b'\n') {
        Some(position) => {
            if position + 1 > limit {
                return Err(limit);
            }

            let crlf = position > 0 && input[position - 1] == b'\r';
            let content = &input[..position - usize::from(crlf)];

            Ok(Some(Line {
                content,
                consumed: position + 1,
                crlf,
            }))
        }
        None if input.len() >= limit => Err(limit),
        None => Ok(None),
    }
}

impl Decoder for CommandCodec {
    type Message = Command;
    type Error = CommandDecodeError;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Command), CommandDecodeError> {
        let line = match take_line(input, self.max_line_length) {
            Ok(Some(line)) => line,
            Ok(None) => return Err(CommandDecodeError::Incomplete),
            Err(limit) => return Err(CommandDecodeError::LineTooLong { limit }),
        };

        if !line.crlf {
            warn!("Missing CR at end of command line");
        }

        let (verb_bytes, args) = match line.content.iter().position(|b| *b == b' ') {
            Some(position) => line.content.split_at(position),
            None => (line.content, &b""[..]),
        };

        let verb = std::str::from_utf8(verb_bytes)
            .ok()
            .and_then(smtp_types::command::Verb::by_name);

        let verb = match verb {
            Some(verb) => verb,
            None => {
                return Err(CommandDecodeError::Failed {
                    reply: GrammarError::new(
                        500,
                        format!("Unknown command \"{}\"", escape_byte_string(verb_bytes)),
                    ),
                    discard: line.consumed,
                });
            }
        };

        if !self.verbs.contains(verb) {
            return Err(CommandDecodeError::Failed {
                reply: GrammarError::new(502, "Unimplemented"),
                discard: line.consumed,
            });
        }

        match command_args(verb, args) {
            Ok(command) => Ok((&input[line.consumed..], command)),
            Err(reply) => Err(CommandDecodeError::Failed {
                reply,
                discard: line.consumed,
            }),
        }
    }
}

impl Decoder for ResponseCodec {
    type Message = Response;
    type Error = ResponseDecodeError;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Response), ResponseDecodeError> {
        let mut offset = 0;
        let mut code: Option<u16> = None;
        let mut lines = Vec::new();

        loop {
            let line = match take_line(&input[offset..], self.max_line_length) {
                Ok(Some(line)) => line,
                Ok(None) => return Err(ResponseDecodeError::Incomplete),
                Err(limit) => return Err(ResponseDecodeError::LineTooLong { limit }),
            };

            if !line.crlf {
                warn!("Missing CR at end of response line");
            }

            let reply = match reply_line(line.content) {
                Ok(reply) => reply,
                Err(message) => {
                    return Err(ResponseDecodeError::Failed {
                        message,
                        discard: offset,
                    });
                }
            };

            match code {
                None => code = Some(reply.code),
                Some(expected) if expected != reply.code => {
                    return Err(ResponseDecodeError::Failed {
                        message: format!(
                            "response code changed mid-response: expected {}, got {}",
                            expected, reply.code
                        ),
                        discard: offset,
                    });
                }
                Some(_) => {}
            }

            lines.push(reply.text);
            offset += line.consumed;

            if reply.last {
                let code = ReplyCode::try_from(code.unwrap_or(0)).map_err(|error| {
                    ResponseDecodeError::Failed {
                        message: error.to_string(),
                        discard: 0,
                    }
                })?;
                let response =
                    Response::from_parts(code, lines).map_err(|error| {
                        ResponseDecodeError::Failed {
                            message: error.to_string(),
                            discard: 0,
                        }
                    })?;

                return Ok((&input[offset..], response));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use smtp_types::{
        command::{Command, Verb, VerbSet},
        core::Domain,
        envelope::{EnvelopeRoute, Mailbox},
    };

    use super::*;

    #[test]
    fn test_decode_command_incomplete() {
        let tests: &[&[u8]] = &[
            b"",
            b"M",
            b"MA",
            b"MAI",
            b"MAIL",
            b"MAIL ",
            b"MAIL FROM:<",
            b"MAIL FROM:<a@b.c>",
            b"MAIL FROM:<a@b.c>\r",
        ];

        for test in tests {
            let got = CommandCodec::default().decode(test);

            dbg!((escape_byte_string(test), &got));

            assert_eq!(Err(CommandDecodeError::Incomplete), got);
        }
    }

    #[test]
    fn test_decode_command_prefix_then_exact() {
        let input = b"EHLO client.example.com\r\n";

        for until in 0..input.len() - 1 {
            assert_eq!(
                Err(CommandDecodeError::Incomplete),
                CommandCodec::default().decode(&input[..until + 1]),
            );
        }

        let (remaining, command) = CommandCodec::default().decode(input).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(
            Command::Ehlo {
                domain: Domain::name("client.example.com").unwrap()
            },
            command
        );
    }

    #[test]
    fn test_decode_command_failed() {
        let tests: &[(&[u8], u16)] = &[
            (b"FOO\r\n", 500),
            (b"HELO\r\n", 501),
            (b"HELO \r\n", 501),
            (b"HELO a b\r\n", 501),
            (b"HELO [not-an-ip]\r\n", 501),
            (b"MAIL\r\n", 500),
            (b"MAIL FROM:\r\n", 500),
            (b"MAIL FROM:<broken\r\n", 500),
            (b"RCPT TO:<>\r\n", 500),
            (b"DATA NOW\r\n", 500),
            (b"QUIT QUIT\r\n", 500),
        ];

        for (test, expected_code) in tests {
            let got = CommandCodec::default().decode(test);

            dbg!((escape_byte_string(test), &got));

            match got {
                Err(CommandDecodeError::Failed { reply, discard }) => {
                    assert_eq!(*expected_code, reply.code);
                    assert_eq!(test.len(), discard);
                }
                other => panic!("expected Failed, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_decode_command_disabled_verb_is_unimplemented() {
        // VRFY is registered but not part of the base set.
        let codec = CommandCodec::default();

        match codec.decode(b"VRFY alice\r\n") {
            Err(CommandDecodeError::Failed { reply, .. }) => {
                assert_eq!(502, reply.code);
                assert_eq!("Unimplemented", reply.message);
            }
            other => panic!("expected Failed, got {:?}", other),
        }

        // An unknown word is a different error.
        match codec.decode(b"EXPN alice\r\n") {
            Err(CommandDecodeError::Failed { reply, .. }) => {
                assert_eq!(500, reply.code);
                assert_eq!("Unknown command \"EXPN\"", reply.message);
            }
            other => panic!("expected Failed, got {:?}", other),
        }

        let codec = CommandCodec::new(1000, VerbSet::from_iter([Verb::Vrfy]));
        let (_, command) = codec.decode(b"VRFY alice\r\n").unwrap();
        assert_eq!(
            Command::Vrfy {
                target: "alice".into()
            },
            command
        );
    }

    #[test]
    fn test_decode_command_bare_lf_accepted() {
        let (remaining, command) = CommandCodec::default().decode(b"QUIT\nrest").unwrap();

        assert_eq!(Command::Quit, command);
        assert_eq!(b"rest", remaining);
    }

    #[test]
    fn test_decode_command_line_too_long() {
        let codec = CommandCodec::new(16, VerbSet::base());

        let mut input = vec![b'N'; 32];
        assert_eq!(
            Err(CommandDecodeError::LineTooLong { limit: 16 }),
            codec.decode(&input),
        );

        input.extend_from_slice(b"\r\n");
        assert_eq!(
            Err(CommandDecodeError::LineTooLong { limit: 16 }),
            codec.decode(&input),
        );
    }

    #[test]
    fn test_decode_command_routes_and_params() {
        let (_, command) = CommandCodec::default()
            .decode(b"MAIL FROM:<@relay1.example,@relay2.example:bob@example.com> SIZE=1024 BODY\r\n")
            .unwrap();

        let Command::Mail { reverse_path } = command else {
            panic!("expected MAIL");
        };

        assert_eq!(
            Mailbox::Address {
                local_part: "bob".into(),
                domain: Domain::name("example.com").unwrap(),
            },
            reverse_path.mailbox
        );
        assert_eq!(
            vec![
                Domain::name("relay1.example").unwrap(),
                Domain::name("relay2.example").unwrap()
            ],
            reverse_path.route
        );
        assert_eq!(Some(&Some(String::from("1024"))), reverse_path.params.get("SIZE"));
        assert_eq!(Some(&None), reverse_path.params.get("BODY"));
    }

    #[test]
    fn test_decode_command_postmaster() {
        let (_, command) = CommandCodec::default()
            .decode(b"RCPT TO:<PostMaster>\r\n")
            .unwrap();

        assert_eq!(
            Command::Rcpt {
                forward_path: EnvelopeRoute::postmaster()
            },
            command
        );

        // MAIL has no postmaster special case; a bare word is not a mailbox.
        assert!(matches!(
            CommandCodec::default().decode(b"MAIL FROM:<postmaster>\r\n"),
            Err(CommandDecodeError::Failed { reply, .. }) if reply.code == 500
        ));
    }

    #[test]
    fn test_decode_response_incomplete() {
        let tests: &[&[u8]] = &[
            b"",
            b"2",
            b"25",
            b"250",
            b"250 ",
            b"250 OK",
            b"250 OK\r",
            b"250-a\r\n",
            b"250-a\r\n250-b\r\n",
            b"250-a\r\n250 b",
        ];

        for test in tests {
            let got = ResponseCodec::default().decode(test);

            dbg!((escape_byte_string(test), &got));

            assert_eq!(Err(ResponseDecodeError::Incomplete), got);
        }
    }

    #[test]
    fn test_decode_response_code_mismatch() {
        let got = ResponseCodec::default().decode(b"250-a\r\n251 b\r\n");

        match got {
            Err(ResponseDecodeError::Failed { discard, .. }) => {
                // Cursor points at the start of the offending line.
                assert_eq!(b"250-a\r\n".len(), discard);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_response_failed() {
        let tests: &[&[u8]] = &[b"abc\r\n", b"99 nope\r\n", b"2500 nope\r\n", b"250?text\r\n"];

        for test in tests {
            let got = ResponseCodec::default().decode(test);

            dbg!((escape_byte_string(test), &got));

            assert!(matches!(got, Err(ResponseDecodeError::Failed { .. })));
        }
    }

    #[test]
    fn test_decode_response_code_only_line() {
        let (remaining, response) = ResponseCodec::default().decode(b"250\r\nx").unwrap();

        assert_eq!(b"x", remaining);
        assert_eq!(250, response.code().as_u16());
        assert_eq!(&[String::new()][..], response.lines());
    }
}
