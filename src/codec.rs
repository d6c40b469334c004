//! (De)serialization of commands and responses.
//!
//! All messages implement the [`Encode`](encode::Encode) trait. You can call
//! `.encode()` (or `.encode().dump()`) to serialize a message into bytes.
//!
//! Parsing goes through the [`Decoder`](decode::Decoder) trait: a decoder is
//! handed the unread slice of an input buffer and either returns a message
//! plus the remaining bytes, or reports that more bytes are needed. No decoder
//! ever consumes bytes that do not form a complete message.

pub mod decode;
pub mod encode;

use smtp_types::command::VerbSet;

/// Codec for command lines.
///
/// # Example
///
/// ```rust
/// # use smtp_toolkit::codec::{decode::Decoder, CommandCodec};
/// # use smtp_toolkit::types::command::Command;
/// let (remaining, command) = CommandCodec::default()
///     .decode(b"QUIT\r\n<remaining>")
///     .unwrap();
///
/// assert_eq!(command, Command::Quit);
/// assert_eq!(remaining, &b"<remaining>"[..]);
/// ```
#[derive(Clone, Debug)]
pub struct CommandCodec {
    pub(crate) max_line_length: usize,
    pub(crate) verbs: VerbSet,
}

impl CommandCodec {
    pub fn new(max_line_length: usize, verbs: VerbSet) -> Self {
        Self {
            max_line_length,
            verbs,
        }
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new(1000, VerbSet::base())
    }
}

/// Codec for (possibly multi-line) responses.
#[derive(Clone, Debug)]
pub struct ResponseCodec {
    pub(crate) max_line_length: usize,
}

impl ResponseCodec {
    pub fn new(max_line_length: usize) -> Self {
        Self { max_line_length }
    }
}

impl Default for ResponseCodec {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use smtp_types::{
        command::Command,
        core::{Domain, ReplyCode},
        envelope::EnvelopeRoute,
        response::Response,
    };

    use crate::testing::{kat_inverse_command, kat_inverse_response};

    #[test]
    fn test_kat_inverse_command() {
        kat_inverse_command(&[
            (
                b"QUIT\r\n".as_ref(),
                b"".as_ref(),
                Command::Quit,
            ),
            (
                b"DATA\r\n???",
                b"???",
                Command::Data,
            ),
            (
                b"EHLO client.example.com\r\n",
                b"",
                Command::Ehlo {
                    domain: Domain::name("client.example.com").unwrap(),
                },
            ),
            (
                b"MAIL FROM:<>\r\n",
                b"",
                Command::Mail {
                    reverse_path: EnvelopeRoute::null(),
                },
            ),
            (
                b"RCPT TO:<alice@example.com>\r\nRSET\r\n",
                b"RSET\r\n",
                Command::Rcpt {
                    forward_path: EnvelopeRoute::address(
                        "alice",
                        Domain::name("example.com").unwrap(),
                    )
                    .unwrap(),
                },
            ),
        ]);
    }

    #[test]
    fn test_kat_inverse_response() {
        kat_inverse_response(&[
            (
                b"250 OK\r\n".as_ref(),
                b"".as_ref(),
                Response::new(250, "OK").unwrap(),
            ),
            (
                b"221 Goodbye\r\n???",
                b"???",
                Response::new(221, "Goodbye").unwrap(),
            ),
            (
                b"250-example.com\r\n250-PIPELINING\r\n250 SIZE 10485760\r\n",
                b"",
                Response::from_parts(
                    ReplyCode::OK,
                    vec![
                        "example.com".into(),
                        "PIPELINING".into(),
                        "SIZE 10485760".into(),
                    ],
                )
                .unwrap(),
            ),
        ]);
    }
}
