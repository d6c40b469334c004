use std::io::{Error as IoError, Write};

use bytes::{Buf, BufMut, BytesMut};
use smtp_types::{command::Command, response::Response};
use thiserror::Error;
use tokio_util::codec::{Decoder as TokioDecoder, Encoder as TokioEncoder};

use crate::codec::{
    decode::{CommandDecodeError, Decoder, GrammarError},
    encode::Encode,
    CommandCodec,
};

/// Server-side [`tokio_util::codec`] adapter: decodes [`Command`]s, encodes
/// [`Response`]s.
#[derive(Debug, Default)]
pub struct SmtpServerCodec {
    codec: CommandCodec,
}

impl SmtpServerCodec {
    pub fn new(codec: CommandCodec) -> Self {
        Self { codec }
    }
}

#[derive(Debug, Error)]
pub enum SmtpServerCodecError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("Parsing failed: {0}")]
    ParsingFailed(GrammarError),
}

impl PartialEq for SmtpServerCodecError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(error1), Self::Io(error2)) => error1.kind() == error2.kind(),
            (Self::LineTooLong { limit: limit1 }, Self::LineTooLong { limit: limit2 }) => {
                limit1 == limit2
            }
            (Self::ParsingFailed(reply1), Self::ParsingFailed(reply2)) => reply1 == reply2,
            _ => false,
        }
    }
}

impl TokioDecoder for SmtpServerCodec {
    type Item = Command;
    type Error = SmtpServerCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src) {
            Ok((remaining, command)) => {
                let to_consume = src.len() - remaining.len();
                src.advance(to_consume);
                Ok(Some(command))
            }
            Err(CommandDecodeError::Incomplete) => Ok(None),
            Err(CommandDecodeError::LineTooLong { limit }) => {
                Err(SmtpServerCodecError::LineTooLong { limit })
            }
            Err(CommandDecodeError::Failed { reply, discard }) => {
                src.advance(discard);
                Err(SmtpServerCodecError::ParsingFailed(reply))
            }
        }
    }
}

impl TokioEncoder<&Response> for SmtpServerCodec {
    type Error = IoError;

    fn encode(&mut self, item: &Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut writer = dst.writer();
        writer.write_all(&item.encode().dump())?;
        Ok(())
    }
}
