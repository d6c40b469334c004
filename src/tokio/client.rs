use std::io::{Error as IoError, Write};

use bytes::{Buf, BufMut, BytesMut};
use smtp_types::{command::Command, response::Response};
use thiserror::Error;
use tokio_util::codec::{Decoder as TokioDecoder, Encoder as TokioEncoder};

use crate::codec::{
    decode::{Decoder, ResponseDecodeError},
    encode::Encode,
    ResponseCodec,
};

/// Client-side [`tokio_util::codec`] adapter: decodes [`Response`]s, encodes
/// [`Command`]s.
///
/// The greeting needs no separate decoder in SMTP; it is an ordinary
/// response, so the first decoded item is the server's 220 (or 554).
#[derive(Debug, Default)]
pub struct SmtpClientCodec {
    codec: ResponseCodec,
}

impl SmtpClientCodec {
    pub fn new(codec: ResponseCodec) -> Self {
        Self { codec }
    }
}

#[derive(Debug, Error)]
pub enum SmtpClientCodecError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("Parsing failed: {0}")]
    ParsingFailed(String),
}

impl PartialEq for SmtpClientCodecError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(error1), Self::Io(error2)) => error1.kind() == error2.kind(),
            (Self::LineTooLong { limit: limit1 }, Self::LineTooLong { limit: limit2 }) => {
                limit1 == limit2
            }
            (Self::ParsingFailed(message1), Self::ParsingFailed(message2)) => {
                message1 == message2
            }
            _ => false,
        }
    }
}

impl TokioDecoder for SmtpClientCodec {
    type Item = Response;
    type Error = SmtpClientCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src) {
            Ok((remaining, response)) => {
                let to_consume = src.len() - remaining.len();
                src.advance(to_consume);
                Ok(Some(response))
            }
            Err(ResponseDecodeError::Incomplete) => Ok(None),
            Err(ResponseDecodeError::LineTooLong { limit }) => {
                Err(SmtpClientCodecError::LineTooLong { limit })
            }
            Err(ResponseDecodeError::Failed { message, discard }) => {
                src.advance(discard);
                Err(SmtpClientCodecError::ParsingFailed(message))
            }
        }
    }
}

impl TokioEncoder<&Command> for SmtpClientCodec {
    type Error = IoError;

    fn encode(&mut self, item: &Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut writer = dst.writer();
        writer.write_all(&item.encode().dump())?;
        Ok(())
    }
}
