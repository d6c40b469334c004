use std::str::from_utf8;

use abnf_core::is_digit;
use nom::bytes::complete::take_while_m_n;

use crate::codec::decode::{SmtpErrorKind, SmtpParseError, SmtpResult};

/// One physical line of a reply, terminator stripped.
pub(crate) struct ReplyLine {
    pub code: u16,
    /// `true` when the separator was SP (or the text was absent entirely),
    /// i.e., this line terminates the response.
    pub last: bool,
    pub text: String,
}

/// `Reply-code = 3DIGIT`, constrained to 100..=599.
pub(crate) fn reply_code(input: &[u8]) -> SmtpResult<'_, u16> {
    let (remaining, digits) =
        take_while_m_n(3, 3, is_digit)(input).map_err(|_: nom::Err<SmtpParseError>| {
            nom::Err::Error(SmtpParseError {
                input,
                kind: SmtpErrorKind::BadReplyCode,
            })
        })?;

    // # Safety
    //
    // `unwrap`s are safe because `is_digit` matched exactly three ASCII
    // digits, which always form a valid u16.
    let code = from_utf8(digits).unwrap().parse::<u16>().unwrap();

    if !(100..=599).contains(&code) {
        return Err(nom::Err::Failure(SmtpParseError {
            input,
            kind: SmtpErrorKind::BadReplyCode,
        }));
    }

    Ok((remaining, code))
}

/// `Reply-line = Reply-code [ ("-" / SP) textstring ]`
///
/// Operates on a complete line with the terminator already stripped. A line
/// of only the code terminates the response, as does a SP separator; `-`
/// announces a continuation line.
pub(crate) fn reply_line(line: &[u8]) -> Result<ReplyLine, String> {
    let (rest, code) = reply_code(line).map_err(|error| match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.kind.to_string(),
        nom::Err::Incomplete(_) => SmtpErrorKind::BadReplyCode.to_string(),
    })?;

    let (last, text) = match rest.first() {
        None => (true, &b""[..]),
        Some(b' ') => (true, &rest[1..]),
        Some(b'-') => (false, &rest[1..]),
        Some(_) => return Err(String::from("expected ' ' or '-' after the reply code")),
    };

    Ok(ReplyLine {
        code,
        last,
        text: String::from_utf8_lossy(text).into_owned(),
    })
}
