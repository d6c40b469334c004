use nom::{
    bytes::complete::{tag_no_case, take_while},
    sequence::preceded,
};
use smtp_types::command::{Command, Verb};

use crate::{
    codec::decode::{GrammarError, SmtpErrorKind, SmtpResult},
    rfc5321::core::{domain_or_address_literal, esmtp_params, forward_path, reverse_path, sp},
};

/// Parse the arguments of `verb` from the remainder of a complete command
/// line (verb token already consumed, terminator stripped).
///
/// A failure maps to the reply the server sends: `501` for HELO/EHLO
/// argument errors, `500` for everything else, each chaining the deepest
/// grammar error into the message.
pub(crate) fn command_args(verb: Verb, input: &[u8]) -> Result<Command, GrammarError> {
    let result = match verb {
        Verb::Helo => helo(input),
        Verb::Ehlo => ehlo(input),
        Verb::Mail => mail(input),
        Verb::Rcpt => rcpt(input),
        Verb::Data => no_args(input, Command::Data),
        Verb::Rset => no_args(input, Command::Rset),
        Verb::Noop => no_args(input, Command::Noop),
        Verb::Vrfy => vrfy(input),
        Verb::Quit => no_args(input, Command::Quit),
    };

    match result {
        Ok((remaining, command)) if remaining.is_empty() => Ok(command),
        Ok(_) => Err(grammar_error(verb, SmtpErrorKind::TrailingBytes)),
        Err(nom::Err::Error(error)) | Err(nom::Err::Failure(error)) => {
            Err(grammar_error(verb, error.kind))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(grammar_error(verb, SmtpErrorKind::Expected("a complete line")))
        }
    }
}

fn grammar_error(verb: Verb, kind: SmtpErrorKind) -> GrammarError {
    let code = match verb {
        Verb::Helo | Verb::Ehlo => 501,
        _ => 500,
    };

    GrammarError::new(code, format!("Invalid {} command: {}", verb.name(), kind))
}

/// `helo = "HELO" SP Domain CRLF`
fn helo(input: &[u8]) -> SmtpResult<'_, Command> {
    let (remaining, domain) = preceded(sp, domain_or_address_literal)(input)?;

    Ok((remaining, Command::Helo { domain }))
}

/// `ehlo = "EHLO" SP ( Domain / address-literal ) CRLF`
fn ehlo(input: &[u8]) -> SmtpResult<'_, Command> {
    let (remaining, domain) = preceded(sp, domain_or_address_literal)(input)?;

    Ok((remaining, Command::Ehlo { domain }))
}

/// `mail = "MAIL FROM:" Reverse-path [SP Mail-parameters] CRLF`
fn mail(input: &[u8]) -> SmtpResult<'_, Command> {
    let (remaining, _) = sp(input)?;
    let (remaining, _) = tag_no_case(b"FROM:")(remaining)?;
    let (remaining, mut reverse_path) = reverse_path(remaining)?;
    let (remaining, params) = esmtp_params(remaining)?;

    reverse_path.params = params;

    Ok((remaining, Command::Mail { reverse_path }))
}

/// `rcpt = "RCPT TO:" Forward-path [SP Rcpt-parameters] CRLF`
fn rcpt(input: &[u8]) -> SmtpResult<'_, Command> {
    let (remaining, _) = sp(input)?;
    let (remaining, _) = tag_no_case(b"TO:")(remaining)?;
    let (remaining, mut forward_path) = forward_path(remaining)?;
    let (remaining, params) = esmtp_params(remaining)?;

    forward_path.params = params;

    Ok((remaining, Command::Rcpt { forward_path }))
}

/// `vrfy = "VRFY" SP String CRLF`
fn vrfy(input: &[u8]) -> SmtpResult<'_, Command> {
    let (remaining, target) = preceded(sp, take_while(|b| b != b' '))(input)?;

    if target.is_empty() {
        return Err(nom::Err::Error(crate::codec::decode::SmtpParseError {
            input,
            kind: SmtpErrorKind::Expected("a mailbox or user name"),
        }));
    }

    let target = String::from_utf8_lossy(target).into_owned();

    Ok((remaining, Command::Vrfy { target }))
}

/// The argument-less verbs: the exact token, optional trailing whitespace,
/// end of line.
fn no_args(input: &[u8], command: Command) -> SmtpResult<'_, Command> {
    let (remaining, _) = take_while(|b| b == b' ' || b == b'\t')(input)?;

    Ok((remaining, command))
}

#[cfg(test)]
mod tests {
    use smtp_types::envelope::Mailbox;

    use super::*;

    #[test]
    fn test_no_args_trailing_whitespace() {
        assert_eq!(Ok(Command::Quit), command_args(Verb::Quit, b""));
        assert_eq!(Ok(Command::Quit), command_args(Verb::Quit, b"  "));
        assert!(command_args(Verb::Quit, b" again").is_err());
    }

    #[test]
    fn test_mail_from_case_insensitive() {
        let got = command_args(Verb::Mail, b" from:<>").unwrap();
        assert_eq!(
            Command::Mail {
                reverse_path: smtp_types::envelope::EnvelopeRoute::null()
            },
            got
        );
    }

    #[test]
    fn test_error_message_chains_deepest_error() {
        let error = command_args(Verb::Mail, b" FROM:<alice@->").unwrap_err();

        assert_eq!(500, error.code);
        assert!(
            error.message.starts_with("Invalid MAIL command:"),
            "{}",
            error.message
        );
    }

    #[test]
    fn test_helo_address_literal() {
        let got = command_args(Verb::Helo, b" [192.0.2.1]").unwrap();

        let Command::Helo { domain } = got else {
            panic!("expected HELO");
        };
        assert_eq!("[192.0.2.1]", domain.to_string());
    }

    #[test]
    fn test_rcpt_postmaster_keeps_params() {
        let got = command_args(Verb::Rcpt, b" TO:<postmaster> NOTIFY=NEVER").unwrap();

        let Command::Rcpt { forward_path } = got else {
            panic!("expected RCPT");
        };
        assert_eq!(Mailbox::Postmaster, forward_path.mailbox);
        assert_eq!(
            Some(&Some(String::from("NEVER"))),
            forward_path.params.get("NOTIFY")
        );
    }

}
