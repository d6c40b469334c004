use std::{collections::BTreeMap, net::IpAddr, str::from_utf8};

use abnf_core::{is_alpha, is_digit};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    combinator::opt,
    multi::separated_list1,
    sequence::{preceded, terminated},
};
use smtp_types::{
    core::Domain,
    envelope::{EnvelopeRoute, Mailbox},
};

use crate::codec::decode::{SmtpErrorKind, SmtpParseError, SmtpResult};

/// `SP` (exactly one space).
pub(crate) fn sp(input: &[u8]) -> SmtpResult<'_, ()> {
    match input.first() {
        Some(b' ') => Ok((&input[1..], ())),
        _ => Err(nom::Err::Error(SmtpParseError {
            input,
            kind: SmtpErrorKind::Expected("' '"),
        })),
    }
}

/// `Let-dig = ALPHA / DIGIT`, extended with `_` for hostnames in the wild.
fn is_sub_domain_start(byte: u8) -> bool {
    is_alpha(byte) || is_digit(byte) || byte == b'_'
}

/// `Ldh-str = *( ALPHA / DIGIT / "-" ) Let-dig`
fn is_sub_domain_char(byte: u8) -> bool {
    is_sub_domain_start(byte) || byte == b'-'
}

/// `sub-domain = Let-dig [Ldh-str]`
fn sub_domain(input: &[u8]) -> SmtpResult<'_, &[u8]> {
    match input.first() {
        Some(byte) if is_sub_domain_start(*byte) => {
            let end = input
                .iter()
                .position(|b| !is_sub_domain_char(*b))
                .unwrap_or(input.len());

            Ok((&input[end..], &input[..end]))
        }
        _ => Err(nom::Err::Error(SmtpParseError {
            input,
            kind: SmtpErrorKind::BadDomain,
        })),
    }
}

/// `Domain = sub-domain *("." sub-domain)`
pub(crate) fn domain(input: &[u8]) -> SmtpResult<'_, Domain> {
    let start_len = input.len();
    let (remaining, parts) = separated_list1(tag(b"."), sub_domain)(input)?;

    let matched = &input[..start_len - remaining.len()];
    debug_assert!(!parts.is_empty());

    // # Safety
    //
    // `unwrap` is safe because `sub_domain` matched ASCII-only characters.
    let name = from_utf8(matched).unwrap();

    Ok((remaining, Domain::Name(name.to_string())))
}

fn is_address_literal_char(byte: u8) -> bool {
    byte.is_ascii_hexdigit() || byte == b':' || byte == b'.'
}

/// `address-literal = "[" ( IPv4-address-literal / IPv6-address-literal ) "]"`
pub(crate) fn address_literal(input: &[u8]) -> SmtpResult<'_, Domain> {
    let (remaining, _) = tag(b"[")(input)?;

    // Past the opening bracket there is no going back; everything below
    // reports a hard failure rather than letting `alt` retry.
    let (remaining, literal) =
        terminated(take_while1(is_address_literal_char), tag(b"]"))(remaining).map_err(
            |_: nom::Err<SmtpParseError>| {
                nom::Err::Failure(SmtpParseError {
                    input,
                    kind: SmtpErrorKind::BadAddressLiteral,
                })
            },
        )?;

    // # Safety
    //
    // `unwrap` is safe because `is_address_literal_char` only matches ASCII.
    let literal = from_utf8(literal).unwrap();

    match literal.parse::<IpAddr>() {
        Ok(addr) => Ok((remaining, Domain::Literal(addr))),
        Err(_) => Err(nom::Err::Failure(SmtpParseError {
            input,
            kind: SmtpErrorKind::BadAddressLiteral,
        })),
    }
}

/// The argument of HELO/EHLO and the domain of a mailbox.
pub(crate) fn domain_or_address_literal(input: &[u8]) -> SmtpResult<'_, Domain> {
    alt((address_literal, domain))(input)
}

/// `Local-part`, deliberately permissive: printable US-ASCII minus the bytes
/// that delimit the surrounding path syntax.
fn is_local_part_wire_char(byte: u8) -> bool {
    matches!(byte, 0x21..=0x7e) && !matches!(byte, b'<' | b'>' | b':' | b',' | b'@')
}

fn local_part(input: &[u8]) -> SmtpResult<'_, &str> {
    let (remaining, bytes) = take_while1(is_local_part_wire_char)(input).map_err(
        |_: nom::Err<SmtpParseError>| {
            nom::Err::Error(SmtpParseError {
                input,
                kind: SmtpErrorKind::BadLocalPart,
            })
        },
    )?;

    // # Safety
    //
    // `unwrap` is safe because `is_local_part_wire_char` only matches ASCII.
    Ok((remaining, from_utf8(bytes).unwrap()))
}

/// `A-d-l = At-domain *( "," At-domain )` followed by `":"`, the obsolete
/// source route.
fn a_d_l(input: &[u8]) -> SmtpResult<'_, Vec<Domain>> {
    terminated(
        separated_list1(tag(b","), preceded(tag(b"@"), domain)),
        tag(b":"),
    )(input)
}

/// `Path = "<" [ A-d-l ":" ] Mailbox ">"`
pub(crate) fn path(input: &[u8]) -> SmtpResult<'_, EnvelopeRoute> {
    let (remaining, _) = tag(b"<")(input)?;
    let (remaining, route) = opt(a_d_l)(remaining)?;
    let (remaining, local_part) = local_part(remaining)?;
    let (remaining, _) = tag(b"@")(remaining)?;
    let (remaining, domain) = domain_or_address_literal(remaining)?;
    let (remaining, _) = tag(b">")(remaining)?;

    Ok((
        remaining,
        EnvelopeRoute {
            mailbox: Mailbox::Address {
                local_part: local_part.to_string(),
                domain,
            },
            route: route.unwrap_or_default(),
            params: BTreeMap::new(),
        },
    ))
}

/// `Reverse-path = Path / "<>"`
pub(crate) fn reverse_path(input: &[u8]) -> SmtpResult<'_, EnvelopeRoute> {
    let null: SmtpResult<'_, &[u8]> = tag(b"<>")(input);
    if let Ok((remaining, _)) = null {
        return Ok((remaining, EnvelopeRoute::null()));
    }

    path(input)
}

/// `Forward-path = Path`, plus the `<Postmaster>` special case.
pub(crate) fn forward_path(input: &[u8]) -> SmtpResult<'_, EnvelopeRoute> {
    let postmaster: SmtpResult<'_, &[u8]> = tag_no_case(b"<postmaster>")(input);
    if let Ok((remaining, _)) = postmaster {
        return Ok((remaining, EnvelopeRoute::postmaster()));
    }

    path(input)
}

/// `esmtp-keyword = (ALPHA / DIGIT) *(ALPHA / DIGIT / "-")`
fn is_param_name_char(byte: u8) -> bool {
    is_alpha(byte) || is_digit(byte) || byte == b'-'
}

/// `esmtp-value`: printable US-ASCII up to the next space.
fn is_param_value_char(byte: u8) -> bool {
    matches!(byte, 0x21..=0x7e)
}

/// `esmtp-param = esmtp-keyword ["=" esmtp-value]`
fn esmtp_param(input: &[u8]) -> SmtpResult<'_, (String, Option<String>)> {
    let (remaining, name) = take_while1(is_param_name_char)(input)?;
    let (remaining, value) = opt(preceded(tag(b"="), take_while(is_param_value_char)))(remaining)?;

    // # Safety
    //
    // `unwrap` is safe because both predicates only match ASCII.
    let name = from_utf8(name).unwrap().to_string();
    let value = value.map(|bytes| from_utf8(bytes).unwrap().to_string());

    Ok((remaining, (name, value)))
}

/// `Mail-parameters = esmtp-param *(SP esmtp-param)`, here including the
/// leading SP of each parameter. Duplicate names overwrite.
pub(crate) fn esmtp_params(input: &[u8]) -> SmtpResult<'_, BTreeMap<String, Option<String>>> {
    let mut params = BTreeMap::new();
    let mut remaining = input;

    while let Ok((rest, (name, value))) = preceded(sp, esmtp_param)(remaining) {
        params.insert(name, value);
        remaining = rest;
    }

    Ok((remaining, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain() {
        let (remaining, got) = domain(b"mx-1.example.com rest").unwrap();
        assert_eq!(b" rest", remaining);
        assert_eq!(Domain::name("mx-1.example.com").unwrap(), got);

        assert!(domain(b"-nope").is_err());
        assert!(domain(b".nope").is_err());
    }

    #[test]
    fn test_address_literal() {
        let (remaining, got) = address_literal(b"[127.0.0.1]>").unwrap();
        assert_eq!(b">", remaining);
        assert_eq!("[127.0.0.1]", got.to_string());

        let (_, got) = address_literal(b"[::1]").unwrap();
        assert_eq!("[::1]", got.to_string());

        // Commits after the opening bracket.
        assert!(matches!(
            address_literal(b"[zz]"),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_path_with_source_route() {
        let (remaining, got) = path(b"<@a.example,@b.example:carol@example.com>").unwrap();
        assert!(remaining.is_empty());
        assert_eq!(2, got.route.len());
        assert_eq!("carol@example.com", got.mailbox.to_wire_string());
    }

    #[test]
    fn test_reverse_path_null() {
        let (remaining, got) = reverse_path(b"<> SIZE=1").unwrap();
        assert_eq!(b" SIZE=1", remaining);
        assert!(got.is_null());
    }

    #[test]
    fn test_esmtp_params() {
        let (remaining, got) = esmtp_params(b" SIZE=1024 BODY=8BITMIME FLAG").unwrap();
        assert!(remaining.is_empty());
        assert_eq!(3, got.len());
        assert_eq!(Some(&Some(String::from("1024"))), got.get("SIZE"));
        assert_eq!(Some(&None), got.get("FLAG"));

        // Anything that is not a parameter is left for the caller.
        let (remaining, got) = esmtp_params(b" SIZE=1 ?").unwrap();
        assert_eq!(b" ?", remaining);
        assert_eq!(1, got.len());
    }
}
