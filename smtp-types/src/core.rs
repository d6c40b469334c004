//! Core data types.
//!
//! This module exposes smtp-types' "core types": the domain argument of
//! HELO/EHLO and of mailboxes, the 3-digit reply code, and the EHLO keyword
//! parameter value.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    net::IpAddr,
    str::FromStr,
};

use crate::error::{ValidationError, ValidationErrorKind};

/// A domain name or a bracketed address literal.
///
/// `domain = sub-domain *("." sub-domain)` where a sub-domain starts with an
/// alphanumeric character and continues with alphanumerics and `-`.
/// An address literal is an IP address used where a domain name would appear,
/// written in brackets, e.g., `[127.0.0.1]` or `[::1]`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Domain {
    Name(String),
    /// Bracketed address literal, stored without the brackets.
    Literal(IpAddr),
}

impl Domain {
    pub fn verify_name(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        let mut at_label_start = true;
        for (at, byte) in value.iter().copied().enumerate() {
            let ok = if at_label_start {
                is_sub_domain_start(byte)
            } else {
                is_sub_domain_char(byte) || byte == b'.'
            };

            if !ok {
                return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                    byte,
                    at,
                }));
            }

            at_label_start = byte == b'.';
        }

        // A trailing dot leaves an empty label.
        if at_label_start {
            return Err(ValidationError::new(ValidationErrorKind::Invalid));
        }

        Ok(())
    }

    pub fn name(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        Self::verify_name(&value)?;

        Ok(Self::Name(value))
    }

    pub fn literal(addr: IpAddr) -> Self {
        Self::Literal(addr)
    }

    /// The text as it appears on the wire, brackets included for literals.
    pub fn to_wire_string(&self) -> String {
        self.to_string()
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Literal(addr) => write!(f, "[{}]", addr),
        }
    }
}

impl TryFrom<&str> for Domain {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if let Some(literal) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            let addr = IpAddr::from_str(literal)
                .map_err(|_| ValidationError::new(ValidationErrorKind::Invalid))?;

            return Ok(Self::Literal(addr));
        }

        Self::name(value)
    }
}

impl TryFrom<String> for Domain {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// `Let-dig = ALPHA / DIGIT`, extended with `_` for hostnames in the wild.
pub(crate) fn is_sub_domain_start(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// `Ldh-str = *( ALPHA / DIGIT / "-" ) Let-dig`
pub(crate) fn is_sub_domain_char(byte: u8) -> bool {
    is_sub_domain_start(byte) || byte == b'-'
}

/// A 3-digit SMTP reply code.
///
/// `Reply-code = %x32-35 %x30-35 %x30-39` per RFC 5321. This type is less
/// strict and accepts any `100..=599` so that first-digit `1` (specified but
/// unused) and slightly out-of-grammar codes from real servers round-trip.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ReplyCode(u16);

impl ReplyCode {
    pub const SERVICE_READY: Self = Self(220);
    pub const CLOSING_CHANNEL: Self = Self(221);
    pub const OK: Self = Self(250);
    pub const CANNOT_VRFY: Self = Self(252);
    pub const START_MAIL_INPUT: Self = Self(354);
    pub const SHUTTING_DOWN: Self = Self(421);
    pub const LOCAL_ERROR: Self = Self(451);
    pub const TOO_MANY_RECIPIENTS: Self = Self(452);
    pub const SYNTAX_ERROR: Self = Self(500);
    pub const PARAMETER_SYNTAX_ERROR: Self = Self(501);
    pub const NOT_IMPLEMENTED: Self = Self(502);
    pub const BAD_SEQUENCE: Self = Self(503);
    pub const MESSAGE_TOO_BIG: Self = Self(552);
    pub const TRANSACTION_FAILED: Self = Self(554);

    pub fn verify(value: u16) -> Result<(), ValidationError> {
        if (100..=599).contains(&value) {
            Ok(())
        } else {
            Err(ValidationError::new(ValidationErrorKind::OutOfRange {
                value: u32::from(value),
                min: 100,
                max: 599,
            }))
        }
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// True for 2xx.
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// True for 3xx.
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.0)
    }

    /// True for 4xx.
    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.0)
    }

    /// True for 5xx.
    pub fn is_permanent_failure(&self) -> bool {
        self.0 >= 500
    }

    /// True unless 2xx or 3xx.
    pub fn is_erroneous(&self) -> bool {
        !self.is_positive() && !self.is_intermediate()
    }
}

impl TryFrom<u16> for ReplyCode {
    type Error = ValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value))
    }
}

impl From<ReplyCode> for u16 {
    fn from(code: ReplyCode) -> Self {
        code.0
    }
}

impl PartialEq<u16> for ReplyCode {
    fn eq(&self, other: &u16) -> bool {
        self.0 == *other
    }
}

impl Display for ReplyCode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// The value of an advertised EHLO keyword.
///
/// RFC 5321 leaves the parameter syntax to each keyword, so the value decides
/// its own rendering: a bare capability flag, a single preformatted value, or
/// a space-joined list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EhloParam {
    /// Keyword only, e.g. `PIPELINING`.
    Flag,
    /// Keyword with one value, e.g. `SIZE 10485760`.
    Value(String),
    /// Keyword with a word list, e.g. `AUTH PLAIN LOGIN`.
    List(Vec<String>),
}

impl EhloParam {
    /// The parameter text following the keyword, if any.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Flag => None,
            Self::Value(value) => Some(value.clone()),
            Self::List(items) => Some(items.join(" ")),
        }
    }
}

/// EHLO keywords advertised by a server, ordered by keyword.
pub type EhloKeywords = BTreeMap<String, EhloParam>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_name_verify() {
        let valid = ["example.com", "a", "mx-1.example.com", "_dmarc.example.com", "xn--nxasmq6b"];
        for test in valid {
            assert!(Domain::verify_name(test).is_ok(), "{test:?} should verify");
        }

        let invalid = ["", ".", "example.", ".example", "exa mple.com", "foo..bar", "[1.2.3.4]"];
        for test in invalid {
            assert!(Domain::verify_name(test).is_err(), "{test:?} should not verify");
        }
    }

    #[test]
    fn test_domain_literal_round_trip() {
        let tests = [("[127.0.0.1]", "[127.0.0.1]"), ("[::1]", "[::1]")];

        for (test, expected) in tests {
            let got = Domain::try_from(test).unwrap();
            assert!(matches!(got, Domain::Literal(_)));
            assert_eq!(expected, got.to_string());
        }

        assert!(Domain::try_from("[not-an-ip]").is_err());
    }

    #[test]
    fn test_reply_code() {
        assert!(ReplyCode::try_from(99).is_err());
        assert!(ReplyCode::try_from(600).is_err());

        let code = ReplyCode::try_from(250).unwrap();
        assert_eq!(code, ReplyCode::OK);
        assert!(code.is_positive());
        assert!(!code.is_erroneous());
        assert_eq!("250", code.to_string());

        assert!(ReplyCode::START_MAIL_INPUT.is_intermediate());
        assert!(ReplyCode::SHUTTING_DOWN.is_transient_failure());
        assert!(ReplyCode::BAD_SEQUENCE.is_permanent_failure());
    }

    #[test]
    fn test_ehlo_param_text() {
        assert_eq!(None, EhloParam::Flag.text());
        assert_eq!(
            Some(String::from("10485760")),
            EhloParam::Value("10485760".into()).text()
        );
        assert_eq!(
            Some(String::from("PLAIN LOGIN")),
            EhloParam::List(vec!["PLAIN".into(), "LOGIN".into()]).text()
        );
    }
}
