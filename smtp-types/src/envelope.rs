//! Envelope routes: the `<...>` argument of MAIL FROM and RCPT TO.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use crate::{
    core::Domain,
    error::{ValidationError, ValidationErrorKind},
};

/// The mailbox designated by an envelope route.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Mailbox {
    /// The null reverse path `<>`. Only meaningful for MAIL.
    Null,
    /// The special `<postmaster>` recipient (case-insensitive on the wire).
    /// Only meaningful for RCPT.
    Postmaster,
    /// An ordinary `local-part@domain` mailbox.
    Address { local_part: String, domain: Domain },
}

impl Mailbox {
    /// Verify a mailbox local part.
    ///
    /// Deliberately permissive: any printable US-ASCII except the characters
    /// that delimit the surrounding path syntax. Callers that need full
    /// RFC 5321 `Dot-string`/`Quoted-string` strictness can validate upfront
    /// and construct the variant directly.
    pub fn verify_local_part(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        if let Some(at) = value.iter().position(|b| !is_local_part_char(*b)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        }

        Ok(())
    }

    pub fn address(
        local_part: impl Into<String>,
        domain: Domain,
    ) -> Result<Self, ValidationError> {
        let local_part = local_part.into();
        Self::verify_local_part(&local_part)?;

        Ok(Self::Address { local_part, domain })
    }

    /// The mailbox as a plain string; the null path is the empty string.
    pub fn to_wire_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Postmaster => String::from("postmaster"),
            Self::Address { local_part, domain } => format!("{}@{}", local_part, domain),
        }
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_wire_string())
    }
}

/// `local-part` accepts printable US-ASCII except SP and the path delimiters.
pub(crate) fn is_local_part_char(byte: u8) -> bool {
    matches!(byte, 0x21..=0x7e) && !matches!(byte, b'<' | b'>' | b':' | b',')
}

/// An envelope route: mailbox, optional (obsolete) source route, and ESMTP
/// parameters.
///
/// This is the value of both the reverse path of MAIL and the forward path of
/// RCPT. Parameters keep iteration order by name; a duplicate name overwrites
/// the earlier value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvelopeRoute {
    pub mailbox: Mailbox,
    /// Ordered source route, e.g. `@relay1,@relay2:` before the mailbox.
    pub route: Vec<Domain>,
    /// `name[=value]` parameters following the path.
    pub params: BTreeMap<String, Option<String>>,
}

impl EnvelopeRoute {
    pub fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox,
            route: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// The null reverse path `<>`.
    pub fn null() -> Self {
        Self::new(Mailbox::Null)
    }

    pub fn postmaster() -> Self {
        Self::new(Mailbox::Postmaster)
    }

    pub fn address(
        local_part: impl Into<String>,
        domain: Domain,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(Mailbox::address(local_part, domain)?))
    }

    pub fn with_route(mut self, route: Vec<Domain>) -> Self {
        self.route = route;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn is_null(&self) -> bool {
        self.mailbox == Mailbox::Null
    }

    pub fn is_postmaster(&self) -> bool {
        self.mailbox == Mailbox::Postmaster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_strings() {
        let tests = [
            (Mailbox::Null, ""),
            (Mailbox::Postmaster, "postmaster"),
            (
                Mailbox::address("alice", Domain::name("example.com").unwrap()).unwrap(),
                "alice@example.com",
            ),
        ];

        for (test, expected) in tests {
            assert_eq!(expected, test.to_wire_string());
        }
    }

    #[test]
    fn test_local_part_verify() {
        assert!(Mailbox::verify_local_part("alice").is_ok());
        assert!(Mailbox::verify_local_part("alice+tag").is_ok());
        assert!(Mailbox::verify_local_part("\"quoted\"").is_ok());

        assert!(Mailbox::verify_local_part("").is_err());
        assert!(Mailbox::verify_local_part("with space").is_err());
        assert!(Mailbox::verify_local_part("angle>bracket").is_err());
    }

    #[test]
    fn test_route_params_overwrite() {
        let route = EnvelopeRoute::null()
            .with_param("SIZE", Some("1".into()))
            .with_param("SIZE", Some("2".into()));

        assert_eq!(1, route.params.len());
        assert_eq!(Some(&Some(String::from("2"))), route.params.get("SIZE"));
    }
}
