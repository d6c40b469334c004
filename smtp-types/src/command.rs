//! SMTP commands.

use std::fmt::{Display, Formatter};

use crate::{core::Domain, envelope::EnvelopeRoute, state::SessionState};

/// An SMTP command, one variant per verb.
///
/// Each variant carries only the attributes its verb needs. The verbs of the
/// minimal RFC 5321 command set are covered; everything else surfaces as an
/// unknown command to the engines.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Helo { domain: Domain },
    Ehlo { domain: Domain },
    Mail { reverse_path: EnvelopeRoute },
    Rcpt { forward_path: EnvelopeRoute },
    Data,
    Rset,
    Noop,
    Vrfy { target: String },
    Quit,
}

impl Command {
    pub fn verb(&self) -> Verb {
        match self {
            Self::Helo { .. } => Verb::Helo,
            Self::Ehlo { .. } => Verb::Ehlo,
            Self::Mail { .. } => Verb::Mail,
            Self::Rcpt { .. } => Verb::Rcpt,
            Self::Data => Verb::Data,
            Self::Rset => Verb::Rset,
            Self::Noop => Verb::Noop,
            Self::Vrfy { .. } => Verb::Vrfy,
            Self::Quit => Verb::Quit,
        }
    }
}

/// The verb of a [`Command`], detached from its arguments.
///
/// The verb owns the state legality table: `is_legal_in` answers whether a
/// server in `state` accepts the verb at all (argument validation aside).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Verb {
    Helo,
    Ehlo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Noop,
    Vrfy,
    Quit,
}

impl Verb {
    pub const ALL: [Verb; 9] = [
        Verb::Helo,
        Verb::Ehlo,
        Verb::Mail,
        Verb::Rcpt,
        Verb::Data,
        Verb::Rset,
        Verb::Noop,
        Verb::Vrfy,
        Verb::Quit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Helo => "HELO",
            Self::Ehlo => "EHLO",
            Self::Mail => "MAIL",
            Self::Rcpt => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Vrfy => "VRFY",
            Self::Quit => "QUIT",
        }
    }

    /// Look up a verb by its (case-insensitive) wire name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|verb| verb.name().eq_ignore_ascii_case(name))
    }

    /// Whether a server in `state` accepts this verb.
    pub fn is_legal_in(&self, state: SessionState) -> bool {
        use SessionState::*;

        match self {
            Self::Helo | Self::Ehlo => matches!(state, Handshake | Ready | Mail | Data),
            Self::Mail => matches!(state, Ready),
            Self::Rcpt => matches!(state, Mail),
            Self::Data => matches!(state, Mail),
            Self::Rset | Self::Noop | Self::Vrfy => matches!(state, Handshake | Ready | Mail),
            Self::Quit => matches!(state, Handshake | Reject | Ready | Mail),
        }
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The set of verbs enabled on a session.
///
/// Engines build their set at construction; there is no global command table.
/// A verb that is known (present in [`Verb::ALL`]) but absent from the set
/// draws `502 Unimplemented` instead of `500 Unknown command`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VerbSet(u16);

impl VerbSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The verbs every session speaks by default. VRFY is registered but
    /// disabled, which makes it answer 502 until explicitly enabled.
    pub fn base() -> Self {
        let mut set = Self::empty();
        for verb in [
            Verb::Helo,
            Verb::Ehlo,
            Verb::Mail,
            Verb::Rcpt,
            Verb::Data,
            Verb::Rset,
            Verb::Noop,
            Verb::Quit,
        ] {
            set.insert(verb);
        }
        set
    }

    pub fn insert(&mut self, verb: Verb) {
        self.0 |= 1 << (verb as u16);
    }

    pub fn remove(&mut self, verb: Verb) {
        self.0 &= !(1 << (verb as u16));
    }

    pub fn contains(&self, verb: Verb) -> bool {
        self.0 & (1 << (verb as u16)) != 0
    }
}

impl FromIterator<Verb> for VerbSet {
    fn from_iter<I: IntoIterator<Item = Verb>>(iter: I) -> Self {
        let mut set = Self::empty();
        for verb in iter {
            set.insert(verb);
        }
        set
    }
}
