//! SMTP responses.

use crate::{
    core::ReplyCode,
    error::{ValidationError, ValidationErrorKind},
};

/// A (possibly multi-line) numeric SMTP response.
///
/// A response is one reply code plus one or more message lines. On the wire,
/// every physical line repeats the code; all but the last carry the `-`
/// continuation separator. The lines stored here are bare text without code
/// prefix or terminator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    code: ReplyCode,
    lines: Vec<String>,
}

impl Response {
    /// Create a response from a raw code and message text.
    ///
    /// The text is split into lines on `\r?\n`, so handlers can pass
    /// multi-line text in one string. Empty text yields a single empty line.
    pub fn new(code: u16, text: impl AsRef<str>) -> Result<Self, ValidationError> {
        Ok(Self::with_code(ReplyCode::try_from(code)?, text))
    }

    /// Like [`Response::new`] with an already-validated code.
    pub fn with_code(code: ReplyCode, text: impl AsRef<str>) -> Self {
        // `split` on an empty string yields one empty element, which is
        // exactly the single empty line we want.
        let lines = text
            .as_ref()
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();

        Self { code, lines }
    }

    /// Create a response from pre-split lines, e.g. from a parser.
    ///
    /// Each line must be free of CR and LF; at least one line is required.
    pub fn from_parts(code: ReplyCode, lines: Vec<String>) -> Result<Self, ValidationError> {
        if lines.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        for line in &lines {
            if line.contains('\r') || line.contains('\n') {
                return Err(ValidationError::new(ValidationErrorKind::Invalid));
            }
        }

        Ok(Self { code, lines })
    }

    pub fn code(&self) -> ReplyCode {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// All message lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// True if the code is unknown or indicates an error.
    pub fn is_erroneous(&self) -> bool {
        self.code.is_erroneous()
    }
}
