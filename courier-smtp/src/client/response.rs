//! SMTP reply parsing and representation.

use super::error::{ClientError, Result};

/// Returns `true` if `code` is a permanent (5xx) failure.
///
/// This is the single rule used to decide whether a rejection should bounce
/// the message or leave it queued for a later retry.
#[must_use]
pub const fn is_permanent_code(code: u16) -> bool {
    code / 100 == 5
}

/// Represents a single line in an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line reply.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete SMTP reply, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the reply.
    pub lines: Vec<String>,
}

impl Response {
    /// Creates a new `Response`.
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` if this reply indicates success (2xx code).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` if this reply asks for more input (3xx code).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Returns `true` if this reply indicates a permanent error (5xx code).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        is_permanent_code(self.code)
    }

    /// Parses a single reply line, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the line doesn't match `<code>[ -]<text>`.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return Err(ClientError::Parse(format!("invalid reply line: '{line}'")));
        }

        let code = bytes[..3]
            .iter()
            .fold(0u16, |code, digit| code * 10 + u16::from(digit - b'0'));

        let is_last = match bytes.get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(c) => {
                return Err(ClientError::Parse(format!(
                    "invalid separator character: '{}'",
                    char::from(*c)
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete, possibly multi-line, reply from the start of `buffer`.
    ///
    /// Lines may end in CRLF or a bare LF. Returns the parsed reply and the
    /// number of bytes consumed, or `None` if the buffer does not yet hold a
    /// final line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the reply is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut first_code = None;

        while let Some(end) = buffer[consumed..].iter().position(|b| *b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                // Stray line ends between replies are skipped, but not inside one.
                if first_code.is_some() {
                    return Err(ClientError::Parse(
                        "empty line inside multi-line reply".to_string(),
                    ));
                }
                continue;
            }

            let parsed_line = Self::parse_line(std::str::from_utf8(raw)?)?;

            match first_code {
                Some(code) if parsed_line.code != code => {
                    return Err(ClientError::Parse(format!(
                        "status code mismatch in multi-line reply: expected {code}, got {}",
                        parsed_line.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed_line.code),
            }

            lines.push(parsed_line.message);

            if parsed_line.is_last {
                return Ok(Some((Self::new(parsed_line.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
