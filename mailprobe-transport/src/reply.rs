//! SMTP reply parsing.

use crate::error::{Result, TransportError};

/// Upper bound on a single buffered reply.
pub(crate) const MAX_REPLY_SIZE: usize = 1024 * 1024;

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All text lines joined by a single space.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    #[must_use]
    pub const fn is_permanent_failure(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Capability keywords from an EHLO reply.
    ///
    /// The first line carries the server's greeting name and is skipped.
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .skip(1)
            .filter_map(|line| line.split_whitespace().next())
    }

    /// Whether an EHLO reply advertises `keyword` (case-insensitive).
    #[must_use]
    pub fn advertises(&self, keyword: &str) -> bool {
        self.capabilities()
            .any(|capability| capability.eq_ignore_ascii_case(keyword))
    }

    /// SASL mechanisms listed on the `AUTH` capability line, upper-cased.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.lines
            .iter()
            .skip(1)
            .filter_map(|line| {
                // Some servers still send the pre-RFC `AUTH=LOGIN` form.
                let (keyword, rest) = line.split_once([' ', '=']).unwrap_or((line, ""));
                keyword.eq_ignore_ascii_case("AUTH").then_some(rest)
            })
            .flat_map(str::split_whitespace)
            .map(str::to_ascii_uppercase)
            .collect()
    }

    /// Attempts to parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None` when
    /// more data is needed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Parse`] for malformed lines or a code that
    /// changes between lines of the same reply.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let (line_code, last, text) = parse_line(std::str::from_utf8(raw)?)?;
            match code {
                None => code = Some(line_code),
                Some(expected) if expected != line_code => {
                    return Err(TransportError::Parse(format!(
                        "reply code changed from {expected} to {line_code} mid-reply"
                    )));
                }
                Some(_) => {}
            }
            lines.push(text.to_string());

            if last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

/// Splits `250-text` / `250 text` / `250` into (code, is-last, text).
fn parse_line(line: &str) -> Result<(u16, bool, &str)> {
    let code = line
        .get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(|| TransportError::Parse(format!("invalid reply line '{line}'")))?;

    match line.as_bytes().get(3) {
        None => Ok((code, true, "")),
        Some(b' ') => Ok((code, true, &line[4..])),
        Some(b'-') => Ok((code, false, &line[4..])),
        Some(other) => Err(TransportError::Parse(format!(
            "invalid separator '{}' in '{line}'",
            char::from(*other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn single_line_reply() {
        let (reply, consumed) = Reply::parse(b"220 smtp.acme.org ESMTP\r\n").unwrap().unwrap();
        assert_eq!(reply, Reply::new(220, vec!["smtp.acme.org ESMTP".into()]));
        assert_eq!(consumed, 25);
    }

    #[test]
    fn bare_code_line() {
        let (reply, _) = Reply::parse(b"221\r\n").unwrap().unwrap();
        assert_eq!(reply.code, 221);
        assert_eq!(reply.lines, vec![String::new()]);
    }

    #[test]
    fn multi_line_reply_leaves_trailing_bytes() {
        let data = b"250-smtp.acme.org\r\n250-SIZE 1000\r\n250 STARTTLS\r\n221 bye\r\n";
        let (reply, consumed) = Reply::parse(data).unwrap().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(&data[consumed..], b"221 bye\r\n");
    }

    #[test]
    fn incomplete_reply_needs_more_data() {
        assert!(Reply::parse(b"250-smtp.acme.org\r\n250 STA").unwrap().is_none());
        assert!(Reply::parse(b"").unwrap().is_none());
    }

    #[test]
    fn bare_lf_is_accepted() {
        let (reply, consumed) = Reply::parse(b"250 OK\n").unwrap().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(consumed, 7);
    }

    #[test]
    fn code_mismatch_is_an_error() {
        let err = Reply::parse(b"250-first\r\n251 second\r\n").unwrap_err();
        assert!(matches!(err, TransportError::Parse(_)));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(Reply::parse(b"hello\r\n").is_err());
        assert!(Reply::parse(b"250_OK\r\n").is_err());
    }

    #[test]
    fn capabilities_skip_greeting_line() {
        let reply = Reply::new(
            250,
            vec![
                "smtp.acme.org greets you".into(),
                "SIZE 10240000".into(),
                "starttls".into(),
                "AUTH LOGIN PLAIN".into(),
            ],
        );
        assert_eq!(
            reply.capabilities().collect::<Vec<_>>(),
            vec!["SIZE", "starttls", "AUTH"]
        );
        assert!(reply.advertises("STARTTLS"));
        assert!(!reply.advertises("smtp.acme.org"));
        assert_eq!(reply.auth_mechanisms(), vec!["LOGIN", "PLAIN"]);
    }

    #[test]
    fn legacy_auth_capability() {
        let reply = Reply::new(250, vec!["mx".into(), "AUTH=login plain".into()]);
        assert_eq!(reply.auth_mechanisms(), vec!["LOGIN", "PLAIN"]);
    }

    #[test]
    fn classification() {
        assert!(Reply::new(502, vec![]).is_permanent_failure());
        assert!(!Reply::new(421, vec![]).is_permanent_failure());
        assert!(!Reply::new(250, vec![]).is_permanent_failure());
    }
}
