use crate::NumlogError;
use std::fmt;
use std::str::FromStr;

/// Number of digits in every token.
pub const TOKEN_WIDTH: usize = 9;

/// A nine digit decimal number. Leading zeros are part of the wire form, so the value is
/// always rendered back zero-padded to nine digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u32);

impl Token {
    /// Classify one line (terminator already stripped).
    pub fn parse(line: &[u8]) -> Result<Self, NumlogError> {
        if line.len() != TOKEN_WIDTH || !line.iter().all(u8::is_ascii_digit) {
            return Err(NumlogError::MalformedToken(
                String::from_utf8_lossy(line).into_owned(),
            ));
        }
        let value = line
            .iter()
            .fold(0u32, |acc, digit| acc * 10 + u32::from(digit - b'0'));
        Ok(Token(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl FromStr for Token {
    type Err = NumlogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::parse(s.as_bytes())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = TOKEN_WIDTH)
    }
}

/// Strip a trailing `\n` or `\r\n` from a raw line.
pub fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }
    }
    line
}
