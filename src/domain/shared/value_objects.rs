//! Shared value objects used across the softphone core

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Local identifier for one call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dialable phone number value object
///
/// Formatting characters are stripped on parse; a leading `+` is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("Phone number is empty".to_string());
        }

        let mut normalized = String::with_capacity(raw.len());
        for (i, c) in raw.chars().enumerate() {
            match c {
                '0'..='9' => normalized.push(c),
                '+' if i == 0 => normalized.push(c),
                ' ' | '-' | '(' | ')' | '.' => {}
                _ => return Err(format!("Invalid character '{}' in phone number", c)),
            }
        }

        let digits = normalized.trim_start_matches('+').len();
        if digits < 3 {
            return Err(format!("Phone number '{}' is too short", raw));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable rendering, e.g. `+1 (206) 555-0100`
    pub fn display(&self) -> String {
        format_phone(&self.0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a North American number for display; anything else is returned as-is.
pub fn format_phone(number: &str) -> String {
    let d: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if d.len() == 11 && d.starts_with('1') {
        return format!("+1 ({}) {}-{}", &d[1..4], &d[4..7], &d[7..]);
    }
    if d.len() == 10 {
        return format!("({}) {}-{}", &d[0..3], &d[3..6], &d[6..]);
    }
    number.to_string()
}

/// A single DTMF tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DtmfDigit(char);

impl DtmfDigit {
    pub fn new(c: char) -> Result<Self, String> {
        let c = c.to_ascii_uppercase();
        match c {
            '0'..='9' | '*' | '#' | 'A'..='D' => Ok(Self(c)),
            _ => Err(format!("'{}' is not a DTMF digit", c)),
        }
    }

    pub fn as_char(&self) -> char {
        self.0
    }
}

impl fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
