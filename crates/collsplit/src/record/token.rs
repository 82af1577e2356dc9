//! Event reference tokens.
//!
//! A token is the string form of a persistent object reference:
//!
//! ```text
//! [DB=6E0ED5A8-0E0B-DF11-8D1C-0030487CD906][CNT=POOLContainer(DataHeader)][CLID=...][TECH=00000202][OID=00000003-0000002A]
//! ```
//!
//! The `DB` component is the id of the file holding the event and is what
//! collections are split on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reference token with its database (file) id extracted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Token {
    raw: String,
    db_id: String,
}

impl Token {
    /// Parse a token string.
    ///
    /// Strings without `[KEY=VALUE]` segments, or without a `DB` segment, are
    /// taken verbatim (trimmed) as their own database id.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let db_id = segment(&raw, "DB")
            .unwrap_or_else(|| raw.trim())
            .to_string();
        Self { raw, db_id }
    }

    /// The database (file) id this token points into.
    pub fn db_id(&self) -> &str {
        &self.db_id
    }

    /// Value of a named `[KEY=VALUE]` segment.
    pub fn field(&self, key: &str) -> Option<&str> {
        segment(&self.raw, key)
    }

    /// The original token string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn segment<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    raw.trim()
        .strip_prefix('[')?
        .split('[')
        .filter_map(|part| part.trim_end().strip_suffix(']'))
        .filter_map(|part| part.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

impl From<String> for Token {
    fn from(raw: String) -> Self {
        Token::parse(raw)
    }
}

impl From<&str> for Token {
    fn from(raw: &str) -> Self {
        Token::parse(raw)
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.raw
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
