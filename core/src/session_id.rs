use std::fmt;

use thiserror::Error;

pub const SESSION_ID_LEN: usize = 10;
pub const SESSION_ID_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn is_valid_session_id(value: &str) -> bool {
    if value.len() != SESSION_ID_LEN {
        return false;
    }
    value.chars().all(|ch| SESSION_ID_ALPHABET.contains(ch))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(value: &str) -> Result<Self, SessionIdError> {
        if value.len() != SESSION_ID_LEN {
            return Err(SessionIdError::InvalidLength {
                expected: SESSION_ID_LEN,
                found: value.len(),
            });
        }
        for (idx, ch) in value.chars().enumerate() {
            if !SESSION_ID_ALPHABET.contains(ch) {
                return Err(SessionIdError::InvalidCharacter { ch, index: idx });
            }
        }
        Ok(Self(value.to_string()))
    }

    /// Builds an id from arbitrary indices into the alphabet, wrapping out of
    /// range values.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let alphabet = SESSION_ID_ALPHABET.as_bytes();
        let id = indices
            .into_iter()
            .take(SESSION_ID_LEN)
            .map(|idx| alphabet[idx % alphabet.len()] as char)
            .collect::<String>();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionIdError {
    #[error("session id must be {expected} chars, got {found}")]
    InvalidLength { expected: usize, found: usize },
    #[error("invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_alphanumeric_ids() {
        let id = SessionId::parse("Ab3dEf9hIj").unwrap();
        assert_eq!(id.as_str(), "Ab3dEf9hIj");
        assert!(is_valid_session_id("Ab3dEf9hIj"));
    }

    #[test]
    fn parse_reports_length_and_character() {
        assert_eq!(
            SessionId::parse("short"),
            Err(SessionIdError::InvalidLength {
                expected: SESSION_ID_LEN,
                found: 5
            })
        );
        assert_eq!(
            SessionId::parse("abcde-ghij"),
            Err(SessionIdError::InvalidCharacter { ch: '-', index: 5 })
        );
    }

    #[test]
    fn from_indices_wraps_into_alphabet() {
        let id = SessionId::from_indices((0..SESSION_ID_LEN).map(|i| i * 100));
        assert!(is_valid_session_id(id.as_str()));
    }
}
