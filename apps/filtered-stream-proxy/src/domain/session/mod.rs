//! Session Identity
//!
//! The caller-supplied token that keys a session, and the server-assigned
//! id that distinguishes successive sessions created for the same token.

use std::fmt;

use uuid::Uuid;

/// Errors constructing a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Token was empty or whitespace.
    #[error("token cannot be empty")]
    Empty,
}

/// Opaque bearer credential that identifies a session.
///
/// `Debug` and `Display` only show the last four characters so tokens can
/// be passed to log macros without leaking them.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Create a token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Empty` for an empty or whitespace-only value.
    pub fn new(value: impl Into<String>) -> Result<Self, TokenError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(Self(value))
    }

    /// The raw credential, for `Authorization` headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn redacted(&self) -> String {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{tail}")
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Server-assigned id of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_rejected() {
        assert_eq!(Token::new("").unwrap_err(), TokenError::Empty);
        assert_eq!(Token::new("   ").unwrap_err(), TokenError::Empty);
    }

    #[test]
    fn token_redacted_in_debug_and_display() {
        let token = Token::new("AAAAsecretvalue1234").unwrap();
        let debug = format!("{token:?}");
        let display = token.to_string();

        assert!(!debug.contains("secretvalue"));
        assert!(debug.contains("****1234"));
        assert_eq!(display, "****1234");
        assert_eq!(token.expose(), "AAAAsecretvalue1234");
    }

    #[test]
    fn short_token_redaction() {
        let token = Token::new("ab").unwrap();
        assert_eq!(token.to_string(), "****ab");
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
