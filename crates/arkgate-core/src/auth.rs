//! Bearer credential extracted from the inbound `Authorization` header.

use std::fmt;

const BEARER_PREFIX: &str = "Bearer ";

/// Opaque bearer token supplied by the caller and forwarded to the backend.
///
/// The token is never printed: `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Parse an `Authorization` header value of the form `Bearer <token>`.
    ///
    /// Returns `None` when the header is absent, uses another scheme, or the
    /// token is blank after trimming.
    #[must_use]
    pub fn from_authorization(header: Option<&str>) -> Option<Self> {
        let token = header?.strip_prefix(BEARER_PREFIX)?.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self(token.to_string()))
    }

    /// The raw token, for building the upstream `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bearer_and_trims_token() {
        let cred = Credential::from_authorization(Some("Bearer   sk-abc  ")).unwrap();
        assert_eq!(cred.expose(), "sk-abc");
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        assert!(Credential::from_authorization(None).is_none());
        assert!(Credential::from_authorization(Some("")).is_none());
        assert!(Credential::from_authorization(Some("Token abc")).is_none());
        assert!(Credential::from_authorization(Some("bearer abc")).is_none());
        assert!(Credential::from_authorization(Some("Bearer")).is_none());
        assert!(Credential::from_authorization(Some("Bearer    ")).is_none());
    }

    #[test]
    fn token_is_redacted_in_logs() {
        let cred = Credential::from_authorization(Some("Bearer secret-token")).unwrap();
        assert!(!format!("{cred:?}").contains("secret"));
        assert!(!format!("{cred}").contains("secret"));
    }
}
