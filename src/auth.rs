// Credential checks. Verifying users belongs to an outside service; the crate only needs to
// know who is signed in.
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserName(String);

impl UserName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserName {
    fn from(name: &str) -> Self {
        UserName(name.to_string())
    }
}

// What a user types at the login prompt. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    // Both fields present once surrounding whitespace is ignored.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.trim().is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait CredentialVerifier {
    fn verify(&self, credentials: &Credentials) -> Result<UserName, AuthError>;
}

/// Accepts any complete pair and signs the user in under the trimmed username. Suitable for a
/// single-user terminal where the data directory already belongs to the person at the keyboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalVerifier;

impl CredentialVerifier for LocalVerifier {
    fn verify(&self, credentials: &Credentials) -> Result<UserName, AuthError> {
        if !credentials.is_complete() {
            return Err(AuthError::MissingCredentials);
        }
        let username = credentials.username.trim();
        if username.contains('/') {
            return Err(AuthError::Rejected);
        }
        log::info!("User {username} signed in");
        Ok(UserName::from(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_missing_credentials() {
        for (user, pass) in [("", "x"), ("ana", ""), ("  ", "  ")] {
            assert_eq!(
                LocalVerifier.verify(&Credentials::new(user, pass)),
                Err(AuthError::MissingCredentials)
            );
        }
    }

    #[test]
    fn username_is_trimmed() {
        let user = LocalVerifier
            .verify(&Credentials::new(" ana ", "secret"))
            .unwrap();
        assert_eq!(user.as_str(), "ana");
        assert_eq!(user.to_string(), "ana");
    }

    #[test]
    fn path_like_names_are_rejected() {
        assert_eq!(
            LocalVerifier.verify(&Credentials::new("ana/../bob", "x")),
            Err(AuthError::Rejected)
        );
    }

    #[test]
    fn debug_hides_the_password() {
        let shown = format!("{:?}", Credentials::new("ana", "hunter2"));
        assert!(!shown.contains("hunter2"));
    }
}
