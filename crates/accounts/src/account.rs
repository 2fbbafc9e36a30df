//! Account records

use nexus_core::AccountId;
use nexus_crypto::{SrpVerifier, PASSWORD_VERIFIER_LENGTH, SALT_LENGTH};
use std::fmt;

/// May log in and enter the world
pub const ACCESS_PLAYER: u32 = 0x0001;

/// Game master commands
pub const ACCESS_GM: u32 = 0x0002;

/// A login account
///
/// # Purpose
/// Everything the login tier needs to authenticate a player and the realm
/// tier needs to admit them. Only the salt and password verifier are kept,
/// never the password itself.
///
/// # File Format
/// ```text
/// NXACC001
/// ID 1
/// EMAIL player@example.com
/// SALT <32 hex digits>
/// VERIFIER <256 hex digits, little endian>
/// ACCESS 1
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    /// Login name; matched case-insensitively
    pub email: String,
    pub salt: [u8; SALT_LENGTH],
    pub verifier: [u8; PASSWORD_VERIFIER_LENGTH],
    /// Bitmask of `ACCESS_*` flags
    pub access_mask: u32,
}

impl Account {
    /// Create an account from a plaintext password; only the verifier is kept
    pub fn with_password(id: AccountId, email: &str, password: &str) -> Self {
        let credentials = SrpVerifier::from_username_and_password(email, password);
        Self {
            id,
            email: email.to_string(),
            salt: *credentials.salt(),
            verifier: *credentials.password_verifier(),
            access_mask: ACCESS_PLAYER,
        }
    }

    /// Lowercased login name, the key accounts are stored under
    pub fn login_key(&self) -> String {
        normalize_login(&self.email)
    }

    /// Stored credentials in the form the SRP6 server role takes
    pub fn srp_verifier(&self) -> SrpVerifier {
        SrpVerifier::from_database_values(&self.email, self.salt, self.verifier)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("access_mask", &format_args!("{:#06x}", self.access_mask))
            .finish_non_exhaustive()
    }
}

pub(crate) fn normalize_login(login_name: &str) -> String {
    login_name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_crypto::generate_verifier;

    #[test]
    fn test_with_password_keeps_only_verifier() {
        let account = Account::with_password(AccountId::new(3), "Player@Example.com", "secret");
        assert_eq!(account.verifier, generate_verifier(&account.salt, "player@example.com", "secret"));
        assert_eq!(account.login_key(), "player@example.com");
        assert_eq!(account.access_mask, ACCESS_PLAYER);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let account = Account::with_password(AccountId::new(1), "a@b.c", "pw");
        let output = format!("{:?}", account);
        assert!(output.contains("a@b.c"));
        assert!(!output.contains("verifier"));
        assert!(!output.contains("salt"));
    }
}
