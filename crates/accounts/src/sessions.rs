//! Game token handoff between the login tier and the realm tier
//!
//! After a successful login the STS connection asks for a game token. The
//! token is registered here together with what the realm needs to admit the
//! player, and the client presents it again in its realm hello. Tokens are
//! single use and expire.

use crate::account::ACCESS_GM;
use dashmap::DashMap;
use nexus_core::{AccountId, GameToken};
use nexus_crypto::CIPHER_KEY_LENGTH;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long an issued token stays redeemable
pub const DEFAULT_GRANT_TTL: Duration = Duration::from_secs(300);

/// What a game token entitles its holder to
#[derive(Clone, PartialEq, Eq)]
pub struct GameGrant {
    pub account_id: AccountId,
    pub email: String,
    pub access_mask: u32,
    /// First 16 bytes of the SRP6 session key; keys the realm cipher
    pub cipher_key: [u8; CIPHER_KEY_LENGTH],
}

impl GameGrant {
    pub fn is_gm(&self) -> bool {
        self.access_mask & ACCESS_GM != 0
    }
}

impl fmt::Debug for GameGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameGrant")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .field("access_mask", &self.access_mask)
            .finish_non_exhaustive()
    }
}

struct PendingGrant {
    grant: GameGrant,
    issued_at: Instant,
}

/// Outstanding game tokens, shared by both tiers
pub struct SessionDirectory {
    grants: DashMap<GameToken, PendingGrant>,
    ttl: Duration,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_GRANT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            grants: DashMap::new(),
            ttl,
        }
    }

    /// Register a grant under a fresh random token
    pub fn issue(&self, grant: GameGrant) -> GameToken {
        let account_id = grant.account_id;
        let mut pending = PendingGrant {
            grant,
            issued_at: Instant::now(),
        };

        loop {
            let token = GameToken::generate();
            match self.grants.entry(token) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(pending);
                    debug!("Issued game token for account {}", account_id.get());
                    return token;
                }
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    pending.issued_at = Instant::now();
                }
            }
        }
    }

    /// Redeem a token by its raw (uppercase hex) form
    ///
    /// Returns `None` for unknown, malformed, expired or already redeemed
    /// tokens. A successful redeem removes the token.
    pub fn redeem(&self, raw_form: &str) -> Option<GameGrant> {
        let token = GameToken::from_raw_form(raw_form)?;
        self.redeem_token(&token)
    }

    pub fn redeem_token(&self, token: &GameToken) -> Option<GameGrant> {
        let (_, pending) = self.grants.remove(token)?;
        if pending.issued_at.elapsed() > self.ttl {
            debug!(
                "Game token for account {} expired",
                pending.grant.account_id.get()
            );
            return None;
        }
        Some(pending.grant)
    }

    /// Drop every expired token; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.grants.len();
        self.grants
            .retain(|_, pending| pending.issued_at.elapsed() <= self.ttl);
        before.saturating_sub(self.grants.len())
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDirectory")
            .field("outstanding", &self.grants.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(id: u32) -> GameGrant {
        GameGrant {
            account_id: AccountId::new(id),
            email: format!("user{}@example.com", id),
            access_mask: 1,
            cipher_key: [id as u8; CIPHER_KEY_LENGTH],
        }
    }

    #[test]
    fn test_gm_flag_follows_access_mask() {
        let mut player = grant(1);
        assert!(!player.is_gm());
        player.access_mask |= ACCESS_GM;
        assert!(player.is_gm());
    }

    #[test]
    fn test_issue_and_redeem_raw_form() {
        let directory = SessionDirectory::new();
        let token = directory.issue(grant(1));

        let redeemed = directory.redeem(&token.raw_form()).unwrap();
        assert_eq!(redeemed, grant(1));
        assert!(directory.is_empty());
    }

    #[test]
    fn test_tokens_are_single_use() {
        let directory = SessionDirectory::new();
        let token = directory.issue(grant(2));

        assert!(directory.redeem_token(&token).is_some());
        assert!(directory.redeem_token(&token).is_none());
    }

    #[test]
    fn test_display_form_is_not_redeemable() {
        let directory = SessionDirectory::new();
        let token = directory.issue(grant(3));

        assert!(directory.redeem(&token.display_form()).is_none());
        assert!(directory.redeem("not hex").is_none());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_expired_tokens() {
        let directory = SessionDirectory::with_ttl(Duration::ZERO);
        let token = directory.issue(grant(4));
        std::thread::sleep(Duration::from_millis(5));

        assert!(directory.redeem_token(&token).is_none());

        directory.issue(grant(5));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(directory.purge_expired(), 1);
        assert!(directory.is_empty());
    }

    #[test]
    fn test_debug_hides_cipher_key() {
        let output = format!("{:?}", grant(9));
        assert!(!output.contains("cipher_key"));
    }
}
