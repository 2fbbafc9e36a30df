//! Account lookup

use crate::account::{normalize_login, Account};
use crate::error::{AccountError, Result};
use dashmap::DashMap;
use nexus_core::AccountId;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

/// Read access to accounts, shared by every login connection
pub trait AccountStore: Send + Sync {
    /// Look up an account by login name, case-insensitively
    fn find(&self, login_name: &str) -> Option<Account>;
}

/// Accounts held in memory, keyed by lowercased login name
#[derive(Debug)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Account>,
    next_id: AtomicU32,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Create an account with a fresh salt and verifier
    pub fn register(&self, email: &str, password: &str) -> Result<Account> {
        let key = normalize_login(email);
        if key.is_empty() {
            return Err(AccountError::InvalidData("empty login name".to_string()));
        }
        if self.accounts.contains_key(&key) {
            return Err(AccountError::AlreadyExists(email.to_string()));
        }

        let id = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .map(AccountId::new)
            .map_err(|_| AccountError::InvalidData("account ids exhausted".to_string()))?;
        let account = Account::with_password(id, email, password);
        self.insert(account.clone())?;

        info!("Registered account {} ({})", account.email, id.get());
        Ok(account)
    }

    /// Add an existing account, such as one read by the loader
    pub fn insert(&self, account: Account) -> Result<()> {
        let key = account.login_key();
        match self.accounts.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AccountError::AlreadyExists(account.email)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.next_id.fetch_max(account.id.get().saturating_add(1), Ordering::Relaxed);
                slot.insert(account);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for MemoryAccountStore {
    fn find(&self, login_name: &str) -> Option<Account> {
        self.accounts
            .get(&normalize_login(login_name))
            .map(|entry| entry.value().clone())
    }
}
