//! # Nexus Account Management
//!
//! This crate handles login accounts and the game tokens that carry a
//! successful login over to the realm tier.
//!
//! ## Features
//!
//! - Account records holding only salt and SRP6 verifier
//! - Account file loading from disk
//! - In-memory account store with case-insensitive lookup
//! - Single-use, expiring game tokens
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nexus_accounts::{AccountLoader, AccountStore, MemoryAccountStore};
//! use std::path::Path;
//!
//! let store = MemoryAccountStore::new();
//! let loader = AccountLoader::new(Path::new("servers/default/accounts"));
//! for account in loader.load_all().unwrap() {
//!     store.insert(account).unwrap();
//! }
//!
//! if let Some(account) = store.find("player@example.com") {
//!     println!("{} has access mask {:#x}", account.email, account.access_mask);
//! }
//! ```

mod account;
mod error;
mod loader;
mod sessions;
mod store;

pub use account::{Account, ACCESS_GM, ACCESS_PLAYER};
pub use error::{AccountError, Result};
pub use loader::{AccountLoader, ACCOUNT_FILE_HEADER};
pub use sessions::{GameGrant, SessionDirectory, DEFAULT_GRANT_TTL};
pub use store::{AccountStore, MemoryAccountStore};
