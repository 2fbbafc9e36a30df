//! Account file loading

use super::{
    account::{normalize_login, Account},
    error::{AccountError, Result},
};
use nexus_core::{decode_hex_array, encode_hex, AccountId};
use nexus_crypto::{PASSWORD_VERIFIER_LENGTH, SALT_LENGTH};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic first line of every account file
pub const ACCOUNT_FILE_HEADER: &str = "NXACC001";

/// Account file loader
///
/// # Purpose
/// Loads and saves account files on disk.
///
/// # File Format
/// One text file per account in the accounts directory, named after the
/// login name (`player@example.com.txt`):
/// ```text
/// NXACC001
/// ID 1
/// EMAIL player@example.com
/// SALT 00112233445566778899aabbccddeeff
/// VERIFIER <256 hex digits>
/// ACCESS 1
/// ```
pub struct AccountLoader {
    accounts_dir: PathBuf,
}

impl AccountLoader {
    /// Create a new account loader
    ///
    /// # Arguments
    /// * `accounts_dir` - Directory holding the `*.txt` account files
    pub fn new(accounts_dir: &Path) -> Self {
        Self {
            accounts_dir: accounts_dir.to_path_buf(),
        }
    }

    pub fn accounts_dir(&self) -> &Path {
        &self.accounts_dir
    }

    /// Load an account by login name
    ///
    /// # Arguments
    /// * `login_name` - Login name (case-insensitive, will be searched for)
    pub fn load(&self, login_name: &str) -> Result<Account> {
        debug!("Loading account: {}", login_name);

        let path = self.find_account_file(login_name)?;
        let account = Self::parse_account_file(&path)?;

        debug!("Loaded account: {} from {:?}", account.email, path);
        Ok(account)
    }

    /// Load every account file in the directory
    ///
    /// # Returns
    /// All parsed accounts. Files that fail to parse are skipped with a
    /// warning; a missing directory yields an empty list.
    pub fn load_all(&self) -> Result<Vec<Account>> {
        let entries = match fs::read_dir(&self.accounts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Accounts directory {:?} does not exist", self.accounts_dir);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut accounts = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("txt") {
                continue;
            }

            match Self::parse_account_file(&path) {
                Ok(account) => accounts.push(account),
                Err(e) => warn!("Skipping account file {:?}: {}", path, e),
            }
        }

        accounts.sort_by_key(|account| account.id.get());
        Ok(accounts)
    }

    /// Write an account file, replacing any existing one
    pub fn save(&self, account: &Account) -> Result<PathBuf> {
        fs::create_dir_all(&self.accounts_dir)?;

        let path = self.accounts_dir.join(format!("{}.txt", account.login_key()));
        let content = format!(
            "{}\nID {}\nEMAIL {}\nSALT {}\nVERIFIER {}\nACCESS {}\n",
            ACCOUNT_FILE_HEADER,
            account.id.get(),
            account.email,
            encode_hex(&account.salt),
            encode_hex(&account.verifier),
            account.access_mask,
        );
        fs::write(&path, content)?;

        debug!("Saved account {} to {:?}", account.email, path);
        Ok(path)
    }

    /// Find account file (case-insensitive search)
    fn find_account_file(&self, login_name: &str) -> Result<PathBuf> {
        let exact_path = self.accounts_dir.join(format!("{}.txt", login_name));
        if exact_path.exists() {
            return Ok(exact_path);
        }

        if let Ok(entries) = fs::read_dir(&self.accounts_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) == Some("txt") {
                    let filename = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");

                    if filename.eq_ignore_ascii_case(login_name.trim()) {
                        return Ok(path);
                    }
                }
            }
        }

        Err(AccountError::NotFound(login_name.to_string()))
    }

    /// Parse account file
    fn parse_account_file(path: &Path) -> Result<Account> {
        let content = fs::read_to_string(path)?;

        let first_line = content
            .lines()
            .next()
            .ok_or_else(|| AccountError::InvalidFormat("Empty file".to_string()))?;

        if first_line.trim() != ACCOUNT_FILE_HEADER {
            return Err(AccountError::InvalidFormat(format!(
                "Invalid magic header: {}",
                first_line
            )));
        }

        let mut id = None;
        let mut email = None;
        let mut salt = None;
        let mut verifier = None;
        let mut access_mask = crate::account::ACCESS_PLAYER;

        for line in content.lines().skip(1) {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once(' ') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => continue,
            };

            match key {
                "ID" => {
                    id = Some(value.parse::<u32>().map_err(|_| {
                        AccountError::InvalidData(format!("bad ID: {}", value))
                    })?)
                }
                "EMAIL" => email = Some(value.to_string()),
                "SALT" => salt = Some(decode_hex_field::<SALT_LENGTH>(value)?),
                "VERIFIER" => verifier = Some(decode_hex_field::<PASSWORD_VERIFIER_LENGTH>(value)?),
                "ACCESS" => access_mask = value.parse().unwrap_or(access_mask),
                _ => debug!("Ignoring unknown account field {} in {:?}", key, path),
            }
        }

        let missing = |field: &str| AccountError::InvalidFormat(format!("missing {} in {:?}", field, path));
        let email = email.ok_or_else(|| missing("EMAIL"))?;
        if normalize_login(&email).is_empty() {
            return Err(AccountError::InvalidData("empty EMAIL".to_string()));
        }

        Ok(Account {
            id: AccountId::new(id.ok_or_else(|| missing("ID"))?),
            email,
            salt: salt.ok_or_else(|| missing("SALT"))?,
            verifier: verifier.ok_or_else(|| missing("VERIFIER"))?,
            access_mask,
        })
    }
}

/// Decode a hex field into exactly `N` bytes
fn decode_hex_field<const N: usize>(text: &str) -> Result<[u8; N]> {
    let text = text.trim();
    decode_hex_array(text).ok_or_else(|| {
        AccountError::InvalidData(format!("expected {} hex digits, got {:?}", N * 2, text))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ACCESS_GM;
    use std::fs::File;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        File::create(dir.join(name))
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
    }

    fn account_file(id: u32, email: &str) -> String {
        format!(
            "NXACC001\nID {}\nEMAIL {}\nSALT {}\nVERIFIER {}\nACCESS 3\n",
            id,
            email,
            "0f".repeat(SALT_LENGTH),
            "a5".repeat(PASSWORD_VERIFIER_LENGTH)
        )
    }

    #[test]
    fn test_parse_account() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "tester@example.com.txt", &account_file(7, "Tester@example.com"));

        let loader = AccountLoader::new(temp_dir.path());
        let account = loader.load("tester@example.com").unwrap();

        assert_eq!(account.id.get(), 7);
        assert_eq!(account.email, "Tester@example.com");
        assert_eq!(account.salt, [0x0f; SALT_LENGTH]);
        assert_eq!(account.verifier, [0xa5; PASSWORD_VERIFIER_LENGTH]);
        assert_ne!(account.access_mask & ACCESS_GM, 0);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "Tester@Example.com.txt", &account_file(1, "Tester@Example.com"));

        let loader = AccountLoader::new(temp_dir.path());
        assert!(loader.load("tester@example.COM").is_ok());
        assert!(matches!(loader.load("nobody"), Err(AccountError::NotFound(_))));
    }

    #[test]
    fn test_bad_header() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "x.txt", "GRACC001\nNAME x\n");

        let loader = AccountLoader::new(temp_dir.path());
        assert!(matches!(loader.load("x"), Err(AccountError::InvalidFormat(_))));
    }

    #[test]
    fn test_missing_verifier() {
        let temp_dir = tempfile::tempdir().unwrap();
        let content = format!("NXACC001\nID 1\nEMAIL x@y.z\nSALT {}\n", "00".repeat(SALT_LENGTH));
        write_file(temp_dir.path(), "x.txt", &content);

        let loader = AccountLoader::new(temp_dir.path());
        assert!(matches!(loader.load("x"), Err(AccountError::InvalidFormat(_))));
    }

    #[test]
    fn test_short_salt() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "x.txt", "NXACC001\nID 1\nEMAIL x@y.z\nSALT 00\n");

        let loader = AccountLoader::new(temp_dir.path());
        assert!(matches!(loader.load("x"), Err(AccountError::InvalidData(_))));
    }

    #[test]
    fn test_load_all_skips_broken_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "b.txt", &account_file(2, "b@example.com"));
        write_file(temp_dir.path(), "a.txt", &account_file(1, "a@example.com"));
        write_file(temp_dir.path(), "broken.txt", "not an account");
        write_file(temp_dir.path(), "notes.md", "ignored");

        let loader = AccountLoader::new(temp_dir.path());
        let accounts = loader.load_all().unwrap();
        let ids: Vec<u32> = accounts.iter().map(|a| a.id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_load_all_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let loader = AccountLoader::new(&temp_dir.path().join("absent"));
        assert!(loader.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_saved_account_loads_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let loader = AccountLoader::new(&temp_dir.path().join("accounts"));

        let account = Account::with_password(AccountId::new(12), "Saved@Example.com", "pw");
        loader.save(&account).unwrap();

        assert_eq!(loader.load("saved@example.com").unwrap(), account);
    }

    #[test]
    fn test_decode_hex_field() {
        assert_eq!(decode_hex_field::<2>(" ABcd ").unwrap(), [0xab, 0xcd]);
        assert!(matches!(decode_hex_field::<2>("abc"), Err(AccountError::InvalidData(_))));
        assert!(matches!(decode_hex_field::<2>("zzzz"), Err(AccountError::InvalidData(_))));
    }
}
