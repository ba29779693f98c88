//! Test accounts remembered per application.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::action::TestAccount;
use crate::error::BrowserResult;

/// Side file store: `<dir>/<application id>.accounts.json`.
#[derive(Debug, Clone)]
pub struct AccountStore {
    dir: PathBuf,
}

impl AccountStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, application_id: &str) -> PathBuf {
        self.dir.join(format!("{}.accounts.json", application_id))
    }

    /// Accounts of an application. A missing or corrupt file yields none.
    pub fn load(&self, application_id: &str) -> Vec<TestAccount> {
        let path = self.path(application_id);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable accounts file {}: {}", path.display(), e);
            Vec::new()
        })
    }

    /// Merge `accounts` into the stored ones. A known username gets the new
    /// password. Returns the merged list.
    pub fn merge(
        &self,
        application_id: &str,
        accounts: &[TestAccount],
    ) -> BrowserResult<Vec<TestAccount>> {
        let mut known = self.load(application_id);
        if accounts.is_empty() {
            return Ok(known);
        }
        for account in accounts {
            match known.iter_mut().find(|k| k.username == account.username) {
                Some(existing) => existing.password = account.password.clone(),
                None => known.push(account.clone()),
            }
        }

        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(
            self.path(application_id),
            serde_json::to_string_pretty(&known)?,
        )?;
        debug!("Stored {} test accounts for {}", known.len(), application_id);
        Ok(known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn account(username: &str, password: &str) -> TestAccount {
        TestAccount {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_merge_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = AccountStore::new(dir.path());
        assert!(store.load("shop").is_empty());

        store.merge("shop", &[account("ada", "one")]).unwrap();
        let merged = store
            .merge("shop", &[account("ada", "two"), account("bob", "pw")])
            .unwrap();
        assert_eq!(merged, vec![account("ada", "two"), account("bob", "pw")]);

        let reopened = AccountStore::new(dir.path());
        assert_eq!(reopened.load("shop"), merged);
        assert!(reopened.load("other").is_empty());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("shop.accounts.json"), "not json").unwrap();
        assert!(AccountStore::new(dir.path()).load("shop").is_empty());
    }
}
