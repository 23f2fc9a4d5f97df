use anyhow::{bail, Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

use super::credentials::{Credential, Mechanism, Secret};

const SERVICE_NAME: &str = "siteconn";

/// What the keychain holds for one username.
#[derive(Serialize, Deserialize)]
struct StoredCredential {
    mechanism: Mechanism,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
}

/// Keychain slot for one username's credential.
///
/// The mechanism is stored next to the secret, so a credential read back
/// authenticates the same way it did when saved.
pub struct CredentialStore {
    username: String,
    entry: Entry,
}

impl CredentialStore {
    pub fn for_user(username: &str) -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, username)
            .with_context(|| format!("Failed to open keychain entry for '{}'", username))?;
        Ok(Self {
            username: username.to_string(),
            entry,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        if credential.username() != self.username {
            bail!(
                "Credential for '{}' cannot be saved in the slot for '{}'",
                credential.username(),
                self.username
            );
        }
        let stored = StoredCredential {
            mechanism: credential.mechanism(),
            secret: credential.secret().map(|s| s.expose().to_string()),
        };
        let payload = serde_json::to_string(&stored)?;
        self.entry
            .set_password(&payload)
            .with_context(|| format!("Failed to save credential for '{}'", self.username))
    }

    pub fn load(&self) -> Result<Credential> {
        let payload = self
            .entry
            .get_password()
            .with_context(|| format!("No stored credential for '{}'", self.username))?;
        let stored: StoredCredential = serde_json::from_str(&payload)
            .with_context(|| format!("Stored credential for '{}' is corrupt", self.username))?;
        Ok(Credential::new(
            self.username.clone(),
            stored.secret.map(Secret::from),
            stored.mechanism,
        ))
    }

    /// Remove the stored credential. Deleting an empty slot is not an error.
    pub fn delete(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err::<(), _>(err)
                .with_context(|| format!("Failed to delete credential for '{}'", self.username)),
        }
    }

    pub fn contains(&self) -> bool {
        self.entry.get_password().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(username: &str) -> CredentialStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        CredentialStore::for_user(username).unwrap()
    }

    #[test]
    fn test_save_and_load_keeps_mechanism() {
        let store = store("svc");
        assert!(!store.contains());

        store.save(&Credential::derived_token("svc", "pw")).unwrap();
        assert!(store.contains());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.username(), "svc");
        assert_eq!(loaded.mechanism(), Mechanism::DerivedToken);
        assert_eq!(loaded.secret().map(Secret::expose), Some("pw"));
    }

    #[test]
    fn test_secretless_credential_round_trips() {
        let store = store("host");
        store.save(&Credential::ambient("host")).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.mechanism(), Mechanism::Ambient);
        assert!(loaded.secret().is_none());
    }

    #[test]
    fn test_save_rejects_other_username() {
        let store = store("svc");
        assert!(store.save(&Credential::basic("someone-else", "pw")).is_err());
        assert!(!store.contains());
    }

    #[test]
    fn test_delete() {
        let store = store("svc");
        store.save(&Credential::basic("svc", "pw")).unwrap();
        store.delete().unwrap();
        assert!(!store.contains());
        assert!(store.load().is_err());

        // Already empty.
        store.delete().unwrap();
    }

    #[test]
    fn test_from_keychain_without_stored_credential() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let err = Credential::from_keychain("nobody").unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }
}
