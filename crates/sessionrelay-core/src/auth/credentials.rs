use keyring::Entry;
use thiserror::Error;

const SERVICE_NAME: &str = "sessionrelay";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Keychain unavailable: {0}")]
    Keychain(#[from] keyring::Error),
}

/// "Remember me" password storage in the OS keychain, keyed by email.
pub struct CredentialStore;

impl CredentialStore {
    /// Store email and password in the OS keychain
    pub fn store(email: &str, password: &str) -> Result<(), CredentialError> {
        let entry = Entry::new(SERVICE_NAME, email)?;
        entry.set_password(password)?;
        Ok(())
    }

    /// Retrieve the remembered password for an email
    pub fn get_password(email: &str) -> Result<String, CredentialError> {
        let entry = Entry::new(SERVICE_NAME, email)?;
        Ok(entry.get_password()?)
    }

    /// Delete stored credentials for an email. Missing entries are not an error.
    pub fn delete(email: &str) -> Result<(), CredentialError> {
        let entry = Entry::new(SERVICE_NAME, email)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if credentials exist for an email
    pub fn has_credentials(email: &str) -> bool {
        if let Ok(entry) = Entry::new(SERVICE_NAME, email) {
            entry.get_password().is_ok()
        } else {
            false
        }
    }
}
