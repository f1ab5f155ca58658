use crate::domain::models::AccessToken;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub trait CredentialStore: Send + Sync {
    fn save_token(&self, token: &AccessToken) -> Result<(), InfraError>;
    fn load_token(&self) -> Result<Option<AccessToken>, InfraError>;
    fn delete_token(&self) -> Result<(), InfraError>;
}

/// Process-lifetime token storage; nothing is written to disk.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    token: Mutex<Option<AccessToken>>,
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, token: &AccessToken) -> Result<(), InfraError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(token.clone());
        Ok(())
    }

    fn load_token(&self) -> Result<Option<AccessToken>, InfraError> {
        let guard = self
            .token
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone())
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}
