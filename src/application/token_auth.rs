use crate::application::ports::AuthProvider;
use crate::domain::models::AccessToken;
use crate::domain::time_source::NowProvider;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

const TOKEN_LEEWAY_SECONDS: i64 = 60;

pub type TokenReader = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Bearer-token login. `login` picks the token up from an environment
/// variable and keeps it in the credential store until `logout`.
pub struct TokenAuthProvider<S>
where
    S: CredentialStore,
{
    credential_store: Arc<S>,
    token_env: String,
    token_reader: TokenReader,
    now_provider: NowProvider,
}

impl<S> TokenAuthProvider<S>
where
    S: CredentialStore,
{
    pub fn new(credential_store: Arc<S>, token_env: impl Into<String>) -> Self {
        Self {
            credential_store,
            token_env: token_env.into(),
            token_reader: Arc::new(|name| std::env::var(name).ok()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_token_reader(mut self, token_reader: TokenReader) -> Self {
        self.token_reader = token_reader;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn valid_token(&self) -> Result<AccessToken, InfraError> {
        let token = self
            .credential_store
            .load_token()?
            .ok_or(InfraError::AuthMissing)?;
        if !token.is_valid_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS) {
            return Err(InfraError::AuthMissing);
        }
        Ok(token)
    }
}

#[async_trait]
impl<S> AuthProvider for TokenAuthProvider<S>
where
    S: CredentialStore,
{
    fn is_logged_in(&self) -> bool {
        self.valid_token().is_ok()
    }

    fn access_token(&self) -> Result<String, InfraError> {
        self.valid_token().map(|token| token.access_token)
    }

    async fn login(&self) -> Result<(), InfraError> {
        let access_token = (self.token_reader)(&self.token_env)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                warn!(variable = self.token_env.as_str(), "access token variable is not set");
                InfraError::AuthMissing
            })?;

        self.credential_store.save_token(&AccessToken {
            access_token,
            expires_at: None,
        })?;
        info!(variable = self.token_env.as_str(), "access token stored");
        Ok(())
    }

    fn logout(&self) {
        if let Err(error) = self.credential_store.delete_token() {
            warn!(%error, "failed deleting access token");
        }
    }
}
