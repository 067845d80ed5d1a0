use std::fmt;

use crate::models::{redact, Credentials};

pub const MODEL_KEY_ENV: &str = "OPENAI_API_KEY";
pub const SOURCE_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Holds the two secrets a run needs. Callers snapshot it with
/// [`CredentialStore::credentials`] and hand the value to the dispatcher, so
/// nothing reads the secrets behind the caller's back.
#[derive(Clone, Default)]
pub struct CredentialStore {
    model_key: String,
    source_token: String,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Fills the store from a variable lookup; unset names leave a slot empty.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut store = Self::new();
        if let Some(key) = lookup(MODEL_KEY_ENV) {
            store.set_model_key(key);
        }
        if let Some(token) = lookup(SOURCE_TOKEN_ENV) {
            store.set_source_token(token);
        }
        store
    }

    pub fn set_model_key(&mut self, key: impl Into<String>) {
        self.model_key = key.into();
    }

    pub fn set_source_token(&mut self, token: impl Into<String>) {
        self.source_token = token.into();
    }

    pub fn has_model_key(&self) -> bool {
        !self.model_key.is_empty()
    }

    pub fn has_source_token(&self) -> bool {
        !self.source_token.is_empty()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.model_key.clone(), self.source_token.clone())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("model_key", &redact(&self.model_key))
            .field("source_token", &redact(&self.source_token))
            .finish()
    }
}
