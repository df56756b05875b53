use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{ClientError, GatewayError};

/// Where the session credential survives between runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> io::Result<Option<String>>;
    async fn save(&self, token: &str) -> io::Result<()>;
    async fn clear(&self) -> io::Result<()>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> io::Result<Option<String>> {
        Ok(self.token.lock().await.clone())
    }

    async fn save(&self, token: &str) -> io::Result<()> {
        *self.token.lock().await = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> io::Result<()> {
        *self.token.lock().await = None;
        Ok(())
    }
}

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let token = raw.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, token).await
    }

    async fn clear(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Authenticated/unauthenticated state plus its credential.
///
/// Cloning shares the same state. Every outgoing call reads the token again,
/// so a logout or an invalidation is visible to requests issued afterwards.
#[derive(Clone)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
    store: Arc<dyn CredentialStore>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            token: Arc::new(RwLock::new(None)),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::default()))
    }

    /// Builds a session from whatever credential the store still holds.
    pub async fn restore(store: Arc<dyn CredentialStore>) -> io::Result<Self> {
        let token = store.load().await?;
        Ok(Self {
            token: Arc::new(RwLock::new(token)),
            store,
        })
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn sign_in(&self, token: impl Into<String>) -> io::Result<()> {
        let token = token.into();
        let mut current = self.token.write().await;
        self.store.save(&token).await?;
        *current = Some(token);
        info!("session authenticated");
        Ok(())
    }

    pub async fn sign_out(&self) -> io::Result<()> {
        *self.token.write().await = None;
        self.store.clear().await?;
        info!("session cleared");
        Ok(())
    }

    /// Forced logout after the API rejected the credential.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear persisted credential");
        }
        warn!("session invalidated by the api");
    }

    /// Forced logout that only applies while the session still holds the
    /// credential a rejected call was sent with. Returns whether the session
    /// was ended by this call.
    pub async fn invalidate_if(&self, issued_with: Option<&str>) -> bool {
        let mut token = self.token.write().await;
        if issued_with.is_none() || token.as_deref() != issued_with {
            return false;
        }
        *token = None;
        // Held across the clear so a concurrent sign-in cannot be wiped.
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear persisted credential");
        }
        warn!("session invalidated by the api");
        true
    }

    /// Converts a gateway failure into a client error. An auth rejection of
    /// the credential `issued_with` invalidates the session first.
    pub async fn absorb_failure(&self, err: GatewayError, issued_with: Option<&str>) -> ClientError {
        if err.is_auth() {
            self.invalidate_if(issued_with).await;
        }
        ClientError::Gateway(err)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
