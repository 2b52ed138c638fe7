//! The process-wide credential and its persistence.

use std::sync::Arc;

use adacta_core::api::{AuthRequest, AuthResponse};
use reqwest::Method;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::error::ClientError;
use crate::store::{KeyValueStore, StoreError};
use crate::transport::{ApiRequest, Transport};

pub const TOKEN_KEY: &str = "token";
pub const USERNAME_KEY: &str = "username";

/// Path of the credential exchange endpoint.
pub const AUTH_PATH: &str = "auth";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredential {
    pub token: Option<String>,
    pub username: Option<String>,
}

impl SessionCredential {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Single source of truth for the current credential.
///
/// Every mutation is persisted to the backing store and published to subscribers.
/// Construct one per process and share it through `Arc`.
pub struct SessionStore {
    credential: watch::Sender<SessionCredential>,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
    // Serializes store writes so the store ends up matching memory.
    persist: Mutex<()>,
}

impl SessionStore {
    /// Rehydrates the credential from `store`.
    ///
    /// `transport` is only used for the unauthenticated credential exchange.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let credential = SessionCredential {
            token: store.get(TOKEN_KEY)?,
            username: store.get(USERNAME_KEY)?,
        };
        let (tx, _) = watch::channel(credential);
        Ok(Self {
            credential: tx,
            store,
            transport,
            persist: Mutex::new(()),
        })
    }

    /// Exchanges a username and password for a token.
    ///
    /// The credential is published only once both keys are stored. On any failure the
    /// current credential is left untouched, in memory and in storage.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionCredential, ClientError> {
        let request = ApiRequest::new(Method::POST, AUTH_PATH).with_json(&AuthRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;

        let auth: AuthResponse = self
            .transport
            .send(request)
            .await
            .map_err(ClientError::from_failure)?
            .json()?;

        let credential = SessionCredential {
            token: Some(auth.token),
            username: Some(auth.username),
        };

        let _guard = self.persist.lock().await;
        self.write(credential.clone(), Some(self.credential())).await?;
        self.credential.send_replace(credential.clone());
        info!("logged in as {}", credential.username.as_deref().unwrap_or_default());
        Ok(credential)
    }

    /// Stores a rotated token. The username is left as is.
    ///
    /// Does nothing without a current session. Returns whether the token changed.
    pub async fn update(&self, token: &str) -> Result<bool, ClientError> {
        self.swap_token(None, token).await
    }

    /// Replaces the token only if the session still holds `expected`.
    ///
    /// A rotation that lands after a logout or a re-login is dropped.
    pub async fn rotate(&self, expected: &str, token: &str) -> Result<bool, ClientError> {
        self.swap_token(Some(expected), token).await
    }

    /// Clears the credential in memory first, then in storage.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let previous = self.credential.send_replace(SessionCredential::default());
        if previous.is_authenticated() {
            info!(
                "logged out {}",
                previous.username.as_deref().unwrap_or("<unknown>")
            );
        }
        self.persist_current().await
    }

    /// Logs out if the session still holds `token`. Returns whether it did.
    pub async fn expire(&self, token: &str) -> Result<bool, ClientError> {
        let cleared = self.credential.send_if_modified(|c| {
            if c.token.as_deref() != Some(token) {
                return false;
            }
            *c = SessionCredential::default();
            true
        });
        if cleared {
            info!("session expired");
            self.persist_current().await?;
        }
        Ok(cleared)
    }

    /// True while a token is held. Never contacts the server.
    pub fn authenticated(&self) -> bool {
        self.credential.borrow().is_authenticated()
    }

    pub fn token(&self) -> Option<String> {
        self.credential.borrow().token.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.credential.borrow().username.clone()
    }

    pub fn credential(&self) -> SessionCredential {
        self.credential.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionCredential> {
        self.credential.subscribe()
    }

    async fn swap_token(&self, expected: Option<&str>, token: &str) -> Result<bool, ClientError> {
        let _guard = self.persist.lock().await;
        let changed = self.credential.send_if_modified(|c| {
            let Some(current) = c.token.as_deref() else {
                return false;
            };
            if expected.is_some_and(|e| e != current) || current == token {
                return false;
            }
            c.token = Some(token.to_string());
            true
        });
        if changed {
            self.write(self.credential(), None).await?;
        }
        Ok(changed)
    }

    async fn persist_current(&self) -> Result<(), ClientError> {
        let _guard = self.persist.lock().await;
        self.write(self.credential(), None).await
    }

    /// Writes `target` off the async executor. On failure `fallback`, if any, is
    /// written back so the store never holds half of a credential.
    async fn write(
        &self,
        target: SessionCredential,
        fallback: Option<SessionCredential>,
    ) -> Result<(), ClientError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            write_credential(store.as_ref(), &target).inspect_err(|_| {
                if let Some(fallback) = &fallback {
                    if let Err(e) = write_credential(store.as_ref(), fallback) {
                        warn!("failed to restore stored session: {e}");
                    }
                }
            })
        })
        .await
        .map_err(|e| ClientError::Storage(format!("session store task failed: {e}")))??;
        Ok(())
    }
}

fn write_credential(
    store: &dyn KeyValueStore,
    credential: &SessionCredential,
) -> Result<(), StoreError> {
    put(store, TOKEN_KEY, credential.token.as_deref())?;
    put(store, USERNAME_KEY, credential.username.as_deref())
}

fn put(store: &dyn KeyValueStore, key: &str, value: Option<&str>) -> Result<(), StoreError> {
    match value {
        Some(value) => store.set(key, value),
        None => store.remove(key),
    }
}
