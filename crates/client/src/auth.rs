use std::sync::Arc;

use adacta_core::new_ulid;
use tracing::{debug, warn, Instrument};

use crate::error::{ClientError, AUTH_REJECTED_STATUS};
use crate::session::SessionStore;
use crate::transport::{ApiRequest, ApiResponse, Headers, Transport, TransportFailure};

/// Header carrying the bearer token on requests and the rotated token on responses.
pub const AUTHORIZATION_HEADER: &str = "authorization";

type RejectionHook = Arc<dyn Fn() + Send + Sync>;

/// Threads the session credential through every request.
///
/// The token is read from the session at send time, never cached. A 401 response
/// clears the session before the error reaches the caller, unless the session has
/// moved on to another token while the request was in flight.
pub struct RequestAuthenticator {
    inner: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    on_rejected: Option<RejectionHook>,
}

impl RequestAuthenticator {
    pub fn new(inner: Arc<dyn Transport>, session: Arc<SessionStore>) -> Self {
        Self {
            inner,
            session,
            on_rejected: None,
        }
    }

    /// Runs after the forced logout, e.g. to rebuild all view state.
    pub fn on_rejected(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_rejected = Some(Arc::new(hook));
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let span = tracing::debug_span!(
            "request",
            id = %new_ulid(),
            method = %request.method,
            path = %request.path
        );

        async move {
            let attached = self.session.token();
            if let Some(token) = &attached {
                request
                    .headers
                    .push((AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}")));
            }

            match self.inner.send(request).await {
                Ok(resp) => {
                    self.rotate(attached.as_deref(), &resp.headers).await;
                    Ok(resp)
                }
                Err(TransportFailure::Status {
                    status: AUTH_REJECTED_STATUS,
                    status_text,
                    headers,
                    body,
                }) => {
                    if let Some(token) = &attached {
                        match self.session.expire(token).await {
                            Ok(true) => warn!("credential rejected by server; logged out"),
                            Ok(false) => debug!("rejected credential already replaced"),
                            Err(e) => warn!("logout after rejection failed: {e}"),
                        }
                    }
                    if let Some(hook) = &self.on_rejected {
                        hook();
                    }
                    Err(ClientError::from_failure(TransportFailure::Status {
                        status: AUTH_REJECTED_STATUS,
                        status_text,
                        headers,
                        body,
                    }))
                }
                Err(failure) => {
                    if let TransportFailure::Status { headers, .. } = &failure {
                        self.rotate(attached.as_deref(), headers).await;
                    }
                    let err = ClientError::from_failure(failure);
                    debug!("request failed: {err}");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Applies a rotated token, but only over the token this request carried.
    async fn rotate(&self, attached: Option<&str>, headers: &Headers) {
        let Some(raw) = headers.get(AUTHORIZATION_HEADER) else {
            return;
        };
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        if token.is_empty() {
            return;
        }
        let Some(attached) = attached else {
            debug!("ignoring token on unauthenticated request");
            return;
        };
        match self.session.rotate(attached, token).await {
            Ok(true) => debug!("server rotated session token"),
            Ok(false) => debug!("dropping rotation for a replaced session"),
            Err(e) => warn!("failed to persist rotated token: {e}"),
        }
    }
}
