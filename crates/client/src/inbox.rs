//! The inbox view: a count of unreviewed documents, refreshed on a timer.

use std::sync::Arc;
use std::time::Duration;

use adacta_core::api::InboxResponse;

use crate::api::ApiClient;
use crate::fetcher::RequestDescriptor;
use crate::polling::PollingSource;
use crate::session::SessionStore;

/// Polls `GET inbox` every `period` while `session` holds a credential.
pub fn inbox_source(
    api: ApiClient,
    session: Arc<SessionStore>,
    period: Duration,
) -> PollingSource<InboxResponse> {
    let descriptor = RequestDescriptor::new(move || {
        let api = api.clone();
        async move { api.inbox().await }
    });
    PollingSource::start_gated(descriptor, period, move || session.authenticated())
}
