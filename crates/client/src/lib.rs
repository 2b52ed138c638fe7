#![forbid(unsafe_code)]
//! Session handling and reactive request orchestration for the Adacta document server.

pub mod api;
pub mod auth;
pub mod cell;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod inbox;
pub mod polling;
pub mod search;
pub mod session;
pub mod store;
pub mod transport;

pub use api::{ApiClient, Resource};
pub use auth::RequestAuthenticator;
pub use cell::{LoadingCell, LoadingState, PendingTicket, Ticket};
pub use config::ClientConfig;
pub use error::{ClientError, ErrorInfo};
pub use fetcher::{FailureAction, ReactiveFetcher, RequestDescriptor};
pub use polling::PollingSource;
pub use search::{search_fetcher, QueryComposer, SearchResults};
pub use session::{SessionCredential, SessionStore};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportFailure};
