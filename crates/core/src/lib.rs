#![forbid(unsafe_code)]

//! Shared wire models and search query composition for the Adacta archive client.

pub mod api;
pub mod query;

mod util;

pub use util::new_ulid;
