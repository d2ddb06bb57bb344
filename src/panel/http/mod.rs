//! Shared HTTP plumbing for panel clients.

mod executor;

pub use executor::{PanelAuth, Payload, RawResponse, RequestExecutor};
