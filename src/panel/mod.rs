//! Panel client abstraction.
//!
//! Two unrelated control planes issue access credentials: a 3x-ui panel
//! (cookie sessions, VLESS clients on an inbound) and a Marzban panel (bearer
//! tokens, users with protocol-keyed proxies). Both share the session store
//! and request executor in this module and report a uniform
//! [`ProvisioningResult`].
//!
//! # Example
//!
//! ```ignore
//! use keysmith::panel::{DataCap, Expiry, TunnelPanelClient};
//!
//! let client = TunnelPanelClient::new(&config)?;
//! let result = client
//!     .create_credential("john_doe", DataCap::UNLIMITED, Expiry::in_days(30), 1, 5)
//!     .await;
//! ```

mod backend;
mod error;
mod http;
pub mod proxy;
mod session;
pub mod tunnel;
mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

pub use backend::Backend;
pub use error::{Error, FailureKind, format_api_error};
pub use http::{PanelAuth, Payload, RawResponse, RequestExecutor};
pub use proxy::ProxyPanelClient;
pub use session::{SessionState, SessionStore, SessionTicket};
pub use tunnel::TunnelPanelClient;
pub use types::*;

/// Timeout for one HTTP attempt against a panel.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Connect timeout for panel requests.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
