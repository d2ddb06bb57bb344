//! Marzban ("proxy") panel: users with protocol-keyed proxy settings.

mod client;
mod types;

pub use client::{MarzbanAuth, ProxyPanelClient, validate_username};
pub use types::{ProtocolCatalog, ProxyConfiguration, ProxyProtocol, ProxySettings, UserInfo};
