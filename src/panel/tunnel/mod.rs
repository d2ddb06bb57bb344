//! 3x-ui ("tunnel") panel: VLESS clients scoped to an inbound.

mod client;
mod types;
mod uri;

pub use client::{TunnelPanelClient, XuiAuth};
pub use types::{InboundConfiguration, InboundSummary, Security, Transport};
pub use uri::{build_vless_uri, server_host};
