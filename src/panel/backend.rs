//! Panel backend definitions.

use super::error::Error;
use std::fmt;

/// Supported panel backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// 3x-ui, issuing VLESS clients on an inbound.
    Tunnel,
    /// Marzban, issuing users with shadowsocks/vless/vmess/trojan proxies.
    Proxy,
}

impl Backend {
    /// All available backends.
    pub const ALL: &'static [Backend] = &[Backend::Tunnel, Backend::Proxy];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Backend::Tunnel => "VLESS (3x-ui)",
            Backend::Proxy => "Outline (Marzban)",
        }
    }

    /// Short identifier.
    pub fn id(self) -> &'static str {
        match self {
            Backend::Tunnel => "tunnel",
            Backend::Proxy => "proxy",
        }
    }

    /// Parse a backend selector. Accepts the id or the panel/protocol alias.
    pub fn from_id(id: &str) -> Result<Self, Error> {
        match id.trim().to_ascii_lowercase().as_str() {
            "tunnel" | "vless" | "3x-ui" | "xui" => Ok(Backend::Tunnel),
            "proxy" | "marzban" | "outline" => Ok(Backend::Proxy),
            other => Err(Error::Validation(format!("unknown backend '{other}'"))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
