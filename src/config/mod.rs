use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "KEYSMITH_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 3x-ui panel issuing VLESS credentials.
    pub tunnel: Option<PanelConfig>,
    /// Marzban panel issuing proxy users.
    pub proxy: Option<PanelConfig>,
    /// Named provisioning plans offered to callers.
    pub plans: BTreeMap<String, PlanConfig>,
}

/// Connection settings for one panel.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Base URL including any web base path, e.g. `https://host:2053/secret`.
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Accept self-signed or otherwise invalid TLS certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for PanelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// A provisioning plan: which backend, and the limits of each issued key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Backend id (`tunnel`/`vless` or `proxy`/`marzban`).
    pub backend: String,
    #[serde(default = "default_one")]
    pub devices: u32,
    /// Data cap in MB. 0 = unlimited.
    #[serde(default)]
    pub data_mb: u64,
    pub expiry_days: u32,
    #[serde(default = "default_one")]
    pub keys: u32,
    /// Required for tunnel plans.
    pub inbound_id: Option<u32>,
    pub description: Option<String>,
}

fn default_one() -> u32 {
    1
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .map(|d| d.join("keysmith").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".keysmith/config.toml"))
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`. A missing file yields the default config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overlay panel settings from environment variables.
    ///
    /// `VLESS_*` configures the tunnel panel and `MARZBAN_*` the proxy panel.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        overlay_panel(&mut self.tunnel, "VLESS", &lookup);
        overlay_panel(&mut self.proxy, "MARZBAN", &lookup);
    }

    pub fn plan(&self, name: &str) -> Result<&PlanConfig> {
        self.plans
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown plan '{name}'")))
    }
}

fn overlay_panel(
    panel: &mut Option<PanelConfig>,
    prefix: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) {
    let var = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.is_empty());

    if let Some(url) = var("PANEL_URL") {
        panel.get_or_insert_with(PanelConfig::default).base_url = url;
    }
    let Some(panel) = panel.as_mut() else {
        return;
    };
    if let Some(username) = var("USERNAME") {
        panel.username = username;
    }
    if let Some(password) = var("PASSWORD") {
        panel.password = password;
    }
}
