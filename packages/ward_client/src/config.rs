//! Client Configuration
//!
//! figment-merged from struct defaults, `ward.toml`, and `WARD_` environment
//! variables (double underscore = nesting), with CLI flags applied on top by
//! `main`. Example:
//!
//! ```text
//! ward.toml:    [user]
//!               id = "550e8400-..."
//!               role = "patient"
//!
//! env var:      WARD_USER__ID=550e8400-...
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Which side of the clinic relationship this client runs as. Determines the
/// roster/history endpoints and whether the active-peer rail exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    pub fn is_doctor(self) -> bool {
        matches!(self, Role::Doctor)
    }
}

/// Server endpoints (lives under `[server]` in ward.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL for REST calls.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the realtime endpoint on the same host.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_path: default_ws_path(),
        }
    }
}

/// Operator identity (lives under `[user]` in ward.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Patient
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            role: default_role(),
        }
    }
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub user: UserConfig,
}

impl FileConfig {
    /// Layer defaults → toml file → `WARD_` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let toml_path = path.unwrap_or_else(|| Path::new("ward.toml"));
        Figment::from(Serialized::defaults(FileConfig::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("WARD_").split("__"))
            .extract()
            .context("failed to load configuration")
    }

    /// Realtime endpoint URL derived from the REST base URL.
    pub fn ws_url(&self) -> String {
        let host = self
            .server
            .base_url
            .trim_end_matches('/')
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}{}", host, self.server.ws_path)
    }
}
