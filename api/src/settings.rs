use std::net::SocketAddr;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{auth, sqlite};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub sqlite: sqlite::Settings,
    #[serde(default)]
    pub sessions: auth::SessionSettings,
}

impl Settings {
    /// Reads `config/default` (any format the `config` crate knows) and
    /// overlays `CLUBS__SECTION__KEY` environment variables. `DATABASE_URL`
    /// wins over both for the database location.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("sqlite.url", "sqlite://chess_clubs.db")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("api/config/default").required(false))
            .add_source(Environment::with_prefix("CLUBS").separator("__"))
            .set_override_option("sqlite.url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}
