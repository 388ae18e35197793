use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{anyhow, Context};
use url::Url;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATABASE: &str = "storyPaths";

/// Front-end origins allowed to call the API with credentials.
///
/// Local development hosts only; deployments list their real front-ends in
/// `CORS_ALLOWED_ORIGINS`.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:5173",
];

/// Server configuration read from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    /// SRV host of the managed cluster, e.g. `cluster0.abcde.mongodb.net`.
    pub cluster_host: Option<String>,
    /// Full connection string; when set, credentials are taken from it as-is.
    pub mongodb_uri: Option<String>,
    pub database: String,
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Build the config from environment variables.
    ///
    /// Recognised env vars:
    /// - `PORT` (default 5000)
    /// - `DB_USER`, `DB_PASSWORD`
    /// - `MONGODB_CLUSTER_HOST` (required unless `MONGODB_URI` is set)
    /// - `MONGODB_URI` (optional override of the managed cluster)
    /// - `MONGODB_DATABASE` (default `storyPaths`)
    /// - `CORS_ALLOWED_ORIGINS` (optional, comma-separated)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", raw))?,
            None => DEFAULT_PORT,
        };

        let allowed_origins = match lookup("CORS_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            port,
            db_user: lookup("DB_USER"),
            db_password: lookup("DB_PASSWORD"),
            cluster_host: lookup("MONGODB_CLUSTER_HOST").filter(|h| !h.trim().is_empty()),
            mongodb_uri: lookup("MONGODB_URI"),
            database: lookup("MONGODB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            allowed_origins,
        })
    }

    /// The connection string for the store.
    ///
    /// Credentials are percent-encoded into the managed cluster URI, so
    /// passwords containing `@` or `:` are safe.
    pub fn mongodb_uri(&self) -> anyhow::Result<String> {
        if let Some(uri) = &self.mongodb_uri {
            return Ok(uri.clone());
        }

        let host = self
            .cluster_host
            .as_deref()
            .ok_or_else(|| anyhow!("Neither MONGODB_URI nor MONGODB_CLUSTER_HOST is set"))?;
        let user = self.db_user.as_deref().ok_or_else(|| anyhow!("DB_USER not set"))?;
        let password = self
            .db_password
            .as_deref()
            .ok_or_else(|| anyhow!("DB_PASSWORD not set"))?;

        let mut uri = Url::parse(&format!("mongodb+srv://{}/", host))
            .with_context(|| format!("Invalid MONGODB_CLUSTER_HOST '{}'", host))?;
        uri.set_username(user)
            .map_err(|_| anyhow!("Cannot set username on MongoDB URI"))?;
        uri.set_password(Some(password))
            .map_err(|_| anyhow!("Cannot set password on MongoDB URI"))?;
        uri.set_query(Some("retryWrites=true&w=majority"));

        Ok(uri.to_string())
    }

    /// Listen on every interface at the configured port.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
