//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into type-safe structs.

use serde::Deserialize;

/// License server configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): symmetric signing key for license tokens
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8080
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub database_url: String,

    /// Shared symmetric key used to sign and verify license tokens.
    ///
    /// Known only to the server. Tokens are a capability hint, not a trust
    /// anchor - every heartbeat re-validates against live license state.
    pub jwt_secret: String,

    #[serde(default = "default_port")]
    pub server_port: u16,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    8080
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into a config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<ServerConfig>()
    }
}

/// Client configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `SERVER_URL` (optional): license server base URL, defaults to http://localhost:8080
/// - `LICENSE_KEY` (optional): license key; prompted for interactively when absent
/// - `HEARTBEAT_INTERVAL_SECS` (optional): seconds between heartbeat ticks, defaults to 30
/// - `MAX_RETRIES` (optional): heartbeat attempts per tick before the kill switch fires, defaults to 3
/// - `RETRY_DELAY_SECS` (optional): fixed delay between retry attempts, defaults to 2
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default)]
    pub license_key: Option<String>,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2
}

impl ClientConfig {
    /// Load client configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<ClientConfig>()
    }
}
