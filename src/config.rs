//! Runtime configuration resolved from environment variables, following
//! `run::config::RuntimeConfig::from_cli`'s env-var-resolution idiom.

use std::path::PathBuf;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    /// Reserved for a future matchmaking-queue collaborator. Parsed but
    /// never dialed by this core.
    pub redis_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub tick_rate_hz: f64,
    pub map_radius: f64,
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env(host: String, port: u16, data_dir: PathBuf) -> Result<Self> {
        let tick_rate_hz = std::env::var("TICK_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::physics::TICK_HZ);
        let map_radius = std::env::var("MAP_RADIUS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::simulation::MAP_RADIUS_DEFAULT);

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            tick_rate_hz,
            map_radius,
            host,
            port,
            data_dir,
        })
    }
}
