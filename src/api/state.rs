use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use crate::ingress::OutboundMessage;
use crate::ledger::Ledger;
use crate::lifecycle::Controller;

use super::db::Db;
use super::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<RwLock<AppStateInner>>,
}

pub struct AppStateInner {
    pub data_dir: PathBuf,
    pub db: Db,
    pub auth_secret: String,
    pub controller: Arc<Controller>,
    pub ledger: Arc<Ledger>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tick_rate_hz: f64,
    pub map_radius: f64,
    /// One entry per live match: input sender + snapshot/event fan-out.
    pub live_matches: HashMap<String, LiveMatch>,
}

/// The match owner task's handles, as seen by the API layer. The task
/// itself owns the `simulation::Match` value exclusively; nothing here
/// reaches into its state directly.
pub struct LiveMatch {
    pub input_tx: tokio::sync::mpsc::Sender<(String, crate::physics::Vec2, bool)>,
    pub outbound_tx: broadcast::Sender<OutboundMessage>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        data_dir: PathBuf,
        db: Db,
        auth_secret: String,
        controller: Controller,
        ledger: Ledger,
        tick_rate_hz: f64,
        map_radius: f64,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AppStateInner {
                data_dir,
                db,
                auth_secret,
                controller: Arc::new(controller),
                ledger: Arc::new(ledger),
                rate_limiter: Arc::new(RateLimiter::new()),
                tick_rate_hz,
                map_radius,
                live_matches: HashMap::new(),
            })),
        }
    }
}
