//! Per-player duplex session protocol: a broadcast channel pair for
//! snapshot/event fan-out, with client input validated and sequence-gated
//! before it reaches the simulation.

use serde::{Deserialize, Serialize};

use crate::physics::Vec2;
use crate::simulation::{MatchEvent, Snapshot};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Auth { token: String },
    Input { seq: u64, axes: AxesDto, boost: bool, ts: i64 },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxesDto {
    pub x: f64,
    pub y: f64,
}

impl From<AxesDto> for Vec2 {
    fn from(a: AxesDto) -> Self {
        Vec2 { x: a.x, y: a.y }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Snapshot(Snapshot),
    Event(MatchEvent),
    Result {
        placements: Vec<PlacementDto>,
        seed_hex: String,
        nonce_hex: String,
        commit_hex: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacementDto {
    pub account_id: String,
    pub placement: u32,
    pub payout: i64,
}

/// Axes length must not exceed 1 (the simulation itself also clamps;
/// this is the session-level rejection for obviously bad input).
pub fn validate_axes(axes: AxesDto) -> Result<(), &'static str> {
    let len = (axes.x * axes.x + axes.y * axes.y).sqrt();
    if len.is_nan() || len > 1.000_1 {
        return Err("axes length must not exceed 1");
    }
    Ok(())
}

/// Session-local state: binds an authenticated account to a match cell and
/// tracks the latest accepted input sequence number so stale/duplicate
/// inputs coalesce to the latest rather than being reapplied out of order.
pub struct SessionBinding {
    pub account_id: String,
    pub cell_id: String,
    pub match_id: String,
    last_seq: u64,
}

impl SessionBinding {
    pub fn new(account_id: String, cell_id: String, match_id: String) -> Self {
        Self { account_id, cell_id, match_id, last_seq: 0 }
    }

    /// Returns true if `seq` is newer than the last accepted input and
    /// should be applied; false if it's stale and should be dropped.
    pub fn accept_seq(&mut self, seq: u64) -> bool {
        if seq <= self.last_seq && self.last_seq != 0 {
            return false;
        }
        self.last_seq = seq;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_over_unit_length_rejected() {
        assert!(validate_axes(AxesDto { x: 2.0, y: 0.0 }).is_err());
        assert!(validate_axes(AxesDto { x: 0.6, y: 0.6 }).is_ok());
    }

    #[test]
    fn stale_sequence_numbers_are_dropped() {
        let mut binding = SessionBinding::new("p1".into(), "c1".into(), "m1".into());
        assert!(binding.accept_seq(5));
        assert!(!binding.accept_seq(3));
        assert!(binding.accept_seq(6));
    }
}
