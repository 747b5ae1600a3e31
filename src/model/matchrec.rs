use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::money::{Bps, Cents};
use super::payout::PayoutModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Countdown,
    Active,
    Shrink,
    Settlement,
    Completed,
    Refunding,
}

/// Persistent record of a match, created at countdown entry. `seed`/`nonce`
/// are only revealed to clients once `ended_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatchRecord {
    pub id: String,
    pub lobby_id: String,
    pub seed_hex: String,
    pub nonce_hex: String,
    pub commit_hex: String,
    pub payout_model: PayoutModel,
    pub rake_bps: Bps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rake_cap: Option<Cents>,
    pub buy_in: Cents,
    pub pot: Cents,
    pub rake: Cents,
    pub phase: MatchPhase,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
}

impl MatchRecord {
    pub fn net_pot(&self) -> Cents {
        self.pot - self.rake
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Placement {
    pub match_id: String,
    pub account_id: String,
    pub team: u32,
    pub placement: u32,
    pub final_mass: f64,
    pub max_mass: f64,
    pub payout: Cents,
}
