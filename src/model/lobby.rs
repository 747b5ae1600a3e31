use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::money::{Bps, Cents};
use super::payout::PayoutModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LobbyMode {
    Solo,
    Duo,
    Squad,
}

impl LobbyMode {
    pub fn capacity(self) -> usize {
        match self {
            LobbyMode::Solo => 8,
            LobbyMode::Duo => 8,
            LobbyMode::Squad => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LobbyState {
    Waiting,
    Countdown,
    Active,
    Shrink,
    Settlement,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LobbyMember {
    pub account_id: String,
    pub team: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Lobby {
    pub id: String,
    pub mode: LobbyMode,
    pub buy_in: Cents,
    pub payout_model: PayoutModel,
    pub rake_bps: Bps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rake_cap: Option<Cents>,
    pub state: LobbyState,
    pub members: Vec<LobbyMember>,
}

impl Lobby {
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.mode.capacity()
    }

    pub fn has_member(&self, account_id: &str) -> bool {
        self.members.iter().any(|m| m.account_id == account_id)
    }
}
