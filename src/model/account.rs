use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// KYC state for a player account. Transitions are driven by an external
/// collaborator (KYC webhook consumer); this core only reads the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KycState {
    None,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Account {
    pub id: String,
    pub nickname: String,
    pub kyc_state: KycState,
    pub region: String,
}

/// The distinguished ledger account that collects rake. Not a singleton:
/// constructed explicitly wherever a `Ledger` is built and passed through.
pub const HOUSE_ACCOUNT_ID: &str = "house";
