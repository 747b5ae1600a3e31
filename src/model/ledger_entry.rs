use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::money::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Deposit,
    Withdrawal,
    EscrowLock,
    EscrowRelease,
    Payout,
    Rake,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// Immutable ledger row. `delta` is signed: positive credits `available`-side
/// balance, negative debits it (escrow transfers are modeled as a pair of
/// entries, one per bucket, that net to zero for the account).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEntry {
    pub id: String,
    pub account_id: String,
    pub kind: LedgerEntryKind,
    pub delta: Cents,
    pub status: LedgerEntryStatus,
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: i64,
}
