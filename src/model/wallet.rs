use super::money::Cents;

/// One wallet per account. `version` increments on every mutation so callers
/// can detect and retry against a stale read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    pub account_id: String,
    pub available: Cents,
    pub escrow: Cents,
    pub version: i64,
}

impl Wallet {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            available: 0,
            escrow: 0,
            version: 0,
        }
    }
}
