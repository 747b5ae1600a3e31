pub mod account;
pub mod ledger_entry;
pub mod lobby;
pub mod matchrec;
pub mod money;
pub mod payout;
pub mod wallet;
