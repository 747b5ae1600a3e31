//! Double-entry-style ledger and escrow engine: per-account available
//! and escrow balances, with idempotency keys on externally-triggered
//! entries and match-grain idempotent settlement.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::account::{HOUSE_ACCOUNT_ID, KycState};
use crate::model::ledger_entry::{LedgerEntry, LedgerEntryKind, LedgerEntryStatus};
use crate::model::money::Cents;
use crate::model::wallet::Wallet;

pub type Db = Arc<Mutex<Connection>>;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS wallets (
            account_id TEXT PRIMARY KEY,
            available  INTEGER NOT NULL DEFAULT 0 CHECK (available >= 0),
            escrow     INTEGER NOT NULL DEFAULT 0 CHECK (escrow >= 0),
            version    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id              TEXT PRIMARY KEY,
            account_id      TEXT NOT NULL,
            kind            TEXT NOT NULL,
            delta           INTEGER NOT NULL,
            status          TEXT NOT NULL,
            reference       TEXT NOT NULL,
            idempotency_key TEXT UNIQUE,
            created_at      INTEGER DEFAULT (unixepoch())
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_account ON ledger_entries(account_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_reference ON ledger_entries(reference);
        ",
    )?;
    Ok(())
}

pub struct Ledger {
    db: Db,
}

impl Ledger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn ensure_wallet(conn: &Connection, account_id: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO wallets (account_id, available, escrow, version) VALUES (?1, 0, 0, 0)",
            params![account_id],
        )?;
        Ok(())
    }

    fn read_wallet(conn: &Connection, account_id: &str) -> Result<Wallet> {
        conn.query_row(
            "SELECT account_id, available, escrow, version FROM wallets WHERE account_id = ?1",
            params![account_id],
            |row| {
                Ok(Wallet {
                    account_id: row.get(0)?,
                    available: row.get(1)?,
                    escrow: row.get(2)?,
                    version: row.get(3)?,
                })
            },
        )
        .context("reading wallet")
    }

    /// Returns `Some(existing id)` if `key` already has a completed entry.
    fn idempotent_hit(conn: &Connection, key: &str) -> Result<Option<String>> {
        conn.query_row(
            "SELECT id FROM ledger_entries WHERE idempotency_key = ?1 AND status = 'completed'",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("checking idempotency key")
    }

    fn insert_entry(
        conn: &Connection,
        account_id: &str,
        kind: LedgerEntryKind,
        delta: Cents,
        reference: &str,
        key: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO ledger_entries (id, account_id, kind, delta, status, reference, idempotency_key)
             VALUES (?1, ?2, ?3, ?4, 'completed', ?5, ?6)",
            params![id, account_id, format!("{kind:?}").to_lowercase(), delta, reference, key],
        )?;
        Ok(id)
    }

    pub async fn deposit(&self, account_id: &str, amount: Cents, reference: &str, key: Option<&str>) -> Result<String> {
        if amount < 0 {
            bail!("deposit amount must be non-negative");
        }
        let conn = self.db.lock().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<String> {
            if let Some(k) = key {
                if let Some(existing) = Self::idempotent_hit(&conn, k)? {
                    return Ok(existing);
                }
            }
            conn.execute(
                "INSERT INTO wallets (account_id, available, escrow, version) VALUES (?1, 0, 0, 0)
                 ON CONFLICT(account_id) DO NOTHING",
                params![account_id],
            )?;
            conn.execute(
                "UPDATE wallets SET available = available + ?2, version = version + 1 WHERE account_id = ?1",
                params![account_id, amount],
            )?;
            Self::insert_entry(&conn, account_id, LedgerEntryKind::Deposit, amount, reference, key)
        })();
        match result {
            Ok(id) => {
                conn.execute_batch("COMMIT")?;
                Ok(id)
            }
            Err(e) => {
                conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    /// Decreases `available`. Requires an approved KYC state; the caller
    /// supplies it (this ledger has no access to the accounts table that
    /// owns KYC state, only to wallets).
    pub async fn withdraw(
        &self,
        account_id: &str,
        amount: Cents,
        kyc_state: KycState,
        reference: &str,
        key: Option<&str>,
    ) -> Result<String> {
        if kyc_state != KycState::Approved {
            bail!("withdrawal requires an approved KYC state");
        }
        if amount <= 0 {
            bail!("withdrawal amount must be positive");
        }

        let conn = self.db.lock().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<String> {
            if let Some(k) = key {
                if let Some(existing) = Self::idempotent_hit(&conn, k)? {
                    return Ok(existing);
                }
            }
            Self::ensure_wallet(&conn, account_id)?;
            let wallet = Self::read_wallet(&conn, account_id)?;
            if wallet.available < amount {
                bail!("insufficient available balance for withdrawal");
            }
            conn.execute(
                "UPDATE wallets SET available = available - ?2, version = version + 1 WHERE account_id = ?1",
                params![account_id, amount],
            )?;
            Self::insert_entry(&conn, account_id, LedgerEntryKind::Withdrawal, -amount, reference, key)
        })();
        match result {
            Ok(id) => {
                conn.execute_batch("COMMIT")?;
                Ok(id)
            }
            Err(e) => {
                conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    pub async fn lock_escrow(&self, account_id: &str, amount: Cents, match_ref: &str) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<()> {
            conn.execute(
                "INSERT INTO wallets (account_id, available, escrow, version) VALUES (?1, 0, 0, 0)
                 ON CONFLICT(account_id) DO NOTHING",
                params![account_id],
            )?;
            let wallet = Self::read_wallet(&conn, account_id)?;
            if wallet.available < amount {
                bail!("insufficient available balance for escrow lock");
            }
            conn.execute(
                "UPDATE wallets SET available = available - ?2, escrow = escrow + ?2, version = version + 1
                 WHERE account_id = ?1",
                params![account_id, amount],
            )?;
            Self::insert_entry(&conn, account_id, LedgerEntryKind::EscrowLock, -amount, match_ref, None)?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    pub async fn refund_escrow(&self, account_id: &str, amount: Cents, match_ref: &str) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<()> {
            let wallet = Self::read_wallet(&conn, account_id)?;
            let amount = amount.min(wallet.escrow);
            conn.execute(
                "UPDATE wallets SET available = available + ?2, escrow = escrow - ?2, version = version + 1
                 WHERE account_id = ?1",
                params![account_id, amount],
            )?;
            Self::insert_entry(&conn, account_id, LedgerEntryKind::Refund, amount, match_ref, None)?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    /// Settles a match in one transaction: debits each player's own
    /// `buy_in` from escrow (never `pot / n`), credits
    /// payouts, and writes one rake entry against the house account.
    /// Idempotent at the `match_id` grain: a second call with the same
    /// `match_id` is a no-op.
    pub async fn settle(
        &self,
        match_id: &str,
        buy_in: Cents,
        payouts: &[(String, Cents)],
        rake: Cents,
    ) -> Result<()> {
        let conn = self.db.lock().await;
        let already: Option<String> = conn
            .query_row(
                "SELECT id FROM ledger_entries WHERE reference = ?1 AND kind = 'rake'",
                params![match_id],
                |row| row.get(0),
            )
            .optional()?;
        if already.is_some() {
            return Ok(());
        }

        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<()> {
            for (account_id, payout) in payouts {
                let wallet = Self::read_wallet(&conn, account_id)?;
                let debit = buy_in.min(wallet.escrow);
                conn.execute(
                    "UPDATE wallets SET escrow = escrow - ?2, available = available + ?3, version = version + 1
                     WHERE account_id = ?1",
                    params![account_id, debit, payout],
                )?;
                Self::insert_entry(&conn, account_id, LedgerEntryKind::EscrowRelease, -debit, match_id, None)?;
                if *payout > 0 {
                    Self::insert_entry(&conn, account_id, LedgerEntryKind::Payout, *payout, match_id, None)?;
                }
            }

            conn.execute(
                "INSERT INTO wallets (account_id, available, escrow, version) VALUES (?1, 0, 0, 0)
                 ON CONFLICT(account_id) DO NOTHING",
                params![HOUSE_ACCOUNT_ID],
            )?;
            conn.execute(
                "UPDATE wallets SET available = available + ?2, version = version + 1 WHERE account_id = ?1",
                params![HOUSE_ACCOUNT_ID, rake],
            )?;
            Self::insert_entry(&conn, HOUSE_ACCOUNT_ID, LedgerEntryKind::Rake, rake, match_id, None)?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                println!("[ledger] settled match {match_id}: {} payouts, rake={rake}", payouts.len());
                Ok(())
            }
            Err(e) => {
                conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    pub async fn wallet(&self, account_id: &str) -> Result<Wallet> {
        let conn = self.db.lock().await;
        Self::ensure_wallet(&conn, account_id)?;
        Self::read_wallet(&conn, account_id)
    }

    pub async fn history(&self, account_id: &str, limit: u32) -> Result<Vec<LedgerEntry>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, account_id, kind, delta, status, reference, idempotency_key, created_at
             FROM ledger_entries WHERE account_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![account_id, limit], |row| {
                let kind: String = row.get(2)?;
                let status: String = row.get(4)?;
                Ok(LedgerEntry {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    kind: parse_kind(&kind),
                    delta: row.get(3)?,
                    status: parse_status(&status),
                    reference: row.get(5)?,
                    idempotency_key: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn parse_kind(s: &str) -> LedgerEntryKind {
    match s {
        "deposit" => LedgerEntryKind::Deposit,
        "withdrawal" => LedgerEntryKind::Withdrawal,
        "escrowlock" => LedgerEntryKind::EscrowLock,
        "escrowrelease" => LedgerEntryKind::EscrowRelease,
        "payout" => LedgerEntryKind::Payout,
        "rake" => LedgerEntryKind::Rake,
        _ => LedgerEntryKind::Refund,
    }
}

fn parse_status(s: &str) -> LedgerEntryStatus {
    match s {
        "pending" => LedgerEntryStatus::Pending,
        "failed" => LedgerEntryStatus::Failed,
        "cancelled" => LedgerEntryStatus::Cancelled,
        _ => LedgerEntryStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_mem() -> Db {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[tokio::test]
    async fn deposit_idempotency_key_applies_once() {
        let ledger = Ledger::new(open_mem());
        let id1 = ledger.deposit("p1", 5000, "topup", Some("key-1")).await.unwrap();
        let id2 = ledger.deposit("p1", 5000, "topup", Some("key-1")).await.unwrap();
        assert_eq!(id1, id2);
        let w = ledger.wallet("p1").await.unwrap();
        assert_eq!(w.available, 5000);
    }

    #[tokio::test]
    async fn lock_escrow_rejects_insufficient_funds() {
        let ledger = Ledger::new(open_mem());
        ledger.deposit("p1", 100, "topup", None).await.unwrap();
        assert!(ledger.lock_escrow("p1", 200, "m1").await.is_err());
    }

    #[tokio::test]
    async fn settle_is_idempotent_at_match_grain() {
        let ledger = Ledger::new(open_mem());
        ledger.deposit("p1", 1000, "topup", None).await.unwrap();
        ledger.deposit("p2", 1000, "topup", None).await.unwrap();
        ledger.lock_escrow("p1", 1000, "m1").await.unwrap();
        ledger.lock_escrow("p2", 1000, "m1").await.unwrap();

        let payouts = vec![("p1".to_string(), 1840i64), ("p2".to_string(), 0i64)];
        ledger.settle("m1", 1000, &payouts, 160).await.unwrap();
        ledger.settle("m1", 1000, &payouts, 160).await.unwrap();

        let w1 = ledger.wallet("p1").await.unwrap();
        assert_eq!(w1.available, 1840);
        assert_eq!(w1.escrow, 0);
    }

    #[tokio::test]
    async fn withdraw_rejects_unapproved_kyc() {
        let ledger = Ledger::new(open_mem());
        ledger.deposit("p1", 1000, "topup", None).await.unwrap();
        assert!(ledger.withdraw("p1", 500, KycState::None, "bank", None).await.is_err());
        assert!(ledger.withdraw("p1", 500, KycState::Pending, "bank", None).await.is_err());
        let w = ledger.wallet("p1").await.unwrap();
        assert_eq!(w.available, 1000);
    }

    #[tokio::test]
    async fn withdraw_rejects_insufficient_balance() {
        let ledger = Ledger::new(open_mem());
        ledger.deposit("p1", 100, "topup", None).await.unwrap();
        assert!(ledger.withdraw("p1", 200, KycState::Approved, "bank", None).await.is_err());
    }

    #[tokio::test]
    async fn withdraw_decreases_available_once_per_idempotency_key() {
        let ledger = Ledger::new(open_mem());
        ledger.deposit("p1", 1000, "topup", None).await.unwrap();
        let id1 = ledger.withdraw("p1", 400, KycState::Approved, "bank", Some("w-1")).await.unwrap();
        let id2 = ledger.withdraw("p1", 400, KycState::Approved, "bank", Some("w-1")).await.unwrap();
        assert_eq!(id1, id2);
        let w = ledger.wallet("p1").await.unwrap();
        assert_eq!(w.available, 600);
    }

    #[tokio::test]
    async fn refund_returns_escrow_to_available() {
        let ledger = Ledger::new(open_mem());
        ledger.deposit("p1", 1000, "topup", None).await.unwrap();
        ledger.lock_escrow("p1", 1000, "m1").await.unwrap();
        ledger.refund_escrow("p1", 1000, "m1").await.unwrap();
        let w = ledger.wallet("p1").await.unwrap();
        assert_eq!(w.available, 1000);
        assert_eq!(w.escrow, 0);
    }
}
