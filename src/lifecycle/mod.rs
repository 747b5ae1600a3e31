//! Lobby -> match -> settled lifecycle controller, persisting state at
//! every transition so a crash can always resume or refund cleanly.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ledger::Ledger;
use crate::model::lobby::{Lobby, LobbyMember, LobbyMode, LobbyState};
use crate::model::matchrec::{MatchPhase, MatchRecord};
use crate::model::money::{Bps, Cents, apply_bps};
use crate::model::payout::PayoutModel;
use crate::rng;

pub type Db = Arc<Mutex<Connection>>;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS lobbies (
            id            TEXT PRIMARY KEY,
            mode          TEXT NOT NULL,
            buy_in        INTEGER NOT NULL,
            payout_model  TEXT NOT NULL,
            rake_bps      INTEGER NOT NULL,
            rake_cap      INTEGER,
            state         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lobby_members (
            lobby_id   TEXT NOT NULL REFERENCES lobbies(id) ON DELETE CASCADE,
            account_id TEXT NOT NULL,
            team       INTEGER NOT NULL,
            PRIMARY KEY (lobby_id, account_id)
        );

        CREATE TABLE IF NOT EXISTS matches (
            id            TEXT PRIMARY KEY,
            lobby_id      TEXT NOT NULL REFERENCES lobbies(id),
            seed_hex      TEXT NOT NULL,
            nonce_hex     TEXT NOT NULL,
            commit_hex    TEXT NOT NULL,
            payout_model  TEXT NOT NULL,
            rake_bps      INTEGER NOT NULL,
            rake_cap      INTEGER,
            buy_in        INTEGER NOT NULL,
            pot           INTEGER NOT NULL,
            rake          INTEGER NOT NULL,
            phase         TEXT NOT NULL,
            started_at    INTEGER NOT NULL,
            ended_at      INTEGER
        );

        CREATE TABLE IF NOT EXISTS placements (
            match_id   TEXT NOT NULL REFERENCES matches(id),
            account_id TEXT NOT NULL,
            team       INTEGER NOT NULL,
            placement  INTEGER NOT NULL,
            final_mass REAL NOT NULL,
            max_mass   REAL NOT NULL,
            payout     INTEGER NOT NULL,
            PRIMARY KEY (match_id, account_id)
        );
        ",
    )?;
    Ok(())
}

pub struct Controller {
    db: Db,
    ledger: Ledger,
}

fn mode_str(m: LobbyMode) -> &'static str {
    match m {
        LobbyMode::Solo => "solo",
        LobbyMode::Duo => "duo",
        LobbyMode::Squad => "squad",
    }
}

fn payout_model_str(m: PayoutModel) -> &'static str {
    match m {
        PayoutModel::WinnerTakeAll => "winner_take_all",
        PayoutModel::Top3Ladder => "top3_ladder",
        PayoutModel::Proportional => "proportional",
    }
}

fn parse_payout_model(s: &str) -> PayoutModel {
    match s {
        "top3_ladder" => PayoutModel::Top3Ladder,
        "proportional" => PayoutModel::Proportional,
        _ => PayoutModel::WinnerTakeAll,
    }
}

impl Controller {
    pub fn new(db: Db, ledger: Ledger) -> Self {
        Self { db, ledger }
    }

    pub async fn create_lobby(
        &self,
        mode: LobbyMode,
        buy_in: Cents,
        payout_model: PayoutModel,
        rake_bps: Bps,
        rake_cap: Option<Cents>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO lobbies (id, mode, buy_in, payout_model, rake_bps, rake_cap, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'waiting')",
            params![id, mode_str(mode), buy_in, payout_model_str(payout_model), rake_bps, rake_cap],
        )?;
        Ok(id)
    }

    fn load_lobby(conn: &Connection, lobby_id: &str) -> Result<Lobby> {
        let (mode, buy_in, payout_model, rake_bps, rake_cap, state): (String, Cents, String, Bps, Option<Cents>, String) = conn
            .query_row(
                "SELECT mode, buy_in, payout_model, rake_bps, rake_cap, state FROM lobbies WHERE id = ?1",
                params![lobby_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
            )
            .context("lobby not found")?;

        let mut stmt = conn.prepare("SELECT account_id, team FROM lobby_members WHERE lobby_id = ?1")?;
        let members = stmt
            .query_map(params![lobby_id], |row| {
                Ok(LobbyMember { account_id: row.get(0)?, team: row.get(1)? })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Lobby {
            id: lobby_id.to_string(),
            mode: match mode.as_str() {
                "duo" => LobbyMode::Duo,
                "squad" => LobbyMode::Squad,
                _ => LobbyMode::Solo,
            },
            buy_in,
            payout_model: parse_payout_model(&payout_model),
            rake_bps,
            rake_cap,
            state: match state.as_str() {
                "countdown" => LobbyState::Countdown,
                "active" => LobbyState::Active,
                "shrink" => LobbyState::Shrink,
                "settlement" => LobbyState::Settlement,
                "completed" => LobbyState::Completed,
                _ => LobbyState::Waiting,
            },
            members,
        })
    }

    /// Public read of a lobby's current state and membership.
    pub async fn lobby(&self, lobby_id: &str) -> Result<Lobby> {
        let conn = self.db.lock().await;
        Self::load_lobby(&conn, lobby_id)
    }

    /// Join protocol: lock the lobby row, reject if not `waiting`/full/
    /// already a member, lock escrow, insert membership. Any failure rolls
    /// back every prior step. If this join fills the lobby to its mode
    /// capacity, promotes it to a match and returns the new record.
    pub async fn join(&self, lobby_id: &str, account_id: &str, team: u32) -> Result<Option<MatchRecord>> {
        let (buy_in, fills_lobby) = {
            let conn = self.db.lock().await;
            let lobby = Self::load_lobby(&conn, lobby_id)?;
            if lobby.state != LobbyState::Waiting {
                bail!("lobby {lobby_id} is not accepting joins");
            }
            if lobby.is_full() {
                bail!("lobby {lobby_id} is full");
            }
            if lobby.has_member(account_id) {
                bail!("{account_id} is already a member of {lobby_id}");
            }
            (lobby.buy_in, lobby.members.len() + 1 >= lobby.mode.capacity())
        };

        self.ledger.lock_escrow(account_id, buy_in, lobby_id).await?;

        {
            let conn = self.db.lock().await;
            conn.execute(
                "INSERT INTO lobby_members (lobby_id, account_id, team) VALUES (?1, ?2, ?3)",
                params![lobby_id, account_id, team],
            )?;
        }

        if fills_lobby {
            return Ok(Some(self.start_match(lobby_id, now_unix()).await?));
        }
        Ok(None)
    }

    /// Pre-countdown leave: releases escrow.
    pub async fn leave(&self, lobby_id: &str, account_id: &str) -> Result<()> {
        let buy_in = {
            let conn = self.db.lock().await;
            let lobby = Self::load_lobby(&conn, lobby_id)?;
            if lobby.state != LobbyState::Waiting {
                bail!("cannot leave lobby {lobby_id} after countdown has started");
            }
            lobby.buy_in
        };

        self.ledger.refund_escrow(account_id, buy_in, lobby_id).await?;

        let conn = self.db.lock().await;
        conn.execute(
            "DELETE FROM lobby_members WHERE lobby_id = ?1 AND account_id = ?2",
            params![lobby_id, account_id],
        )?;
        Ok(())
    }

    /// Promote a lobby to a match at countdown entry: draw commitment,
    /// snapshot pot/rake, persist the match row before any gameplay events
    /// are emitted.
    pub async fn start_match(&self, lobby_id: &str, now: i64) -> Result<MatchRecord> {
        let conn = self.db.lock().await;
        let lobby = Self::load_lobby(&conn, lobby_id)?;
        if lobby.members.is_empty() {
            bail!("cannot start a match with no members");
        }

        let commitment = rng::generate_commitment();
        let pot = lobby.buy_in * lobby.members.len() as Cents;
        let raw_rake = apply_bps(pot, lobby.rake_bps);
        let rake = match lobby.rake_cap {
            Some(cap) => raw_rake.min(cap),
            None => raw_rake,
        };

        let match_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO matches
             (id, lobby_id, seed_hex, nonce_hex, commit_hex, payout_model, rake_bps, rake_cap, buy_in, pot, rake, phase, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'countdown', ?12, NULL)",
            params![
                match_id, lobby_id, commitment.seed_hex, commitment.nonce_hex, commitment.commit_hex,
                payout_model_str(lobby.payout_model), lobby.rake_bps, lobby.rake_cap, lobby.buy_in, pot, rake, now,
            ],
        )?;
        conn.execute("UPDATE lobbies SET state = 'countdown' WHERE id = ?1", params![lobby_id])?;

        println!("[lifecycle] match {match_id} started from lobby {lobby_id}: pot={pot} rake={rake}");

        Ok(MatchRecord {
            id: match_id,
            lobby_id: lobby_id.to_string(),
            seed_hex: commitment.seed_hex,
            nonce_hex: commitment.nonce_hex,
            commit_hex: commitment.commit_hex,
            payout_model: lobby.payout_model,
            rake_bps: lobby.rake_bps,
            rake_cap: lobby.rake_cap,
            buy_in: lobby.buy_in,
            pot,
            rake,
            phase: MatchPhase::Countdown,
            started_at: now,
            ended_at: None,
        })
    }

    pub async fn set_match_phase(&self, match_id: &str, phase: MatchPhase) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE matches SET phase = ?2 WHERE id = ?1",
            params![match_id, phase_str(phase)],
        )?;
        Ok(())
    }

    pub async fn load_match(&self, match_id: &str) -> Result<MatchRecord> {
        let conn = self.db.lock().await;
        Self::load_match_row(&conn, match_id)
    }

    fn load_match_row(conn: &Connection, match_id: &str) -> Result<MatchRecord> {
        conn.query_row(
            "SELECT id, lobby_id, seed_hex, nonce_hex, commit_hex, payout_model, rake_bps, rake_cap,
                    buy_in, pot, rake, phase, started_at, ended_at
             FROM matches WHERE id = ?1",
            params![match_id],
            |row| {
                let payout_model: String = row.get(5)?;
                let phase: String = row.get(11)?;
                Ok(MatchRecord {
                    id: row.get(0)?,
                    lobby_id: row.get(1)?,
                    seed_hex: row.get(2)?,
                    nonce_hex: row.get(3)?,
                    commit_hex: row.get(4)?,
                    payout_model: parse_payout_model(&payout_model),
                    rake_bps: row.get(6)?,
                    rake_cap: row.get(7)?,
                    buy_in: row.get(8)?,
                    pot: row.get(9)?,
                    rake: row.get(10)?,
                    phase: parse_phase(&phase),
                    started_at: row.get(12)?,
                    ended_at: row.get(13)?,
                })
            },
        )
        .context("match not found")
    }

    /// Finalize a settled match: persist placements, settle the ledger, and
    /// mark the match completed. Idempotent — a retry after `ended_at` is
    /// set returns without re-applying.
    pub async fn settle_match(
        &self,
        match_id: &str,
        placements: &[(String, u32, f64, f64, Cents)],
        now: i64,
    ) -> Result<()> {
        let record = self.load_match(match_id).await?;
        if record.ended_at.is_some() {
            return Ok(());
        }

        let payouts: Vec<(String, Cents)> = placements
            .iter()
            .map(|(account_id, _, _, _, payout)| (account_id.clone(), *payout))
            .collect();
        self.ledger.settle(match_id, record.buy_in, &payouts, record.rake).await?;

        let conn = self.db.lock().await;
        for (account_id, placement, final_mass, max_mass, payout) in placements {
            conn.execute(
                "INSERT INTO placements (match_id, account_id, team, placement, final_mass, max_mass, payout)
                 VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6)
                 ON CONFLICT(match_id, account_id) DO NOTHING",
                params![match_id, account_id, placement, final_mass, max_mass, payout],
            )?;
        }
        conn.execute(
            "UPDATE matches SET phase = 'completed', ended_at = ?2 WHERE id = ?1",
            params![match_id, now],
        )?;
        conn.execute(
            "UPDATE lobbies SET state = 'completed' WHERE id = ?1",
            params![record.lobby_id],
        )?;

        println!("[lifecycle] match {match_id} settled and completed");
        Ok(())
    }

    /// Recovery: on startup, any match left in countdown/active/shrink with
    /// no `ended_at` is fully refunded and marked completed. Run once
    /// before the API router is mounted.
    pub async fn recover(&self) -> Result<u32> {
        let stuck: Vec<(String, String, Cents)> = {
            let conn = self.db.lock().await;
            let mut stmt = conn.prepare(
                "SELECT id, lobby_id, buy_in FROM matches
                 WHERE ended_at IS NULL AND phase IN ('countdown', 'active', 'shrink')",
            )?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut recovered = 0;
        for (match_id, lobby_id, buy_in) in stuck {
            let members: Vec<String> = {
                let conn = self.db.lock().await;
                let mut stmt = conn.prepare("SELECT account_id FROM lobby_members WHERE lobby_id = ?1")?;
                stmt.query_map(params![lobby_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            for account_id in &members {
                self.ledger.refund_escrow(account_id, buy_in, &match_id).await?;
            }

            let conn = self.db.lock().await;
            conn.execute(
                "UPDATE matches SET phase = 'completed', ended_at = unixepoch() WHERE id = ?1",
                params![match_id],
            )?;
            conn.execute("UPDATE lobbies SET state = 'completed' WHERE id = ?1", params![lobby_id])?;

            println!("[lifecycle] recovered crashed match {match_id}: refunded {} players", members.len());
            recovered += 1;
        }

        Ok(recovered)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn phase_str(p: MatchPhase) -> &'static str {
    match p {
        MatchPhase::Countdown => "countdown",
        MatchPhase::Active => "active",
        MatchPhase::Shrink => "shrink",
        MatchPhase::Settlement => "settlement",
        MatchPhase::Completed => "completed",
        MatchPhase::Refunding => "refunding",
    }
}

fn parse_phase(s: &str) -> MatchPhase {
    match s {
        "active" => MatchPhase::Active,
        "shrink" => MatchPhase::Shrink,
        "settlement" => MatchPhase::Settlement,
        "completed" => MatchPhase::Completed,
        "refunding" => MatchPhase::Refunding,
        _ => MatchPhase::Countdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn open_mem() -> (Db, crate::ledger::Db) {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        crate::ledger::migrate(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        (db.clone(), db)
    }

    #[tokio::test]
    async fn join_that_fills_the_lobby_promotes_it_to_a_match() {
        let (db, ledger_db) = open_mem();
        let ledger = Ledger::new(ledger_db);
        let controller = Controller::new(db, ledger);

        let lobby_id = controller
            .create_lobby(LobbyMode::Solo, 100, PayoutModel::WinnerTakeAll, 0, None)
            .await
            .unwrap();

        for p in ["p1", "p2", "p3", "p4", "p5", "p6", "p7"] {
            controller.ledger.deposit(p, 100, "topup", None).await.unwrap();
            let promoted = controller.join(&lobby_id, p, 0).await.unwrap();
            assert!(promoted.is_none());
        }

        controller.ledger.deposit("p8", 100, "topup", None).await.unwrap();
        let promoted = controller.join(&lobby_id, "p8", 0).await.unwrap();
        let record = promoted.expect("8th join should fill a solo lobby and start the match");
        assert_eq!(record.phase, MatchPhase::Countdown);
        assert_eq!(record.pot, 800);

        let lobby = controller.lobby(&lobby_id).await.unwrap();
        assert_eq!(lobby.state, LobbyState::Countdown);
    }

    #[tokio::test]
    async fn crash_recovery_refunds_all_members() {
        let (db, ledger_db) = open_mem();
        let ledger = Ledger::new(ledger_db);
        let controller = Controller::new(db, ledger);

        let lobby_id = controller
            .create_lobby(LobbyMode::Solo, 1000, PayoutModel::WinnerTakeAll, 800, None)
            .await
            .unwrap();

        controller.ledger.deposit("p1", 1000, "topup", None).await.unwrap();
        controller.ledger.deposit("p2", 1000, "topup", None).await.unwrap();
        controller.ledger.deposit("p3", 1000, "topup", None).await.unwrap();
        controller.join(&lobby_id, "p1", 0).await.unwrap();
        controller.join(&lobby_id, "p2", 0).await.unwrap();
        controller.join(&lobby_id, "p3", 0).await.unwrap();

        let record = controller.start_match(&lobby_id, 1000).await.unwrap();
        controller.set_match_phase(&record.id, MatchPhase::Active).await.unwrap();

        let recovered = controller.recover().await.unwrap();
        assert_eq!(recovered, 1);

        for p in ["p1", "p2", "p3"] {
            let w = controller.ledger.wallet(p).await.unwrap();
            assert_eq!(w.available, 1000);
            assert_eq!(w.escrow, 0);
        }
    }
}
