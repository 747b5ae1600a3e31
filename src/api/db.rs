use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

pub type Db = Arc<Mutex<Connection>>;

pub fn open(path: &std::path::Path) -> Result<(Db, String)> {
    std::fs::create_dir_all(path.parent().unwrap_or(path)).context("creating db directory")?;

    let conn = Connection::open(path).with_context(|| format!("opening sqlite at {}", path.display()))?;

    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    crate::ledger::migrate(&conn)?;
    crate::lifecycle::migrate(&conn)?;
    let secret = ensure_auth_secret(&conn)?;

    Ok((Arc::new(Mutex::new(conn)), secret))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id             TEXT PRIMARY KEY,
            username       TEXT UNIQUE NOT NULL,
            password_hash  TEXT NOT NULL,
            nickname       TEXT NOT NULL,
            kyc_state      TEXT NOT NULL DEFAULT 'none',
            created_at     INTEGER DEFAULT (unixepoch())
        );

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn ensure_auth_secret(conn: &Connection) -> Result<String> {
    let existing: Option<String> = conn
        .query_row("SELECT value FROM config WHERE key = 'auth_secret'", [], |row| row.get(0))
        .ok();

    if let Some(secret) = existing {
        return Ok(secret);
    }

    if let Ok(from_env) = std::env::var("JWT_SECRET") {
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('auth_secret', ?1)",
            [&from_env],
        )?;
        return Ok(from_env);
    }

    use rand::Rng;
    let bytes: [u8; 48] = rand::rng().random();
    let secret = hex::encode(bytes);

    conn.execute("INSERT INTO config (key, value) VALUES ('auth_secret', ?1)", [&secret])?;

    println!("[api] generated and persisted a new JWT auth secret");
    Ok(secret)
}
