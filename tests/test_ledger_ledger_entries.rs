use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use battle_arena_core::ledger::{self, Ledger};
use battle_arena_core::model::account::HOUSE_ACCOUNT_ID;

fn open_mem() -> ledger::Db {
    let conn = Connection::open_in_memory().unwrap();
    ledger::migrate(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

#[tokio::test]
async fn settlement_residue_and_rake_land_on_the_house_account() {
    let ledger = Ledger::new(open_mem());
    ledger.deposit("p1", 500, "topup", None).await.unwrap();
    ledger.deposit("p2", 500, "topup", None).await.unwrap();
    ledger.lock_escrow("p1", 500, "m1").await.unwrap();
    ledger.lock_escrow("p2", 500, "m1").await.unwrap();

    let payouts = vec![("p1".to_string(), 920i64), ("p2".to_string(), 0i64)];
    ledger.settle("m1", 500, &payouts, 80).await.unwrap();

    let house = ledger.wallet(HOUSE_ACCOUNT_ID).await.unwrap();
    assert_eq!(house.available, 80);

    let history = ledger.history("p1", 10).await.unwrap();
    assert!(history.iter().any(|e| e.reference == "m1"));
}

#[tokio::test]
async fn history_is_ordered_most_recent_first() {
    let ledger = Ledger::new(open_mem());
    ledger.deposit("p1", 100, "first", None).await.unwrap();
    ledger.deposit("p1", 200, "second", None).await.unwrap();
    let history = ledger.history("p1", 10).await.unwrap();
    assert_eq!(history[0].reference, "second");
    assert_eq!(history[1].reference, "first");
}
