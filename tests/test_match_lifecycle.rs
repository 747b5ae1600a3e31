use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use battle_arena_core::ledger::{self, Ledger};
use battle_arena_core::lifecycle::{self, Controller};
use battle_arena_core::model::lobby::LobbyMode;
use battle_arena_core::model::matchrec::MatchPhase;
use battle_arena_core::model::payout::PayoutModel;
use battle_arena_core::physics::Vec2;
use battle_arena_core::settlement::{self, PlacementInput, Pot};
use battle_arena_core::simulation::Match;

fn open_mem() -> ledger::Db {
    let conn = Connection::open_in_memory().unwrap();
    ledger::migrate(&conn).unwrap();
    lifecycle::migrate(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

/// Full happy path: create a lobby, two players join, the match starts,
/// runs a handful of ticks, and settles through the ledger with the pot
/// fully accounted for.
#[tokio::test]
async fn lobby_join_start_settle_round_trip() {
    let db = open_mem();
    let ledger = Ledger::new(db.clone());
    let controller = Controller::new(db.clone(), Ledger::new(db.clone()));

    let lobby_id = controller
        .create_lobby(LobbyMode::Duo, 500, PayoutModel::WinnerTakeAll, 500, None)
        .await
        .unwrap();

    ledger.deposit("alice", 1000, "topup", None).await.unwrap();
    ledger.deposit("bob", 1000, "topup", None).await.unwrap();

    controller.join(&lobby_id, "alice", 0).await.unwrap();
    controller.join(&lobby_id, "bob", 1).await.unwrap();

    let alice_wallet = ledger.wallet("alice").await.unwrap();
    assert_eq!(alice_wallet.available, 500);
    assert_eq!(alice_wallet.escrow, 500);

    let record = controller.start_match(&lobby_id, 1_700_000_000).await.unwrap();
    assert_eq!(record.pot, 1000);
    assert_eq!(record.phase, MatchPhase::Countdown);

    let members = vec![("alice".to_string(), 0u32), ("bob".to_string(), 1u32)];
    let mut sim =
        Match::new(record.id.clone(), record.buy_in, &members, &record.seed_hex, 1000.0, battle_arena_core::physics::TICK_HZ).unwrap();

    for _ in 0..5 {
        sim.apply_input("alice", Vec2 { x: 1.0, y: 0.0 }, false);
        sim.tick().unwrap();
    }

    let ranked = sim.placements();
    let inputs: Vec<PlacementInput> = ranked
        .iter()
        .map(|(cell, rank)| PlacementInput { account_id: cell.id.clone(), placement: *rank, final_mass: cell.mass })
        .collect();

    let pot = Pot { pot: record.pot, rake_bps: record.rake_bps, rake_cap: record.rake_cap };
    let outcomes = settlement::compute_payouts(pot, record.payout_model, &inputs);

    let rows: Vec<(String, u32, f64, f64, i64)> = ranked
        .iter()
        .zip(outcomes.iter())
        .map(|((cell, rank), outcome)| (cell.id.clone(), *rank, cell.mass, cell.max_mass_seen, outcome.payout))
        .collect();

    controller.settle_match(&record.id, &rows, 1_700_000_300).await.unwrap();

    let settled = controller.load_match(&record.id).await.unwrap();
    assert!(settled.ended_at.is_some());

    let total_available: i64 = {
        let a = ledger.wallet("alice").await.unwrap();
        let b = ledger.wallet("bob").await.unwrap();
        assert_eq!(a.escrow, 0);
        assert_eq!(b.escrow, 0);
        a.available + b.available
    };
    let house = ledger.wallet(battle_arena_core::model::account::HOUSE_ACCOUNT_ID).await.unwrap();

    // every minor unit of the original deposits is accounted for: either
    // still sitting available, paid out, or collected as rake.
    assert_eq!(total_available + house.available, 1000 + 1000);
}

#[tokio::test]
async fn leaving_before_countdown_refunds_escrow() {
    let db = open_mem();
    let ledger = Ledger::new(db.clone());
    let controller = Controller::new(db.clone(), Ledger::new(db));

    let lobby_id = controller
        .create_lobby(LobbyMode::Solo, 250, PayoutModel::WinnerTakeAll, 0, None)
        .await
        .unwrap();

    ledger.deposit("carol", 250, "topup", None).await.unwrap();
    controller.join(&lobby_id, "carol", 0).await.unwrap();
    assert_eq!(ledger.wallet("carol").await.unwrap().escrow, 250);

    controller.leave(&lobby_id, "carol").await.unwrap();
    let wallet = ledger.wallet("carol").await.unwrap();
    assert_eq!(wallet.escrow, 0);
    assert_eq!(wallet.available, 250);
}
