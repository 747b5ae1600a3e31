use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use crate::api::error::ApiError;
use crate::api::state::{AppState, LiveMatch};
use crate::ingress::{InboundMessage, OutboundMessage, SessionBinding, validate_axes};
use crate::lifecycle::Controller;
use crate::ledger::Ledger;
use crate::model::matchrec::MatchPhase;
use crate::physics::Vec2;
use crate::settlement::{self, PlacementInput, Pot};
use crate::simulation::{Match, MatchEvent};

const INPUT_QUEUE_DEPTH: usize = 64;
const OUTBOUND_CAPACITY: usize = 256;

pub async fn upgrade(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    ensure_match_owner(&state, &match_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, match_id, socket)))
}

/// Spawns the match's owner task the first time any session connects to
/// it. The task owns the `simulation::Match` exclusively; everything else
/// talks to it only through the input queue and the broadcast channel
/// (no `Arc<Mutex<_>>` around simulation state).
async fn ensure_match_owner(state: &AppState, match_id: &str) -> Result<(), ApiError> {
    {
        let inner = state.inner.read().await;
        if inner.live_matches.contains_key(match_id) {
            return Ok(());
        }
    }

    let mut inner = state.inner.write().await;
    if inner.live_matches.contains_key(match_id) {
        return Ok(());
    }

    let record = inner.controller.load_match(match_id).await?;
    let members: Vec<(String, u32)> = {
        let conn = inner.db.lock().await;
        let mut stmt = conn
            .prepare("SELECT account_id, team FROM lobby_members WHERE lobby_id = ?1")
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        stmt.query_map(rusqlite::params![record.lobby_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::Internal(e.to_string()))?
    };

    let (tick_rate_hz, map_radius) = (inner.tick_rate_hz, inner.map_radius);
    let sim = Match::new(match_id.to_string(), record.buy_in, &members, &record.seed_hex, map_radius, tick_rate_hz)
        .map_err(ApiError::from)?;

    let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
    let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    inner.live_matches.insert(
        match_id.to_string(),
        LiveMatch {
            input_tx,
            outbound_tx: outbound_tx.clone(),
            shutdown_tx: shutdown_tx.clone(),
        },
    );

    let controller = inner.controller.clone();
    let ledger = inner.ledger.clone();
    let match_id_owned = match_id.to_string();

    tokio::spawn(run_match_owner(
        sim, record.rake_bps, record.rake_cap, record.pot, tick_rate_hz, input_rx, outbound_tx, shutdown_rx, controller, ledger,
        match_id_owned,
    ));

    Ok(())
}

/// The per-match owner loop: ticks at the configured rate, drains pending
/// inputs, fans out snapshots/events, and settles through the ledger on
/// the terminal tick.
#[allow(clippy::too_many_arguments)]
async fn run_match_owner(
    mut sim: Match,
    rake_bps: u32,
    rake_cap: Option<i64>,
    pot: i64,
    tick_hz: f64,
    mut input_rx: mpsc::Receiver<(String, Vec2, bool)>,
    outbound_tx: broadcast::Sender<OutboundMessage>,
    mut shutdown_rx: broadcast::Receiver<()>,
    controller: Arc<Controller>,
    _ledger: Arc<Ledger>,
    match_id: String,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(1.0 / tick_hz));

    println!("[match] {match_id} owner task starting");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                println!("[match] {match_id} cancelled, refunding");
                let _ = outbound_tx.send(OutboundMessage::Event(MatchEvent::End));
                if let Err(e) = refund_match(&controller, &match_id).await {
                    eprintln!("[match] {match_id} refund error: {e:#}");
                }
                break;
            }
            Some((cell_id, axes, boost)) = input_rx.recv() => {
                sim.apply_input(&cell_id, axes, boost);
            }
            _ = interval.tick() => {
                let events = match sim.tick() {
                    Ok(e) => e,
                    Err(e) => {
                        eprintln!("[match] {match_id} tick error: {e:#}");
                        continue;
                    }
                };

                let _ = outbound_tx.send(OutboundMessage::Snapshot(sim.snapshot()));
                for event in events {
                    let _ = outbound_tx.send(OutboundMessage::Event(event));
                }

                if sim.is_settled() {
                    if let Err(e) = settle(&sim, &controller, &match_id, rake_bps, rake_cap, pot, &outbound_tx).await {
                        eprintln!("[match] {match_id} settlement error: {e:#}");
                    }
                    break;
                }
            }
        }
    }

    println!("[match] {match_id} owner task exiting");
}

async fn settle(
    sim: &Match,
    controller: &Controller,
    match_id: &str,
    rake_bps: u32,
    rake_cap: Option<i64>,
    pot: i64,
    outbound_tx: &broadcast::Sender<OutboundMessage>,
) -> anyhow::Result<()> {
    let record = controller.load_match(match_id).await?;
    let ranked = sim.placements();

    let placement_inputs: Vec<PlacementInput> = ranked
        .iter()
        .map(|(cell, rank)| PlacementInput { account_id: cell.id.clone(), placement: *rank, final_mass: cell.mass })
        .collect();

    let pot = Pot { pot, rake_bps, rake_cap };
    let outcomes = settlement::compute_payouts(pot, record.payout_model, &placement_inputs);

    let rows: Vec<(String, u32, f64, f64, i64)> = ranked
        .iter()
        .zip(outcomes.iter())
        .map(|((cell, rank), outcome)| (cell.id.clone(), *rank, cell.mass, cell.max_mass_seen, outcome.payout))
        .collect();

    controller.settle_match(match_id, &rows, now_unix()).await?;

    let placements_dto = rows
        .iter()
        .map(|(account_id, rank, _, _, payout)| crate::ingress::PlacementDto {
            account_id: account_id.clone(),
            placement: *rank,
            payout: *payout,
        })
        .collect();

    let _ = outbound_tx.send(OutboundMessage::Result {
        placements: placements_dto,
        seed_hex: record.seed_hex,
        nonce_hex: record.nonce_hex,
        commit_hex: record.commit_hex,
    });

    Ok(())
}

async fn refund_match(controller: &Controller, match_id: &str) -> anyhow::Result<()> {
    controller.set_match_phase(match_id, MatchPhase::Refunding).await?;
    controller.recover().await?;
    Ok(())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

async fn handle_socket(state: AppState, match_id: String, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    let (outbound_tx, shutdown_tx) = {
        let inner = state.inner.read().await;
        match inner.live_matches.get(&match_id) {
            Some(live) => (live.outbound_tx.clone(), live.shutdown_tx.clone()),
            None => return,
        }
    };

    let mut outbound_rx = outbound_tx.subscribe();
    let mut binding: Option<SessionBinding> = None;

    let send_task = tokio::spawn(async move {
        while let Ok(msg) = outbound_rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let input_tx = {
        let inner = state.inner.read().await;
        inner.live_matches.get(&match_id).map(|live| live.input_tx.clone())
    };

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(inbound) = serde_json::from_str::<InboundMessage>(&text) else { continue };

        match inbound {
            InboundMessage::Auth { token } => {
                let secret = state.inner.read().await.auth_secret.clone();
                if let Ok(claims) = crate::api::auth::verify_jwt(&token, &secret) {
                    binding = Some(SessionBinding::new(claims.sub.clone(), claims.sub, match_id.clone()));
                }
            }
            InboundMessage::Input { seq, axes, boost, .. } => {
                let Some(binding) = binding.as_mut() else { continue };
                if !binding.accept_seq(seq) {
                    continue;
                }
                if validate_axes(axes).is_err() {
                    continue;
                }
                if let Some(tx) = &input_tx {
                    let _ = tx.send((binding.cell_id.clone(), axes.into(), boost)).await;
                }
            }
        }
    }

    let _ = shutdown_tx; // session disconnect does not cancel the match
    send_task.abort();
}
