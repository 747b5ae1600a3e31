pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod state;

use std::path::Path;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::ledger::Ledger;
use crate::lifecycle::Controller;
use state::AppState;

pub async fn serve(host: &str, port: u16, data_dir: &Path, tick_rate_hz: f64, map_radius: f64) -> Result<()> {
    let data_dir = if data_dir.starts_with("~") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        std::path::PathBuf::from(home).join(data_dir.strip_prefix("~").unwrap())
    } else {
        data_dir.to_path_buf()
    };

    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let db_path = data_dir.join("battle-arena.db");
    let (db_conn, auth_secret) =
        db::open(&db_path).with_context(|| format!("opening database at {}", db_path.display()))?;

    let ledger = Ledger::new(db_conn.clone());
    let controller = Controller::new(db_conn.clone(), Ledger::new(db_conn.clone()));

    let recovered = controller.recover().await.context("running crash recovery")?;
    if recovered > 0 {
        println!("[api] recovered {recovered} crashed match(es) on startup");
    }

    let state = AppState::new(data_dir.clone(), db_conn, auth_secret, controller, ledger, tick_rate_hz, map_radius);

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/lobbies", post(handlers::lobbies::create))
        .route("/api/lobbies/{id}", get(handlers::lobbies::get))
        .route("/api/lobbies/{id}/join", post(handlers::lobbies::join))
        .route("/api/lobbies/{id}/leave", post(handlers::lobbies::leave))
        .route("/api/matches/{id}/verify", get(handlers::matches::verify))
        .route("/api/wallets/{account_id}", get(handlers::wallets::get))
        .route("/api/wallets/{account_id}/history", get(handlers::wallets::history))
        .route("/api/wallets/{account_id}/withdraw", post(handlers::wallets::withdraw))
        .route("/ws/matches/{id}", get(handlers::ws::upgrade))
        .layer(cors)
        .with_state(state);

    let addr = format!("{host}:{port}");
    println!("battle-arena-core API server listening on {addr}");
    println!("  Health:  GET  http://{addr}/health");
    println!("  Auth:    POST http://{addr}/api/auth/register");
    println!("  Lobbies: POST http://{addr}/api/lobbies");
    println!("  Match:   WS   ws://{addr}/ws/matches/{{id}}");

    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;

    axum::serve(listener, app).await.context("running server")?;

    Ok(())
}
