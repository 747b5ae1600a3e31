use clap::Parser;

use battle_arena_core::{api, cli, config, ledger, lifecycle, model};

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Serve { host, port, data_dir } => {
            let cfg = config::Config::from_env(host, port, data_dir)?;
            println!(
                "[config] tick_rate_hz={} map_radius={} data_dir={}",
                cfg.tick_rate_hz,
                cfg.map_radius,
                cfg.data_dir.display()
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(api::serve(&cfg.host, cfg.port, &cfg.data_dir, cfg.tick_rate_hz, cfg.map_radius))
        }
        cli::Command::CreateLobby { mode, buy_in, payout_model, rake_bps, rake_cap, data_dir } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(create_lobby(&mode, buy_in, &payout_model, rake_bps, rake_cap, &data_dir))
        }
        cli::Command::ListLobbies { data_dir } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(list_lobbies(&data_dir))
        }
    }
}

fn expand_data_dir(data_dir: &std::path::Path) -> std::path::PathBuf {
    if data_dir.starts_with("~") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        std::path::PathBuf::from(home).join(data_dir.strip_prefix("~").unwrap())
    } else {
        data_dir.to_path_buf()
    }
}

async fn create_lobby(
    mode: &str,
    buy_in: i64,
    payout_model: &str,
    rake_bps: u32,
    rake_cap: Option<i64>,
    data_dir: &std::path::Path,
) -> anyhow::Result<()> {
    let data_dir = expand_data_dir(data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let (db, _secret) = api::db::open(&data_dir.join("battle-arena.db"))?;

    let mode = match mode {
        "duo" => model::lobby::LobbyMode::Duo,
        "squad" => model::lobby::LobbyMode::Squad,
        _ => model::lobby::LobbyMode::Solo,
    };
    let payout_model = match payout_model {
        "top3_ladder" => model::payout::PayoutModel::Top3Ladder,
        "proportional" => model::payout::PayoutModel::Proportional,
        _ => model::payout::PayoutModel::WinnerTakeAll,
    };

    let controller = lifecycle::Controller::new(db.clone(), ledger::Ledger::new(db));
    let lobby_id = controller.create_lobby(mode, buy_in, payout_model, rake_bps, rake_cap).await?;
    println!("{lobby_id}");
    Ok(())
}

async fn list_lobbies(data_dir: &std::path::Path) -> anyhow::Result<()> {
    let data_dir = expand_data_dir(data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let (db, _secret) = api::db::open(&data_dir.join("battle-arena.db"))?;

    let conn = db.lock().await;
    let mut stmt = conn.prepare("SELECT id, mode, buy_in, state FROM lobbies ORDER BY rowid DESC")?;
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let mode: String = row.get(1)?;
        let buy_in: i64 = row.get(2)?;
        let state: String = row.get(3)?;
        Ok((id, mode, buy_in, state))
    })?;

    for row in rows {
        let (id, mode, buy_in, state) = row?;
        println!("{id}  mode={mode}  buy_in={buy_in}  state={state}");
    }
    Ok(())
}
