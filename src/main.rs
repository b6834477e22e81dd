use anyhow::{Result, bail};
use luxedraw::config;
use luxedraw::database::list_assets;
use luxedraw::reports::generate_and_save_report_to_path;
use luxedraw::utils::format_timestamp;
use luxedraw::{AssetKey, DrawSession};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: luxedraw [draw [prize-id] | prizes | history | assets | set-asset <key> <file> | clear-asset <key> | reset --yes | report]";

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut session = config.open_session()?;
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str).unwrap_or("draw") {
        "draw" => {
            if let Some(prize_id) = args.get(1) {
                session.select_prize(prize_id)?;
            }
            run_draw(&mut session).await?;
        }
        "prizes" => print_prizes(&session),
        "history" => print_history(&session),
        "assets" => {
            if let Some(conn) = session.store() {
                for (key, mime_type, size) in list_assets(conn)? {
                    println!("{}  {}  {} bytes", key, mime_type, size);
                }
            }
        }
        "set-asset" => {
            let (Some(key), Some(file)) = (args.get(1), args.get(2)) else {
                bail!("{}", USAGE);
            };
            let key = asset_key(key)?;
            let data = fs::read(file)?;
            let mime_type = mime_type_for(Path::new(file));
            let size = data.len();
            session.set_asset(key, mime_type, data)?;
            println!("✅ Stored {} ({}, {} bytes)", key.as_str(), mime_type, size);
        }
        "clear-asset" => {
            let Some(key) = args.get(1) else {
                bail!("{}", USAGE);
            };
            let key = asset_key(key)?;
            if session.clear_asset(key)? {
                println!("✅ Cleared {}", key.as_str());
            } else {
                println!("⚠ {} was not set", key.as_str());
            }
        }
        "reset" => {
            let confirmed = args.iter().any(|a| a == "--yes" || a == "-y");
            if !confirmed {
                println!("⚠ This clears every winner and refills all prizes. Re-run with --yes.");
                return Ok(());
            }
            session.reset(true)?;
            println!("✅ Lottery reset.");
        }
        "report" => {
            match generate_and_save_report_to_path(
                session.config(),
                session.history(),
                &config.report_path,
            ) {
                Ok(path) => println!("✅ Report written to {}", path.display()),
                Err(e) => println!("❌ Failed to write report: {}", e),
            }
        }
        other => {
            eprintln!("{}", USAGE);
            bail!("unknown command: {}", other);
        }
    }

    Ok(())
}

async fn run_draw(session: &mut DrawSession) -> Result<()> {
    let Some(prize) = session.selected_prize() else {
        bail!("No prize selected and no prizes left to draw.");
    };
    println!("🎲 Drawing {} ({} left)", prize.name, prize.remaining);

    let width = session.config().draw.digit_count();
    let mut shown = vec!['*'; width];
    let winner = session
        .run_draw(|settle, digit| {
            shown[settle.position] = digit;
            let line: String = shown.iter().collect();
            print!("\r   {}", line);
            let _ = io::stdout().flush();
        })
        .await?;
    println!();

    println!("🎉 {} wins {}!", winner.number, winner.prize_name);
    println!("   \"{}\"", winner.message);
    if session.selected_prize().is_some_and(|p| p.remaining == 0) {
        if let Some(next) = session.select_first_available() {
            println!("👉 Next up: {}", next.name);
        }
    }
    Ok(())
}

/// Accepts `bgm` as well as `asset_bgm`.
fn asset_key(name: &str) -> Result<AssetKey> {
    AssetKey::parse(name)
        .or_else(|| AssetKey::parse(&format!("asset_{}", name)))
        .ok_or_else(|| anyhow::anyhow!("unknown asset: {} (background, bgm, winsfx)", name))
}

fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn print_prizes(session: &DrawSession) {
    println!("🎁 Prizes (0 – {}):", session.config().draw.max_number);
    for prize in session.inventory().by_rank() {
        let marker = if session.selected_prize_id() == Some(prize.id.as_str()) {
            "→"
        } else {
            " "
        };
        println!(
            " {} [{}] {}: {} / {} left",
            marker, prize.id, prize.name, prize.remaining, prize.count
        );
    }
}

fn print_history(session: &DrawSession) {
    if session.history().is_empty() {
        println!("⚠ No winners yet.");
        return;
    }
    for winner in session.history().iter() {
        println!(
            "{}  {}  {}  \"{}\"",
            winner.number,
            winner.prize_name,
            format_timestamp(winner.timestamp),
            winner.message
        );
    }
}
