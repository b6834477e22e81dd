use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::history::HistoryLedger;
use crate::types::{AssetKey, LotteryConfig, StoredAsset};

pub const CONFIG_KEY: &str = "lottery_config";
pub const WINNERS_KEY: &str = "lottery_winners";

pub fn ensure_parent_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn create_database(db_path: &str) -> Result<Connection> {
    ensure_parent_dir(db_path)?;
    let conn = Connection::open(db_path)?;
    create_database_with_connection(&conn)?;
    info!("Opened draw store at {}", db_path);
    Ok(conn)
}

pub fn create_database_with_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assets (
            key TEXT PRIMARY KEY,
            mime_type TEXT NOT NULL,
            data BLOB NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    Ok(())
}

fn save_setting(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        params![key, value],
    )?;
    Ok(())
}

pub fn load_setting(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
    stmt.query_row([key], |row| row.get::<_, String>(0))
        .optional()
}

pub fn save_config(conn: &Connection, config: &LotteryConfig) -> Result<()> {
    let json = serde_json::to_string(config)?;
    save_setting(conn, CONFIG_KEY, &json)?;
    Ok(())
}

pub fn load_config(conn: &Connection) -> Result<Option<LotteryConfig>> {
    match load_setting(conn, CONFIG_KEY)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Key an unreadable value is moved aside to.
pub fn corrupt_key(key: &str) -> String {
    format!("{}.corrupt", key)
}

/// Copies the raw value under `key` to [`corrupt_key`]. Returns false if `key` is unset.
pub fn preserve_setting(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    match load_setting(conn, key)? {
        Some(raw) => {
            save_setting(conn, &corrupt_key(key), &raw)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub fn save_history(conn: &Connection, history: &HistoryLedger) -> Result<()> {
    let json = serde_json::to_string(history)?;
    save_setting(conn, WINNERS_KEY, &json)?;
    Ok(())
}

pub fn load_history(conn: &Connection) -> Result<HistoryLedger> {
    match load_setting(conn, WINNERS_KEY)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(HistoryLedger::default()),
    }
}

/// Writes inventory and history in one transaction so a draw is recorded whole.
pub fn save_draw_result(
    conn: &Connection,
    config: &LotteryConfig,
    history: &HistoryLedger,
) -> Result<()> {
    let config_json = serde_json::to_string(config)?;
    let history_json = serde_json::to_string(history)?;
    let tx = conn.unchecked_transaction()?;
    save_setting(&tx, CONFIG_KEY, &config_json)?;
    save_setting(&tx, WINNERS_KEY, &history_json)?;
    tx.commit()?;
    Ok(())
}

pub fn save_asset(conn: &Connection, key: AssetKey, asset: &StoredAsset) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO assets (key, mime_type, data, updated_at) VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET mime_type = excluded.mime_type, data = excluded.data,
         updated_at = CURRENT_TIMESTAMP",
        params![key.as_str(), asset.mime_type, asset.data],
    )?;
    Ok(())
}

pub fn load_asset(conn: &Connection, key: AssetKey) -> rusqlite::Result<Option<StoredAsset>> {
    let mut stmt = conn.prepare("SELECT mime_type, data FROM assets WHERE key = ?1")?;
    stmt.query_row([key.as_str()], |row| {
        Ok(StoredAsset {
            mime_type: row.get(0)?,
            data: row.get(1)?,
        })
    })
    .optional()
}

pub fn delete_asset(conn: &Connection, key: AssetKey) -> rusqlite::Result<bool> {
    let removed = conn.execute("DELETE FROM assets WHERE key = ?1", [key.as_str()])?;
    Ok(removed > 0)
}

pub fn list_assets(conn: &Connection) -> rusqlite::Result<Vec<(String, String, usize)>> {
    let mut stmt =
        conn.prepare("SELECT key, mime_type, length(data) FROM assets ORDER BY key")?;
    let asset_iter = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)? as usize,
        ))
    })?;

    let mut results = Vec::new();
    for asset in asset_iter {
        results.push(asset?);
    }
    Ok(results)
}
