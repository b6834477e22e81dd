use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use luxedraw::reports::generate_and_save_report_to_path;
use luxedraw::{DrawSession, DrawSettingsUpdate, PrizeUpdate};

pub type SharedSession = Arc<Mutex<DrawSession>>;

fn required_str<'a>(arguments: &'a HashMap<String, Value>, name: &str) -> Result<&'a str> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing {} parameter", name))
}

fn optional_u32(arguments: &HashMap<String, Value>, name: &str) -> Result<Option<u32>> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = v
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("{} must be a non-negative integer", name))?;
            Ok(Some(u32::try_from(n)?))
        }
    }
}

pub struct DrawUseCase {
    session: SharedSession,
}

impl DrawUseCase {
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }

    pub async fn list_prizes(&self, _arguments: &HashMap<String, Value>) -> Result<String> {
        let session = self.session.lock().await;
        let prizes: Vec<_> = session.inventory().by_rank();

        Ok(json!({
            "success": true,
            "selected_prize_id": session.selected_prize_id(),
            "drawing": session.is_drawing(),
            "max_number": session.config().draw.max_number,
            "prizes": prizes
        })
        .to_string())
    }

    pub async fn select_prize(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let prize_id = required_str(arguments, "prize_id")?;
        let mut session = self.session.lock().await;
        let prize = session.select_prize(prize_id)?;

        Ok(json!({
            "success": true,
            "selected": prize
        })
        .to_string())
    }

    /// Plays a full draw: starts it, settles each digit on schedule, then records the winner.
    pub async fn start_draw(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(prize_id) = arguments.get("prize_id").and_then(|v| v.as_str()) {
            session.select_prize(prize_id)?;
        }

        let active = session.begin_draw()?;
        let plan = active.plan.clone();
        let digits: Vec<char> = plan.winning_number.chars().collect();
        let started = Instant::now();
        let mut timeline = Vec::new();

        for settle in plan.schedule.settles() {
            tokio::time::sleep_until(started + settle.offset()).await;
            session.settle_digit(settle.position);
            timeline.push(json!({
                "position": settle.position,
                "digit": digits.get(settle.position).map(|d| d.to_string()),
                "offset_ms": settle.offset_ms
            }));
        }

        let winner = session.complete_draw(active).await?;
        let remaining = session
            .inventory()
            .get(&plan.prize.id)
            .map(|p| p.remaining)
            .unwrap_or(0);

        Ok(json!({
            "success": true,
            "winner": winner,
            "remaining": remaining,
            "uniqueness_exhausted": plan.uniqueness_exhausted,
            "timeline": timeline
        })
        .to_string())
    }

    pub async fn get_history(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let session = self.session.lock().await;
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|l| l as usize)
            .unwrap_or(usize::MAX);
        let winners = session.history().recent(limit);

        Ok(json!({
            "success": true,
            "total": session.history().len(),
            "winners": winners
        })
        .to_string())
    }
}

pub struct PrizeUseCase {
    session: SharedSession,
}

impl PrizeUseCase {
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }

    pub async fn add_prize(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let name = required_str(arguments, "name")?;
        let count = optional_u32(arguments, "count")?.unwrap_or(1);
        let mut session = self.session.lock().await;
        let prize = session.add_prize(name, count)?;

        Ok(json!({
            "success": true,
            "prize": prize
        })
        .to_string())
    }

    pub async fn update_prize(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let prize_id = required_str(arguments, "prize_id")?;
        let update = PrizeUpdate {
            name: arguments
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            count: optional_u32(arguments, "count")?,
            rank: optional_u32(arguments, "rank")?,
        };
        let mut session = self.session.lock().await;
        let prize = session.update_prize(prize_id, update)?;

        Ok(json!({
            "success": true,
            "prize": prize
        })
        .to_string())
    }

    pub async fn remove_prize(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let prize_id = required_str(arguments, "prize_id")?;
        let mut session = self.session.lock().await;
        let removed = session.remove_prize(prize_id)?;

        Ok(json!({
            "success": true,
            "removed": removed,
            "selected_prize_id": session.selected_prize_id()
        })
        .to_string())
    }

    pub async fn update_draw_settings(
        &self,
        arguments: &HashMap<String, Value>,
    ) -> Result<String> {
        let update: DrawSettingsUpdate =
            serde_json::from_value(Value::Object(arguments.clone().into_iter().collect()))?;
        let mut session = self.session.lock().await;
        let settings = session.update_draw_settings(update)?.clone();

        Ok(json!({
            "success": true,
            "settings": settings
        })
        .to_string())
    }

    pub async fn reset_lottery(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let confirmed = arguments
            .get("confirm")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let mut session = self.session.lock().await;
        session.reset(confirmed)?;

        Ok(json!({
            "success": true,
            "message": "All prizes refilled and winner history cleared"
        })
        .to_string())
    }

    pub async fn toggle_audio(&self, _arguments: &HashMap<String, Value>) -> Result<String> {
        let mut session = self.session.lock().await;
        let muted = session.toggle_audio();

        Ok(json!({
            "success": true,
            "muted": muted
        })
        .to_string())
    }
}

pub struct ThemeUseCase {
    session: SharedSession,
}

impl ThemeUseCase {
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }

    pub async fn generate_background(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let mut session = self.session.lock().await;
        let prompt = match arguments.get("prompt").and_then(|v| v.as_str()) {
            Some(prompt) => prompt.to_string(),
            None => session.config().background_prompt.clone(),
        };
        let image = session.generate_background(&prompt).await?;

        Ok(json!({
            "success": true,
            "mime_type": image.mime_type,
            "bytes": image.bytes.len(),
            "message": "Background generated and saved"
        })
        .to_string())
    }
}

pub struct ReportUseCase {
    session: SharedSession,
    report_path: String,
}

impl ReportUseCase {
    pub fn new(session: SharedSession, report_path: String) -> Self {
        Self {
            session,
            report_path,
        }
    }

    pub async fn generate_history_report(
        &self,
        _arguments: &HashMap<String, Value>,
    ) -> Result<String> {
        let session = self.session.lock().await;
        let path = generate_and_save_report_to_path(
            session.config(),
            session.history(),
            &self.report_path,
        )
        .map_err(|e| anyhow::anyhow!("Report generation error: {}", e))?;

        Ok(json!({
            "success": true,
            "path": path.display().to_string(),
            "message": format!("Report generated with {} winner(s)", session.history().len())
        })
        .to_string())
    }
}
