//! The live draw session: owns configuration, inventory and history, applies
//! the results of each draw atomically and flushes every accepted change to
//! the store. Store failures are logged and the session carries on in memory.

use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ImageGenerator;
use crate::database;
use crate::draw::{self, DigitSettle, DrawPlan, RevealState};
use crate::error::DrawError;
use crate::history::HistoryLedger;
use crate::inventory::{PrizeInventory, PrizeUpdate};
use crate::message::{MessageProvider, PendingMessage};
use crate::types::{
    AssetKey, DrawConfiguration, GeneratedImage, LotteryConfig, MAX_DIGIT_DELAY_MS,
    MIN_DIGIT_DELAY_MS, MessageMode, Prize, StoredAsset, Winner,
};
use crate::utils::new_id;

/// A draw between [`DrawSession::begin_draw`] and [`DrawSession::complete_draw`].
#[derive(Debug)]
pub struct ActiveDraw {
    pub plan: DrawPlan,
    message: PendingMessage,
    draw_id: String,
}

impl ActiveDraw {
    pub fn message_ready(&self) -> bool {
        self.message.is_ready()
    }
}

/// Changes to the draw settings; `None` leaves a field as is.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DrawSettingsUpdate {
    pub max_number: Option<u32>,
    pub digit_delay_ms: Option<u64>,
    pub message_mode: Option<MessageMode>,
}

pub struct DrawSession {
    config: LotteryConfig,
    history: HistoryLedger,
    selected_prize_id: Option<String>,
    reveal: RevealState,
    active_draw: Option<String>,
    message_abort: Option<AbortHandle>,
    last_message: Option<String>,
    store: Option<Connection>,
    provider: MessageProvider,
    images: Option<Arc<dyn ImageGenerator>>,
    rng: StdRng,
}

impl DrawSession {
    pub fn new(
        mut config: LotteryConfig,
        history: HistoryLedger,
        store: Option<Connection>,
        provider: MessageProvider,
    ) -> Self {
        if config.draw.clamp_digit_delay() {
            warn!("Digit delay out of range, using {} ms", config.draw.digit_delay_ms);
        }
        let reveal = RevealState::idle(config.draw.digit_count());
        let mut session = Self {
            config,
            history,
            selected_prize_id: None,
            reveal,
            active_draw: None,
            message_abort: None,
            last_message: None,
            store,
            provider,
            images: None,
            rng: StdRng::from_os_rng(),
        };
        session.select_first_available();
        session
    }

    /// Session with no backing store.
    pub fn in_memory(config: LotteryConfig, provider: MessageProvider) -> Self {
        Self::new(config, HistoryLedger::default(), None, provider)
    }

    /// Restores the session from `conn`, falling back to defaults for anything unreadable.
    ///
    /// Unreadable values are copied aside under `<key>.corrupt` and left in
    /// place; only the next accepted change overwrites them.
    pub fn load(conn: Connection, provider: MessageProvider) -> Self {
        let (config, fresh) = match database::load_config(&conn) {
            Ok(Some(config)) => (config, false),
            Ok(None) => {
                info!("No saved configuration, starting with defaults");
                (LotteryConfig::default(), true)
            }
            Err(e) => {
                warn!("Could not read saved configuration, using defaults: {}", e);
                preserve_unreadable(&conn, database::CONFIG_KEY);
                (LotteryConfig::default(), false)
            }
        };
        let history = database::load_history(&conn).unwrap_or_else(|e| {
            warn!("Could not read winner history, starting empty: {}", e);
            preserve_unreadable(&conn, database::WINNERS_KEY);
            HistoryLedger::default()
        });
        info!(
            "Session loaded: {} prize tier(s), {} winner(s)",
            config.prizes.len(),
            history.len()
        );
        let session = Self::new(config, history, Some(conn), provider);
        if fresh {
            session.persist_config();
        }
        session
    }

    pub fn with_image_generator(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    pub fn inventory(&self) -> &PrizeInventory {
        &self.config.prizes
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub fn reveal(&self) -> &RevealState {
        &self.reveal
    }

    pub fn is_drawing(&self) -> bool {
        self.active_draw.is_some()
    }

    /// Message of the current or most recent draw.
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn selected_prize_id(&self) -> Option<&str> {
        self.selected_prize_id.as_deref()
    }

    pub fn selected_prize(&self) -> Option<&Prize> {
        self.selected_prize_id
            .as_deref()
            .and_then(|id| self.config.prizes.get(id))
    }

    pub fn store(&self) -> Option<&Connection> {
        self.store.as_ref()
    }

    // Selection

    pub fn select_prize(&mut self, prize_id: &str) -> Result<&Prize, DrawError> {
        self.ensure_idle()?;
        let prize = self
            .config
            .prizes
            .get(prize_id)
            .ok_or_else(|| DrawError::UnknownPrize(prize_id.to_string()))?;
        self.selected_prize_id = Some(prize.id.clone());
        Ok(prize)
    }

    /// Selects the lowest-rank tier with prizes left, or clears the selection.
    pub fn select_first_available(&mut self) -> Option<&Prize> {
        self.selected_prize_id = self.config.prizes.first_available().map(|p| p.id.clone());
        self.selected_prize()
    }

    // Draw lifecycle

    /// Starts a draw for the selected prize and kicks off its message.
    pub fn begin_draw(&mut self) -> Result<ActiveDraw, DrawError> {
        self.ensure_idle()?;
        let plan = draw::start_draw(
            self.selected_prize_id.as_deref(),
            &self.config.prizes,
            &self.history,
            &self.config.draw,
            &mut self.rng,
        )?;
        let message = self.provider.request(
            self.config.draw.message_mode,
            &plan.prize.name,
            &plan.winning_number,
            &mut self.rng,
        );

        let draw_id = new_id();
        self.reveal = RevealState::spinning(plan.schedule.digit_count());
        self.last_message = None;
        self.message_abort = message.abort_handle();
        self.active_draw = Some(draw_id.clone());
        Ok(ActiveDraw {
            plan,
            message,
            draw_id,
        })
    }

    /// Records one settle of the active draw's reveal.
    pub fn settle_digit(&mut self, position: usize) -> bool {
        self.reveal.settle(position)
    }

    /// Records the winner and consumes one prize unit, both or neither.
    pub async fn complete_draw(&mut self, active: ActiveDraw) -> Result<Winner, DrawError> {
        match self.active_draw.as_deref() {
            None => {
                active.message.cancel();
                return Err(DrawError::NoDrawInProgress);
            }
            Some(id) if id != active.draw_id => {
                active.message.cancel();
                return Err(DrawError::StaleDraw);
            }
            Some(_) => {}
        }
        let ActiveDraw { plan, message, .. } = active;
        for settle in plan.schedule.settles() {
            self.reveal.settle(settle.position);
        }

        let result = draw::finish_draw(
            &plan.prize,
            &plan.winning_number,
            message,
            &self.config.prizes,
        )
        .await;
        self.active_draw = None;
        self.message_abort = None;
        let (winner, updated) = result?;

        self.config.prizes = updated;
        self.history.record(winner.clone());
        self.last_message = Some(winner.message.clone());
        info!(
            "Winner recorded: {} for {} ({} left)",
            winner.number,
            winner.prize_name,
            self.config
                .prizes
                .get(&plan.prize.id)
                .map(|p| p.remaining)
                .unwrap_or(0)
        );
        self.persist_draw();
        Ok(winner)
    }

    /// Abandons the active draw; inventory and history stay untouched.
    pub fn cancel_draw(&mut self, active: ActiveDraw) {
        let owned = self.active_draw.as_deref() == Some(active.draw_id.as_str());
        let prize_name = active.plan.prize.name.clone();
        active.message.cancel();
        if owned && self.abort_draw() {
            info!("Draw of {} cancelled", prize_name);
        }
    }

    /// Ends the current draw without recording it, even when its [`ActiveDraw`]
    /// is gone. Returns false if no draw was in progress.
    pub fn abort_draw(&mut self) -> bool {
        if self.active_draw.take().is_none() {
            return false;
        }
        if let Some(handle) = self.message_abort.take() {
            handle.abort();
        }
        self.reveal = RevealState::idle(self.config.draw.digit_count());
        debug!("Active draw aborted");
        true
    }

    /// Runs a whole draw on the tokio clock, reporting each digit as it settles.
    pub async fn run_draw<F>(&mut self, mut on_settle: F) -> Result<Winner, DrawError>
    where
        F: FnMut(&DigitSettle, char),
    {
        let active = self.begin_draw()?;
        let mut guard = AbortOnDrop {
            session: self,
            armed: true,
        };
        let started = Instant::now();
        let digits: Vec<char> = active.plan.winning_number.chars().collect();

        for settle in active.plan.schedule.settles() {
            tokio::time::sleep_until(started + settle.offset()).await;
            guard.session.reveal.settle(settle.position);
            let digit = digits.get(settle.position).copied().unwrap_or('0');
            on_settle(settle, digit);
        }

        let result = guard.session.complete_draw(active).await;
        guard.armed = false;
        result
    }

    // Configuration

    pub fn add_prize(&mut self, name: &str, count: u32) -> Result<Prize, DrawError> {
        self.ensure_idle()?;
        let prize = self.config.prizes.add_prize(name, count).clone();
        if self.selected_prize().is_none() {
            self.select_first_available();
        }
        self.persist_config();
        Ok(prize)
    }

    pub fn update_prize(
        &mut self,
        prize_id: &str,
        update: PrizeUpdate,
    ) -> Result<Prize, DrawError> {
        self.ensure_idle()?;
        let prize = self.config.prizes.update_prize(prize_id, update)?.clone();
        self.persist_config();
        Ok(prize)
    }

    pub fn remove_prize(&mut self, prize_id: &str) -> Result<Prize, DrawError> {
        self.ensure_idle()?;
        let removed = self.config.prizes.remove_prize(prize_id)?;
        if self.selected_prize_id.as_deref() == Some(prize_id) {
            self.select_first_available();
        }
        self.persist_config();
        Ok(removed)
    }

    pub fn update_draw_settings(
        &mut self,
        update: DrawSettingsUpdate,
    ) -> Result<&DrawConfiguration, DrawError> {
        self.ensure_idle()?;
        if let Some(delay) = update.digit_delay_ms {
            if !(MIN_DIGIT_DELAY_MS..=MAX_DIGIT_DELAY_MS).contains(&delay) {
                return Err(DrawError::InvalidSettings(format!(
                    "digit_delay_ms must be between {} and {}, got {}",
                    MIN_DIGIT_DELAY_MS, MAX_DIGIT_DELAY_MS, delay
                )));
            }
        }
        if let Some(max_number) = update.max_number {
            self.config.draw.max_number = max_number;
        }
        if let Some(delay) = update.digit_delay_ms {
            self.config.draw.digit_delay_ms = delay;
        }
        if let Some(mode) = update.message_mode {
            self.config.draw.message_mode = mode;
        }
        self.reveal = RevealState::idle(self.config.draw.digit_count());
        debug!("Draw settings now {:?}", self.config.draw);
        self.persist_config();
        Ok(&self.config.draw)
    }

    /// Refills every tier and clears the winner history. Requires confirmation.
    pub fn reset(&mut self, confirmed: bool) -> Result<(), DrawError> {
        if !confirmed {
            return Err(DrawError::ResetNotConfirmed);
        }
        self.ensure_idle()?;
        self.config.prizes.reset_remaining();
        self.history.clear();
        self.last_message = None;
        if self.selected_prize().is_none() {
            self.select_first_available();
        }
        info!("Lottery reset: all tiers refilled, history cleared");
        self.persist_draw();
        Ok(())
    }

    /// Flips background audio and returns whether it is now muted.
    pub fn toggle_audio(&mut self) -> bool {
        self.config.muted = !self.config.muted;
        self.persist_config();
        self.config.muted
    }

    // Assets

    pub async fn generate_background(&mut self, prompt: &str) -> Result<GeneratedImage> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            bail!("Background prompt is empty");
        }
        let images = match &self.images {
            Some(images) => Arc::clone(images),
            None => bail!("No image generator configured"),
        };

        let image = images.generate_image(prompt).await?;
        self.config.background_prompt = prompt.to_string();
        self.persist_config();
        self.set_asset(AssetKey::Background, &image.mime_type, image.bytes.clone())?;
        info!(
            "Generated background ({}, {} bytes)",
            image.mime_type,
            image.bytes.len()
        );
        Ok(image)
    }

    pub fn set_asset(&mut self, key: AssetKey, mime_type: &str, data: Vec<u8>) -> Result<()> {
        let Some(conn) = &self.store else {
            bail!("No store attached; cannot keep {}", key.as_str());
        };
        let asset = StoredAsset {
            mime_type: mime_type.to_string(),
            data,
        };
        database::save_asset(conn, key, &asset)?;
        Ok(())
    }

    pub fn asset(&self, key: AssetKey) -> Option<StoredAsset> {
        let conn = self.store.as_ref()?;
        database::load_asset(conn, key).unwrap_or_else(|e| {
            warn!("Could not read {}: {}", key.as_str(), e);
            None
        })
    }

    pub fn clear_asset(&mut self, key: AssetKey) -> Result<bool> {
        match &self.store {
            Some(conn) => Ok(database::delete_asset(conn, key)?),
            None => Ok(false),
        }
    }

    fn ensure_idle(&self) -> Result<(), DrawError> {
        if self.is_drawing() {
            Err(DrawError::DrawInProgress)
        } else {
            Ok(())
        }
    }

    fn persist_config(&self) {
        if let Some(conn) = &self.store {
            if let Err(e) = database::save_config(conn, &self.config) {
                warn!("Failed to save configuration: {}", e);
            }
        }
    }

    fn persist_draw(&self) {
        if let Some(conn) = &self.store {
            if let Err(e) = database::save_draw_result(conn, &self.config, &self.history) {
                warn!("Failed to save draw result: {}", e);
            }
        }
    }
}

/// Aborts the session's draw if a `run_draw` future is dropped before it finishes.
struct AbortOnDrop<'a> {
    session: &'a mut DrawSession,
    armed: bool,
}

impl Drop for AbortOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed && self.session.abort_draw() {
            warn!("Draw dropped before completion; aborted without recording a winner");
        }
    }
}

fn preserve_unreadable(conn: &Connection, key: &str) {
    match database::preserve_setting(conn, key) {
        Ok(true) => warn!("Unreadable {} kept as {}", key, database::corrupt_key(key)),
        Ok(false) => {}
        Err(e) => warn!("Could not keep a copy of unreadable {}: {}", key, e),
    }
}
