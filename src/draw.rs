//! The draw-and-award state machine.
//!
//! A draw runs in two phases. [`start_draw`] validates the selection, picks a
//! winning number and returns a [`DrawPlan`] whose [`RevealSchedule`] the
//! caller plays out on its own clock. Once the last digit settles the caller
//! invokes [`finish_draw`], which yields the winner record and the inventory
//! with one unit consumed. Neither phase mutates the session; the caller
//! applies both results together.

use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::DrawError;
use crate::history::HistoryLedger;
use crate::inventory::PrizeInventory;
use crate::message::PendingMessage;
use crate::types::{DrawConfiguration, Prize, Winner};
use crate::utils::{digit_count, new_id, now_millis, pad_number};

/// Spin time before the first (least significant) digit settles.
pub const INITIAL_REVEAL_DELAY: Duration = Duration::from_millis(1500);

/// Redraws allowed when a number has already won.
pub const UNIQUENESS_RETRY_BUDGET: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitState {
    Spinning,
    Settled,
}

/// One timed settle event. Position 0 is the most significant digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigitSettle {
    pub position: usize,
    pub offset_ms: u64,
}

impl DigitSettle {
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms)
    }
}

/// Settle events ordered by time, least significant digit first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealSchedule {
    settles: Vec<DigitSettle>,
}

impl RevealSchedule {
    pub fn new(digit_count: usize, initial_delay: Duration, gap: Duration) -> Self {
        let initial_ms = u64::try_from(initial_delay.as_millis()).unwrap_or(u64::MAX);
        let gap_ms = u64::try_from(gap.as_millis()).unwrap_or(u64::MAX);
        let settles = (0..digit_count)
            .map(|i| DigitSettle {
                position: digit_count - 1 - i,
                offset_ms: initial_ms.saturating_add((i as u64).saturating_mul(gap_ms)),
            })
            .collect();
        Self { settles }
    }

    pub fn digit_count(&self) -> usize {
        self.settles.len()
    }

    pub fn settles(&self) -> &[DigitSettle] {
        &self.settles
    }

    /// When the most significant digit settles and the draw can finish.
    pub fn completes_at(&self) -> Duration {
        self.settles.last().map(|s| s.offset()).unwrap_or_default()
    }
}

/// Per-digit spin state of the draw on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealState {
    digits: Vec<DigitState>,
}

impl RevealState {
    /// Nothing spinning; the state between draws.
    pub fn idle(digit_count: usize) -> Self {
        Self {
            digits: vec![DigitState::Settled; digit_count],
        }
    }

    pub fn spinning(digit_count: usize) -> Self {
        Self {
            digits: vec![DigitState::Spinning; digit_count],
        }
    }

    pub fn digits(&self) -> &[DigitState] {
        &self.digits
    }

    pub fn is_spinning(&self) -> bool {
        self.digits.contains(&DigitState::Spinning)
    }

    /// Settles one digit. Returns false if it was already settled.
    pub fn settle(&mut self, position: usize) -> bool {
        match self.digits.get_mut(position) {
            Some(state) if *state == DigitState::Spinning => {
                *state = DigitState::Settled;
                true
            }
            _ => false,
        }
    }

    /// Applies every settle due by `elapsed` and returns the newly settled positions.
    pub fn advance(&mut self, schedule: &RevealSchedule, elapsed: Duration) -> Vec<usize> {
        schedule
            .settles()
            .iter()
            .filter(|s| s.offset() <= elapsed)
            .filter_map(|s| self.settle(s.position).then_some(s.position))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawPlan {
    pub winning_number: String,
    /// Snapshot taken when the draw started.
    pub prize: Prize,
    pub schedule: RevealSchedule,
    pub attempts: u32,
    /// True when every retry collided with a previous winner and the number repeats one.
    pub uniqueness_exhausted: bool,
}

/// Draws a zero-padded number in `[0, max_number]` not yet present in `history`.
///
/// Gives up after [`UNIQUENESS_RETRY_BUDGET`] attempts and keeps the last
/// draw. Returns the number, the attempts used and whether uniqueness failed.
pub fn generate_unique_number<R: Rng + ?Sized>(
    max_number: u32,
    history: &HistoryLedger,
    rng: &mut R,
) -> (String, u32, bool) {
    let width = digit_count(max_number);
    let drawn = history.drawn_numbers();
    let mut number = String::new();

    for attempt in 1..=UNIQUENESS_RETRY_BUDGET {
        number = pad_number(rng.random_range(0..=max_number), width);
        if !drawn.contains(number.as_str()) {
            return (number, attempt, false);
        }
    }
    (number, UNIQUENESS_RETRY_BUDGET, true)
}

pub fn start_draw<R: Rng + ?Sized>(
    selected_prize_id: Option<&str>,
    inventory: &PrizeInventory,
    history: &HistoryLedger,
    config: &DrawConfiguration,
    rng: &mut R,
) -> Result<DrawPlan, DrawError> {
    let prize_id = selected_prize_id
        .ok_or_else(|| DrawError::InvalidSelection("no prize selected".to_string()))?;
    let prize = inventory.get(prize_id).ok_or_else(|| {
        DrawError::InvalidSelection(format!("prize {} does not exist", prize_id))
    })?;
    if !prize.is_available() {
        return Err(DrawError::InvalidSelection(format!(
            "{} has no prizes left",
            prize.name
        )));
    }

    let (winning_number, attempts, uniqueness_exhausted) =
        generate_unique_number(config.max_number, history, rng);
    if uniqueness_exhausted {
        warn!(
            "No unused number found in [0, {}] after {} attempts; {} repeats a previous winner",
            config.max_number, attempts, winning_number
        );
    }
    info!(
        "Draw started for {}: {} ({} attempt(s))",
        prize.name, winning_number, attempts
    );

    let schedule = RevealSchedule::new(
        config.digit_count(),
        INITIAL_REVEAL_DELAY,
        config.digit_reveal_delay(),
    );

    Ok(DrawPlan {
        winning_number,
        prize: prize.clone(),
        schedule,
        attempts,
        uniqueness_exhausted,
    })
}

/// Completes a draw once its reveal has played out.
///
/// The message is awaited here; it has already fallen back internally if the
/// service failed. Fails only if the prize can no longer be drawn from
/// `inventory`, in which case nothing should be recorded.
pub async fn finish_draw(
    prize: &Prize,
    winning_number: &str,
    pending_message: PendingMessage,
    inventory: &PrizeInventory,
) -> Result<(Winner, PrizeInventory), DrawError> {
    let updated = match inventory.with_prize_drawn(&prize.id) {
        Ok(updated) => updated,
        Err(e) => {
            pending_message.cancel();
            return Err(e);
        }
    };
    let message = pending_message.resolve().await;

    let winner = Winner {
        id: new_id(),
        number: winning_number.to_string(),
        prize_name: prize.name.clone(),
        timestamp: now_millis(),
        message,
    };
    Ok((winner, updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageMode;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn inventory() -> PrizeInventory {
        PrizeInventory::new(vec![
            Prize::new("grand", "Grand Prize", 1, 1),
            Prize::new("lucky", "Lucky Prize", 10, 2),
        ])
    }

    fn config(max_number: u32) -> DrawConfiguration {
        DrawConfiguration {
            max_number,
            digit_delay_ms: 1000,
            message_mode: MessageMode::Predefined,
        }
    }

    fn history_of(numbers: impl IntoIterator<Item = String>) -> HistoryLedger {
        let mut history = HistoryLedger::default();
        for number in numbers {
            history.record(Winner {
                id: new_id(),
                number,
                prize_name: "Lucky Prize".to_string(),
                timestamp: 0,
                message: "hi".to_string(),
            });
        }
        history
    }

    #[test]
    fn drawn_numbers_are_zero_padded_to_max_width() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let history = HistoryLedger::default();
        for _ in 0..500 {
            let (number, _, _) = generate_unique_number(9999, &history, &mut rng);
            assert_eq!(number.len(), 4);
            assert!(number.chars().all(|c| c.is_ascii_digit()));
            assert!(number.parse::<u32>().unwrap() <= 9999);
        }
        assert_eq!(pad_number(7, digit_count(9999)), "0007");
    }

    #[test]
    fn only_unused_number_is_found() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let history = history_of((0..9).map(|n| n.to_string()));
        let (number, attempts, exhausted) = generate_unique_number(9, &history, &mut rng);
        assert_eq!(number, "9");
        assert!(!exhausted);
        assert!(attempts <= UNIQUENESS_RETRY_BUDGET);
    }

    #[test]
    fn full_number_space_exhausts_the_budget() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let history = history_of((0..=9).map(|n| n.to_string()));
        let (number, attempts, exhausted) = generate_unique_number(9, &history, &mut rng);
        assert!(exhausted);
        assert_eq!(attempts, UNIQUENESS_RETRY_BUDGET);
        assert!(history.contains_number(&number));
    }

    #[test]
    fn settles_run_least_significant_first() {
        let schedule = RevealSchedule::new(4, INITIAL_REVEAL_DELAY, Duration::from_millis(1000));
        let timeline: Vec<(usize, u64)> = schedule
            .settles()
            .iter()
            .map(|s| (s.position, s.offset_ms))
            .collect();
        assert_eq!(timeline, vec![(3, 1500), (2, 2500), (1, 3500), (0, 4500)]);
        assert_eq!(schedule.completes_at(), Duration::from_millis(4500));
    }

    #[test]
    fn huge_gaps_saturate_instead_of_wrapping() {
        let schedule = RevealSchedule::new(
            5,
            INITIAL_REVEAL_DELAY,
            Duration::from_millis(u64::MAX / 2),
        );
        let offsets: Vec<u64> = schedule.settles().iter().map(|s| s.offset_ms).collect();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "{:?}", offsets);
        assert_eq!(offsets[0], 1500);
        assert_eq!(offsets[4], u64::MAX);
    }

    #[test]
    fn reveal_state_follows_the_schedule() {
        let schedule = RevealSchedule::new(4, INITIAL_REVEAL_DELAY, Duration::from_millis(1000));
        let mut state = RevealState::spinning(4);
        assert!(state.advance(&schedule, Duration::from_millis(1499)).is_empty());
        assert_eq!(state.advance(&schedule, Duration::from_millis(1500)), vec![3]);
        assert_eq!(state.advance(&schedule, Duration::from_millis(3600)), vec![2, 1]);
        assert!(state.is_spinning());
        assert_eq!(
            state.digits(),
            &[
                DigitState::Spinning,
                DigitState::Settled,
                DigitState::Settled,
                DigitState::Settled
            ]
        );
        assert_eq!(state.advance(&schedule, Duration::from_millis(4500)), vec![0]);
        assert!(!state.is_spinning());
        assert!(state.advance(&schedule, Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn start_draw_rejects_missing_unknown_and_exhausted_prizes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let history = HistoryLedger::default();
        let exhausted = inventory().with_prize_drawn("grand").unwrap();

        for (selection, inv) in [
            (None, inventory()),
            (Some("missing"), inventory()),
            (Some("grand"), exhausted),
        ] {
            let result = start_draw(selection, &inv, &history, &config(9999), &mut rng);
            assert!(matches!(result, Err(DrawError::InvalidSelection(_))));
        }
    }

    #[test]
    fn start_draw_plans_a_reveal_for_the_selected_prize() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let plan = start_draw(
            Some("lucky"),
            &inventory(),
            &HistoryLedger::default(),
            &config(999),
            &mut rng,
        )
        .unwrap();
        assert_eq!(plan.prize.id, "lucky");
        assert_eq!(plan.winning_number.len(), 3);
        assert_eq!(plan.schedule.digit_count(), 3);
        assert_eq!(plan.schedule.completes_at(), Duration::from_millis(3500));
        assert!(!plan.uniqueness_exhausted);
    }

    #[tokio::test]
    async fn finish_draw_consumes_exactly_one_unit() {
        let inv = inventory();
        let prize = inv.get("lucky").unwrap().clone();
        let (winner, updated) = finish_draw(
            &prize,
            "0420",
            PendingMessage::Ready("Congrats".to_string()),
            &inv,
        )
        .await
        .unwrap();

        assert_eq!(winner.number, "0420");
        assert_eq!(winner.prize_name, "Lucky Prize");
        assert_eq!(winner.message, "Congrats");
        assert_eq!(updated.total_remaining(), inv.total_remaining() - 1);
        assert_eq!(updated.get("lucky").unwrap().remaining, 9);
        assert_eq!(updated.get("grand"), inv.get("grand"));
    }

    #[tokio::test]
    async fn finish_draw_refuses_a_prize_that_ran_out() {
        let inv = inventory();
        let prize = inv.get("grand").unwrap().clone();
        let drained = inv.with_prize_drawn("grand").unwrap();
        let result = finish_draw(
            &prize,
            "0001",
            PendingMessage::Ready("x".to_string()),
            &drained,
        )
        .await;
        assert!(matches!(result, Err(DrawError::InvalidSelection(_))));
    }
}
