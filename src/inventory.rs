use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DrawError;
use crate::types::Prize;
use crate::utils::new_id;

/// Fields an admin may change on an existing tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrizeUpdate {
    pub name: Option<String>,
    /// A new count discards partial progress: `remaining` restarts at `count`.
    pub count: Option<u32>,
    pub rank: Option<u32>,
}

/// Ordered set of prize tiers, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Prize>", into = "Vec<Prize>")]
pub struct PrizeInventory {
    prizes: Vec<Prize>,
}

impl From<Vec<Prize>> for PrizeInventory {
    fn from(prizes: Vec<Prize>) -> Self {
        Self::new(prizes)
    }
}

impl From<PrizeInventory> for Vec<Prize> {
    fn from(inventory: PrizeInventory) -> Self {
        inventory.prizes
    }
}

impl PrizeInventory {
    pub fn new(prizes: Vec<Prize>) -> Self {
        let mut inventory = Self { prizes };
        inventory.clamp_remaining();
        inventory
    }

    pub fn len(&self) -> usize {
        self.prizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prizes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prize> {
        self.prizes.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Prize> {
        self.prizes.iter().find(|p| p.id == id)
    }

    /// Tiers in presentation order; equal ranks keep configuration order.
    pub fn by_rank(&self) -> Vec<&Prize> {
        let mut sorted: Vec<&Prize> = self.prizes.iter().collect();
        sorted.sort_by_key(|p| p.rank);
        sorted
    }

    /// Lowest-rank tier that can still be drawn.
    pub fn first_available(&self) -> Option<&Prize> {
        self.by_rank().into_iter().find(|p| p.is_available())
    }

    pub fn total_remaining(&self) -> u64 {
        self.prizes.iter().map(|p| u64::from(p.remaining)).sum()
    }

    pub fn add_prize(&mut self, name: impl Into<String>, count: u32) -> &Prize {
        let rank = self.prizes.len() as u32 + 1;
        let prize = Prize::new(new_id(), name, count, rank);
        debug!("Adding prize {} ({}) rank {}", prize.name, prize.id, rank);
        self.prizes.push(prize);
        &self.prizes[self.prizes.len() - 1]
    }

    pub fn update_prize(&mut self, id: &str, update: PrizeUpdate) -> Result<&Prize, DrawError> {
        let prize = self
            .prizes
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| DrawError::UnknownPrize(id.to_string()))?;

        if let Some(name) = update.name {
            prize.name = name;
        }
        if let Some(count) = update.count {
            prize.count = count;
            prize.remaining = count;
        }
        if let Some(rank) = update.rank {
            prize.rank = rank;
        }
        debug!("Updated prize {}: {:?}", prize.id, prize);
        Ok(prize)
    }

    pub fn remove_prize(&mut self, id: &str) -> Result<Prize, DrawError> {
        let index = self
            .prizes
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DrawError::UnknownPrize(id.to_string()))?;
        Ok(self.prizes.remove(index))
    }

    /// Refill every tier.
    pub fn reset_remaining(&mut self) {
        for prize in &mut self.prizes {
            prize.remaining = prize.count;
        }
    }

    /// Copy of this inventory with one unit of `prize_id` consumed.
    pub fn with_prize_drawn(&self, prize_id: &str) -> Result<PrizeInventory, DrawError> {
        let mut updated = self.clone();
        let prize = updated
            .prizes
            .iter_mut()
            .find(|p| p.id == prize_id)
            .ok_or_else(|| {
                DrawError::InvalidSelection(format!("prize {} is not in the inventory", prize_id))
            })?;
        if prize.remaining == 0 {
            return Err(DrawError::InvalidSelection(format!(
                "prize {} has no remaining units",
                prize.name
            )));
        }
        prize.remaining -= 1;
        Ok(updated)
    }

    // Stored data may predate validation.
    fn clamp_remaining(&mut self) {
        for prize in &mut self.prizes {
            prize.remaining = prize.remaining.min(prize.count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PrizeInventory {
        PrizeInventory::new(vec![
            Prize::new("grand", "Grand Prize", 1, 1),
            Prize::new("first", "First Prize", 3, 2),
            Prize::new("lucky", "Lucky Prize", 10, 3),
        ])
    }

    #[test]
    fn add_prize_ranks_after_existing_tiers() {
        let mut inventory = sample();
        let added = inventory.add_prize("Bonus", 5).clone();
        assert_eq!(added.rank, 4);
        assert_eq!(added.remaining, 5);
        assert_eq!(inventory.len(), 4);
        assert!(inventory.get(&added.id).is_some());
    }

    #[test]
    fn editing_count_resets_remaining() {
        let mut inventory = sample().with_prize_drawn("lucky").unwrap();
        assert_eq!(inventory.get("lucky").unwrap().remaining, 9);

        let prize = inventory
            .update_prize(
                "lucky",
                PrizeUpdate {
                    count: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(prize.count, 4);
        assert_eq!(prize.remaining, 4);
    }

    #[test]
    fn editing_name_keeps_progress() {
        let mut inventory = sample().with_prize_drawn("first").unwrap();
        inventory
            .update_prize(
                "first",
                PrizeUpdate {
                    name: Some("Gold".to_string()),
                    rank: Some(7),
                    ..Default::default()
                },
            )
            .unwrap();
        let prize = inventory.get("first").unwrap();
        assert_eq!(prize.name, "Gold");
        assert_eq!(prize.rank, 7);
        assert_eq!(prize.remaining, 2);
    }

    #[test]
    fn unknown_prize_edits_are_rejected() {
        let mut inventory = sample();
        assert_eq!(
            inventory.update_prize("nope", PrizeUpdate::default()).unwrap_err(),
            DrawError::UnknownPrize("nope".to_string())
        );
        assert!(inventory.remove_prize("nope").is_err());
    }

    #[test]
    fn drawing_touches_only_the_selected_tier() {
        let inventory = sample();
        let updated = inventory.with_prize_drawn("first").unwrap();
        assert_eq!(updated.total_remaining(), inventory.total_remaining() - 1);
        for prize in inventory.iter() {
            let after = updated.get(&prize.id).unwrap();
            if prize.id == "first" {
                assert_eq!(after.remaining, prize.remaining - 1);
            } else {
                assert_eq!(after, prize);
            }
        }
    }

    #[test]
    fn exhausted_tier_cannot_be_drawn() {
        let inventory = sample().with_prize_drawn("grand").unwrap();
        assert!(matches!(
            inventory.with_prize_drawn("grand"),
            Err(DrawError::InvalidSelection(_))
        ));
    }

    #[test]
    fn first_available_skips_exhausted_tiers_by_rank() {
        let mut inventory = PrizeInventory::new(vec![
            Prize::new("c", "Third", 2, 3),
            Prize::new("a", "Top", 1, 1),
            Prize::new("b", "Second", 1, 2),
        ]);
        assert_eq!(inventory.first_available().unwrap().id, "a");
        inventory = inventory.with_prize_drawn("a").unwrap();
        assert_eq!(inventory.first_available().unwrap().id, "b");
        inventory = inventory.with_prize_drawn("b").unwrap();
        inventory = inventory.with_prize_drawn("c").unwrap();
        inventory = inventory.with_prize_drawn("c").unwrap();
        assert!(inventory.first_available().is_none());
    }

    #[test]
    fn loaded_remaining_is_clamped_to_count() {
        let mut prize = Prize::new("x", "X", 2, 1);
        prize.remaining = 9;
        let json = serde_json::to_string(&vec![prize]).unwrap();
        let inventory: PrizeInventory = serde_json::from_str(&json).unwrap();
        assert_eq!(inventory.get("x").unwrap().remaining, 2);
    }

    #[test]
    fn reset_refills_every_tier() {
        let mut inventory = sample()
            .with_prize_drawn("grand")
            .unwrap()
            .with_prize_drawn("lucky")
            .unwrap();
        inventory.reset_remaining();
        assert!(inventory.iter().all(|p| p.remaining == p.count));
    }
}
