use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::Winner;

/// Winners of the session, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLedger {
    winners: Vec<Winner>,
}

impl HistoryLedger {
    pub fn new(winners: Vec<Winner>) -> Self {
        Self { winners }
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Winner> {
        self.winners.iter()
    }

    pub fn winners(&self) -> &[Winner] {
        &self.winners
    }

    pub fn contains_number(&self, number: &str) -> bool {
        self.winners.iter().any(|w| w.number == number)
    }

    pub fn drawn_numbers(&self) -> HashSet<&str> {
        self.winners.iter().map(|w| w.number.as_str()).collect()
    }

    pub fn recent(&self, limit: usize) -> &[Winner] {
        &self.winners[..limit.min(self.winners.len())]
    }

    pub fn record(&mut self, winner: Winner) {
        self.winners.insert(0, winner);
    }

    pub fn clear(&mut self) {
        self.winners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winner(number: &str) -> Winner {
        Winner {
            id: format!("w-{}", number),
            number: number.to_string(),
            prize_name: "Lucky Prize".to_string(),
            timestamp: 0,
            message: "Congratulations!".to_string(),
        }
    }

    #[test]
    fn record_keeps_newest_first() {
        let mut ledger = HistoryLedger::default();
        ledger.record(winner("0001"));
        ledger.record(winner("0002"));
        ledger.record(winner("0003"));

        let numbers: Vec<&str> = ledger.iter().map(|w| w.number.as_str()).collect();
        assert_eq!(numbers, vec!["0003", "0002", "0001"]);
        assert_eq!(ledger.recent(2).len(), 2);
        assert_eq!(ledger.recent(2)[0].number, "0003");
        assert_eq!(ledger.recent(10).len(), 3);
    }

    #[test]
    fn drawn_numbers_reflect_every_winner() {
        let ledger = HistoryLedger::new(vec![winner("0042"), winner("1234")]);
        assert!(ledger.contains_number("0042"));
        assert!(!ledger.contains_number("42"));
        assert_eq!(ledger.drawn_numbers().len(), 2);
    }
}
