use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use saim_core::{BankTransaction, Direction, Money};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::context::contact_key;
use crate::util::{similarity, word_overlap};

pub const DEFAULT_PATTERN_WINDOW: usize = 50;
pub const CONTACT_SIMILARITY_THRESHOLD: f32 = 0.8;
pub const DESCRIPTION_OVERLAP_THRESHOLD: f32 = 0.6;

fn amount_band() -> Decimal {
    Decimal::new(2, 1)
}

/// A past categorization remembered for a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub contact: String,
    /// Similarity between the queried contact and this pattern's contact.
    /// Only meaningful on patterns returned from [`PatternStore::find_matches`].
    pub contact_similarity: f32,
    pub amount_min: Money,
    pub amount_max: Money,
    pub direction: Direction,
    pub description: String,
    pub account_id: String,
    pub confidence: f32,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    fn matches(&self, tx: &BankTransaction) -> bool {
        tx.amount >= self.amount_min
            && tx.amount <= self.amount_max
            && tx.direction == self.direction
            && word_overlap(&tx.description, &self.description) >= DESCRIPTION_OVERLAP_THRESHOLD
    }
}

/// Per-contact history of categorizations, each contact bounded to `window`
/// entries with the oldest evicted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStore {
    window: usize,
    by_contact: BTreeMap<String, VecDeque<Pattern>>,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_WINDOW)
    }
}

impl PatternStore {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            by_contact: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Re-applies a (possibly smaller) window, trimming every contact.
    pub fn set_window(&mut self, window: usize) {
        self.window = window.max(1);
        for patterns in self.by_contact.values_mut() {
            while patterns.len() > self.window {
                patterns.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_contact.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_contact.values().all(VecDeque::is_empty)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &str> {
        self.by_contact.keys().map(String::as_str)
    }

    pub fn patterns_for(&self, contact: &str) -> impl Iterator<Item = &Pattern> {
        self.by_contact
            .get(&contact.trim().to_lowercase())
            .into_iter()
            .flatten()
    }

    /// Patterns matching `tx` on contact, amount band, direction and
    /// description, best first.
    pub fn find_matches(&self, tx: &BankTransaction) -> Vec<Pattern> {
        let key = contact_key(tx).to_lowercase();
        let mut matches: Vec<Pattern> = Vec::new();

        for (contact, patterns) in &self.by_contact {
            let contact_similarity = similarity(&key, contact);
            if contact_similarity < CONTACT_SIMILARITY_THRESHOLD {
                continue;
            }
            matches.extend(patterns.iter().filter(|p| p.matches(tx)).map(|p| Pattern {
                contact_similarity,
                ..p.clone()
            }));
        }

        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        matches
    }

    /// Remembers that `tx` went to `account_id` with `confidence`.
    pub fn record(&mut self, tx: &BankTransaction, account_id: &str, confidence: f32) {
        let contact = contact_key(tx);
        let (amount_min, amount_max) = tx.amount.band(amount_band());
        let pattern = Pattern {
            contact: contact.clone(),
            contact_similarity: 1.0,
            amount_min,
            amount_max,
            direction: tx.direction,
            description: tx.description.clone(),
            account_id: account_id.to_string(),
            confidence,
            last_seen: Utc::now(),
        };

        let patterns = self.by_contact.entry(contact.to_lowercase()).or_default();
        patterns.push_back(pattern);
        while patterns.len() > self.window {
            patterns.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.by_contact.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(desc: &str, contact: &str, cents: i64, direction: Direction) -> BankTransaction {
        BankTransaction::new(
            "t1",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            desc,
            Money::from_cents(cents),
            direction,
        )
        .with_contact(contact)
    }

    fn pattern(contact: &str, min: i64, max: i64, desc: &str, confidence: f32) -> Pattern {
        Pattern {
            contact: contact.into(),
            contact_similarity: 1.0,
            amount_min: Money::from_major(min),
            amount_max: Money::from_major(max),
            direction: Direction::Debit,
            description: desc.into(),
            account_id: "6400".into(),
            confidence,
            last_seen: Utc::now(),
        }
    }

    fn store_with(patterns: Vec<Pattern>) -> PatternStore {
        let mut store = PatternStore::default();
        for p in patterns {
            store
                .by_contact
                .entry(p.contact.to_lowercase())
                .or_default()
                .push_back(p);
        }
        store
    }

    #[test]
    fn amount_outside_band_does_not_match() {
        let store = store_with(vec![pattern("ABC Corp", 100, 150, "ABC Corp monthly fee", 0.9)]);
        let inside = tx("ABC Corp monthly fee", "ABC Corp", 12000, Direction::Debit);
        let outside = tx("ABC Corp monthly fee", "ABC Corp", 50000, Direction::Debit);
        assert_eq!(store.find_matches(&inside).len(), 1);
        assert!(store.find_matches(&outside).is_empty());
    }

    #[test]
    fn band_edges_are_inclusive() {
        let store = store_with(vec![pattern("ABC Corp", 100, 150, "ABC Corp monthly fee", 0.9)]);
        let edge = tx("ABC Corp monthly fee", "ABC Corp", 15000, Direction::Debit);
        assert_eq!(store.find_matches(&edge).len(), 1);
    }

    #[test]
    fn direction_must_agree() {
        let store = store_with(vec![pattern("ABC Corp", 100, 150, "ABC Corp monthly fee", 0.9)]);
        let credit = tx("ABC Corp monthly fee", "ABC Corp", 12000, Direction::Credit);
        assert!(store.find_matches(&credit).is_empty());
    }

    #[test]
    fn description_overlap_is_required() {
        let store = store_with(vec![pattern("ABC Corp", 100, 150, "ABC Corp monthly fee", 0.9)]);
        let other = tx("Refund of deposit", "ABC Corp", 12000, Direction::Debit);
        assert!(store.find_matches(&other).is_empty());
    }

    #[test]
    fn similar_contact_names_match() {
        let store = store_with(vec![pattern("ABC Corp.", 100, 150, "ABC Corp monthly fee", 0.9)]);
        let matches =
            store.find_matches(&tx("ABC Corp monthly fee", "abc corp", 12000, Direction::Debit));

        assert_eq!(matches.len(), 1);
        assert!(matches[0].contact_similarity >= CONTACT_SIMILARITY_THRESHOLD);

        let unrelated = tx("ABC Corp monthly fee", "Starbucks", 12000, Direction::Debit);
        assert!(store.find_matches(&unrelated).is_empty());
    }

    #[test]
    fn matches_sorted_by_confidence() {
        let store = store_with(vec![
            pattern("ABC Corp", 100, 150, "ABC Corp monthly fee", 0.6),
            pattern("ABC Corp", 100, 150, "ABC Corp monthly fee", 0.9),
            pattern("ABC Corp", 100, 150, "ABC Corp monthly fee", 0.7),
        ]);
        let confidences: Vec<f32> = store
            .find_matches(&tx("ABC Corp monthly fee", "ABC Corp", 12000, Direction::Debit))
            .iter()
            .map(|p| p.confidence)
            .collect();
        assert_eq!(confidences, vec![0.9, 0.7, 0.6]);
    }

    #[test]
    fn record_uses_twenty_percent_band() {
        let mut store = PatternStore::default();
        store.record(&tx("ABC Corp fee", "ABC Corp", 10000, Direction::Debit), "6400", 0.8);
        let p = store.patterns_for("abc corp").next().unwrap();
        assert_eq!(p.amount_min, Money::from_major(80));
        assert_eq!(p.amount_max, Money::from_major(120));
    }

    #[test]
    fn recorded_pattern_is_found_again() {
        let mut store = PatternStore::default();
        let t = tx("AWS Cloud Services", "", 9900, Direction::Debit);
        store.record(&t, "6400", 0.75);
        let matches = store.find_matches(&t);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].account_id, "6400");
        assert_eq!(matches[0].contact, "AWS Cloud");
    }

    #[test]
    fn window_evicts_oldest() {
        let mut store = PatternStore::new(2);
        for (i, account) in ["a", "b", "c"].iter().enumerate() {
            store.record(
                &tx("ABC Corp fee", "ABC Corp", 10000 + i as i64, Direction::Debit),
                account,
                0.8,
            );
        }
        let kept: Vec<&str> = store
            .patterns_for("ABC Corp")
            .map(|p| p.account_id.as_str())
            .collect();
        assert_eq!(kept, vec!["b", "c"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn shrinking_window_trims() {
        let mut store = PatternStore::new(5);
        for _ in 0..4 {
            store.record(&tx("ABC Corp fee", "ABC Corp", 10000, Direction::Debit), "x", 0.8);
        }
        store.set_window(1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_round_trips_through_json() {
        let mut store = PatternStore::new(10);
        store.record(&tx("ABC Corp fee", "ABC Corp", 10000, Direction::Debit), "6400", 0.8);
        let json = serde_json::to_string(&store).unwrap();
        let back: PatternStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
    }
}
