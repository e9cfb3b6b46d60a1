// src/expiry.rs
//
// Shelf-life assessment for fused items. Purchase date is assumed to be
// the day the photo was taken; opened packaging halves the remaining
// shelf life.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::types::FusedItem;

struct ShelfLife {
    days: u64,
    storage: &'static str,
}

const DEFAULT_SHELF_DAYS: u64 = 7;

static SHELF_LIFE_TABLE: [(&str, ShelfLife); 30] = [
    ("carrot", ShelfLife { days: 14, storage: "fridge" }),
    ("onion", ShelfLife { days: 30, storage: "pantry" }),
    ("potato", ShelfLife { days: 30, storage: "pantry" }),
    ("spinach", ShelfLife { days: 5, storage: "fridge" }),
    ("lettuce", ShelfLife { days: 5, storage: "fridge" }),
    ("cabbage", ShelfLife { days: 7, storage: "fridge" }),
    ("broccoli", ShelfLife { days: 7, storage: "fridge" }),
    ("cucumber", ShelfLife { days: 7, storage: "fridge" }),
    ("mushroom", ShelfLife { days: 5, storage: "fridge" }),
    ("tomato", ShelfLife { days: 7, storage: "pantry" }),
    ("pepper", ShelfLife { days: 7, storage: "fridge" }),
    ("garlic", ShelfLife { days: 60, storage: "pantry" }),
    ("ginger", ShelfLife { days: 14, storage: "fridge" }),
    ("green onion", ShelfLife { days: 7, storage: "fridge" }),
    ("milk", ShelfLife { days: 7, storage: "fridge" }),
    ("yogurt", ShelfLife { days: 10, storage: "fridge" }),
    ("cheese", ShelfLife { days: 21, storage: "fridge" }),
    ("butter", ShelfLife { days: 30, storage: "fridge" }),
    ("tofu", ShelfLife { days: 3, storage: "fridge" }),
    ("egg", ShelfLife { days: 21, storage: "fridge" }),
    ("chicken", ShelfLife { days: 2, storage: "fridge" }),
    ("pork", ShelfLife { days: 3, storage: "fridge" }),
    ("beef", ShelfLife { days: 3, storage: "fridge" }),
    ("fish", ShelfLife { days: 2, storage: "fridge" }),
    ("apple", ShelfLife { days: 14, storage: "fridge" }),
    ("orange", ShelfLife { days: 14, storage: "fridge" }),
    ("banana", ShelfLife { days: 5, storage: "pantry" }),
    ("bread", ShelfLife { days: 4, storage: "pantry" }),
    ("juice", ShelfLife { days: 10, storage: "fridge" }),
    ("sandwich", ShelfLife { days: 2, storage: "fridge" }),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Expired,
    UseToday,
    WithinThreeDays,
    WithinWeek,
    Safe,
}

impl Urgency {
    pub fn from_days_left(days_left: i64) -> Self {
        match days_left {
            d if d < 0 => Urgency::Expired,
            0 => Urgency::UseToday,
            1..=3 => Urgency::WithinThreeDays,
            4..=7 => Urgency::WithinWeek,
            _ => Urgency::Safe,
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, Urgency::Expired | Urgency::UseToday | Urgency::WithinThreeDays)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiryRecord {
    pub item: String,
    pub purchase_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub days_left: i64,
    pub urgency: Urgency,
    pub storage_tip: String,
    pub category: String,
    pub quantity: u32,
}

/// Exact lookup first, substring match second, 7-day default last.
fn shelf_life(name: &str) -> &'static ShelfLife {
    static DEFAULT: ShelfLife = ShelfLife {
        days: DEFAULT_SHELF_DAYS,
        storage: "fridge",
    };

    let lowered = name.to_lowercase();
    SHELF_LIFE_TABLE
        .iter()
        .find(|(key, _)| *key == lowered)
        .or_else(|| {
            SHELF_LIFE_TABLE
                .iter()
                .find(|(key, _)| lowered.contains(key) || key.contains(lowered.as_str()))
        })
        .map(|(_, life)| life)
        .unwrap_or(&DEFAULT)
}

/// Opened products keep half their shelf life, at least one day.
fn adjust_for_packaging(item: &FusedItem, base_days: u64) -> u64 {
    if item.packaging.to_lowercase().contains("opened") {
        (base_days / 2).max(1)
    } else {
        base_days
    }
}

/// Assess every confirmed item, returning per-item records plus the
/// alert strings shown to the user.
pub fn assess_expiry(items: &[FusedItem], today: NaiveDate) -> (Vec<ExpiryRecord>, Vec<String>) {
    let mut records = Vec::with_capacity(items.len());
    let mut alerts = Vec::new();

    for item in items {
        let life = shelf_life(&item.name);
        let days = adjust_for_packaging(item, life.days);
        let expiry_date = today
            .checked_add_days(Days::new(days))
            .unwrap_or(today);
        let days_left = (expiry_date - today).num_days();
        let urgency = Urgency::from_days_left(days_left);

        match urgency {
            Urgency::Expired | Urgency::UseToday => {
                alerts.push(format!("🚨 use today: {}", item.name));
            }
            Urgency::WithinThreeDays => {
                alerts.push(format!("⚠️ use within 3 days: {}", item.name));
            }
            Urgency::WithinWeek => {
                alerts.push(format!("📅 use within a week: {}", item.name));
            }
            Urgency::Safe => {}
        }

        records.push(ExpiryRecord {
            item: item.name.clone(),
            purchase_date: today,
            expiry_date,
            days_left,
            urgency,
            storage_tip: format!("keep in the {}", life.storage),
            category: item.category.clone(),
            quantity: item.quantity,
        });
    }

    info!("✓ expiry assessed for {} item(s), {} alert(s)", records.len(), alerts.len());
    (records, alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_CATEGORY, DEFAULT_FRESHNESS, DEFAULT_UNIT};

    fn item(name: &str, packaging: &str) -> FusedItem {
        FusedItem {
            name: name.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            quantity: 1,
            unit: DEFAULT_UNIT.to_string(),
            freshness: DEFAULT_FRESHNESS.to_string(),
            packaging: packaging.to_string(),
            confidence: 0.9,
            bounding_box: None,
            expiry_text: None,
            matched_with_detector: false,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    #[test]
    fn test_urgency_boundaries() {
        assert_eq!(Urgency::from_days_left(-1), Urgency::Expired);
        assert_eq!(Urgency::from_days_left(0), Urgency::UseToday);
        assert_eq!(Urgency::from_days_left(3), Urgency::WithinThreeDays);
        assert_eq!(Urgency::from_days_left(4), Urgency::WithinWeek);
        assert_eq!(Urgency::from_days_left(7), Urgency::WithinWeek);
        assert_eq!(Urgency::from_days_left(8), Urgency::Safe);
    }

    #[test]
    fn test_known_item_uses_table() {
        let (records, alerts) = assess_expiry(&[item("chicken", "none")], today());
        assert_eq!(records[0].days_left, 2);
        assert_eq!(records[0].urgency, Urgency::WithinThreeDays);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("chicken"));
    }

    #[test]
    fn test_substring_lookup() {
        // "whole milk" should resolve to the milk entry (7 days).
        let (records, _) = assess_expiry(&[item("whole milk", "none")], today());
        assert_eq!(records[0].days_left, 7);
        assert_eq!(records[0].urgency, Urgency::WithinWeek);
    }

    #[test]
    fn test_unknown_item_gets_default() {
        let (records, _) = assess_expiry(&[item("dragonfruit salsa", "none")], today());
        assert_eq!(records[0].days_left, DEFAULT_SHELF_DAYS as i64);
    }

    #[test]
    fn test_opened_packaging_halves_shelf_life() {
        let (records, _) = assess_expiry(&[item("cheese", "opened")], today());
        assert_eq!(records[0].days_left, 10);

        // 2-day fish stays at least one day when opened
        let (records, _) = assess_expiry(&[item("fish", "opened")], today());
        assert_eq!(records[0].days_left, 1);
    }

    #[test]
    fn test_no_items_no_alerts() {
        let (records, alerts) = assess_expiry(&[], today());
        assert!(records.is_empty());
        assert!(alerts.is_empty());
    }
}
