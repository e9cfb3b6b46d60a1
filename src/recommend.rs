// src/recommend.rs
//
// Final recommendation assembly. Pure aggregation over everything the
// earlier stages produced; tolerates any of them being empty.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::expiry::{ExpiryRecord, Urgency};
use crate::recipes::RecipeSuggestion;
use crate::types::FusedItem;

const RECOMMENDED_RECIPES: usize = 2;
const SHOPPING_REMINDER_DAYS: u64 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationSummary {
    pub total_items: usize,
    pub use_today: usize,
    pub within_three_days: usize,
    pub safe: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalRecommendation {
    pub summary: RecommendationSummary,
    pub priority_actions: Vec<String>,
    pub recommended_recipes: Vec<RecipeSuggestion>,
    pub tips: Vec<String>,
    pub waste_risk_count: usize,
    pub next_purchase_date: NaiveDate,
}

fn recipe_using<'a>(
    item_name: &str,
    recipes: &'a [RecipeSuggestion],
) -> Option<&'a RecipeSuggestion> {
    let item = item_name.to_lowercase();
    recipes.iter().find(|recipe| {
        recipe
            .ingredients_needed
            .iter()
            .any(|i| i.to_lowercase().contains(&item))
    })
}

pub fn build_recommendation(
    confirmed_items: &[FusedItem],
    expiry_records: &[ExpiryRecord],
    recipes: &[RecipeSuggestion],
    today: NaiveDate,
) -> FinalRecommendation {
    let count = |urgency: Urgency| {
        expiry_records
            .iter()
            .filter(|r| r.urgency == urgency)
            .count()
    };
    let use_today = count(Urgency::UseToday) + count(Urgency::Expired);
    let within_three_days = count(Urgency::WithinThreeDays);

    let summary = RecommendationSummary {
        total_items: confirmed_items.len(),
        use_today,
        within_three_days,
        safe: count(Urgency::Safe),
    };

    // Urgent items first, each routed into a recipe when one uses it.
    let mut priority_actions = Vec::new();
    for record in expiry_records {
        if !record.urgency.is_urgent() {
            continue;
        }
        match recipe_using(&record.item, recipes) {
            Some(recipe) => priority_actions.push(format!(
                "⭐ chef's pick: {} -> '{}'",
                record.item, recipe.title
            )),
            None if matches!(record.urgency, Urgency::Expired | Urgency::UseToday) => {
                priority_actions.push(format!("🚨 use today: {}", record.item));
            }
            None => {}
        }
    }

    let mut tips = Vec::new();
    for record in expiry_records {
        if matches!(record.urgency, Urgency::Expired | Urgency::UseToday) {
            tips.push(format!(
                "⭐ cook {} today or move it to the freezer",
                record.item
            ));
        } else if !record.storage_tip.is_empty() {
            tips.push(format!("💡 {}: {}", record.item, record.storage_tip));
        }
    }

    let recommendation = FinalRecommendation {
        summary,
        priority_actions,
        recommended_recipes: recipes.iter().take(RECOMMENDED_RECIPES).cloned().collect(),
        tips,
        waste_risk_count: use_today + within_three_days,
        next_purchase_date: today
            .checked_add_days(Days::new(SHOPPING_REMINDER_DAYS))
            .unwrap_or(today),
    };

    info!(
        "✓ recommendation built: {} priority action(s), {} recipe pick(s)",
        recommendation.priority_actions.len(),
        recommendation.recommended_recipes.len()
    );
    recommendation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_CATEGORY, DEFAULT_FRESHNESS, DEFAULT_PACKAGING, DEFAULT_UNIT};

    fn item(name: &str) -> FusedItem {
        FusedItem {
            name: name.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            quantity: 1,
            unit: DEFAULT_UNIT.to_string(),
            freshness: DEFAULT_FRESHNESS.to_string(),
            packaging: DEFAULT_PACKAGING.to_string(),
            confidence: 0.9,
            bounding_box: None,
            expiry_text: None,
            matched_with_detector: false,
        }
    }

    fn record(name: &str, days_left: i64) -> ExpiryRecord {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        ExpiryRecord {
            item: name.to_string(),
            purchase_date: today,
            expiry_date: today + chrono::Duration::days(days_left),
            days_left,
            urgency: Urgency::from_days_left(days_left),
            storage_tip: "keep in the fridge".to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            quantity: 1,
        }
    }

    fn recipe(title: &str, ingredients: &[&str]) -> RecipeSuggestion {
        RecipeSuggestion {
            title: title.to_string(),
            description: String::new(),
            ingredients_needed: ingredients.iter().map(|s| s.to_string()).collect(),
            missing_ingredients: vec![],
            cooking_time: "20min".to_string(),
            difficulty: "easy".to_string(),
            calories: 200,
            match_rate: 1.0,
            priority_score: 100.0,
            uses_urgent: true,
        }
    }

    #[test]
    fn test_urgent_item_routed_to_recipe() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let recommendation = build_recommendation(
            &[item("chicken")],
            &[record("chicken", 0)],
            &[recipe("chicken stew", &["chicken", "onion"])],
            today,
        );

        assert_eq!(recommendation.summary.use_today, 1);
        assert_eq!(recommendation.priority_actions.len(), 1);
        assert!(recommendation.priority_actions[0].contains("chicken stew"));
        assert_eq!(recommendation.waste_risk_count, 1);
    }

    #[test]
    fn test_urgent_item_without_recipe_still_flagged() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let recommendation =
            build_recommendation(&[item("fish")], &[record("fish", 0)], &[], today);

        assert_eq!(recommendation.priority_actions.len(), 1);
        assert!(recommendation.priority_actions[0].contains("use today"));
        assert!(recommendation.recommended_recipes.is_empty());
    }

    #[test]
    fn test_empty_inputs_produce_neutral_recommendation() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let recommendation = build_recommendation(&[], &[], &[], today);

        assert_eq!(recommendation.summary.total_items, 0);
        assert!(recommendation.priority_actions.is_empty());
        assert_eq!(recommendation.waste_risk_count, 0);
        assert_eq!(
            recommendation.next_purchase_date,
            today + chrono::Duration::days(3)
        );
    }

    #[test]
    fn test_recommended_recipes_capped_at_two() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let recipes = vec![
            recipe("a", &["x"]),
            recipe("b", &["y"]),
            recipe("c", &["z"]),
        ];
        let recommendation = build_recommendation(&[], &[], &recipes, today);
        assert_eq!(recommendation.recommended_recipes.len(), 2);
    }
}
