// src/recipes.rs
//
// Recipe suggestion client. The generative service owns prompt wording
// and cooking knowledge; this side contributes the fixed contract plus
// match-rate and priority annotation over the reply.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct RecipeRequest<'a> {
    request_id: String,
    ingredients: &'a [String],
    urgent_items: &'a [String],
    diet_type: &'a str,
    max_recipes: usize,
}

#[derive(Debug, Deserialize)]
struct RecipeResponse {
    #[serde(default)]
    recipes: Vec<RawRecipe>,
}

#[derive(Debug, Deserialize)]
struct RawRecipe {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    ingredients: Vec<String>,
    #[serde(default)]
    missing_ingredients: Vec<String>,
    #[serde(default)]
    cooking_time: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default)]
    calories: u32,
    #[serde(default)]
    uses_urgent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeSuggestion {
    pub title: String,
    pub description: String,
    pub ingredients_needed: Vec<String>,
    pub missing_ingredients: Vec<String>,
    pub cooking_time: String,
    pub difficulty: String,
    pub calories: u32,
    pub match_rate: f32,
    pub priority_score: f32,
    pub uses_urgent: bool,
}

const MAX_SUGGESTIONS: usize = 20;
const URGENT_BONUS: f32 = 30.0;

/// Share of recipe ingredients already on hand. Partial name matches
/// count ("green onion" covers "onion").
pub fn match_rate(recipe_ingredients: &[String], available: &[String]) -> f32 {
    if recipe_ingredients.is_empty() {
        return 0.0;
    }

    let matched = recipe_ingredients
        .iter()
        .filter(|needed| {
            let needed = needed.to_lowercase();
            available.iter().any(|have| {
                let have = have.to_lowercase();
                have.contains(&needed) || needed.contains(&have)
            })
        })
        .count();

    matched as f32 / recipe_ingredients.len() as f32
}

pub struct RecipeClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl RecipeClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn suggest(
        &self,
        ingredients: &[String],
        urgent_items: &[String],
        diet_type: &str,
    ) -> anyhow::Result<Vec<RecipeSuggestion>> {
        let request = RecipeRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            ingredients,
            urgent_items,
            diet_type,
            max_recipes: MAX_SUGGESTIONS,
        };

        info!(
            "🌐 recipe request {} ({} ingredients, {} urgent, diet={})",
            request.request_id,
            ingredients.len(),
            urgent_items.len(),
            diet_type
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("🌐 recipe service error {}", status);
            anyhow::bail!("recipe service returned HTTP {}", status);
        }

        let payload: RecipeResponse = response.json().await?;
        let suggestions = annotate(payload.recipes, ingredients, urgent_items);
        info!("✓ {} recipe suggestion(s)", suggestions.len());
        Ok(suggestions)
    }
}

/// Score, sort and truncate raw recipes.
fn annotate(
    raw: Vec<RawRecipe>,
    available: &[String],
    urgent_items: &[String],
) -> Vec<RecipeSuggestion> {
    let mut suggestions: Vec<RecipeSuggestion> = raw
        .into_iter()
        .map(|recipe| {
            let rate = match_rate(&recipe.ingredients, available);
            let uses_urgent = recipe.uses_urgent
                || urgent_items.iter().any(|urgent| {
                    recipe
                        .ingredients
                        .iter()
                        .any(|i| i.to_lowercase().contains(&urgent.to_lowercase()))
                });
            let priority_score = rate * 100.0 + if uses_urgent { URGENT_BONUS } else { 0.0 };

            RecipeSuggestion {
                title: recipe.title,
                description: recipe.description,
                ingredients_needed: recipe.ingredients,
                missing_ingredients: recipe.missing_ingredients,
                cooking_time: recipe.cooking_time,
                difficulty: recipe.difficulty,
                calories: recipe.calories,
                match_rate: rate,
                priority_score,
                uses_urgent,
            }
        })
        .collect();

    suggestions.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}
