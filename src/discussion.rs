// src/discussion.rs
//
// Panel discussion over the recipe candidates: a chef persona is
// picked from the dominant ingredient category and the generative
// service argues out the final pick.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::recipes::RecipeSuggestion;

const MEAT_KEYWORDS: [&str; 6] = ["beef", "pork", "chicken", "lamb", "bacon", "ham"];
const SEAFOOD_KEYWORDS: [&str; 6] = ["fish", "shrimp", "squid", "clam", "crab", "salmon"];
const VEGGIE_KEYWORDS: [&str; 8] = [
    "spinach", "carrot", "onion", "broccoli", "tofu", "mushroom", "cabbage", "lettuce",
];

/// Ingredient census over the item names; the winning category decides
/// which chef persona fronts the discussion.
pub fn dominant_category(ingredients: &[String]) -> &'static str {
    let mut meat = 0;
    let mut seafood = 0;
    let mut veggie = 0;

    for name in ingredients {
        let lowered = name.to_lowercase();
        if MEAT_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            meat += 1;
        } else if SEAFOOD_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            seafood += 1;
        } else if VEGGIE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            veggie += 1;
        }
    }

    let top = meat.max(seafood).max(veggie);
    if top == 0 {
        "general"
    } else if top == meat {
        "meat"
    } else if top == seafood {
        "seafood"
    } else {
        "vegetable"
    }
}

pub fn persona_for(category: &str) -> &'static str {
    match category {
        "meat" => "master butcher chef",
        "seafood" => "three-star seafood chef",
        "vegetable" => "plant-forward fine dining chef",
        _ => "five-star hotel executive chef",
    }
}

#[derive(Debug, Serialize)]
struct DiscussionRequest<'a> {
    request_id: String,
    persona: &'a str,
    ingredients: &'a [String],
    urgent_items: &'a [String],
    candidate_recipes: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DiscussionResponse {
    chosen_recipe: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscussionSummary {
    pub main_category: String,
    pub persona: String,
    pub chosen_recipe: String,
    pub reasoning: String,
}

pub struct DiscussionClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl DiscussionClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn discuss(
        &self,
        ingredients: &[String],
        urgent_items: &[String],
        recipes: &[RecipeSuggestion],
    ) -> anyhow::Result<DiscussionSummary> {
        let category = dominant_category(ingredients);
        let persona = persona_for(category);

        let request = DiscussionRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            persona,
            ingredients,
            urgent_items,
            candidate_recipes: recipes.iter().map(|r| r.title.as_str()).collect(),
        };

        info!(
            "🌐 discussion request {} (persona={}, {} candidates)",
            request.request_id,
            persona,
            request.candidate_recipes.len()
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("🌐 discussion service error {}", status);
            anyhow::bail!("discussion service returned HTTP {}", status);
        }

        let payload: DiscussionResponse = response.json().await?;
        info!("✓ discussion pick: {}", payload.chosen_recipe);

        Ok(DiscussionSummary {
            main_category: category.to_string(),
            persona: persona.to_string(),
            chosen_recipe: payload.chosen_recipe,
            reasoning: payload.reasoning,
        })
    }
}
