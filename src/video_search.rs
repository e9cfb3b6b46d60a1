// src/video_search.rs
//
// Cooking-video lookup for the top recipe suggestions. A failed search
// degrades to "no videos for that recipe" instead of failing the stage.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::recipes::RecipeSuggestion;

const RECIPES_TO_SEARCH: usize = 5;
const RESULTS_PER_RECIPE: usize = 2;

#[derive(Debug, Serialize)]
struct VideoSearchRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct VideoSearchResponse {
    #[serde(default)]
    videos: Vec<VideoResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResult {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail_url: String,
    #[serde(default)]
    pub description: String,
}

pub struct VideoSearchClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl VideoSearchClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<VideoResult>> {
        let request = VideoSearchRequest {
            query,
            max_results: RESULTS_PER_RECIPE,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("video service returned HTTP {}", response.status());
        }

        let payload: VideoSearchResponse = response.json().await?;
        Ok(payload.videos)
    }

    /// One search per top recipe; a per-recipe failure only skips that
    /// recipe.
    pub async fn search_for_recipes(
        &self,
        recipes: &[RecipeSuggestion],
    ) -> BTreeMap<String, Vec<VideoResult>> {
        let mut results = BTreeMap::new();

        for recipe in recipes.iter().take(RECIPES_TO_SEARCH) {
            if recipe.title.is_empty() {
                continue;
            }
            let query = format!("{} recipe", recipe.title);
            match self.search(&query).await {
                Ok(videos) if !videos.is_empty() => {
                    info!("✓ {} video(s) for '{}'", videos.len(), recipe.title);
                    results.insert(recipe.title.clone(), videos);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("🌐 video search failed for '{}': {}", recipe.title, e);
                }
            }
        }

        results
    }
}
