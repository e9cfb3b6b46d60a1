// src/inventory.rs
//
// Inventory aggregation. The store is a repository owned by the process
// bootstrap and injected into the orchestrator; the in-memory
// implementation serializes writes behind a lock so concurrent pipeline
// runs cannot lose updates.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::types::FusedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    Fridge,
    Freezer,
    Pantry,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredEntry {
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub unit: String,
    pub location: StorageLocation,
    pub added_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryStatus {
    pub total_items: usize,
    pub fridge: usize,
    pub freezer: usize,
    pub pantry: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    pub status: InventoryStatus,
    pub new_items: Vec<String>,
    pub updated_items: Vec<String>,
    pub warnings: Vec<String>,
}

/// Repository seam for inventory persistence.
pub trait InventoryStore: Send + Sync {
    /// Upsert the given items and return a snapshot report.
    fn record(&self, items: &[FusedItem], now: DateTime<Utc>) -> Result<InventoryReport>;
}

pub struct InMemoryInventory {
    entries: Mutex<HashMap<String, StoredEntry>>,
    overstock_threshold: u32,
}

impl InMemoryInventory {
    pub fn new(overstock_threshold: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            overstock_threshold,
        }
    }
}

/// Where an item should live, from its category and name.
fn storage_location(item: &FusedItem) -> StorageLocation {
    let category = item.category.to_lowercase();
    let name = item.name.to_lowercase();

    if item.packaging.to_lowercase().contains("frozen") {
        return StorageLocation::Freezer;
    }
    if matches!(category.as_str(), "meat" | "seafood" | "dairy") {
        return StorageLocation::Fridge;
    }
    // Some produce keeps better out of the fridge.
    const PANTRY_ITEMS: [&str; 4] = ["onion", "garlic", "potato", "banana"];
    if PANTRY_ITEMS.iter().any(|p| name.contains(p)) {
        return StorageLocation::Pantry;
    }
    StorageLocation::Fridge
}

impl InventoryStore for InMemoryInventory {
    fn record(&self, items: &[FusedItem], now: DateTime<Utc>) -> Result<InventoryReport> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("inventory lock poisoned"))?;

        let mut new_items = Vec::new();
        let mut updated_items = Vec::new();

        for item in items {
            let location = storage_location(item);
            match entries.get_mut(&item.name) {
                Some(existing) => {
                    existing.quantity = item.quantity;
                    existing.last_updated = now;
                    updated_items.push(item.name.clone());
                }
                None => {
                    entries.insert(
                        item.name.clone(),
                        StoredEntry {
                            name: item.name.clone(),
                            category: item.category.clone(),
                            quantity: item.quantity,
                            unit: item.unit.clone(),
                            location,
                            added_at: now,
                            last_updated: now,
                        },
                    );
                    new_items.push(item.name.clone());
                }
            }
        }

        let mut warnings = Vec::new();
        for entry in entries.values() {
            if entry.quantity > self.overstock_threshold {
                warnings.push(format!(
                    "🟡 overstock: {} ({} on hand, {} recommended)",
                    entry.name, entry.quantity, self.overstock_threshold
                ));
            }
        }
        warnings.sort();

        let status = InventoryStatus {
            total_items: entries.len(),
            fridge: entries
                .values()
                .filter(|e| e.location == StorageLocation::Fridge)
                .count(),
            freezer: entries
                .values()
                .filter(|e| e.location == StorageLocation::Freezer)
                .count(),
            pantry: entries
                .values()
                .filter(|e| e.location == StorageLocation::Pantry)
                .count(),
        };

        info!(
            "✓ inventory updated: {} new, {} existing, {} total",
            new_items.len(),
            updated_items.len(),
            status.total_items
        );

        Ok(InventoryReport {
            status,
            new_items,
            updated_items,
            warnings,
        })
    }
}
