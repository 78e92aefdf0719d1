use tracing::warn;

use crate::errors::CoreError;
use crate::models::holding::Holding;

use super::local::LocalStorage;

/// Save/load the holdings list as a single JSON document.
pub struct StorageManager;

impl StorageManager {
    /// Holdings → JSON array (the persisted document format).
    pub fn to_json(holdings: &[Holding]) -> Result<String, CoreError> {
        serde_json::to_string(holdings)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize holdings: {e}")))
    }

    /// JSON array → holdings. Any parse failure is `MalformedStoredData`.
    pub fn from_json(json: &str) -> Result<Vec<Holding>, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::MalformedStoredData(e.to_string()))
    }

    /// Overwrite the document under `key` with the full list.
    pub fn save(storage: &dyn LocalStorage, key: &str, holdings: &[Holding]) -> Result<(), CoreError> {
        let json = Self::to_json(holdings)?;
        storage.write(key, &json)
    }

    /// Read the list under `key`. A missing document is an empty list.
    pub fn load(storage: &dyn LocalStorage, key: &str) -> Result<Vec<Holding>, CoreError> {
        match storage.read(key)? {
            Some(json) => Self::from_json(&json),
            None => Ok(Vec::new()),
        }
    }

    /// Collapse repeated ids (from older or hand-edited documents) by summing
    /// their amounts into the first occurrence.
    pub fn dedupe(holdings: Vec<Holding>) -> Vec<Holding> {
        let mut out: Vec<Holding> = Vec::with_capacity(holdings.len());
        for h in holdings {
            match out.iter_mut().find(|e| e.id == h.id) {
                Some(existing) => {
                    warn!(id = %h.id, "duplicate holding in stored document, merging");
                    existing.amount += h.amount;
                }
                None => out.push(h),
            }
        }
        out
    }
}
