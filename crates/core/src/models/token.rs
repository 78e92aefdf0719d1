use serde::{Deserialize, Serialize};

/// A single token match returned by the provider's text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSearchResult {
    /// Provider token id, used as the join key for price lookups
    pub id: String,

    /// Ticker as returned by the provider (usually lowercase)
    pub symbol: String,

    pub name: String,

    /// Small icon URL
    #[serde(default)]
    pub thumb: String,

    /// Large icon URL, when the provider has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<String>,
}

impl TokenSearchResult {
    /// Best available icon: `large`, falling back to `thumb`.
    pub fn icon(&self) -> Option<&str> {
        self.large
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.thumb.as_str()).filter(|s| !s.is_empty()))
    }
}
