//! Which recipe is current, carried in a URL query string.

use serde::{Deserialize, Serialize};

/// `recipe_id` alone names the record being built; with `is_prefill` it
/// names a stored record to replay without generating anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    pub recipe_id: Option<String>,
    pub is_prefill: bool,
}

/// The query parameters as they appear in the URL.
#[derive(Debug, Default, Deserialize, Serialize)]
struct NavigationQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipe_id: Option<String>,
    /// Any non-empty value turns replay on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_prefill: Option<String>,
}

impl NavigationState {
    /// The record currently being generated.
    pub fn fresh(recipe_id: impl Into<String>) -> Self {
        Self {
            recipe_id: Some(recipe_id.into()),
            is_prefill: false,
        }
    }

    /// A stored record to load and show as-is.
    pub fn replay(recipe_id: impl Into<String>) -> Self {
        Self {
            recipe_id: Some(recipe_id.into()),
            is_prefill: true,
        }
    }

    /// Read from a query string, with or without the leading `?` (or a whole URL).
    /// Unknown parameters are ignored.
    pub fn from_query(query: &str) -> Self {
        let query = query.split_once('?').map_or(query, |(_, rest)| rest);
        let query = query.split_once('#').map_or(query, |(params, _)| params);
        let params: NavigationQuery = serde_urlencoded::from_str(query).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable query {:?}: {}", query, e);
            NavigationQuery::default()
        });
        Self {
            recipe_id: params.recipe_id.filter(|id| !id.is_empty()),
            is_prefill: params.is_prefill.is_some_and(|flag| !flag.is_empty()),
        }
    }

    pub fn to_query(&self) -> String {
        let params = NavigationQuery {
            recipe_id: self.recipe_id.clone(),
            is_prefill: self.is_prefill.then(|| "1".to_string()),
        };
        // Plain string pairs always encode.
        serde_urlencoded::to_string(&params).unwrap_or_default()
    }
}
