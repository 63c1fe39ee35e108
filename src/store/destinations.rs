//! Scenario to destination routing

use std::collections::BTreeMap;

use tracing::warn;

/// Maps scenario labels to vector-store collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTable {
    routes: BTreeMap<String, String>,
}

impl DestinationTable {
    /// Build from `scenario -> collection` pairs; keys are normalized to
    /// trimmed lowercase.
    pub fn new(routes: &BTreeMap<String, String>) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect(),
        }
    }

    /// Destination for `scenario`, or `None` (with a warning) when the
    /// scenario is empty or unknown
    pub fn resolve(&self, scenario: Option<&str>) -> Option<&str> {
        let key = scenario.map(|s| s.trim().to_lowercase()).unwrap_or_default();
        if key.is_empty() {
            warn!("no scenario given, skipping store access");
            return None;
        }
        match self.routes.get(&key) {
            Some(destination) => Some(destination.as_str()),
            None => {
                warn!(scenario = %key, "unknown scenario, skipping store access");
                None
            }
        }
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for DestinationTable {
    fn default() -> Self {
        Self::new(&crate::config::default_destinations())
    }
}
