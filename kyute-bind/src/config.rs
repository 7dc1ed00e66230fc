use serde::{Deserialize, Serialize};

/// What happens when a listener requests an update of a node that is in the middle of one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentrancyPolicy {
    /// Queue the request and run it after the current top-level cycle.
    #[default]
    Defer,
    /// Refuse the request with `UpdateError::Reentrant`.
    Reject,
}

/// Engine settings, fixed when the tree is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trace the start and end of every update cycle.
    pub log_updates: bool,
    /// Attribute keys that control visibility themselves. Resolving their bindings never changes
    /// the node's visibility.
    pub visibility_attributes: Vec<String>,
    pub reentrancy: ReentrancyPolicy,
    /// Maximum number of rounds of deferred requests processed after a top-level operation.
    pub max_deferred_rounds: usize,
    /// Check the host containers against the node's children after each reconciliation.
    pub verify_containers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            log_updates: false,
            visibility_attributes: vec!["visibility".to_owned(), "invisibility".to_owned()],
            reentrancy: ReentrancyPolicy::Defer,
            max_deferred_rounds: 16,
            verify_containers: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<EngineConfig, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_visibility_attribute(&self, key: &str) -> bool {
        self.visibility_attributes.iter().any(|k| k == key)
    }
}
