use std::time::Duration;

use serde::Deserialize;

use ragway_core::types::SearchMethod;

/// `[agents]` configuration section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub window_size: usize,
    pub max_retries: usize,
    /// Characters of each passage shown to the classifier.
    pub preview_chars: usize,
    pub web_limit: usize,
    pub synthesis_timeout_ms: u64,
    /// Whole-request deadline; unset means no deadline.
    pub request_timeout_ms: Option<u64>,
    /// Candidate retrieval method. Unset picks hybrid when the backend can.
    pub method: Option<SearchMethod>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            window_size: 5,
            max_retries: 5,
            preview_chars: 400,
            web_limit: 5,
            synthesis_timeout_ms: 60_000,
            request_timeout_ms: None,
            method: None,
        }
    }
}

impl AgentSettings {
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
