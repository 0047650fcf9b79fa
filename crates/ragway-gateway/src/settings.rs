use serde::Deserialize;

use ragway_agents::{AgentSettings, PromptSet, WebSettings};
use ragway_core::config::Config;
use ragway_core::error::Result;
use ragway_core::types::Collection;
use ragway_hybrid::SearchSettings;
use ragway_models::ModelSettings;
use ragway_qdrant::QdrantSettings;

use crate::registry::BackendKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Relative paths resolve against the gateway's base directory.
    pub root_dir: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self { root_dir: "data".to_string() }
    }
}

/// `[backend]` configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub local: LocalSettings,
    pub qdrant: QdrantSettings,
}

/// Every section the gateway reads, each falling back to its defaults.
#[derive(Debug, Clone, Default)]
pub struct GatewaySettings {
    pub backend: BackendSettings,
    pub models: ModelSettings,
    pub search: SearchSettings,
    pub agents: AgentSettings,
    pub web: WebSettings,
    pub prompts: PromptSet,
    pub collections: Vec<Collection>,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            backend: config.section("backend")?,
            models: config.section("models")?,
            search: config.section("search")?,
            agents: config.section("agents")?,
            web: config.section("web")?,
            prompts: config.section("prompts")?,
            collections: config.section("collections")?,
        })
    }
}
