//! ragway-agents
//!
//! Multi-agent retrieval: window classification, web fallback and parallel
//! answer synthesis over ranked search results.

pub mod context;
pub mod orchestrator;
pub mod prompts;
pub mod settings;
pub mod synthesis;
pub mod verdict;
pub mod web;

pub use orchestrator::{OrchestratedAnswer, OrchestrationState, RetrievalOrchestrator};
pub use prompts::{PromptSet, NOTHING_HERE, NO_SOURCES};
pub use settings::AgentSettings;
pub use web::{build_web_source, DisabledWebFallback, SearxngSource, WebSettings};
