//! The classify / retry / escalate / synthesize loop.
//!
//! Candidates are walked in windows of `window_size`. Each window is shown to
//! the classifier once, and its verdict decides whether to move on to the next
//! window, go to the web, give up, or answer from what is in hand. At most
//! `max_retries + 1` windows are ever classified.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use ragway_core::error::{Error, Result};
use ragway_core::runtime::cancellable;
use ragway_core::traits::{CompletionParams, Completer, Message, WebFallbackSource};
use ragway_core::types::{MethodTag, SearchResult, Verdict};
use ragway_core::CancellationToken;
use ragway_hybrid::fuse;

use crate::context::{build_context, window};
use crate::prompts::{is_empty_answer, PromptSet, NO_SOURCES};
use crate::settings::AgentSettings;
use crate::synthesis::Synthesizer;
use crate::verdict::classify_reply;

/// Request-scoped progress of one orchestrated answer.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    pub query: String,
    pub window_index: usize,
    pub window_size: usize,
    pub max_retries: usize,
    pub verdict: Verdict,
    pub sources_used: Vec<String>,
    pub partial_answers: Vec<String>,
}

impl OrchestrationState {
    fn new(query: &str, window_size: usize, max_retries: usize) -> Self {
        Self {
            query: query.to_string(),
            window_index: 0,
            window_size: window_size.max(1),
            max_retries,
            verdict: Verdict::Unclear,
            sources_used: Vec::new(),
            partial_answers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratedAnswer {
    pub answer: String,
    pub verdict: Verdict,
    pub source_names: Vec<String>,
    pub source_contents: Vec<String>,
    pub retries_used: usize,
}

enum Next {
    Synthesize(Vec<SearchResult>),
    Web,
    GiveUp,
}

pub struct RetrievalOrchestrator {
    completer: Arc<dyn Completer>,
    web: Arc<dyn WebFallbackSource>,
    prompts: PromptSet,
    params: CompletionParams,
    settings: AgentSettings,
    rrf_k: f64,
}

impl RetrievalOrchestrator {
    pub fn new(
        completer: Arc<dyn Completer>,
        web: Arc<dyn WebFallbackSource>,
        prompts: PromptSet,
        params: CompletionParams,
        settings: AgentSettings,
        rrf_k: f64,
    ) -> Self {
        Self { completer, web, prompts, params, settings, rrf_k }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Answer `query` from `candidates`, which must already be ranked.
    pub async fn answer(
        &self,
        query: &str,
        candidates: &[SearchResult],
        window_size: usize,
        max_retries: usize,
        cancel: &CancellationToken,
    ) -> Result<OrchestratedAnswer> {
        let mut state = OrchestrationState::new(query, window_size, max_retries);
        let next = self.classify_windows(&mut state, candidates, cancel).await?;
        let passages = match next {
            Next::Synthesize(passages) => passages,
            Next::GiveUp => {
                tracing::info!(retries = state.window_index, "question stayed unclear");
                return Ok(self.fixed(&state, self.prompts.unclear_answer.clone()));
            }
            Next::Web => {
                state.verdict = Verdict::NeedsWebSearch;
                let passages = self.web_passages(query, cancel).await?;
                if passages.is_empty() {
                    tracing::info!(retries = state.window_index, "web fallback found nothing");
                    return Ok(self.fixed(&state, self.prompts.nothing_found.clone()));
                }
                passages
            }
        };
        self.synthesize(&mut state, &passages, cancel).await
    }

    async fn classify_windows(
        &self,
        state: &mut OrchestrationState,
        candidates: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<Next> {
        loop {
            let current = window(candidates, state.window_index, state.window_size);
            let context = build_context(current, self.settings.preview_chars);
            let prompt = self.prompts.classify(&state.query, &context);
            let messages = [Message::system(&self.prompts.system), Message::user(prompt)];
            let reply = cancellable(cancel, self.completer.complete(&messages, &self.params)).await?;
            state.verdict = classify_reply(&reply);
            tracing::debug!(
                window = state.window_index,
                passages = current.len(),
                verdict = %state.verdict,
                "window classified"
            );

            match state.verdict {
                Verdict::Answerable | Verdict::NoContextNeeded => return Ok(Next::Synthesize(current.to_vec())),
                Verdict::NeedsWebSearch => return Ok(Next::Web),
                Verdict::Unclear | Verdict::InsufficientContext => {
                    let has_next = !window(candidates, state.window_index + 1, state.window_size).is_empty();
                    if state.window_index < state.max_retries && has_next {
                        state.window_index += 1;
                        continue;
                    }
                    return Ok(if state.verdict == Verdict::Unclear { Next::GiveUp } else { Next::Web });
                }
            }
        }
    }

    /// Web passages ranked as a single fused list. A failing source counts as
    /// finding nothing.
    async fn web_passages(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<SearchResult>> {
        let fetched = match cancellable(cancel, self.web.fetch(query, self.settings.web_limit)).await {
            Ok(chunks) => chunks,
            Err(Error::CancelledByCaller) => return Err(Error::CancelledByCaller),
            Err(err) => {
                tracing::warn!(error = %err, "web fallback failed");
                Vec::new()
            }
        };
        let list = fetched
            .into_iter()
            .map(|chunk| SearchResult { method: MethodTag::web(), score: 0.0, chunk })
            .collect();
        fuse(vec![list], 0, self.rrf_k)
    }

    async fn synthesize(
        &self,
        state: &mut OrchestrationState,
        passages: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<OrchestratedAnswer> {
        let synthesizer = Synthesizer {
            completer: self.completer.as_ref(),
            params: &self.params,
            system: &self.prompts.system,
            timeout: self.settings.synthesis_timeout(),
        };
        let no_context = state.verdict == Verdict::NoContextNeeded;
        let prompts: Vec<String> = if no_context {
            vec![self.prompts.direct(&state.query)]
        } else {
            passages.iter().map(|p| self.prompts.passage(&state.query, &p.chunk.content)).collect()
        };
        state.partial_answers = synthesizer.fan_out(&prompts, cancel).await?;

        let kept: Vec<usize> = (0..state.partial_answers.len())
            .filter(|&i| !is_empty_answer(&state.partial_answers[i]))
            .collect();
        let (source_names, source_contents) = if no_context {
            (vec![NO_SOURCES.to_string()], vec![NO_SOURCES.to_string()])
        } else {
            let used: Vec<&SearchResult> = kept.iter().map(|&i| &passages[i]).collect();
            (
                dedup(used.iter().map(|p| p.chunk.document_name())),
                dedup(used.iter().map(|p| p.chunk.content.as_str())),
            )
        };
        state.sources_used.clone_from(&source_names);

        let answer = if kept.is_empty() {
            tracing::info!(verdict = %state.verdict, "no passage produced an answer");
            self.prompts.nothing_found.clone()
        } else {
            let answers: Vec<&str> = kept.iter().map(|&i| state.partial_answers[i].as_str()).collect();
            synthesizer.merge(&self.prompts.merge(&state.query, &answers), cancel).await?
        };
        tracing::info!(
            verdict = %state.verdict,
            retries = state.window_index,
            partials = kept.len(),
            "answer synthesized"
        );
        Ok(OrchestratedAnswer {
            answer,
            verdict: state.verdict,
            source_names,
            source_contents,
            retries_used: state.window_index,
        })
    }

    fn fixed(&self, state: &OrchestrationState, answer: String) -> OrchestratedAnswer {
        OrchestratedAnswer {
            answer,
            verdict: state.verdict,
            source_names: Vec::new(),
            source_contents: Vec::new(),
            retries_used: state.window_index,
        }
    }
}

/// First occurrence wins.
fn dedup<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(*item)).map(str::to_string).collect()
}
