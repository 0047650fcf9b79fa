use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use ragway_agents::{AgentSettings, OrchestratedAnswer, PromptSet, RetrievalOrchestrator, NO_SOURCES};
use ragway_core::error::{Error, Result};
use ragway_core::traits::{CompletionParams, Completer, Message, WebFallbackSource};
use ragway_core::types::{Chunk, ChunkMetadata, MethodTag, QueryMethod, SearchResult, Verdict};
use ragway_core::CancellationToken;

/// Answers classifier prompts from a script and passage prompts from the
/// passage text itself.
#[derive(Default)]
struct ScriptedCompleter {
    verdicts: Mutex<VecDeque<String>>,
    classifications: AtomicUsize,
    merges: Mutex<Vec<String>>,
}

impl ScriptedCompleter {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self { verdicts: Mutex::new(replies.iter().map(|r| r.to_string()).collect()), ..Self::default() })
    }

    fn classifications(&self) -> usize {
        self.classifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, messages: &[Message], _params: &CompletionParams) -> Result<String> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        if prompt.starts_with("CLASSIFY") {
            self.classifications.fetch_add(1, Ordering::SeqCst);
            return Ok(self.verdicts.lock().pop_front().unwrap_or_else(|| "0".to_string()));
        }
        if let Some(passage) = prompt.strip_prefix("PASSAGE ") {
            if passage.contains("irrelevant") {
                return Ok("Nothing here.".to_string());
            }
            if passage.contains("broken") {
                return Err(Error::CompletionFailed { status: Some(500), message: "boom".into() });
            }
            if passage.contains("slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            return Ok(format!("from {passage}"));
        }
        if prompt.starts_with("DIRECT") {
            return Ok("hello there".to_string());
        }
        if let Some(answers) = prompt.strip_prefix("MERGE ") {
            self.merges.lock().push(answers.to_string());
            return Ok(format!("merged: {answers}"));
        }
        Ok(String::new())
    }
}

#[derive(Default)]
struct ScriptedWeb {
    results: Vec<Chunk>,
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl WebFallbackSource for ScriptedWeb {
    async fn fetch(&self, _query: &str, limit: usize) -> Result<Vec<Chunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::backend("searxng", "connection refused"));
        }
        Ok(self.results.iter().take(limit).cloned().collect())
    }
}

fn chunk(id: &str, name: &str, content: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        content: content.to_string(),
        metadata: ChunkMetadata {
            document_id: name.to_string(),
            document_name: name.to_string(),
            document_part: 0,
            collection_id: "docs".to_string(),
            created_at: Utc::now(),
            extra: Default::default(),
        },
    }
}

fn candidates(contents: &[&str]) -> Vec<SearchResult> {
    contents
        .iter()
        .enumerate()
        .map(|(i, content)| SearchResult {
            method: MethodTag::from(QueryMethod::Semantic),
            score: 1.0 - i as f64 * 0.01,
            chunk: chunk(&format!("c{i}"), &format!("doc{}.md", i / 2), content),
        })
        .collect()
}

fn numbered(n: usize) -> Vec<SearchResult> {
    let contents: Vec<String> = (0..n).map(|i| format!("passage {i}")).collect();
    candidates(&contents.iter().map(String::as_str).collect::<Vec<_>>())
}

fn prompts() -> PromptSet {
    PromptSet {
        classify: "CLASSIFY {context}".into(),
        passage: "PASSAGE {passage}".into(),
        direct: "DIRECT {query}".into(),
        merge: "MERGE {answers}".into(),
        ..PromptSet::default()
    }
}

fn orchestrator(completer: Arc<ScriptedCompleter>, web: Arc<ScriptedWeb>) -> RetrievalOrchestrator {
    let settings = AgentSettings { synthesis_timeout_ms: 100, ..AgentSettings::default() };
    let params = CompletionParams { model: "test".into(), temperature: 0.0, max_tokens: 64 };
    RetrievalOrchestrator::new(completer, web, prompts(), params, settings, 20.0)
}

async fn run(replies: &[&str], candidates: &[SearchResult], web: ScriptedWeb) -> (OrchestratedAnswer, usize, usize) {
    let completer = ScriptedCompleter::new(replies);
    let web = Arc::new(web);
    let out = orchestrator(completer.clone(), web.clone())
        .answer("how do I store water?", candidates, 5, 5, &CancellationToken::new())
        .await
        .expect("orchestration");
    (out, completer.classifications(), web.calls.load(Ordering::SeqCst))
}

#[tokio::test]
async fn exhausted_windows_escalate_to_web_instead_of_classifying_empty_window() {
    let (out, classified, web_calls) = run(&["3", "3", "1"], &numbered(8), ScriptedWeb::default()).await;
    assert_eq!(classified, 2);
    assert_eq!(web_calls, 1);
    assert_eq!(out.verdict, Verdict::NeedsWebSearch);
    assert_eq!(out.retries_used, 1);
    assert_eq!(out.answer, PromptSet::default().nothing_found);
    assert!(out.source_names.is_empty() && out.source_contents.is_empty());
}

#[tokio::test]
async fn web_results_become_the_window() {
    let web = ScriptedWeb {
        results: vec![
            chunk("https://a.example", "Rain barrels (https://a.example)", "barrels hold rain"),
            chunk("https://b.example", "Cisterns (https://b.example)", "irrelevant"),
        ],
        ..ScriptedWeb::default()
    };
    let (out, classified, _) = run(&["3", "3"], &numbered(8), web).await;
    assert_eq!(classified, 2);
    assert_eq!(out.verdict, Verdict::NeedsWebSearch);
    assert_eq!(out.source_names, vec!["Rain barrels (https://a.example)".to_string()]);
    assert_eq!(out.source_contents, vec!["barrels hold rain".to_string()]);
    assert_eq!(out.answer, "merged: 1. from barrels hold rain");
}

#[tokio::test]
async fn classification_count_is_bounded_by_max_retries() {
    let many = numbered(100);
    for max_retries in 0..4 {
        for reply in ["3", "0", "no idea"] {
            let completer = ScriptedCompleter::new(&[reply; 20]);
            let out = orchestrator(completer.clone(), Arc::new(ScriptedWeb::default()))
                .answer("q", &many, 5, max_retries, &CancellationToken::new())
                .await
                .expect("orchestration");
            assert_eq!(completer.classifications(), max_retries + 1, "reply {reply}");
            assert_eq!(out.retries_used, max_retries);
        }
    }
}

#[tokio::test]
async fn unclear_after_retries_apologizes_without_web() {
    let (out, classified, web_calls) = run(&["0", "0"], &numbered(10), ScriptedWeb::default()).await;
    assert_eq!(classified, 2);
    assert_eq!(web_calls, 0);
    assert_eq!(out.verdict, Verdict::Unclear);
    assert_eq!(out.answer, PromptSet::default().unclear_answer);
    assert!(out.source_names.is_empty());
}

#[tokio::test]
async fn same_script_same_outcome() {
    let items = numbered(12);
    let first = run(&["3", "0", "1"], &items, ScriptedWeb::default()).await.0;
    let second = run(&["3", "0", "1"], &items, ScriptedWeb::default()).await.0;
    assert_eq!(first.verdict, second.verdict);
    assert_eq!(first.retries_used, second.retries_used);
    assert_eq!(first.source_names, second.source_names);
    assert_eq!(first.verdict, Verdict::Answerable);
    assert_eq!(first.retries_used, 2);
    assert_eq!(first.source_names, vec!["doc5.md".to_string()]);
}

#[tokio::test]
async fn no_context_answers_never_cite_passages() {
    let (out, classified, _) = run(&["2"], &numbered(6), ScriptedWeb::default()).await;
    assert_eq!(classified, 1);
    assert_eq!(out.verdict, Verdict::NoContextNeeded);
    assert_eq!(out.source_names, vec![NO_SOURCES.to_string()]);
    assert_eq!(out.source_contents, vec![NO_SOURCES.to_string()]);
    assert_eq!(out.answer, "merged: 1. hello there");
}

#[tokio::test]
async fn failed_and_irrelevant_passages_are_dropped() {
    let items = candidates(&["useful one", "irrelevant", "broken", "useful two", "slow"]);
    let (out, _, _) = run(&["1"], &items, ScriptedWeb::default()).await;
    assert_eq!(out.verdict, Verdict::Answerable);
    assert_eq!(out.source_names, vec!["doc0.md".to_string(), "doc1.md".to_string()]);
    assert_eq!(out.source_contents, vec!["useful one".to_string(), "useful two".to_string()]);
    assert_eq!(out.answer, "merged: 1. from useful one\n2. from useful two");
}

#[tokio::test]
async fn nothing_useful_skips_the_merge_call() {
    let completer = ScriptedCompleter::new(&["1"]);
    let items = candidates(&["irrelevant", "broken"]);
    let out = orchestrator(completer.clone(), Arc::new(ScriptedWeb::default()))
        .answer("q", &items, 5, 5, &CancellationToken::new())
        .await
        .expect("orchestration");
    assert_eq!(out.answer, PromptSet::default().nothing_found);
    assert!(out.source_names.is_empty());
    assert!(completer.merges.lock().is_empty());
}

#[tokio::test]
async fn explicit_web_request_skips_remaining_windows() {
    let (out, classified, web_calls) = run(&["4"], &numbered(20), ScriptedWeb::default()).await;
    assert_eq!(classified, 1);
    assert_eq!(web_calls, 1);
    assert_eq!(out.retries_used, 0);
    assert_eq!(out.verdict, Verdict::NeedsWebSearch);
}

#[tokio::test]
async fn empty_candidates_still_classify_once() {
    let (out, classified, web_calls) = run(&["3", "3"], &[], ScriptedWeb::default()).await;
    assert_eq!((classified, web_calls), (1, 1));
    assert_eq!(out.verdict, Verdict::NeedsWebSearch);

    let (out, classified, _) = run(&["2"], &[], ScriptedWeb::default()).await;
    assert_eq!(classified, 1);
    assert_eq!(out.source_names, vec![NO_SOURCES.to_string()]);
}

#[tokio::test]
async fn web_failure_reads_as_nothing_found() {
    let web = ScriptedWeb { fail: true, ..ScriptedWeb::default() };
    let (out, _, web_calls) = run(&["4"], &numbered(3), web).await;
    assert_eq!(web_calls, 1);
    assert_eq!(out.answer, PromptSet::default().nothing_found);
    assert!(out.source_names.is_empty());
}

#[tokio::test]
async fn cancellation_returns_no_partial_answer() {
    let completer = ScriptedCompleter::new(&["1"]);
    let token = CancellationToken::new();
    token.cancel();
    let err = orchestrator(completer.clone(), Arc::new(ScriptedWeb::default()))
        .answer("q", &numbered(5), 5, 5, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CancelledByCaller));
    assert_eq!(completer.classifications(), 0);
}
