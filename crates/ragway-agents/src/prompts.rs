//! Prompt templates.
//!
//! Placeholders are `{query}`, `{context}`, `{passage}` and `{answers}`.
//! Every field can be replaced from the `[prompts]` config table.

use serde::Deserialize;

/// Reply a passage agent gives when its passage is irrelevant.
pub const NOTHING_HERE: &str = "nothing here";

/// Stands in for sources when the answer used no retrieved context.
pub const NO_SOURCES: &str = "no sources";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    pub system: String,
    pub classify: String,
    pub passage: String,
    pub direct: String,
    pub merge: String,
    pub unclear_answer: String,
    pub nothing_found: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: "You are a careful research assistant. Be concise and accurate.".to_string(),
            classify: "Decide whether the passages below are enough to answer the question.\n\n\
                Question: {query}\n\n\
                Passages:\n{context}\n\n\
                Reply with one digit and nothing else:\n\
                0 - the question is unclear or meaningless\n\
                1 - the passages contain the answer\n\
                2 - the question needs no documents (greeting, small talk, general knowledge)\n\
                3 - the passages are related but not sufficient\n\
                4 - the question needs current information from the web"
                .to_string(),
            passage: "Answer the question using only the passage below. \
                If the passage does not help, reply exactly: nothing here\n\n\
                Question: {query}\n\n\
                Passage:\n{passage}"
                .to_string(),
            direct: "Answer the question directly.\n\nQuestion: {query}".to_string(),
            merge: "Write one clear answer to the question from the notes below. \
                Present it as your own answer. Do not mention notes, agents or their answers.\n\n\
                Question: {query}\n\n\
                Notes:\n{answers}"
                .to_string(),
            unclear_answer: "Sorry, I could not understand the question. Could you rephrase it?".to_string(),
            nothing_found: "I could not find anything that answers this question.".to_string(),
        }
    }
}

/// Single-pass placeholder substitution. Unknown placeholders are left as is,
/// and substituted values are never scanned again.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail
            .find('}')
            .and_then(|close| vars.iter().find(|(name, _)| *name == &tail[1..close]).map(|(_, v)| (close, *v)));
        match value {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl PromptSet {
    pub fn classify(&self, query: &str, context: &str) -> String {
        render(&self.classify, &[("query", query), ("context", context)])
    }

    pub fn passage(&self, query: &str, passage: &str) -> String {
        render(&self.passage, &[("query", query), ("passage", passage)])
    }

    pub fn direct(&self, query: &str) -> String {
        render(&self.direct, &[("query", query)])
    }

    pub fn merge(&self, query: &str, answers: &[&str]) -> String {
        let numbered: Vec<String> = answers.iter().enumerate().map(|(i, a)| format!("{}. {}", i + 1, a.trim())).collect();
        render(&self.merge, &[("query", query), ("answers", &numbered.join("\n"))])
    }
}

/// True when a passage agent's reply carries no information.
pub fn is_empty_answer(answer: &str) -> bool {
    let trimmed = answer.trim().trim_end_matches('.').trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOTHING_HERE)
}
