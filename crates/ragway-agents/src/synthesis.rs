use std::time::Duration;

use futures::future::join_all;

use ragway_core::error::Result;
use ragway_core::runtime::{cancellable, with_timeout};
use ragway_core::traits::{CompletionParams, Completer, Message};
use ragway_core::CancellationToken;

/// Parallel per-passage completions followed by a single merge call.
pub struct Synthesizer<'a> {
    pub completer: &'a dyn Completer,
    pub params: &'a CompletionParams,
    pub system: &'a str,
    pub timeout: Duration,
}

impl Synthesizer<'_> {
    fn messages(&self, prompt: &str) -> [Message; 2] {
        [Message::system(self.system), Message::user(prompt)]
    }

    /// One completion per prompt, all in flight at once. Output order follows
    /// input order. A call that fails or times out yields `""`.
    pub async fn fan_out(&self, prompts: &[String], cancel: &CancellationToken) -> Result<Vec<String>> {
        let calls = prompts.iter().enumerate().map(|(index, prompt)| async move {
            let messages = self.messages(prompt);
            match with_timeout("synthesis", self.timeout, self.completer.complete(&messages, self.params)).await {
                Ok(answer) => answer,
                Err(err) => {
                    tracing::warn!(index, error = %err, "passage completion failed, using empty answer");
                    String::new()
                }
            }
        });
        cancellable(cancel, async { Ok(join_all(calls).await) }).await
    }

    pub async fn merge(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        let messages = self.messages(prompt);
        cancellable(cancel, self.completer.complete(&messages, self.params))
            .await
            .map(|answer| answer.trim().to_string())
    }
}
