use async_trait::async_trait;
use bricksmith_core::client::{Completion, CompletionClient, Prompt};
use bricksmith_core::config::LlmConfig;
use bricksmith_core::{BricksmithError, Result};
use claude_driver::{CompletionOptions, CompletionRequest, DriverError};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ClaudeCompletion
// ---------------------------------------------------------------------------

/// Production [`CompletionClient`]: each call drives one `claude` CLI
/// subprocess through `claude-driver`, bounded by the configured timeout.
pub struct ClaudeCompletion {
    model: String,
    timeout: Duration,
}

impl ClaudeCompletion {
    pub fn new(llm: &LlmConfig) -> Self {
        Self {
            model: llm.model.clone(),
            timeout: Duration::from_secs(llm.timeout_secs),
        }
    }
}

#[async_trait]
impl CompletionClient for ClaudeCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion> {
        let request = CompletionRequest {
            system_prompt: prompt.system.clone(),
            prompt: prompt.user.clone(),
            opts: CompletionOptions {
                model: Some(self.model.clone()),
                // Pure text completion: one turn, no tool access.
                max_turns: Some(1),
                timeout: Some(self.timeout),
                ..Default::default()
            },
        };

        let completion = claude_driver::complete(request).await.map_err(|e| match e {
            // A missing/unspawnable binary is an environment failure, not
            // something a retry with feedback can fix.
            DriverError::Io(io) => BricksmithError::Io(io),
            other => BricksmithError::Completion(other.to_string()),
        })?;

        if completion.is_error {
            return Err(BricksmithError::Completion(format!(
                "completion ended with an error result after {} turns",
                completion.num_turns
            )));
        }

        Ok(Completion {
            session_id: completion.session_id,
            text: completion.text,
        })
    }
}
