//! Prompt construction and the rig-backed generator.

use async_trait::async_trait;
use rig::completion::Prompt;
use tracing::debug;

use crate::channels::MessageRecord;
use crate::error::LlmError;

/// System preamble sent with every request.
pub const SYSTEM_PREAMBLE: &str = "You are a professional email assistant.";

/// Turns an inbound message into reply text.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, record: &MessageRecord) -> Result<String, LlmError>;
}

/// Fixed-shape user prompt embedding sender, subject and body.
pub fn build_prompt(record: &MessageRecord) -> String {
    format!(
        "You are a professional email assistant. Draft a reply to the following email:\n\n\
         From: {from}\n\
         Subject: {subject}\n\
         Body: {body}\n\n\
         Write a concise and professional reply:",
        from = record.from,
        subject = record.subject,
        body = record.body,
    )
}

/// Generator backed by any rig agent.
pub struct RigReplyGenerator<A> {
    agent: A,
    provider: String,
    model: String,
}

impl<A> RigReplyGenerator<A> {
    pub fn new(agent: A, provider: &str, model: &str) -> Self {
        Self {
            agent,
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl<A> ReplyGenerator for RigReplyGenerator<A>
where
    A: Prompt + Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, record: &MessageRecord) -> Result<String, LlmError> {
        debug!(id = %record.id, model = %self.model, "Requesting reply");

        let reply = self
            .agent
            .prompt(build_prompt(record))
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.clone(),
                reason: e.to_string(),
            })?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.provider.clone(),
            });
        }
        Ok(reply.to_string())
    }
}
